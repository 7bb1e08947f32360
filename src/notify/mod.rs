//! Outbound notifications.
//!
//! Services emit a [`Notification`] onto the [`Outbox`] after their
//! transaction commits. A background [`worker`] renders and delivers them,
//! so delivery failures are logged and never reach the caller.

pub mod mailer;
pub mod templates;
pub mod worker;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::db::queries::users::Recipient;

/// Name and email of whoever receives a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Addressee {
    pub name: String,
    pub email: String,
}

impl From<Recipient> for Addressee {
    fn from(r: Recipient) -> Self {
        Addressee {
            name: r.name,
            email: r.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Sent to the citizen and, with `for_admin`, to every admin.
    RequestCreated {
        to: Addressee,
        for_admin: bool,
        request_id: i64,
        number: i64,
        book_name: String,
        citizen_name: String,
        due_at: String,
    },
    ReviewCreated {
        to: Addressee,
        review_id: i64,
        request_number: i64,
        book_name: String,
        rating: i64,
        comment: Option<String>,
    },
    ReviewEvaluated {
        to: Addressee,
        book_name: String,
        approved: bool,
        rejection_reason: Option<String>,
    },
    BookAvailable {
        to: Addressee,
        book_id: i64,
        book_name: String,
    },
    DueTomorrow {
        to: Addressee,
        request_id: i64,
        number: i64,
        book_name: String,
        due_at: String,
    },
    CartHelp {
        to: Addressee,
        cart_id: i64,
    },
}

impl Notification {
    pub fn addressee(&self) -> &Addressee {
        match self {
            Notification::RequestCreated { to, .. }
            | Notification::ReviewCreated { to, .. }
            | Notification::ReviewEvaluated { to, .. }
            | Notification::BookAvailable { to, .. }
            | Notification::DueTomorrow { to, .. }
            | Notification::CartHelp { to, .. } => to,
        }
    }

    /// Template file rendering this notification's body.
    pub fn template(&self) -> &'static str {
        match self {
            Notification::RequestCreated { .. } => "request_created.html",
            Notification::ReviewCreated { .. } => "review_created.html",
            Notification::ReviewEvaluated { .. } => "review_evaluated.html",
            Notification::BookAvailable { .. } => "book_available.html",
            Notification::DueTomorrow { .. } => "due_tomorrow.html",
            Notification::CartHelp { .. } => "cart_help.html",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::RequestCreated {
                for_admin: true,
                number,
                ..
            } => format!("New book request #{number}"),
            Notification::RequestCreated { number, .. } => {
                format!("Your book request #{number} was created")
            }
            Notification::ReviewCreated { book_name, .. } => {
                format!("New review awaiting moderation: {book_name}")
            }
            Notification::ReviewEvaluated { approved: true, .. } => {
                "Your review was approved".to_string()
            }
            Notification::ReviewEvaluated { .. } => "Your review was rejected".to_string(),
            Notification::BookAvailable { book_name, .. } => {
                format!("{book_name} is available again")
            }
            Notification::DueTomorrow { number, .. } => {
                format!("Request #{number} is due tomorrow")
            }
            Notification::CartHelp { .. } => "Need a hand with your cart?".to_string(),
        }
    }
}

/// Sending half of the notification queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Outbox {
    pub fn channel() -> (Outbox, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, rx)
    }

    /// Queue a notification. Never blocks and never fails the caller.
    pub fn emit(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::warn!(
                kind = e.0.template(),
                "notification dropped: outbox worker is gone"
            );
        }
    }

    pub fn emit_all(&self, notifications: impl IntoIterator<Item = Notification>) {
        for n in notifications {
            self.emit(n);
        }
    }
}
