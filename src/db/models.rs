use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;

/// A status column held a value this build does not know about.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    kind: &'static str,
    value: String,
}

macro_rules! status_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownStatus { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

status_enum!(RequestStatus, "request", {
    Active => "active",
    AwaitingConfirmation => "awaiting_confirmation",
    Completed => "completed",
    Canceled => "canceled",
});

status_enum!(ReviewStatus, "review", {
    Pending => "pending",
    Active => "active",
    Rejected => "rejected",
});

status_enum!(CartStatus, "cart", {
    Active => "active",
    Converted => "converted",
    Abandoned => "abandoned",
});

status_enum!(OrderStatus, "order", {
    PendingPayment => "pending_payment",
    Paid => "paid",
    Canceled => "canceled",
    Expired => "expired",
});

impl RequestStatus {
    /// Statuses that hold a copy of the book (count against stock and the per-user cap).
    pub const CLAIMS: [RequestStatus; 2] =
        [RequestStatus::Active, RequestStatus::AwaitingConfirmation];

    pub fn is_claim(self) -> bool {
        Self::CLAIMS.contains(&self)
    }
}

/// SQL fragment listing the claim statuses, for `status IN (...)` filters.
pub const CLAIM_STATUSES_SQL: &str = "('active', 'awaiting_confirmation')";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub profile_photo_path: Option<String>,
    pub is_admin: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub cover: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    /// Unit price in integer cents.
    pub fn price_cents(&self) -> i64 {
        price_to_cents(self.price)
    }
}

pub fn price_to_cents(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Citizen details copied onto a request when it is created.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CitizenSnapshot {
    #[sqlx(rename = "citizen_name")]
    pub name: String,
    #[sqlx(rename = "citizen_email")]
    pub email: Option<String>,
    #[sqlx(rename = "citizen_photo")]
    pub photo: Option<String>,
}

/// Book details copied onto a request when it is created.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct BookSnapshot {
    #[sqlx(rename = "book_name")]
    pub name: String,
    #[sqlx(rename = "book_cover")]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BookRequest {
    pub id: i64,
    pub number: i64,
    pub book_id: Option<i64>,
    pub user_id: Option<i64>,
    #[sqlx(flatten)]
    pub citizen: CitizenSnapshot,
    #[sqlx(flatten)]
    pub book: BookSnapshot,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub requested_at: String,
    pub due_at: String,
    pub returned_at: Option<String>,
    pub received_at: Option<String>,
    pub received_by_admin_id: Option<i64>,
    pub days_elapsed: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl BookRequest {
    pub fn is_overdue(&self, now: &str) -> bool {
        self.status.is_claim() && now > self.due_at.as_str()
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Review {
    pub id: i64,
    pub request_id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub status: CartStatus,
    pub last_activity_at: Option<String>,
    pub help_email_sent_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub book_id: i64,
    pub qty: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AvailabilityAlert {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub total_amount: i64,
    pub currency: String,
    pub delivery_name: String,
    pub delivery_address_line1: String,
    pub delivery_address_line2: Option<String>,
    pub delivery_zip: String,
    pub delivery_city: String,
    pub delivery_country: String,
    pub payment_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub book_id: Option<i64>,
    pub book_name: String,
    pub unit_price: i64,
    pub qty: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SystemLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub module: String,
    pub record_id: String,
    pub action: String,
    pub changes: Option<String>,
    pub created_at: String,
}
