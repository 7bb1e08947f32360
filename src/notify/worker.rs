use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::Notification;
use super::mailer::Mailer;
use super::templates::Templates;
use crate::error::IntegrationError;

/// Render and send a single notification.
pub async fn deliver<M: Mailer>(
    mailer: &M,
    templates: &Templates,
    notification: &Notification,
) -> Result<(), IntegrationError> {
    let email = templates.render(notification)?;
    mailer.send(&email).await?;
    debug!(to = %email.to, kind = notification.template(), "notification delivered");
    Ok(())
}

/// Drain the outbox until every sender is dropped. A failed delivery is
/// logged and skipped; it never stops the worker.
pub async fn run<M: Mailer>(
    mut rx: UnboundedReceiver<Notification>,
    mailer: M,
    templates: Templates,
) {
    info!("Notification worker started");
    while let Some(notification) = rx.recv().await {
        if let Err(e) = deliver(&mailer, &templates, &notification).await {
            warn!(
                to = %notification.addressee().email,
                kind = notification.template(),
                "notification delivery failed: {e}"
            );
        }
    }
    info!("Notification worker stopped");
}
