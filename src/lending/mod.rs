//! Borrowing: the request lifecycle, the review gate and availability alerts.

pub mod alerts;
pub mod requests;
pub mod reviews;

use crate::db::DbPool;
use crate::db::queries::users;
use crate::notify::{Addressee, Notification};

/// Address of a user, if they have an email on file.
pub(crate) async fn addressee(pool: &DbPool, user_id: i64) -> Option<Addressee> {
    match users::get_by_id(pool, user_id).await {
        Ok(Some(user)) => user
            .email
            .filter(|e| !e.is_empty())
            .map(|email| Addressee {
                name: user.name,
                email,
            }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(user_id, "could not load notification recipient: {e}");
            None
        }
    }
}

/// One notification per admin, built by `make`.
pub(crate) async fn to_admins(
    pool: &DbPool,
    make: impl Fn(Addressee) -> Notification,
) -> Vec<Notification> {
    match users::admin_recipients(pool).await {
        Ok(admins) => admins.into_iter().map(|a| make(a.into())).collect(),
        Err(e) => {
            tracing::warn!("could not load admin recipients: {e}");
            Vec::new()
        }
    }
}
