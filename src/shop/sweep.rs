//! Abandoned-cart nudges.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::format_ts;
use crate::db::queries::carts;
use crate::error::AppError;
use crate::notify::mailer::Mailer;
use crate::notify::templates::Templates;
use crate::notify::{Addressee, Notification, worker};
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Flag idle carts under lock, commit, then email their owners.
///
/// A cart whose email fails is unflagged so the next sweep retries it.
pub async fn sweep_abandoned_carts<M: Mailer>(
    state: &AppState,
    mailer: &M,
    templates: &Templates,
    now: NaiveDateTime,
) -> Result<SweepReport, AppError> {
    let scheduler = &state.config.scheduler;
    let idle_before = format_ts(now - Duration::minutes(scheduler.cart_abandon_after_minutes));
    let stamp = format_ts(now);

    let mut tx = state.db.begin().await?;
    let candidates =
        carts::lock_sweep_candidates_tx(&mut tx, &idle_before, scheduler.cart_sweep_limit).await?;
    for c in &candidates {
        carts::mark_help_sent_tx(&mut tx, c.cart_id, &stamp).await?;
    }
    tx.commit().await?;

    let mut report = SweepReport {
        claimed: candidates.len(),
        ..SweepReport::default()
    };
    for c in candidates {
        let notification = Notification::CartHelp {
            to: Addressee {
                name: c.user_name,
                email: c.user_email,
            },
            cart_id: c.cart_id,
        };
        match worker::deliver(mailer, templates, &notification).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                warn!(cart_id = c.cart_id, user_id = c.user_id, "cart help email failed: {e}");
                if let Err(e) = carts::clear_help_sent(&state.db, c.cart_id, &stamp).await {
                    warn!(cart_id = c.cart_id, "failed to reset cart help flag: {e}");
                }
            }
        }
    }

    if report.claimed > 0 {
        info!(
            claimed = report.claimed,
            sent = report.sent,
            failed = report.failed,
            "abandoned cart sweep finished"
        );
    }
    Ok(report)
}
