use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike, Utc};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::config::{ScheduleConfig, SchedulerConfig};
use crate::lending::requests;
use crate::notify::mailer::Mailer;
use crate::notify::templates::Templates;
use crate::shop::sweep;
use crate::state::AppState;

/// Validate both job schedules at startup.
pub fn validate_config(config: &SchedulerConfig) -> Result<(), String> {
    validate_schedule("scheduler.reminders", &config.reminders)?;
    validate_schedule("scheduler.cart_sweep", &config.cart_sweep)?;
    if config.cart_abandon_after_minutes < 1 {
        return Err("scheduler.cart_abandon_after_minutes must be at least 1".to_string());
    }
    if config.cart_sweep_limit < 1 {
        return Err("scheduler.cart_sweep_limit must be at least 1".to_string());
    }
    Ok(())
}

fn validate_schedule(name: &str, config: &ScheduleConfig) -> Result<(), String> {
    for &m in &config.schedule_minutes {
        if m > 59 {
            return Err(format!("{name}.schedule_minutes: {m} is out of range 0..=59"));
        }
    }
    for &h in &config.schedule_hours {
        if h > 23 {
            return Err(format!("{name}.schedule_hours: {h} is out of range 0..=23"));
        }
    }
    for &d in &config.schedule_day_of_week {
        if !(1..=7).contains(&d) {
            return Err(format!(
                "{name}.schedule_day_of_week: {d} is out of range 1..=7 (Mon=1..Sun=7)"
            ));
        }
    }
    Ok(())
}

/// Check whether `now` (UTC) matches the schedule.
fn matches_schedule(config: &ScheduleConfig, now: NaiveDateTime) -> bool {
    let minute = now.minute();
    let hour = now.hour();
    let dow = now.weekday().number_from_monday(); // 1=Mon..7=Sun

    let minute_ok = config.schedule_minutes.is_empty() || config.schedule_minutes.contains(&minute);
    let hour_ok = config.schedule_hours.is_empty() || config.schedule_hours.contains(&hour);
    let dow_ok =
        config.schedule_day_of_week.is_empty() || config.schedule_day_of_week.contains(&dow);

    minute_ok && hour_ok && dow_ok
}

fn join_or_star(values: &[u32]) -> String {
    if values.is_empty() {
        "*".to_string()
    } else {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Format a schedule for logging.
pub fn format_schedule(config: &ScheduleConfig) -> String {
    let minutes = join_or_star(&config.schedule_minutes);
    let hours = join_or_star(&config.schedule_hours);
    let dow = if config.schedule_day_of_week.is_empty() {
        "*".to_string()
    } else {
        let names = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        config
            .schedule_day_of_week
            .iter()
            .map(|&d| *names.get((d as usize).wrapping_sub(1)).unwrap_or(&"?"))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("minutes=[{minutes}] hours=[{hours}] days=[{dow}]")
}

/// Run the scheduler loop. Wakes at the top of every minute and spawns
/// whichever jobs are due.
pub async fn run<M>(state: AppState, mailer: M, templates: Arc<Templates>)
where
    M: Mailer + Clone + 'static,
{
    let config = &state.config.scheduler;
    info!(
        "Scheduler started: reminders {}, cart sweep {}",
        format_schedule(&config.reminders),
        format_schedule(&config.cart_sweep)
    );

    loop {
        // Sleep until the start of the next minute
        let now = Utc::now();
        let wait = Duration::from_secs(60 - u64::from(now.second()))
            - Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
        sleep(wait).await;

        let tick = Utc::now().naive_utc();
        if matches_schedule(&config.reminders, tick) {
            let state = state.clone();
            tokio::spawn(async move {
                match requests::remind_due_tomorrow(&state, tick).await {
                    Ok(n) => info!("Scheduled reminders queued: {n}"),
                    Err(e) => warn!("Scheduled reminders failed: {e}"),
                }
            });
        }
        if matches_schedule(&config.cart_sweep, tick) {
            let state = state.clone();
            let mailer = mailer.clone();
            let templates = templates.clone();
            tokio::spawn(async move {
                if let Err(e) = sweep::sweep_abandoned_carts(&state, &mailer, &templates, tick).await {
                    warn!("Scheduled cart sweep failed: {e}");
                }
            });
        }
    }
}
