use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::notify::Outbox;
use crate::shop::payments::StripeGateway;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub outbox: Outbox,
    pub payments: Arc<StripeGateway>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, outbox: Outbox, payments: StripeGateway) -> Self {
        Self {
            config: Arc::new(config),
            db,
            outbox,
            payments: Arc::new(payments),
        }
    }
}
