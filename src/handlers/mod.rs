pub mod common;
pub mod health;
pub mod inventory;
pub mod orders;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        batch_registry::BatchRegistryService, order_status::OrderStatusService,
        stock_ledger::StockLedgerService, stock_transactions::StockTransactionService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub stock_transactions: Arc<StockTransactionService>,
    pub batches: Arc<BatchRegistryService>,
    pub ledger: Arc<StockLedgerService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        Self {
            stock_transactions: Arc::new(StockTransactionService::new(
                db_pool.clone(),
                config.default_lot_code.clone(),
            )),
            batches: Arc::new(BatchRegistryService::new(db_pool.clone())),
            ledger: Arc::new(StockLedgerService::new(db_pool.clone())),
            order_status: Arc::new(OrderStatusService::new(
                db_pool,
                config.default_warehouse_id,
                config.default_lot_code.clone(),
            )),
        }
    }
}
