// Lot registry and FEFO allocation
pub mod batch_registry;

// Movement log and ledger queries
pub mod stock_ledger;

// Atomic stock transactions (import / export / transfer)
pub mod stock_transactions;

// Order status changes and confirmation-driven fulfilment
pub mod order_status;
