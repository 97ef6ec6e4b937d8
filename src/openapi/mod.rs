use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pharma Ledger API",
        version = "0.1.0",
        description = r#"
Per-warehouse stock for pharmaceutical distribution.

Every stock change is an immutable movement (IMPORT, EXPORT or TRANSFER).
Aggregate stock and expiry-dated lots are kept in step with the movement log
inside one database transaction. Lots are consumed earliest-expiry first.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "inventory", description = "Stock transactions, stock items, lots and movements"),
        (name = "orders", description = "Order status and confirmation-driven fulfilment"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::inventory::create_transaction,
        crate::handlers::inventory::list_stock_items,
        crate::handlers::inventory::list_batches,
        crate::handlers::inventory::list_movements,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::inventory::CreateTransactionBody,
            crate::handlers::orders::UpdateOrderStatusBody,
            crate::handlers::health::HealthResponse,
            crate::handlers::common::PaginationMeta,
            crate::services::stock_transactions::TransactionItem,
            crate::services::stock_ledger::MovementRecord,
            crate::services::batch_registry::AllocationLine,
            crate::entities::stock_item::Model,
            crate::entities::batch::Model,
            crate::entities::stock_movement::Model,
            crate::entities::stock_movement_lot::Model,
            crate::entities::order::Model,
            crate::entities::stock_movement::MovementType,
            crate::entities::batch::BatchStatus,
            crate::entities::order::OrderStatus,
            crate::errors::ErrorResponse,
            crate::errors::ErrorKind
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDocV1::openapi();
        for path in [
            "/api/v1/inventory/transactions",
            "/api/v1/inventory/stock-items",
            "/api/v1/inventory/batches",
            "/api/v1/inventory/movements",
            "/api/v1/orders/{id}",
            "/api/v1/orders/{id}/status",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
