use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, success_response, PaginatedResponse};
use crate::{
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::{
        batch_registry::BatchFilter,
        stock_ledger::MovementFilter,
        stock_transactions::{CreateTransactionRequest, StockItemFilter, TransactionItem},
    },
    AppState,
};

/// Body of `POST /inventory/transactions`
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionBody {
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Source warehouse for EXPORT and TRANSFER, destination for IMPORT
    pub warehouse_id: Uuid,
    /// Destination of a TRANSFER
    pub to_warehouse_id: Option<Uuid>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<TransactionItem>,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub creator_id: Uuid,
    pub order_id: Option<Uuid>,
}

impl From<CreateTransactionBody> for CreateTransactionRequest {
    fn from(body: CreateTransactionBody) -> Self {
        Self {
            movement_type: body.movement_type,
            warehouse_id: body.warehouse_id,
            to_warehouse_id: body.to_warehouse_id,
            items: body.items,
            reason: body.reason,
            notes: body.notes,
            created_by: body.creator_id,
            order_id: body.order_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StockItemQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BatchQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    /// Include lots that have been fully consumed
    pub include_depleted: Option<bool>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MovementQuery {
    pub product_id: Option<Uuid>,
    /// Matches movements on either side of this warehouse
    pub warehouse_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Apply an import, export or transfer as one atomic stock transaction
#[utoipa::path(
    post,
    path = "/api/v1/inventory/transactions",
    summary = "Create stock transaction",
    request_body = CreateTransactionBody,
    responses(
        (status = 201, description = "Transaction committed", body = Vec<crate::services::stock_ledger::MovementRecord>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product or warehouse", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    body: Result<Json<CreateTransactionBody>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(body) = body?;
    body.validate()?;
    let request = CreateTransactionRequest::from(body);

    let records = state
        .services
        .stock_transactions
        .create_transaction(request)
        .await?;

    info!(movements = records.len(), "Stock transaction created");
    Ok(created_response(records))
}

/// List aggregate stock per product and warehouse
#[utoipa::path(
    get,
    path = "/api/v1/inventory/stock-items",
    summary = "List stock items",
    params(StockItemQuery),
    responses(
        (status = 200, description = "Paged stock items"),
    ),
    tag = "inventory"
)]
pub async fn list_stock_items(
    State(state): State<AppState>,
    Query(query): Query<StockItemQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = state.config.page_size(query.per_page);
    let filter = StockItemFilter {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
    };

    let (items, total) = state
        .services
        .stock_transactions
        .list_stock_items(filter, page, per_page)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        items, page, per_page, total,
    )))
}

/// List lots in consumption order
#[utoipa::path(
    get,
    path = "/api/v1/inventory/batches",
    summary = "List batches",
    params(BatchQuery),
    responses(
        (status = 200, description = "Paged batches, earliest expiry first"),
    ),
    tag = "inventory"
)]
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = state.config.page_size(query.per_page);
    let filter = BatchFilter {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
        include_depleted: query.include_depleted.unwrap_or(false),
    };

    let (batches, total) = state
        .services
        .batches
        .list_batches(filter, page, per_page)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        batches, page, per_page, total,
    )))
}

/// List ledger entries, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/movements",
    summary = "List stock movements",
    params(MovementQuery),
    responses(
        (status = 200, description = "Paged movements with their lot breakdown"),
    ),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = state.config.page_size(query.per_page);
    let filter = MovementFilter {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
        order_id: query.order_id,
        movement_type: query.movement_type,
    };

    let (movements, total) = state
        .services
        .ledger
        .list_movements(filter, page, per_page)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        movements, page, per_page, total,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_uses_wire_names() {
        let product = Uuid::new_v4();
        let body: CreateTransactionBody = serde_json::from_value(json!({
            "type": "TRANSFER",
            "warehouseId": Uuid::nil(),
            "toWarehouseId": Uuid::new_v4(),
            "items": [{ "productId": product, "quantity": 10 }],
            "reason": "rebalance",
            "creatorId": Uuid::new_v4(),
        }))
        .unwrap();

        assert_eq!(body.movement_type, MovementType::Transfer);
        assert!(body.validate().is_ok());
        let request = CreateTransactionRequest::from(body);
        assert_eq!(request.items[0].product_id, product);
        assert!(request.order_id.is_none());
    }

    #[test]
    fn empty_items_fail_validation() {
        let body: CreateTransactionBody = serde_json::from_value(json!({
            "type": "IMPORT",
            "warehouseId": Uuid::new_v4(),
            "items": [],
            "reason": "receipt",
            "creatorId": Uuid::new_v4(),
        }))
        .unwrap();
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
    }
}
