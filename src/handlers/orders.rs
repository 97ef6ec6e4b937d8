use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::success_response;
use crate::{entities::order::OrderStatus, errors::ServiceError, AppState};

/// Body of `PUT /orders/{id}/status`
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusBody {
    pub status: OrderStatus,
    /// Fulfilling warehouse for a confirmation; overrides the order's own
    pub warehouse_id: Option<Uuid>,
    /// Actor recorded on movements produced by a confirmation; required to confirm
    pub changed_by: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = crate::entities::order::Model),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.order_status.get_order(id).await?;
    Ok(success_response(order))
}

/// Move an order along its lifecycle. Confirming a pending order consumes its
/// lines from stock, earliest-expiring lots first.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusBody,
    responses(
        (status = 200, description = "Order status updated", body = crate::entities::order::Model),
        (status = 400, description = "Malformed body, no fulfilling warehouse or no actor", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or warehouse not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid transition or concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateOrderStatusBody>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(body) = body?;
    let order = state
        .services
        .order_status
        .update_status(id, body.status, body.warehouse_id, body.changed_by)
        .await?;

    info!(order_id = %id, status = %order.status, "Order status updated");
    Ok(success_response(order))
}
