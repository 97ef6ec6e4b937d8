use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        stock_movement::MovementType,
    },
    errors::ServiceError,
    services::{
        batch_registry,
        stock_transactions::{self, CreateTransactionRequest, TransactionItem},
    },
};

/// Drives order status changes; confirming a pending order consumes stock.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    default_warehouse_id: Option<Uuid>,
    default_lot_code: String,
}

/// Folds lot-level shortfalls into the order-level error callers expect.
fn as_order_shortfall(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::InsufficientBatchStock(detail) => ServiceError::InsufficientStock(detail),
        other => other,
    }
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        default_warehouse_id: Option<Uuid>,
        default_lot_code: impl Into<String>,
    ) -> Self {
        Self {
            db,
            default_warehouse_id,
            default_lot_code: default_lot_code.into(),
        }
    }

    /// Fulfilling warehouse for a confirmation: the explicit one, else the
    /// order's own, else the configured default.
    fn resolve_warehouse(
        &self,
        explicit: Option<Uuid>,
        order: &OrderModel,
    ) -> Result<Uuid, ServiceError> {
        explicit
            .or(order.warehouse_id)
            .or(self.default_warehouse_id)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "MissingWarehouse: no warehouse given for order {} and no default configured",
                    order.order_number
                ))
            })
    }

    /// Consumes stock for every line of `order` from `warehouse_id`, FEFO per line.
    async fn fulfil<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &OrderModel,
        warehouse_id: Uuid,
        changed_by: Uuid,
    ) -> Result<usize, ServiceError> {
        stock_transactions::ensure_warehouse(conn, warehouse_id).await?;

        let lines = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::from_write_error)?;

        let mut movements = 0;
        for line in lines {
            let plan = batch_registry::select_for_consumption(
                conn,
                line.product_id,
                warehouse_id,
                line.quantity,
            )
            .await
            .map_err(as_order_shortfall)?;

            let legs = plan
                .into_iter()
                .map(|allocation| TransactionItem {
                    product_id: line.product_id,
                    quantity: allocation.quantity,
                    batch_lot: Some(allocation.batch.lot_code),
                    expiry_date: allocation.batch.expiry_date,
                    unit_price: line.unit_price,
                })
                .collect();

            let request = CreateTransactionRequest {
                movement_type: MovementType::Export,
                warehouse_id,
                to_warehouse_id: None,
                items: legs,
                reason: format!("Order {} confirmed", order.order_number),
                notes: None,
                created_by: changed_by,
                order_id: Some(order.id),
            };

            let records = stock_transactions::apply_in(conn, &request, &self.default_lot_code)
                .await
                .map_err(as_order_shortfall)?;
            movements += records.len();
        }

        Ok(movements)
    }

    /// Moves an order to `new_status`.
    ///
    /// PENDING -> CONFIRMED also exports the order lines from the resolved
    /// warehouse in the same transaction; a shortfall on any line fails the
    /// whole confirmation with `InsufficientStock` and leaves the order PENDING.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        warehouse_id: Option<Uuid>,
        changed_by: Option<Uuid>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::from_write_error(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::from_write_error)?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            error!("Invalid status transition from {} to {}", old_status, new_status);
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let mut movements = 0;
        if old_status == OrderStatus::Pending && new_status == OrderStatus::Confirmed {
            let actor = confirming_actor(changed_by)?;
            let warehouse_id = self.resolve_warehouse(warehouse_id, &order)?;
            movements = self.fulfil(&txn, &order, warehouse_id, actor).await?;
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status.to_value()))
            .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&txn)
            .await
            .map_err(ServiceError::from_write_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(format!(
                "order {} was modified concurrently",
                order_id
            )));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::from_write_error)?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::from_write_error(e)
        })?;

        info!(
            movements,
            "Order {} status updated from '{}' to '{}'", order_id, old_status, new_status
        );
        Ok(updated)
    }

    /// Gets an order by id
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }
}

/// Confirmation writes ledger entries, so it needs a named actor.
fn confirming_actor(changed_by: Option<Uuid>) -> Result<Uuid, ServiceError> {
    changed_by.filter(|id| !id.is_nil()).ok_or_else(|| {
        ServiceError::ValidationError(
            "MissingActor: changedBy is required to confirm an order".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;

    fn order(warehouse_id: Option<Uuid>) -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "SO-1".into(),
            customer_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            warehouse_id,
            total_amount: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn service(default_warehouse_id: Option<Uuid>) -> OrderStatusService {
        // resolution never queries, so a disconnected handle is enough
        OrderStatusService::new(
            Arc::new(DatabaseConnection::Disconnected),
            default_warehouse_id,
            "DEFAULT",
        )
    }

    #[test]
    fn explicit_warehouse_wins() {
        let explicit = Uuid::new_v4();
        let svc = service(Some(Uuid::new_v4()));
        let resolved = svc
            .resolve_warehouse(Some(explicit), &order(Some(Uuid::new_v4())))
            .unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn order_warehouse_beats_configured_default() {
        let own = Uuid::new_v4();
        let svc = service(Some(Uuid::new_v4()));
        assert_eq!(svc.resolve_warehouse(None, &order(Some(own))).unwrap(), own);
    }

    #[test]
    fn configured_default_is_the_last_resort() {
        let fallback = Uuid::new_v4();
        let svc = service(Some(fallback));
        assert_eq!(svc.resolve_warehouse(None, &order(None)).unwrap(), fallback);

        let svc = service(None);
        assert_matches!(
            svc.resolve_warehouse(None, &order(None)),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("MissingWarehouse")
        );
    }

    #[test]
    fn confirmation_requires_a_real_actor() {
        let actor = Uuid::new_v4();
        assert_eq!(confirming_actor(Some(actor)).unwrap(), actor);
        for missing in [None, Some(Uuid::nil())] {
            assert_matches!(
                confirming_actor(missing),
                Err(ServiceError::ValidationError(msg)) if msg.starts_with("MissingActor")
            );
        }
    }

    #[test]
    fn batch_shortfall_is_reported_as_insufficient_stock() {
        assert_matches!(
            as_order_shortfall(ServiceError::InsufficientBatchStock("x".into())),
            ServiceError::InsufficientStock(_)
        );
        assert_matches!(
            as_order_shortfall(ServiceError::MissingDestination),
            ServiceError::MissingDestination
        );
    }
}
