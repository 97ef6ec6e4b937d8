//! Lot-level stock: inbound upserts, FEFO consumption planning and guarded
//! decrements.
//!
//! The free functions take any [`ConnectionTrait`] so they can run inside the
//! caller's transaction; [`BatchRegistryService`] wraps the pool for reads.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{Expr, Func, NullOrdering, OnConflict},
    ActiveEnum, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::batch::{self, BatchStatus, Entity as BatchEntity},
    errors::ServiceError,
};

/// One step of a consumption plan: take `quantity` units from `batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AllocationLine {
    pub batch: batch::Model,
    pub quantity: i64,
}

/// Expiry ascending with undated lots last, then creation time, then lot code.
fn fefo_order(a: &batch::Model, b: &batch::Model) -> Ordering {
    let expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    expiry
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.lot_code.cmp(&b.lot_code))
}

/// Plans first-expiry-first-out consumption of `quantity_needed` from `batches`.
///
/// Only ACTIVE batches with stock are considered. Lots are drained greedily in
/// FEFO order and the returned lines always sum to `quantity_needed`.
///
/// # Errors
///
/// `InsufficientBatchStock` when the consumable total is below the request,
/// `ValidationError` when the request is not positive.
pub fn plan_fefo(
    batches: Vec<batch::Model>,
    quantity_needed: i64,
) -> Result<Vec<AllocationLine>, ServiceError> {
    if quantity_needed <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be positive, got {}",
            quantity_needed
        )));
    }

    let mut candidates: Vec<batch::Model> =
        batches.into_iter().filter(|b| b.is_consumable()).collect();
    candidates.sort_by(fefo_order);

    let available = candidates
        .iter()
        .fold(0i64, |acc, b| acc.saturating_add(b.current_quantity));
    if available < quantity_needed {
        return Err(ServiceError::InsufficientBatchStock(format!(
            "{} units available across active lots, {} requested",
            available, quantity_needed
        )));
    }

    let mut remaining = quantity_needed;
    let mut plan = Vec::new();
    for batch in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.current_quantity);
        remaining -= take;
        plan.push(AllocationLine {
            batch,
            quantity: take,
        });
    }

    Ok(plan)
}

/// Keyed lookup on `(product_id, warehouse_id, lot_code)`.
pub async fn find_batch<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    lot_code: &str,
) -> Result<Option<batch::Model>, ServiceError> {
    BatchEntity::find()
        .filter(batch::Column::ProductId.eq(product_id))
        .filter(batch::Column::WarehouseId.eq(warehouse_id))
        .filter(batch::Column::LotCode.eq(lot_code))
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)
}

/// Creates the lot or adds `delta_qty` to it.
///
/// Inbound stock raises both the initial and the current quantity and
/// re-activates a depleted lot. An existing expiry date is kept; a missing one
/// is filled from `expiry_date`.
#[instrument(skip(conn), fields(product_id = %product_id, warehouse_id = %warehouse_id))]
pub async fn upsert_batch<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    lot_code: &str,
    expiry_date: Option<NaiveDate>,
    delta_qty: i64,
) -> Result<batch::Model, ServiceError> {
    if delta_qty <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "batch increment must be positive, got {}",
            delta_qty
        )));
    }
    let lot_code = lot_code.trim();
    if lot_code.is_empty() {
        return Err(ServiceError::ValidationError(
            "lot code must not be blank".to_string(),
        ));
    }

    let now = Utc::now();
    let model = batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        lot_code: Set(lot_code.to_string()),
        expiry_date: Set(expiry_date),
        initial_quantity: Set(delta_qty),
        current_quantity: Set(delta_qty),
        status: Set(BatchStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let on_conflict = OnConflict::columns([
        batch::Column::ProductId,
        batch::Column::WarehouseId,
        batch::Column::LotCode,
    ])
    .value(
        batch::Column::InitialQuantity,
        Expr::col((BatchEntity, batch::Column::InitialQuantity)).add(delta_qty),
    )
    .value(
        batch::Column::CurrentQuantity,
        Expr::col((BatchEntity, batch::Column::CurrentQuantity)).add(delta_qty),
    )
    .value(
        batch::Column::ExpiryDate,
        Func::coalesce([
            Expr::col((BatchEntity, batch::Column::ExpiryDate)).into(),
            Expr::val(expiry_date).into(),
        ]),
    )
    .value(
        batch::Column::Status,
        Expr::val(BatchStatus::Active.to_value()),
    )
    .value(batch::Column::UpdatedAt, Expr::val(now))
    .to_owned();

    BatchEntity::insert(model)
        .on_conflict(on_conflict)
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    let stored = find_batch(conn, product_id, warehouse_id, lot_code)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("lot {} vanished after upsert", lot_code))
        })?;

    debug!(
        lot_code = %stored.lot_code,
        current_quantity = stored.current_quantity,
        "batch upserted"
    );
    Ok(stored)
}

/// Locks the consumable lots of `(product_id, warehouse_id)` and plans FEFO
/// consumption of `quantity_needed` over them.
#[instrument(skip(conn), fields(product_id = %product_id, warehouse_id = %warehouse_id))]
pub async fn select_for_consumption<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity_needed: i64,
) -> Result<Vec<AllocationLine>, ServiceError> {
    let batches = BatchEntity::find()
        .filter(batch::Column::ProductId.eq(product_id))
        .filter(batch::Column::WarehouseId.eq(warehouse_id))
        .filter(batch::Column::Status.eq(BatchStatus::Active))
        .filter(batch::Column::CurrentQuantity.gt(0))
        .order_by_with_nulls(batch::Column::ExpiryDate, Order::Asc, NullOrdering::Last)
        .order_by_asc(batch::Column::CreatedAt)
        .order_by_asc(batch::Column::LotCode)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    plan_fefo(batches, quantity_needed).map_err(|err| {
        if let ServiceError::InsufficientBatchStock(detail) = err {
            ServiceError::InsufficientBatchStock(format!(
                "product {} in warehouse {}: {}",
                product_id, warehouse_id, detail
            ))
        } else {
            err
        }
    })
}

/// Guarded decrement of one lot; flips it to DEPLETED when nothing is left.
///
/// # Errors
///
/// `InsufficientBatchStock` when the lot holds fewer than `quantity` units.
#[instrument(skip(conn), fields(batch_id = %batch_id))]
pub async fn decrement_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    quantity: i64,
) -> Result<batch::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "batch decrement must be positive, got {}",
            quantity
        )));
    }

    let now: DateTime<Utc> = Utc::now();
    let result = BatchEntity::update_many()
        .col_expr(
            batch::Column::CurrentQuantity,
            Expr::col(batch::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(batch::Column::UpdatedAt, Expr::value(now))
        .filter(batch::Column::Id.eq(batch_id))
        .filter(batch::Column::Status.eq(BatchStatus::Active))
        .filter(batch::Column::CurrentQuantity.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    if result.rows_affected == 0 {
        let available = BatchEntity::find_by_id(batch_id)
            .one(conn)
            .await
            .map_err(ServiceError::from_write_error)?
            .map(|b| b.current_quantity)
            .unwrap_or(0);
        warn!(available, requested = quantity, "batch guard rejected decrement");
        return Err(ServiceError::InsufficientBatchStock(format!(
            "lot {} has {} units, {} requested",
            batch_id, available, quantity
        )));
    }

    BatchEntity::update_many()
        .col_expr(
            batch::Column::Status,
            Expr::value(BatchStatus::Depleted.to_value()),
        )
        .filter(batch::Column::Id.eq(batch_id))
        .filter(batch::Column::CurrentQuantity.eq(0))
        .exec(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    BatchEntity::find_by_id(batch_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)?
        .ok_or_else(|| ServiceError::InternalError(format!("lot {} vanished", batch_id)))
}

/// Decrements every lot of a plan from [`select_for_consumption`].
///
/// A lot that no longer covers its planned share was drained by a racing
/// writer after planning, reported as `ConcurrencyConflict`.
pub async fn consume_plan<C: ConnectionTrait>(
    conn: &C,
    plan: &[AllocationLine],
) -> Result<(), ServiceError> {
    for line in plan {
        decrement_batch(conn, line.batch.id, line.quantity)
            .await
            .map_err(|err| match err {
                ServiceError::InsufficientBatchStock(detail) => {
                    ServiceError::ConcurrencyConflict(format!(
                        "lot {} changed while allocating: {}",
                        line.batch.lot_code, detail
                    ))
                }
                other => other,
            })?;
    }
    Ok(())
}

/// Filter for [`BatchRegistryService::list_batches`].
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub include_depleted: bool,
}

#[derive(Clone)]
pub struct BatchRegistryService {
    db: Arc<DatabaseConnection>,
}

impl BatchRegistryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn find_batch(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        lot_code: &str,
    ) -> Result<Option<batch::Model>, ServiceError> {
        find_batch(&*self.db, product_id, warehouse_id, lot_code).await
    }

    /// Lots in FEFO order, one page at a time. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_batches(
        &self,
        filter: BatchFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<batch::Model>, u64), ServiceError> {
        let mut condition = Condition::all();
        if let Some(product_id) = filter.product_id {
            condition = condition.add(batch::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            condition = condition.add(batch::Column::WarehouseId.eq(warehouse_id));
        }
        if !filter.include_depleted {
            condition = condition.add(batch::Column::Status.eq(BatchStatus::Active));
        }

        let paginator = BatchEntity::find()
            .filter(condition)
            .order_by_with_nulls(batch::Column::ExpiryDate, Order::Asc, NullOrdering::Last)
            .order_by_asc(batch::Column::CreatedAt)
            .order_by_asc(batch::Column::LotCode)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn lot(code: &str, expiry: Option<(i32, u32, u32)>, qty: i64, created_secs: i64) -> batch::Model {
        let created = Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap();
        batch::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            warehouse_id: Uuid::nil(),
            lot_code: code.to_string(),
            expiry_date: expiry.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            initial_quantity: qty.max(1),
            current_quantity: qty,
            status: if qty == 0 {
                BatchStatus::Depleted
            } else {
                BatchStatus::Active
            },
            created_at: created,
            updated_at: created,
        }
    }

    fn codes(plan: &[AllocationLine]) -> Vec<(&str, i64)> {
        plan.iter()
            .map(|l| (l.batch.lot_code.as_str(), l.quantity))
            .collect()
    }

    #[test]
    fn nearest_expiry_is_drained_first() {
        let b1 = lot("B1", Some((2025, 1, 1)), 5, 0);
        let b2 = lot("B2", Some((2025, 2, 1)), 10, 0);

        let plan = plan_fefo(vec![b2, b1], 8).unwrap();
        assert_eq!(codes(&plan), vec![("B1", 5), ("B2", 3)]);
    }

    #[test]
    fn undated_lots_come_last() {
        let undated = lot("DEFAULT", None, 50, 0);
        let dated = lot("L9", Some((2030, 12, 31)), 4, 10);

        let plan = plan_fefo(vec![undated, dated], 6).unwrap();
        assert_eq!(codes(&plan), vec![("L9", 4), ("DEFAULT", 2)]);
    }

    #[test]
    fn ties_break_on_creation_then_lot_code() {
        let later = lot("A", Some((2026, 3, 1)), 3, 100);
        let earlier = lot("Z", Some((2026, 3, 1)), 3, 0);
        let same_time = lot("M", Some((2026, 3, 1)), 3, 0);

        let plan = plan_fefo(vec![later, earlier, same_time], 9).unwrap();
        assert_eq!(codes(&plan), vec![("M", 3), ("Z", 3), ("A", 3)]);
    }

    #[test]
    fn depleted_lots_are_skipped() {
        let empty = lot("OLD", Some((2024, 1, 1)), 0, 0);
        let fresh = lot("NEW", Some((2025, 1, 1)), 5, 0);

        let plan = plan_fefo(vec![empty, fresh], 5).unwrap();
        assert_eq!(codes(&plan), vec![("NEW", 5)]);
    }

    #[test]
    fn shortfall_is_insufficient_batch_stock() {
        let only = lot("L1", Some((2025, 6, 1)), 3, 0);
        assert_matches!(
            plan_fefo(vec![only], 5),
            Err(ServiceError::InsufficientBatchStock(_))
        );
        assert_matches!(
            plan_fefo(Vec::new(), 1),
            Err(ServiceError::InsufficientBatchStock(_))
        );
    }

    #[test]
    fn huge_lot_quantities_do_not_overflow_the_total() {
        let lots = vec![
            lot("A", Some((2025, 1, 1)), i64::MAX, 0),
            lot("B", Some((2025, 2, 1)), i64::MAX, 1),
        ];
        let plan = plan_fefo(lots, 5).unwrap();
        assert_eq!(codes(&plan), vec![("A", 5)]);
    }

    #[test]
    fn non_positive_request_is_rejected() {
        let only = lot("L1", None, 3, 0);
        assert_matches!(
            plan_fefo(vec![only], 0),
            Err(ServiceError::ValidationError(_))
        );
    }

    fn arb_lots() -> impl Strategy<Value = Vec<batch::Model>> {
        prop::collection::vec(
            (
                prop::option::of((2024i32..2030, 1u32..=12, 1u32..=28)),
                0i64..40,
                0i64..1_000,
            ),
            0..12,
        )
        .prop_map(|rows| {
            rows
                .into_iter()
                .enumerate()
                .map(|(i, (expiry, qty, created))| lot(&format!("L{:02}", i), expiry, qty, created))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn plan_sums_to_request_and_respects_lot_limits(lots in arb_lots(), want in 1i64..200) {
            let available: i64 = lots.iter().filter(|b| b.is_consumable()).map(|b| b.current_quantity).sum();
            match plan_fefo(lots.clone(), want) {
                Ok(plan) => {
                    prop_assert!(available >= want);
                    prop_assert_eq!(plan.iter().map(|l| l.quantity).sum::<i64>(), want);
                    for line in &plan {
                        prop_assert!(line.quantity > 0);
                        prop_assert!(line.quantity <= line.batch.current_quantity);
                    }
                    // every lot but the last is fully drained
                    for line in plan.iter().rev().skip(1) {
                        prop_assert_eq!(line.quantity, line.batch.current_quantity);
                    }
                    for pair in plan.windows(2) {
                        prop_assert_ne!(fefo_order(&pair[0].batch, &pair[1].batch), Ordering::Greater);
                    }
                }
                Err(ServiceError::InsufficientBatchStock(_)) => prop_assert!(available < want),
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }
    }
}
