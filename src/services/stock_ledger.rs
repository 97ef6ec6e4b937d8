use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::{Alias, Expr, Func, SimpleExpr},
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        stock_movement::{self, Entity as MovementEntity, MovementType},
        stock_movement_lot::{self, Entity as MovementLotEntity},
    },
    errors::ServiceError,
};

/// Lot drawn by an outbound leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDraw {
    pub batch_id: Uuid,
    pub lot_code: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
}

/// Everything needed to append one ledger entry.
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub movement_type: MovementType,
    pub product_id: Uuid,
    pub source_warehouse_id: Option<Uuid>,
    pub dest_warehouse_id: Option<Uuid>,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub batch_lot: Option<String>,
    pub reason: String,
    pub notes: Option<String>,
    pub order_id: Option<Uuid>,
    pub created_by: Uuid,
    pub lots: Vec<LotDraw>,
}

/// A committed ledger entry together with the lots it drew from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MovementRecord {
    #[serde(flatten)]
    pub movement: stock_movement::Model,
    pub lots: Vec<stock_movement_lot::Model>,
}

/// Largest amount the `numeric(16, 4)` money columns hold.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.9999);

/// `quantity × unit_price`, rejected when it does not fit the money columns.
pub fn movement_total(quantity: i64, unit_price: Decimal) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "total amount out of range for {} units at {}",
                quantity, unit_price
            ))
        })
}

fn validate_movement(input: &MovementInput) -> Result<(), ServiceError> {
    if input.quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "movement quantity must be positive, got {}",
            input.quantity
        )));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "unit price must not be negative, got {}",
            input.unit_price
        )));
    }

    movement_total(input.quantity, input.unit_price)?;

    let shape_ok = match input.movement_type {
        MovementType::Import => {
            input.source_warehouse_id.is_none() && input.dest_warehouse_id.is_some()
        }
        MovementType::Export => {
            input.source_warehouse_id.is_some() && input.dest_warehouse_id.is_none()
        }
        MovementType::Transfer => match (input.source_warehouse_id, input.dest_warehouse_id) {
            (Some(source), Some(dest)) => source != dest,
            _ => false,
        },
    };
    if !shape_ok {
        return Err(ServiceError::ValidationError(format!(
            "{} movement has invalid warehouses (source {:?}, destination {:?})",
            input.movement_type, input.source_warehouse_id, input.dest_warehouse_id
        )));
    }

    if !input.lots.is_empty() {
        let drawn = input
            .lots
            .iter()
            .try_fold(0i64, |acc, l| acc.checked_add(l.quantity));
        if drawn != Some(input.quantity) || input.lots.iter().any(|l| l.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "lot breakdown of {:?} units does not match movement quantity {}",
                drawn, input.quantity
            )));
        }
    }

    Ok(())
}

/// Appends one immutable ledger entry and its lot breakdown.
///
/// Only called from inside a stock transaction; nothing in the crate updates
/// or deletes a movement after this.
#[instrument(skip(conn, input), fields(movement_type = %input.movement_type, product_id = %input.product_id, quantity = input.quantity))]
pub async fn record_movement<C: ConnectionTrait>(
    conn: &C,
    input: MovementInput,
) -> Result<MovementRecord, ServiceError> {
    validate_movement(&input)?;

    let movement_id = Uuid::new_v4();
    let total_amount = movement_total(input.quantity, input.unit_price)?;

    let movement = stock_movement::ActiveModel {
        id: Set(movement_id),
        movement_type: Set(input.movement_type),
        product_id: Set(input.product_id),
        source_warehouse_id: Set(input.source_warehouse_id),
        dest_warehouse_id: Set(input.dest_warehouse_id),
        quantity: Set(input.quantity),
        unit_price: Set(input.unit_price),
        total_amount: Set(total_amount),
        batch_lot: Set(input.batch_lot),
        reason: Set(input.reason),
        notes: Set(input.notes),
        order_id: Set(input.order_id),
        created_by: Set(input.created_by),
        created_at: Set(Utc::now()),
    };
    MovementEntity::insert(movement)
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    if !input.lots.is_empty() {
        let rows = input.lots.iter().map(|lot| stock_movement_lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            movement_id: Set(movement_id),
            batch_id: Set(lot.batch_id),
            lot_code: Set(lot.lot_code.clone()),
            expiry_date: Set(lot.expiry_date),
            quantity: Set(lot.quantity),
        });
        MovementLotEntity::insert_many(rows)
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::from_write_error)?;
    }

    let movement = MovementEntity::find_by_id(movement_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)?
        .ok_or_else(|| ServiceError::InternalError(format!("movement {} vanished", movement_id)))?;
    let lots = lots_of(conn, movement_id).await?;

    debug!(movement_id = %movement.id, lots = lots.len(), "movement recorded");
    Ok(MovementRecord { movement, lots })
}

async fn lots_of<C: ConnectionTrait>(
    conn: &C,
    movement_id: Uuid,
) -> Result<Vec<stock_movement_lot::Model>, ServiceError> {
    MovementLotEntity::find()
        .filter(stock_movement_lot::Column::MovementId.eq(movement_id))
        .order_by_asc(stock_movement_lot::Column::ExpiryDate)
        .order_by_asc(stock_movement_lot::Column::LotCode)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Filter for [`StockLedgerService::list_movements`].
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    /// Matches either side of the movement
    pub warehouse_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
}

async fn sum_quantity<C: ConnectionTrait>(
    conn: &C,
    condition: Condition,
) -> Result<i64, ServiceError> {
    let total: Option<Option<i64>> = MovementEntity::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::cast_as(
                Func::sum(Expr::col(stock_movement::Column::Quantity)),
                Alias::new("BIGINT"),
            )),
            "total",
        )
        .filter(condition)
        .into_tuple()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(total.flatten().unwrap_or(0))
}

/// Read side of the ledger.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest movements first, with their lot breakdown.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<MovementRecord>, u64), ServiceError> {
        let db = &*self.db;

        let mut condition = Condition::all();
        if let Some(product_id) = filter.product_id {
            condition = condition.add(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            condition = condition.add(
                Condition::any()
                    .add(stock_movement::Column::SourceWarehouseId.eq(warehouse_id))
                    .add(stock_movement::Column::DestWarehouseId.eq(warehouse_id)),
            );
        }
        if let Some(order_id) = filter.order_id {
            condition = condition.add(stock_movement::Column::OrderId.eq(order_id));
        }
        if let Some(movement_type) = filter.movement_type {
            condition = condition.add(stock_movement::Column::MovementType.eq(movement_type));
        }

        let paginator = MovementEntity::find()
            .filter(condition)
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_asc(stock_movement::Column::Id)
            .paginate(db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let movements = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        let mut records = Vec::with_capacity(movements.len());
        for movement in movements {
            let lots = lots_of(db, movement.id).await?;
            records.push(MovementRecord { movement, lots });
        }

        Ok((records, total))
    }

    /// Net quantity the ledger implies for `(product_id, warehouse_id)`:
    /// everything that arrived minus everything that left.
    #[instrument(skip(self))]
    pub async fn net_quantity(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<i64, ServiceError> {
        net_quantity(&*self.db, product_id, warehouse_id).await
    }
}

/// Σimports − Σexports + Σtransfers-in − Σtransfers-out for one pair.
pub async fn net_quantity<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<i64, ServiceError> {
    let inbound = sum_quantity(
        conn,
        Condition::all()
            .add(stock_movement::Column::ProductId.eq(product_id))
            .add(stock_movement::Column::DestWarehouseId.eq(warehouse_id)),
    )
    .await?;
    let outbound = sum_quantity(
        conn,
        Condition::all()
            .add(stock_movement::Column::ProductId.eq(product_id))
            .add(stock_movement::Column::SourceWarehouseId.eq(warehouse_id)),
    )
    .await?;

    Ok(inbound - outbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn input(
        movement_type: MovementType,
        source: Option<Uuid>,
        dest: Option<Uuid>,
    ) -> MovementInput {
        MovementInput {
            movement_type,
            product_id: Uuid::new_v4(),
            source_warehouse_id: source,
            dest_warehouse_id: dest,
            quantity: 4,
            unit_price: dec!(2.50),
            batch_lot: None,
            reason: "restock".into(),
            notes: None,
            order_id: None,
            created_by: Uuid::new_v4(),
            lots: Vec::new(),
        }
    }

    #[test]
    fn movement_shapes() {
        let a = Some(Uuid::new_v4());
        let b = Some(Uuid::new_v4());

        assert!(validate_movement(&input(MovementType::Import, None, a)).is_ok());
        assert!(validate_movement(&input(MovementType::Export, a, None)).is_ok());
        assert!(validate_movement(&input(MovementType::Transfer, a, b)).is_ok());

        assert_matches!(
            validate_movement(&input(MovementType::Import, a, b)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_movement(&input(MovementType::Export, None, a)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_movement(&input(MovementType::Transfer, a, a)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn quantity_and_price_bounds() {
        let w = Some(Uuid::new_v4());

        let mut zero = input(MovementType::Import, None, w);
        zero.quantity = 0;
        assert_matches!(validate_movement(&zero), Err(ServiceError::ValidationError(_)));

        let mut negative_price = input(MovementType::Import, None, w);
        negative_price.unit_price = dec!(-0.01);
        assert_matches!(
            validate_movement(&negative_price),
            Err(ServiceError::ValidationError(_))
        );

        let mut huge = input(MovementType::Import, None, w);
        huge.quantity = i64::MAX / 2;
        huge.unit_price = dec!(1000000000000);
        assert_matches!(
            validate_movement(&huge),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("total amount out of range")
        );

        let mut free = input(MovementType::Import, None, w);
        free.unit_price = Decimal::ZERO;
        assert!(validate_movement(&free).is_ok());
    }

    #[test]
    fn lot_breakdown_must_cover_quantity() {
        let mut mv = input(MovementType::Export, Some(Uuid::new_v4()), None);
        mv.lots = vec![LotDraw {
            batch_id: Uuid::new_v4(),
            lot_code: "L1".into(),
            expiry_date: None,
            quantity: 3,
        }];
        assert_matches!(validate_movement(&mv), Err(ServiceError::ValidationError(_)));

        mv.lots[0].quantity = 4;
        assert!(validate_movement(&mv).is_ok());
    }
}
