use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        product::Entity as ProductEntity,
        stock_item::{self, Entity as StockItemEntity},
        stock_movement::MovementType,
        warehouse::Entity as WarehouseEntity,
    },
    errors::ServiceError,
    services::{
        batch_registry::{self, AllocationLine},
        stock_ledger::{self, LotDraw, MovementInput, MovementRecord},
    },
};

/// One line of a stock transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub product_id: Uuid,
    pub quantity: i64,
    #[serde(default)]
    pub batch_lot: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub unit_price: Decimal,
}

/// An all-or-nothing batch of movements of one type.
#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub movement_type: MovementType,
    /// Destination for IMPORT, source for EXPORT and TRANSFER
    pub warehouse_id: Uuid,
    /// Destination for TRANSFER
    pub to_warehouse_id: Option<Uuid>,
    pub items: Vec<TransactionItem>,
    pub reason: String,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy)]
struct Sides {
    source: Option<Uuid>,
    dest: Option<Uuid>,
}

fn normalized_lot(lot: &Option<String>) -> Option<String> {
    lot.as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

fn resolve_sides(request: &CreateTransactionRequest) -> Result<Sides, ServiceError> {
    match request.movement_type {
        MovementType::Import => Ok(Sides {
            source: None,
            dest: Some(request.warehouse_id),
        }),
        MovementType::Export => Ok(Sides {
            source: Some(request.warehouse_id),
            dest: None,
        }),
        MovementType::Transfer => {
            let dest = request
                .to_warehouse_id
                .ok_or(ServiceError::MissingDestination)?;
            if dest == request.warehouse_id {
                return Err(ServiceError::ValidationError(
                    "transfer source and destination must differ".to_string(),
                ));
            }
            Ok(Sides {
                source: Some(request.warehouse_id),
                dest: Some(dest),
            })
        }
    }
}

/// Request-level checks that need no database access.
pub fn validate_request(request: &CreateTransactionRequest) -> Result<(), ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "a stock transaction needs at least one item".to_string(),
        ));
    }
    if request.reason.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "reason must not be blank".to_string(),
        ));
    }
    for (index, item) in request.items.iter().enumerate() {
        if item.product_id.is_nil() {
            return Err(ServiceError::ValidationError(format!(
                "item {}: product is required",
                index
            )));
        }
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "item {}: quantity must be positive, got {}",
                index, item.quantity
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "item {}: unit price must not be negative",
                index
            )));
        }
        stock_ledger::movement_total(item.quantity, item.unit_price).map_err(|_| {
            ServiceError::ValidationError(format!("item {}: total amount out of range", index))
        })?;
        if let Some(lot) = &item.batch_lot {
            if lot.trim().len() > 100 {
                return Err(ServiceError::ValidationError(format!(
                    "item {}: lot code longer than 100 characters",
                    index
                )));
            }
        }
    }
    Ok(())
}

/// Fails with `WarehouseNotFound` unless the warehouse exists and is active.
pub async fn ensure_warehouse<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
) -> Result<(), ServiceError> {
    match WarehouseEntity::find_by_id(warehouse_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)?
    {
        Some(warehouse) if warehouse.is_active => Ok(()),
        Some(_) => Err(ServiceError::WarehouseNotFound(format!(
            "{} (inactive)",
            warehouse_id
        ))),
        None => Err(ServiceError::WarehouseNotFound(warehouse_id.to_string())),
    }
}

async fn ensure_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<(), ServiceError> {
    ProductEntity::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)?
        .map(|_| ())
        .ok_or(ServiceError::ProductNotFound(product_id))
}

async fn find_stock_item<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<Option<stock_item::Model>, ServiceError> {
    StockItemEntity::find()
        .filter(stock_item::Column::ProductId.eq(product_id))
        .filter(stock_item::Column::WarehouseId.eq(warehouse_id))
        .one(conn)
        .await
        .map_err(ServiceError::from_write_error)
}

/// Compare-and-swap decrement of the aggregate.
async fn take_from_stock_item<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    count_as_issued: bool,
) -> Result<(), ServiceError> {
    let mut update = StockItemEntity::update_many()
        .col_expr(
            stock_item::Column::CurrentQuantity,
            Expr::col(stock_item::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(stock_item::Column::LastUpdated, Expr::value(Utc::now()));
    if count_as_issued {
        update = update.col_expr(
            stock_item::Column::CumulativeIssued,
            Expr::col(stock_item::Column::CumulativeIssued).add(quantity),
        );
    }

    let result = update
        .filter(stock_item::Column::ProductId.eq(product_id))
        .filter(stock_item::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_item::Column::CurrentQuantity.gte(quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::from_write_error)?;

    if result.rows_affected == 0 {
        let available = find_stock_item(conn, product_id, warehouse_id)
            .await?
            .map(|item| item.current_quantity)
            .unwrap_or(0);
        warn!(
            product_id = %product_id,
            warehouse_id = %warehouse_id,
            available,
            requested = quantity,
            "stock guard rejected decrement"
        );
        return Err(ServiceError::InsufficientStock(format!(
            "product {} has {} units in warehouse {}, {} requested",
            product_id, available, warehouse_id, quantity
        )));
    }
    Ok(())
}

/// Creates the aggregate row on first touch, otherwise increments it.
async fn add_to_stock_item<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    count_as_received: bool,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let received = if count_as_received { quantity } else { 0 };

    let row = stock_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        current_quantity: Set(quantity),
        cumulative_received: Set(received),
        cumulative_issued: Set(0),
        last_updated: Set(now),
    };

    let on_conflict = OnConflict::columns([
        stock_item::Column::ProductId,
        stock_item::Column::WarehouseId,
    ])
    .value(
        stock_item::Column::CurrentQuantity,
        Expr::col((StockItemEntity, stock_item::Column::CurrentQuantity)).add(quantity),
    )
    .value(
        stock_item::Column::CumulativeReceived,
        Expr::col((StockItemEntity, stock_item::Column::CumulativeReceived)).add(received),
    )
    .value(stock_item::Column::LastUpdated, Expr::val(now))
    .to_owned();

    StockItemEntity::insert(row)
        .on_conflict(on_conflict)
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::from_write_error)?;
    Ok(())
}

/// Decrements the source lots for one outbound line and returns what was drawn.
async fn draw_lots<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    source: Uuid,
    item: &TransactionItem,
    named_lot: Option<&str>,
) -> Result<Vec<LotDraw>, ServiceError> {
    let plan: Vec<AllocationLine> = match named_lot {
        Some(lot_code) => {
            let batch = batch_registry::find_batch(conn, product_id, source, lot_code)
                .await?
                .ok_or_else(|| {
                    ServiceError::InsufficientBatchStock(format!(
                        "lot {} of product {} does not exist in warehouse {}",
                        lot_code, product_id, source
                    ))
                })?;
            batch_registry::decrement_batch(conn, batch.id, item.quantity).await?;
            vec![AllocationLine {
                batch,
                quantity: item.quantity,
            }]
        }
        None => {
            let plan =
                batch_registry::select_for_consumption(conn, product_id, source, item.quantity)
                    .await?;
            batch_registry::consume_plan(conn, &plan).await?;
            plan
        }
    };

    Ok(plan
        .into_iter()
        .map(|line| LotDraw {
            batch_id: line.batch.id,
            lot_code: line.batch.lot_code,
            expiry_date: line.batch.expiry_date,
            quantity: line.quantity,
        })
        .collect())
}

async fn apply_item<C: ConnectionTrait>(
    conn: &C,
    request: &CreateTransactionRequest,
    sides: Sides,
    item: &TransactionItem,
    default_lot_code: &str,
) -> Result<MovementRecord, ServiceError> {
    ensure_product(conn, item.product_id).await?;
    let named_lot = normalized_lot(&item.batch_lot);

    let mut drawn = Vec::new();
    if let Some(source) = sides.source {
        take_from_stock_item(
            conn,
            item.product_id,
            source,
            item.quantity,
            request.movement_type == MovementType::Export,
        )
        .await?;
        drawn = draw_lots(conn, item.product_id, source, item, named_lot.as_deref()).await?;
    }

    let mut batch_lot = named_lot.clone();
    if let Some(dest) = sides.dest {
        add_to_stock_item(
            conn,
            item.product_id,
            dest,
            item.quantity,
            request.movement_type == MovementType::Import,
        )
        .await?;

        if drawn.is_empty() {
            // the default lot never carries an expiry
            let (lot_code, expiry) = match named_lot {
                Some(lot) => (lot, item.expiry_date),
                None => {
                    if item.expiry_date.is_some() {
                        warn!(
                            product_id = %item.product_id,
                            "expiry ignored for stock booked into the default lot"
                        );
                    }
                    (default_lot_code.to_string(), None)
                }
            };
            batch_registry::upsert_batch(
                conn,
                item.product_id,
                dest,
                &lot_code,
                expiry,
                item.quantity,
            )
            .await?;
            batch_lot = Some(lot_code);
        } else {
            for lot in &drawn {
                batch_registry::upsert_batch(
                    conn,
                    item.product_id,
                    dest,
                    &lot.lot_code,
                    lot.expiry_date,
                    lot.quantity,
                )
                .await?;
            }
        }
    }

    if batch_lot.is_none() && drawn.len() == 1 {
        batch_lot = Some(drawn[0].lot_code.clone());
    }

    stock_ledger::record_movement(
        conn,
        MovementInput {
            movement_type: request.movement_type,
            product_id: item.product_id,
            source_warehouse_id: sides.source,
            dest_warehouse_id: sides.dest,
            quantity: item.quantity,
            unit_price: item.unit_price,
            batch_lot,
            reason: request.reason.trim().to_string(),
            notes: request.notes.clone(),
            order_id: request.order_id,
            created_by: request.created_by,
            lots: drawn,
        },
    )
    .await
}

/// Applies every item of `request` on `conn` without opening a transaction.
///
/// The caller owns the transaction; any error leaves it to be rolled back.
pub async fn apply_in<C: ConnectionTrait>(
    conn: &C,
    request: &CreateTransactionRequest,
    default_lot_code: &str,
) -> Result<Vec<MovementRecord>, ServiceError> {
    validate_request(request)?;
    let sides = resolve_sides(request)?;

    for warehouse_id in [sides.source, sides.dest].into_iter().flatten() {
        ensure_warehouse(conn, warehouse_id).await?;
    }

    let mut records = Vec::with_capacity(request.items.len());
    for item in &request.items {
        records.push(apply_item(conn, request, sides, item, default_lot_code).await?);
    }
    Ok(records)
}

/// Filter for [`StockTransactionService::list_stock_items`].
#[derive(Debug, Clone, Default)]
pub struct StockItemFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

/// Entry point for imports, exports and transfers.
#[derive(Clone)]
pub struct StockTransactionService {
    db: Arc<DatabaseConnection>,
    default_lot_code: String,
}

impl StockTransactionService {
    pub fn new(db: Arc<DatabaseConnection>, default_lot_code: impl Into<String>) -> Self {
        Self {
            db,
            default_lot_code: default_lot_code.into(),
        }
    }

    pub fn default_lot_code(&self) -> &str {
        &self.default_lot_code
    }

    /// Applies all items in one database transaction and returns the movements
    /// written, in item order.
    #[instrument(skip(self, request), fields(movement_type = %request.movement_type, warehouse_id = %request.warehouse_id, items = request.items.len()))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<Vec<MovementRecord>, ServiceError> {
        validate_request(&request)?;
        resolve_sides(&request)?;

        let default_lot_code = self.default_lot_code.clone();
        let movement_type = request.movement_type;

        let records = self
            .db
            .transaction::<_, Vec<MovementRecord>, ServiceError>(move |txn| {
                Box::pin(async move { apply_in(txn, &request, &default_lot_code).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::from_write_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            movement_type = %movement_type,
            movements = records.len(),
            "stock transaction committed"
        );
        Ok(records)
    }

    /// Aggregate stock rows, one page at a time.
    #[instrument(skip(self))]
    pub async fn list_stock_items(
        &self,
        filter: StockItemFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<stock_item::Model>, u64), ServiceError> {
        let mut condition = Condition::all();
        if let Some(product_id) = filter.product_id {
            condition = condition.add(stock_item::Column::ProductId.eq(product_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            condition = condition.add(stock_item::Column::WarehouseId.eq(warehouse_id));
        }

        let paginator = StockItemEntity::find()
            .filter(condition)
            .order_by_asc(stock_item::Column::WarehouseId)
            .order_by_asc(stock_item::Column::ProductId)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Keyed lookup of one aggregate row.
    pub async fn get_stock_item(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        find_stock_item(&*self.db, product_id, warehouse_id).await
    }
}
