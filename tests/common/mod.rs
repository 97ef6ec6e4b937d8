#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::{NaiveDate, Utc};
use pharma_ledger::{
    config::AppConfig,
    db,
    entities::{
        batch,
        order::{self, OrderStatus},
        order_item, product, stock_item,
        stock_movement::{self, MovementType},
        warehouse,
    },
    services::stock_transactions::{CreateTransactionRequest, TransactionItem},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same as [`TestApp::new`] with a chance to adjust the configuration first.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = pharma_ledger::build_router(state.clone());
        Self { router, state }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, sku: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {sku}")),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_warehouse(&self, code: &str) -> warehouse::Model {
        self.seed_warehouse_with_status(code, true).await
    }

    pub async fn seed_warehouse_with_status(
        &self,
        code: &str,
        is_active: bool,
    ) -> warehouse::Model {
        warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            name: Set(format!("Warehouse {code}")),
            is_active: Set(is_active),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed warehouse")
    }

    /// Seeds a PENDING order with one line per `(product, quantity)`.
    pub async fn seed_order(
        &self,
        number: &str,
        warehouse_id: Option<Uuid>,
        lines: &[(Uuid, i64)],
    ) -> order::Model {
        let now = Utc::now();
        let unit_price = Decimal::new(1250, 2);
        let total = lines
            .iter()
            .map(|(_, qty)| unit_price * Decimal::from(*qty))
            .sum::<Decimal>();

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(number.to_string()),
            customer_id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::Pending),
            warehouse_id: Set(warehouse_id),
            total_amount: Set(total),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        }
        .insert(self.db())
        .await
        .expect("seed order");

        for (product_id, quantity) in lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(*product_id),
                quantity: Set(*quantity),
                unit_price: Set(unit_price),
            }
            .insert(self.db())
            .await
            .expect("seed order item");
        }

        order
    }

    /// Imports `quantity` of `product_id` into `warehouse_id` as lot `lot`.
    pub async fn import(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        lot: &str,
        expiry: Option<NaiveDate>,
        quantity: i64,
    ) {
        let mut line = item(product_id, quantity);
        line.batch_lot = Some(lot.to_string());
        line.expiry_date = expiry;
        self.state
            .services
            .stock_transactions
            .create_transaction(transaction(MovementType::Import, warehouse_id, vec![line]))
            .await
            .expect("seed import");
    }

    pub async fn stock_item(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Option<stock_item::Model> {
        stock_item::Entity::find()
            .filter(stock_item::Column::ProductId.eq(product_id))
            .filter(stock_item::Column::WarehouseId.eq(warehouse_id))
            .one(self.db())
            .await
            .expect("load stock item")
    }

    /// Current aggregate quantity, zero when the row does not exist yet.
    pub async fn on_hand(&self, product_id: Uuid, warehouse_id: Uuid) -> i64 {
        self.stock_item(product_id, warehouse_id)
            .await
            .map(|item| item.current_quantity)
            .unwrap_or(0)
    }

    pub async fn batch(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        lot: &str,
    ) -> Option<batch::Model> {
        batch::Entity::find()
            .filter(batch::Column::ProductId.eq(product_id))
            .filter(batch::Column::WarehouseId.eq(warehouse_id))
            .filter(batch::Column::LotCode.eq(lot))
            .one(self.db())
            .await
            .expect("load batch")
    }

    pub async fn movements_for(&self, product_id: Uuid) -> Vec<stock_movement::Model> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .all(self.db())
            .await
            .expect("load movements")
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(self.db())
            .await
            .expect("load order")
            .expect("order exists")
    }
}

pub fn item(product_id: Uuid, quantity: i64) -> TransactionItem {
    TransactionItem {
        product_id,
        quantity,
        batch_lot: None,
        expiry_date: None,
        unit_price: Decimal::new(1000, 2),
    }
}

pub fn transaction(
    movement_type: MovementType,
    warehouse_id: Uuid,
    items: Vec<TransactionItem>,
) -> CreateTransactionRequest {
    CreateTransactionRequest {
        movement_type,
        warehouse_id,
        to_warehouse_id: None,
        items,
        reason: "test".to_string(),
        notes: None,
        created_by: Uuid::new_v4(),
        order_id: None,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
