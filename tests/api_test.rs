mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn post_transaction_returns_created_movements() {
    let app = TestApp::new().await;
    let product = app.seed_product("AMOX-500").await;
    let w = app.seed_warehouse("W1").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/inventory/transactions",
            Some(json!({
                "type": "IMPORT",
                "warehouseId": w.id,
                "items": [{
                    "productId": product.id,
                    "quantity": 100,
                    "batchLot": "L1",
                    "expiryDate": "2025-06-01",
                    "unitPrice": "2.50"
                }],
                "reason": "supplier receipt",
                "creatorId": Uuid::new_v4(),
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    let movements = body.as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["movement_type"], "IMPORT");
    assert_eq!(movements[0]["quantity"], 100);
    assert_eq!(movements[0]["batch_lot"], "L1");
    assert_eq!(movements[0]["dest_warehouse_id"], json!(w.id));

    assert_eq!(app.on_hand(product.id, w.id).await, 100);
}

#[tokio::test]
async fn insufficient_stock_returns_error_body_with_request_id() {
    let app = TestApp::new().await;
    let product = app.seed_product("P").await;
    let w = app.seed_warehouse("W").await;
    app.import(product.id, w.id, "L1", None, 3).await;

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/inventory/transactions",
            Some(json!({
                "type": "EXPORT",
                "warehouseId": w.id,
                "items": [{ "productId": product.id, "quantity": 5 }],
                "reason": "dispatch",
                "creatorId": Uuid::new_v4(),
            })),
            &[("x-request-id", "req-42")],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let body = read_json(response).await;
    assert_eq!(body["kind"], "insufficient_stock");
    assert_eq!(body["request_id"], "req-42");
    assert_eq!(app.on_hand(product.id, w.id).await, 3);
}

#[tokio::test]
async fn transfer_without_destination_is_a_bad_request() {
    let app = TestApp::new().await;
    let product = app.seed_product("P").await;
    let w = app.seed_warehouse("W").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/inventory/transactions",
            Some(json!({
                "type": "TRANSFER",
                "warehouseId": w.id,
                "items": [{ "productId": product.id, "quantity": 1 }],
                "reason": "rebalance",
                "creatorId": Uuid::new_v4(),
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "missing_destination");
}

#[tokio::test]
async fn malformed_bodies_get_the_error_envelope() {
    let app = TestApp::new().await;
    let w = app.seed_warehouse("W").await;

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/inventory/transactions",
            Some(json!({
                "type": "IMPORT",
                "warehouseId": w.id,
                "items": [{ "quantity": 5 }],
                "reason": "receipt",
                "creatorId": Uuid::new_v4(),
            })),
            &[("x-request-id", "req-bad-body")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "validation_error");
    assert_eq!(body["request_id"], "req-bad-body");
    assert!(body["message"].as_str().unwrap().contains("productId"));

    let order_uri = format!("/api/v1/orders/{}/status", Uuid::new_v4());
    let response = app
        .request(Method::PUT, &order_uri, Some(json!({ "status": "LOST" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["kind"], "validation_error");
}

#[tokio::test]
async fn unknown_warehouse_is_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product("P").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/inventory/transactions",
            Some(json!({
                "type": "IMPORT",
                "warehouseId": Uuid::new_v4(),
                "items": [{ "productId": product.id, "quantity": 1 }],
                "reason": "receipt",
                "creatorId": Uuid::new_v4(),
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["kind"], "warehouse_not_found");
}

#[tokio::test]
async fn order_status_endpoint_confirms_and_rejects_bad_transitions() {
    let app = TestApp::new().await;
    let product = app.seed_product("P").await;
    let w = app.seed_warehouse("W").await;
    app.import(product.id, w.id, "L1", None, 10).await;
    let order = app.seed_order("SO-9", None, &[(product.id, 4)]).await;
    let uri = format!("/api/v1/orders/{}/status", order.id);

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({
                "status": "CONFIRMED",
                "warehouseId": w.id,
                "changedBy": Uuid::new_v4(),
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(app.on_hand(product.id, w.id).await, 6);

    let response = app
        .request(Method::PUT, &uri, Some(json!({ "status": "PENDING" })))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        read_json(response).await["kind"],
        "invalid_status_transition"
    );

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_endpoints_filter_and_page() {
    let app = TestApp::new().await;
    let product = app.seed_product("P").await;
    let a = app.seed_warehouse("A").await;
    let b = app.seed_warehouse("B").await;
    app.import(product.id, a.id, "L1", Some(common::date(2025, 1, 1)), 5)
        .await;
    app.import(product.id, a.id, "L2", Some(common::date(2025, 2, 1)), 5)
        .await;
    app.import(product.id, b.id, "L1", None, 7).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/stock-items?warehouseId={}", a.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["current_quantity"], 10);

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/inventory/batches?productId={}&warehouseId={}&perPage=1",
                product.id, a.id
            ),
            None,
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["data"][0]["lot_code"], "L1");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/movements?warehouseId={}", b.id),
            None,
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["quantity"], 7);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["paths"]["/api/v1/inventory/transactions"].is_object());
}
