pub mod dashboard;
pub mod invoices;
pub mod products;
pub mod users;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use crate::state::AppState;

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(users::routes(state))
        .merge(products::routes(state))
        .merge(invoices::routes(state))
        .merge(dashboard::routes(state))
}

/// Full application under the `/Invoicely` base path.
pub fn app(state: AppState) -> Router {
    let api = create_router(&state)
        .route("/", get(|| async { "Invoicely API" }))
        .route("/health", get(health_check));

    Router::new()
        .nest("/Invoicely", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::store::MemoryStore;

    fn test_app() -> Router {
        app(AppState::new(Arc::new(MemoryStore::new()), Config::for_tests()))
    }

    async fn send_raw(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(format!("/Invoicely{uri}"));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, bytes) = send_raw(app, method, uri, token, body).await;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn sign_up(app: &Router, email: &str) -> String {
        let (status, _) = send(
            app,
            Method::POST,
            "/users/register",
            None,
            Some(json!({ "email": email, "password": "correct horse", "business_name": "Acme Studio" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({ "email": email, "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn create_product(app: &Router, token: &str, name: &str, category: &str, price: &str) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/products",
            Some(token),
            Some(json!({ "name": name, "description": format!("{name} description"), "unit_price": price, "unit": "hour", "category": category })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    fn dec(value: &Value) -> Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    fn names(body: &Value) -> Vec<String> {
        body.as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn health_and_auth_guard() {
        let app = test_app();

        let (status, _, body) = send_raw(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        let (status, body) = send(&app, Method::GET, "/products", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        let (status, _) = send(&app, Method::GET, "/dashboard", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn account_registration_and_login() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;

        let (status, me) = send(&app, Method::GET, "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["business_name"], "Acme Studio");

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/register",
            None,
            Some(json!({ "email": "owner@example.com", "password": "another one", "business_name": "Copy" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({ "email": "owner@example.com", "password": "wrong password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/register",
            None,
            Some(json!({ "email": "short@example.com", "password": "short", "business_name": "Shorty" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn product_list_filters_by_search_category_and_activity() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;

        create_product(&app, &token, "Consulting", "service", "85.00").await;
        let widget = create_product(&app, &token, "Widget", "goods", "4.50").await;
        create_product(&app, &token, "Gadget", "goods", "7.00").await;

        let (status, _) = send(&app, Method::PUT, &format!("/products/{widget}"), Some(&token), Some(json!({ "is_active": false }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/products?search=cons", Some(&token), None).await;
        assert_eq!(names(&body), vec!["Consulting"]);

        let (_, body) = send(&app, Method::GET, "/products", Some(&token), None).await;
        assert_eq!(names(&body), vec!["Consulting", "Gadget"]);

        let (_, body) = send(&app, Method::GET, "/products?active_only=false", Some(&token), None).await;
        assert_eq!(names(&body), vec!["Consulting", "Gadget", "Widget"]);

        let (_, body) = send(&app, Method::GET, "/products?category=goods&active_only=false", Some(&token), None).await;
        assert_eq!(names(&body), vec!["Gadget", "Widget"]);

        let (_, body) = send(&app, Method::GET, "/products?search=nothing", Some(&token), None).await;
        assert_eq!(body, json!([]));

        let (_, body) = send(&app, Method::GET, "/products/categories", Some(&token), None).await;
        assert_eq!(body[0], json!({ "category": "service", "count": 1 }));
        assert_eq!(body[1], json!({ "category": "goods", "count": 1 }));

        let (status, _) = send(
            &app,
            Method::POST,
            "/products",
            Some(&token),
            Some(json!({ "name": "Broken", "unit_price": "-1", "unit": "piece", "category": "goods" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn owners_do_not_see_each_others_data() {
        let app = test_app();
        let alice = sign_up(&app, "alice@example.com").await;
        let bob = sign_up(&app, "bob@example.com").await;

        let product = create_product(&app, &alice, "Consulting", "service", "85.00").await;

        let (status, _) = send(&app, Method::GET, &format!("/products/{product}"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/products", Some(&bob), None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn invoice_lifecycle_feeds_the_dashboard() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;
        let consulting = create_product(&app, &token, "Consulting", "service", "85.00").await;

        let issue_date = Utc::now() - Duration::hours(1);
        let (status, invoice) = send(
            &app,
            Method::POST,
            "/invoices",
            Some(&token),
            Some(json!({
                "client_name": "Globex",
                "issue_date": issue_date,
                "items": [{ "product_id": consulting, "quantity": "2" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(invoice["number"], "INV-00001");
        assert_eq!(invoice["status"], "draft");
        assert_eq!(dec(&invoice["total"]), "204.00".parse::<Decimal>().unwrap());
        let id = invoice["id"].as_i64().unwrap();

        let (_, product) = send(&app, Method::GET, &format!("/products/{consulting}"), Some(&token), None).await;
        assert!(product["last_used_at"].is_string());

        let (status, invoice) = send(
            &app,
            Method::POST,
            &format!("/invoices/{id}/items"),
            Some(&token),
            Some(json!({ "description": "Travel", "quantity": "1", "unit_price": "40.00", "vat_rate": "0" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(invoice["items"].as_array().unwrap().len(), 2);
        assert_eq!(dec(&invoice["total"]), "244.00".parse::<Decimal>().unwrap());

        let (status, _) = send(&app, Method::PATCH, &format!("/invoices/{id}/status"), Some(&token), Some(json!({ "status": "paid" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for next in ["sent", "paid"] {
            let (status, body) = send(&app, Method::PATCH, &format!("/invoices/{id}/status"), Some(&token), Some(json!({ "status": next }))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], next);
        }

        let (status, _) = send(&app, Method::PUT, &format!("/invoices/{id}"), Some(&token), Some(json!({ "client_name": "Initech" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&app, Method::DELETE, &format!("/invoices/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, history) = send(&app, Method::GET, "/invoices?status=paid&search=glob", Some(&token), None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        let (_, history) = send(&app, Method::GET, "/invoices?status=draft", Some(&token), None).await;
        assert_eq!(history, json!([]));

        let (status, dashboard) = send(&app, Method::GET, "/dashboard?time_frame=week", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["time_frame"], "week");
        assert_eq!(dec(&dashboard["metrics"]["total_revenue"]["current"]), "244.00".parse::<Decimal>().unwrap());
        assert!(dashboard["metrics"]["total_revenue"]["change_percent"].is_null());
        assert_eq!(dashboard["metrics"]["active_invoices"]["current"], 0);
        assert_eq!(dashboard["series"].as_array().unwrap().len(), 7);
        assert_eq!(dashboard["activity"][0]["kind"], "paid");

        let (_, deleted) = send(&app, Method::DELETE, &format!("/products/{consulting}"), Some(&token), None).await;
        assert_eq!(deleted, json!({ "id": consulting, "deleted": false, "deactivated": true }));
        let (_, body) = send(&app, Method::GET, "/products", Some(&token), None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn draft_editing_and_removal() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;
        let spare = create_product(&app, &token, "Spare part", "material", "3.00").await;

        let (_, invoice) = send(
            &app,
            Method::POST,
            "/invoices",
            Some(&token),
            Some(json!({ "client_name": "Globex", "items": [{ "product_id": spare, "quantity": "3", "vat_rate": "10" }] })),
        )
        .await;
        let id = invoice["id"].as_i64().unwrap();
        assert_eq!(dec(&invoice["vat_total"]), "0.90".parse::<Decimal>().unwrap());

        let (status, _) = send(&app, Method::PATCH, &format!("/invoices/{id}/status"), Some(&token), Some(json!({ "status": "sent" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, second) = send(&app, Method::POST, "/invoices", Some(&token), Some(json!({ "client_name": "Initech" }))).await;
        assert_eq!(second["number"], "INV-00002");
        let second_id = second["id"].as_i64().unwrap();

        let (status, _) = send(&app, Method::PATCH, &format!("/invoices/{second_id}/status"), Some(&token), Some(json!({ "status": "sent" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::DELETE, &format!("/invoices/{second_id}/items/0"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &format!("/invoices/{second_id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &format!("/invoices/{second_id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::POST,
            "/invoices",
            Some(&token),
            Some(json!({
                "client_name": "Late",
                "issue_date": Utc::now(),
                "due_date": Utc::now() - Duration::days(3),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_export_is_csv() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;

        let (status, headers, body) = send_raw(&app, Method::GET, "/dashboard/export?time_frame=day", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");

        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("metric,current,previous,change_percent\n"));
        assert_eq!(text.lines().count(), 8 + 24);
    }

    #[tokio::test]
    async fn amounts_outside_the_stored_range_are_rejected() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;

        for (quantity, unit_price) in [
            ("79228162514264337593543950335", "10"),
            ("100000000000", "1"),
            ("0.0004", "10"),
            ("1", "1000000000000"),
            ("1", "9.999"),
        ] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/invoices",
                Some(&token),
                Some(json!({
                    "client_name": "Globex",
                    "items": [{ "description": "Bulk", "quantity": quantity, "unit_price": unit_price }],
                })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{quantity} x {unit_price}");
            assert!(body["error"].is_string());
        }

        let (status, _) = send(
            &app,
            Method::POST,
            "/products",
            Some(&token),
            Some(json!({ "name": "Precise", "unit_price": "1.005", "unit": "piece", "category": "goods" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, history) = send(&app, Method::GET, "/invoices", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history, json!([]));
        let (status, _) = send(&app, Method::GET, "/dashboard", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejected_invoice_does_not_mark_products_used() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;
        let consulting = create_product(&app, &token, "Consulting", "service", "85.00").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/invoices",
            Some(&token),
            Some(json!({
                "client_name": "Globex",
                "items": [{ "product_id": consulting, "quantity": "1" }, { "product_id": 9999, "quantity": "1" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, history) = send(&app, Method::GET, "/invoices", Some(&token), None).await;
        assert_eq!(history, json!([]));
        let (_, product) = send(&app, Method::GET, &format!("/products/{consulting}"), Some(&token), None).await;
        assert!(product["last_used_at"].is_null());

        let (_, draft) = send(&app, Method::POST, "/invoices", Some(&token), Some(json!({ "client_name": "Globex" }))).await;
        let id = draft["id"].as_i64().unwrap();
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/invoices/{id}/items"),
            Some(&token),
            Some(json!({ "product_id": consulting, "quantity": "-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, product) = send(&app, Method::GET, &format!("/products/{consulting}"), Some(&token), None).await;
        assert!(product["last_used_at"].is_null());
    }

    #[tokio::test]
    async fn unreferenced_product_is_deleted() {
        let app = test_app();
        let token = sign_up(&app, "owner@example.com").await;
        let widget = create_product(&app, &token, "Widget", "goods", "4.50").await;

        let (status, deleted) = send(&app, Method::DELETE, &format!("/products/{widget}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted, json!({ "id": widget, "deleted": true, "deactivated": false }));

        let (status, _) = send(&app, Method::GET, &format!("/products/{widget}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &format!("/products/{widget}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
