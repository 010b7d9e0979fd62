use std::collections::HashMap;
use std::time::Duration;

use actix_web::{test, web, App};
use mockito::Matcher;
use paygate::providers::momo;
use paygate::{signature, Credentials, Merchant, MomoCredentials, PayosCredentials, Provider};
use paygate_server::routes;
use paygate_server::{AppState, ServerConfig, SqliteStore};
use serde_json::{json, Value};

const ADMIN_TOKEN: &str = "admin-secret";

fn momo_credentials() -> MomoCredentials {
    MomoCredentials {
        partner_code: "MOMOBKUN20180529".to_string(),
        access_key: "klm05TvNBzhg7h7j".to_string(),
        secret_key: "at67qH6mk8w5Y1nAyMoYKMWACiEi2bsa".to_string(),
        public_key: None,
    }
}

fn payos_credentials() -> PayosCredentials {
    PayosCredentials {
        api_key: "payos-api-key".to_string(),
        client_id: "payos-client-id".to_string(),
        checksum_key: "payos-checksum-key".to_string(),
    }
}

/// State with every vendor URL pointed at `vendor_base` and a fresh database.
fn test_state(dir: &tempfile::TempDir, vendor_base: &str) -> AppState {
    let db_path = dir.path().join("paygate.db");
    let vars: HashMap<&str, String> = HashMap::from([
        ("ADMIN_TOKEN", ADMIN_TOKEN.to_string()),
        ("PAYGATE_INSECURE_DEV", "true".to_string()),
        ("DB_PATH", db_path.to_string_lossy().into_owned()),
        ("PUBLIC_BASE_URL", "https://gateway.example".to_string()),
        ("MOMO_URL", vendor_base.to_string()),
        ("PAYOS_URL", vendor_base.to_string()),
        ("ZALOPAY_URL", vendor_base.to_string()),
        ("VNPAY_URL", vendor_base.to_string()),
        ("VIETQR_URL", vendor_base.to_string()),
        ("PROVIDER_TIMEOUT_SECS", "5".to_string()),
        ("FORWARD_TIMEOUT_SECS", "2".to_string()),
    ]);
    let config = ServerConfig::from_vars(|k| vars.get(k).cloned()).unwrap();
    let store = SqliteStore::new(&config.db_path).unwrap();
    AppState::new(config, store).unwrap()
}

fn seed_merchant(state: &AppState, id: &str, ipn_url: &str, credentials: Credentials) {
    state
        .store
        .create_merchant(&Merchant {
            id: id.to_string(),
            email: format!("{id}@shop.example"),
            ipn_url: ipn_url.to_string(),
            credentials,
        })
        .unwrap();
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(routes::health::configure)
                .service(routes::api_scope("/api/v1")),
        )
        .await
    };
}

/// Wait for a background relay to hit the mock.
async fn wait_until_matched(mock: &mockito::Mock) -> bool {
    for _ in 0..40 {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[actix_rt::test]
async fn health_reports_merchant_count() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, "http://127.0.0.1:1");
    seed_merchant(&state, "m-1", "https://shop.example/ipn", Credentials::default());
    let app = app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "paygate");
    assert_eq!(body["merchants"], 1);
}

#[actix_rt::test]
async fn merchant_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let probe = server.mock("POST", "/ipn").with_status(204).expect_at_least(1).create_async().await;
    let state = test_state(&dir, &server.url());
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/create_user")
        .set_json(json!({
            "email": "owner@shop.example",
            "ipnUrl": format!("{}/ipn", server.url()),
            "services": { "momo": {
                "partnerCode": "MOMOBKUN20180529",
                "accessKey": "ak",
                "secretKey": "sk"
            }}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["services"], json!(["momo"]));
    let id = body["data"]["id"].as_str().unwrap().to_string();
    probe.assert_async().await;

    let req = test::TestRequest::get()
        .uri("/api/v1/get_user")
        .insert_header(("x-client-id", id.as_str()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["email"], "owner@shop.example");
    assert!(body.to_string().find("secretKey").is_none());

    // Same e-mail again is a validation error.
    let req = test::TestRequest::post()
        .uri("/api/v1/create_user")
        .set_json(json!({ "email": "owner@shop.example", "ipnUrl": format!("{}/ipn", server.url()) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 8);
    assert_eq!(body["error"]["issues"][0]["field"], "email");

    let req = test::TestRequest::get().uri("/api/v1/get_users").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/get_users")
        .insert_header(("x-admin-token", ADMIN_TOKEN))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let req = test::TestRequest::put()
        .uri("/api/v1/update_user")
        .insert_header(("x-client-id", id.as_str()))
        .set_json(json!({ "email": "new@shop.example", "ipnUrl": format!("{}/ipn", server.url()) }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["email"], "new@shop.example");
    assert_eq!(body["data"]["services"], json!([]));

    let req = test::TestRequest::delete()
        .uri("/api/v1/delete_user")
        .insert_header(("x-client-id", id.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/v1/get_user")
        .insert_header(("x-client-id", id.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_rt::test]
async fn unreachable_ipn_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/ipn").with_status(500).create_async().await;
    let app = app!(test_state(&dir, &server.url()));

    let req = test::TestRequest::post()
        .uri("/api/v1/create_user")
        .set_json(json!({ "email": "owner@shop.example", "ipnUrl": format!("{}/ipn", server.url()) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["issues"][0]["field"], "ipnUrl");
}

#[actix_rt::test]
async fn payos_merchant_registration_confirms_webhook() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/ipn").with_status(204).create_async().await;
    let confirm = server
        .mock("POST", "/confirm-webhook")
        .match_header("x-client-id", "payos-client-id")
        .match_body(Matcher::Regex(
            r"https://gateway\.example/api/v1/payment_link_callback\?service=payos&token=".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "code": "00", "desc": "success", "data": {} }).to_string())
        .expect(1)
        .create_async()
        .await;
    let app = app!(test_state(&dir, &server.url()));

    let req = test::TestRequest::post()
        .uri("/api/v1/create_user")
        .set_json(json!({
            "email": "owner@shop.example",
            "ipnUrl": format!("{}/ipn", server.url()),
            "services": { "payos": {
                "apiKey": "payos-api-key",
                "clientId": "payos-client-id",
                "checksumKey": "payos-checksum-key"
            }}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    confirm.assert_async().await;
}

#[actix_rt::test]
async fn rejected_webhook_registration_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/ipn").with_status(204).create_async().await;
    server
        .mock("POST", "/confirm-webhook")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "code": "214", "desc": "Cổng thanh toán không tồn tại hoặc đã tạm dừng" }).to_string())
        .create_async()
        .await;
    let state = test_state(&dir, &server.url());
    let store = state.store.clone();
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/create_user")
        .set_json(json!({
            "email": "owner@shop.example",
            "ipnUrl": format!("{}/ipn", server.url()),
            "services": { "payos": {
                "apiKey": "k", "clientId": "c", "checksumKey": "s"
            }}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 10);
    assert_eq!(body["error"]["possibleReasons"][0], "Invalid API key and Client ID pair");
    assert_eq!(store.count_merchants().unwrap(), 0);
}

#[actix_rt::test]
async fn payment_link_requires_client_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(test_state(&dir, "http://127.0.0.1:1"));

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link?service=payos")
        .set_json(json!({ "order_id": "42", "amount": 50000, "description": "Order 42", "return_url": "https://shop.example/r" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 1);
}

#[actix_rt::test]
async fn unknown_service_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, "http://127.0.0.1:1");
    seed_merchant(&state, "m-1", "https://shop.example/ipn", Credentials::default());
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link?service=stripe")
        .insert_header(("x-client-id", "m-1"))
        .set_json(json!({ "order_id": "42", "amount": 50000, "description": "Order 42", "return_url": "https://shop.example/r" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 9);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link_callback?service=stripe&token=m-1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_rt::test]
async fn malformed_json_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(test_state(&dir, "http://127.0.0.1:1"));

    let req = test::TestRequest::post()
        .uri("/api/v1/qr_code?service=vietqr")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 4);
}

#[actix_rt::test]
async fn payos_payment_link_goes_through_the_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", "/v2/payment-requests")
        .match_body(Matcher::PartialJson(json!({ "orderCode": 42, "amount": 50000 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "code": "00",
                "desc": "success",
                "data": {
                    "paymentLinkId": "abc",
                    "checkoutUrl": "https://pay.payos.vn/web/abc",
                    "qrCode": "000201",
                    "status": "PENDING"
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let state = test_state(&dir, &server.url());
    seed_merchant(
        &state,
        "m-1",
        "https://shop.example/ipn",
        Credentials {
            payos: Some(payos_credentials()),
            ..Default::default()
        },
    );
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link?service=payos")
        .insert_header(("x-client-id", "m-1"))
        .set_json(json!({
            "order_id": "42",
            "amount": 50000,
            "description": "Order 42",
            "return_url": "https://shop.example/return",
            "cancel_url": "https://shop.example/cancel"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    create.assert_async().await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["data"]["checkout_url"], "https://pay.payos.vn/web/abc");
}

#[actix_rt::test]
async fn missing_provider_credentials_are_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, "http://127.0.0.1:1");
    seed_merchant(&state, "m-1", "https://shop.example/ipn", Credentials::default());
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/transaction_status?service=momo")
        .insert_header(("x-client-id", "m-1"))
        .set_json(json!({ "order_id": "ORDER-1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 6);
    assert_eq!(body["error"]["service"], "momo");
}

#[actix_rt::test]
async fn momo_callback_is_acknowledged_and_relayed() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let forwarded = server
        .mock("POST", "/ipn")
        .match_query(Matcher::UrlEncoded("service".into(), "momo".into()))
        .match_body(Matcher::PartialJson(json!({ "orderId": "ORDER-1" })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let state = test_state(&dir, "http://127.0.0.1:1");
    seed_merchant(
        &state,
        "m-1",
        &format!("{}/ipn", server.url()),
        Credentials {
            momo: Some(momo_credentials()),
            ..Default::default()
        },
    );
    let app = app!(state);

    let mut notification = json!({
        "partnerCode": "MOMOBKUN20180529",
        "orderId": "ORDER-1",
        "requestId": "req-1",
        "amount": 50000,
        "orderInfo": "Pay with MoMo",
        "orderType": "momo_wallet",
        "transId": 4088878653i64,
        "resultCode": 0,
        "message": "Successful.",
        "payType": "qr",
        "responseTime": 1721720663942i64,
        "extraData": ""
    });
    let creds = momo_credentials();
    let raw = momo::ipn_signature_string(&creds, notification.as_object().unwrap());
    notification["signature"] = json!(signature::sign_for(Provider::Momo, &creds.secret_key, &raw).unwrap());

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link_callback?service=momo&token=m-1")
        .set_json(&notification)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    assert!(wait_until_matched(&forwarded).await);
    forwarded.assert_async().await;
}

#[actix_rt::test]
async fn forged_callback_is_acknowledged_but_not_relayed() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let forwarded = server.mock("POST", "/ipn").expect(0).create_async().await;
    let state = test_state(&dir, "http://127.0.0.1:1");
    seed_merchant(
        &state,
        "m-1",
        &format!("{}/ipn", server.url()),
        Credentials {
            payos: Some(payos_credentials()),
            ..Default::default()
        },
    );
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link_callback?service=payos&token=m-1")
        .set_json(json!({
            "code": "00",
            "desc": "success",
            "success": true,
            "data": { "orderCode": 42, "amount": 50000, "transactionDateTime": "2024-01-01 10:00:00" },
            "signature": "0000"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "success": true }));

    tokio::time::sleep(Duration::from_millis(200)).await;
    forwarded.assert_async().await;
}

#[actix_rt::test]
async fn vnpay_ipn_is_acknowledged_on_get() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(test_state(&dir, "http://127.0.0.1:1"));

    let req = test::TestRequest::get()
        .uri("/api/v1/payment_link_callback?service=vnpay&token=nobody&vnp_TxnRef=1&vnp_SecureHash=00")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["RspCode"], "00");
}

#[actix_rt::test]
async fn providers_without_callbacks_are_not_implemented() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(test_state(&dir, "http://127.0.0.1:1"));

    let req = test::TestRequest::post()
        .uri("/api/v1/payment_link_callback?service=vietqr&token=m-1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 501);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 6);
}

#[actix_rt::test]
async fn self_ipn_answers_no_content() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(test_state(&dir, "http://127.0.0.1:1"));

    let req = test::TestRequest::post().uri("/api/v1/ipn").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}
