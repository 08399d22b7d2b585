//! Integration tests for the Nomina backend.
//!
//! Each fixture runs the real router on a random port next to a mock wallet
//! API that speaks the same endpoints as the real one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::capture::test_support::{blank_png, qr_png};
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::{create_router, AppState};

const MOCK_ADMIN_KEY: &str = "wallet-admin-key";
const TEST_PSK: &str = "test-api-key";

// ==================== MOCK WALLET ====================

#[derive(Default)]
struct MockWallet {
    balance_msat: Mutex<i64>,
    paid_hashes: Mutex<HashSet<String>>,
    payments: Mutex<Vec<String>>,
    invoices_created: AtomicUsize,
    status_checks: AtomicUsize,
    balance_requests: AtomicUsize,
    fail_invoice_creation: Mutex<bool>,
    fail_status_checks: Mutex<bool>,
}

impl MockWallet {
    fn mark_paid(&self, payment_hash: &str) {
        self.paid_hashes
            .lock()
            .unwrap()
            .insert(payment_hash.to_string());
    }

    fn payments(&self) -> Vec<String> {
        self.payments.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.invoices_created.load(Ordering::SeqCst)
            + self.status_checks.load(Ordering::SeqCst)
            + self.balance_requests.load(Ordering::SeqCst)
            + self.payments().len()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) == Some(MOCK_ADMIN_KEY)
}

fn rejected() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Invalid adminkey." })),
    )
        .into_response()
}

async fn mock_wallet_details(State(mock): State<Arc<MockWallet>>, headers: HeaderMap) -> Response {
    mock.balance_requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return rejected();
    }
    let balance = *mock.balance_msat.lock().unwrap();
    Json(json!({ "id": "wallet-1", "name": "payroll", "balance": balance })).into_response()
}

async fn mock_payments(
    State(mock): State<Arc<MockWallet>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return rejected();
    }

    if body["out"] == true {
        let bolt11 = body["bolt11"].as_str().unwrap_or_default().to_string();
        if bolt11.contains("broke") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Insufficient balance." })),
            )
                .into_response();
        }
        let mut payments = mock.payments.lock().unwrap();
        payments.push(bolt11);
        let hash = format!("out-hash-{}", payments.len());
        return (
            StatusCode::CREATED,
            Json(json!({ "payment_hash": hash, "checking_id": hash })),
        )
            .into_response();
    }

    if *mock.fail_invoice_creation.lock().unwrap() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Node is offline" })),
        )
            .into_response();
    }

    let n = mock.invoices_created.fetch_add(1, Ordering::SeqCst) + 1;
    let amount = body["amount"].as_u64().unwrap_or_default();
    let request = format!("lnbc{}n1pmock{}", amount, n);
    // Newer wallets send the request under both names.
    (
        StatusCode::CREATED,
        Json(json!({
            "payment_hash": format!("in-hash-{}", n),
            "payment_request": request,
            "bolt11": request,
            "checking_id": format!("in-hash-{}", n),
        })),
    )
        .into_response()
}

async fn mock_payment_status(
    State(mock): State<Arc<MockWallet>>,
    headers: HeaderMap,
    Path(hash): Path<String>,
) -> Response {
    mock.status_checks.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return rejected();
    }
    if *mock.fail_status_checks.lock().unwrap() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Database is locked" })),
        )
            .into_response();
    }
    let paid = mock.paid_hashes.lock().unwrap().contains(&hash);
    Json(json!({ "paid": paid })).into_response()
}

async fn spawn_mock_wallet(mock: Arc<MockWallet>) -> String {
    let app = Router::new()
        .route("/api/v1/wallet", get(mock_wallet_details))
        .route("/api/v1/payments", post(mock_payments))
        .route("/api/v1/payments/{hash}", get(mock_payment_status))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Deliberately without the trailing slash; saving settings adds it.
    format!("http://{}", addr)
}

// ==================== FIXTURE ====================

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    wallet_url: String,
    mock: Arc<MockWallet>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_poll(200).await
    }

    async fn with_poll(max_attempts: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let mock = Arc::new(MockWallet::default());
        *mock.balance_msat.lock().unwrap() = 1_234_567;
        let wallet_url = spawn_mock_wallet(Arc::clone(&mock)).await;

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let config = Config {
            api_psk: Some(TEST_PSK.to_string()),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            poll_interval: Duration::from_millis(20),
            poll_max_attempts: max_attempts,
            wallet_timeout: Duration::from_secs(5),
        };

        let state = AppState::build(Repository::new(pool), config)
            .await
            .expect("Failed to build state");
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-nomina-key", TEST_PSK.parse().unwrap());
        let client = Client::builder().default_headers(headers).build().unwrap();

        TestFixture {
            client,
            base_url: format!("http://{}", addr),
            wallet_url,
            mock,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn configure(&self) {
        let resp = self
            .client
            .put(self.url("/api/settings"))
            .json(&json!({
                "url": self.wallet_url,
                "adminKey": MOCK_ADMIN_KEY,
                "savingsPercent": 20
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn post_bytes(&self, path: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .header("content-type", "image/png")
            .body(bytes)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn add_worker(&self, name: &str) -> Value {
        let (status, body) = self.post("/api/workers", json!({ "name": name })).await;
        assert_eq!(status, 200);
        body["data"]["worker"].clone()
    }

    async fn create_invoice(&self, amount: i64, memo: &str) -> Value {
        let (status, body) = self
            .post("/api/invoices", json!({ "amount": amount, "memo": memo }))
            .await;
        assert_eq!(status, 200, "unexpected body: {}", body);
        body["data"].clone()
    }

    /// Poll the invoice resource until its poll state is `state`.
    async fn wait_for_poll_state(&self, invoice_id: i64, state: &str) -> Value {
        for _ in 0..200 {
            let (_, body) = self.get(&format!("/api/invoices/{}", invoice_id)).await;
            if body["data"]["poll"]["state"] == state {
                return body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("invoice {} never reached poll state {}", invoice_id, state);
    }
}

// ==================== HEALTH & AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_and_invalid_psk() {
    let fixture = TestFixture::new().await;
    let bare = Client::new();

    let resp = bare
        .get(fixture.url("/api/workers"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = bare
        .get(fixture.url("/api/workers"))
        .header("x-nomina-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = bare
        .get(fixture.url("/api/workers"))
        .bearer_auth(TEST_PSK)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

// ==================== SETTINGS ====================

#[tokio::test]
async fn test_settings_default_and_save() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/settings").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["configured"], false);
    assert_eq!(body["data"]["savingsPercent"], 10);

    fixture.configure().await;

    let (_, body) = fixture.get("/api/settings").await;
    assert_eq!(body["data"]["configured"], true);
    assert_eq!(body["data"]["adminKeySet"], true);
    assert_eq!(body["data"]["savingsPercent"], 20);
    assert_eq!(body["data"]["url"], format!("{}/", fixture.wallet_url));
    assert!(body["data"].get("adminKey").is_none());
}

#[tokio::test]
async fn test_settings_require_url_and_key() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.url("/api/settings"))
        .json(&json!({ "url": fixture.wallet_url, "adminKey": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, body) = fixture.get("/api/settings").await;
    assert_eq!(body["data"]["configured"], false);
}

// ==================== WALLET ====================

#[tokio::test]
async fn test_unconfigured_wallet_blocks_balance_and_payment() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/wallet/balance").await;
    assert_eq!(status, 412);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    let (status, body) = fixture
        .post("/api/payments", json!({ "bolt11": "lnbc10n1pvalid" }))
        .await;
    assert_eq!(status, 412);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    assert_eq!(fixture.mock.calls(), 0);
}

#[tokio::test]
async fn test_balance_is_scaled_and_grouped() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let (status, body) = fixture.get("/api/wallet/balance").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["balanceMsat"], 1_234_567);
    assert_eq!(body["data"]["balanceSats"], 1234.567);
    assert_eq!(body["data"]["display"], "1,234.567 SATS");
    assert!(body["data"].get("error").is_none());
}

#[tokio::test]
async fn test_unreachable_wallet_reports_zero_balance() {
    let fixture = TestFixture::new().await;

    // A port nothing listens on
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let resp = fixture
        .client
        .put(fixture.url("/api/settings"))
        .json(&json!({ "url": dead_url, "adminKey": MOCK_ADMIN_KEY }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, body) = fixture.get("/api/wallet/balance").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["balanceMsat"], 0);
    assert_eq!(body["data"]["display"], "0 SATS");
    assert!(body["data"]["error"].is_string());
}

#[tokio::test]
async fn test_wrong_admin_key_reports_connectivity_error() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .put(fixture.url("/api/settings"))
        .json(&json!({ "url": fixture.wallet_url, "adminKey": "not-the-key" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, body) = fixture.get("/api/wallet/balance").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["balanceMsat"], 0);
    assert!(body["data"]["error"]
        .as_str()
        .unwrap()
        .contains("Could not connect"));
}

#[tokio::test]
async fn test_direct_payment_and_failure_detail() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let (status, body) = fixture
        .post("/api/payments", json!({ "bolt11": "lnbc50n1pgood" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["paymentHash"], "out-hash-1");
    assert_eq!(body["data"]["message"], "Payment succeeded. Hash: out-hash-1");
    assert_eq!(body["data"]["balance"]["display"], "1,234.567 SATS");

    let (status, body) = fixture
        .post("/api/payments", json!({ "bolt11": "lnbc50n1pbroke" }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "WALLET_ERROR");
    assert_eq!(body["error"]["message"], "Insufficient balance.");

    assert_eq!(fixture.mock.payments(), vec!["lnbc50n1pgood".to_string()]);
}

#[tokio::test]
async fn test_invalid_payload_never_reaches_wallet() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let (status, body) = fixture
        .post("/api/payments", json!({ "bolt11": "abc123" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(fixture.mock.payments().is_empty());
}

// ==================== WORKERS ====================

#[tokio::test]
async fn test_worker_add_and_delete() {
    let fixture = TestFixture::new().await;

    let ana = fixture.add_worker("Ana").await;
    let (status, body) = fixture.post("/api/workers", json!({ "name": "Luis" })).await;
    assert_eq!(status, 200);
    let luis = body["data"]["worker"].clone();
    assert!(luis["id"].as_i64().unwrap() > ana["id"].as_i64().unwrap());

    // The response carries the whole updated list
    let listed = body["data"]["workers"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["name"], "Ana");
    assert_eq!(listed[1]["id"], luis["id"]);

    let (_, body) = fixture.get("/api/workers").await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ana", "Luis"]);

    // Deletion needs confirmation
    let ana_path = format!("/api/workers/{}", ana["id"]);
    let (status, body) = fixture.delete(&ana_path).await;
    assert_eq!(status, 428);
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");

    let (status, body) = fixture.delete(&format!("{}?confirm=true", ana_path)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["removed"], true);
    assert_eq!(body["data"]["workers"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["workers"][0]["name"], "Luis");

    // Unknown id is a no-op
    let (status, body) = fixture.delete(&format!("{}?confirm=true", ana_path)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["removed"], false);
    assert_eq!(body["data"]["workers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_worker_requires_name() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.post("/api/workers", json!({ "name": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, body) = fixture.get("/api/workers").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_address_qr() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(
            "/api/workers",
            json!({ "name": "Ana", "address": " ana@wallet.example " }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["worker"]["address"], "ana@wallet.example");
    let ana_id = body["data"]["worker"]["id"].clone();

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/workers/{}/qr", ana_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/svg+xml"
    );
    assert!(resp.text().await.unwrap().contains("<svg"));

    // No address, no QR
    let luis = fixture.add_worker("Luis").await;
    let (status, body) = fixture.get(&format!("/api/workers/{}/qr", luis["id"])).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture.get("/api/workers/999/qr").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_pay_worker_attributes_message() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;
    let ana = fixture.add_worker("Ana").await;

    let (status, body) = fixture
        .post(
            &format!("/api/workers/{}/pay", ana["id"]),
            json!({ "bolt11": "LNBC20n1pana" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["workerId"], ana["id"]);
    assert_eq!(
        body["data"]["message"],
        "Payment to Ana succeeded. Hash: out-hash-1"
    );
}

// ==================== NOTES ====================

#[tokio::test]
async fn test_notes_save_and_overview() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(
            "/api/workers",
            json!({ "name": "Marta", "role": "Cook", "salary": 50000 }),
        )
        .await;
    assert_eq!(status, 200);
    let marta_id = body["data"]["worker"]["id"].as_i64().unwrap();
    let notes_path = format!("/api/workers/{}/notes", marta_id);

    let (status, body) = fixture.get(&notes_path).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["text"], "");

    let resp = fixture
        .client
        .put(fixture.url(&notes_path))
        .json(&json!({ "text": "Prefers weekly payments" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (_, body) = fixture.get(&notes_path).await;
    assert_eq!(body["data"]["text"], "Prefers weekly payments");
    assert_eq!(body["data"]["workerName"], "Marta");

    let (_, body) = fixture.get("/api/notes").await;
    assert_eq!(body["data"][0]["summary"], "Cook - 50,000 SATS");
    assert_eq!(body["data"][0]["hasNote"], true);

    let (status, body) = fixture.get("/api/workers/12345/notes").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ==================== INVOICES ====================

#[tokio::test]
async fn test_invoice_paid_scenario() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let invoice = fixture.create_invoice(1000, "salary").await;
    assert_eq!(invoice["amount"], 1000);
    assert_eq!(invoice["memo"], "salary");
    assert_eq!(invoice["paid"], false);
    assert_eq!(invoice["deletable"], true);
    assert_eq!(invoice["bolt11"], "lnbc1000n1pmock1");
    assert_eq!(invoice["statusText"], "Waiting for payment...");
    let id = invoice["id"].as_i64().unwrap();

    let (_, body) = fixture.get("/api/invoices").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    fixture.mock.mark_paid("in-hash-1");
    let settled = fixture.wait_for_poll_state(id, "paid").await;
    assert_eq!(settled["paid"], true);
    assert_eq!(settled["deletable"], false);
    assert_eq!(settled["statusText"], "Payment received!");

    let (status, body) = fixture
        .delete(&format!("/api/invoices/{}?confirm=true", id))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_invoice_qr_is_svg() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;
    let invoice = fixture.create_invoice(21, "").await;

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/invoices/{}/qr", invoice["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/svg+xml"
    );
    assert!(resp.text().await.unwrap().contains("<svg"));
}

#[tokio::test]
async fn test_invoice_rejects_non_positive_amount() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    for amount in [0, -5] {
        let (status, body) = fixture
            .post("/api/invoices", json!({ "amount": amount, "memo": "x" }))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    assert_eq!(fixture.mock.invoices_created.load(Ordering::SeqCst), 0);
    let (_, body) = fixture.get("/api/invoices").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let (_, body) = fixture.get("/api/revision").await;
    let revision = body["data"]["revisionId"].clone();

    for amount in [json!("abc"), json!(1.5)] {
        let (status, body) = fixture
            .post("/api/invoices", json!({ "amount": amount }))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["revisionId"], revision);
    }

    // Not JSON at all
    let resp = fixture
        .client
        .post(fixture.url("/api/workers"))
        .header("content-type", "application/json")
        .body("{name:")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    assert_eq!(fixture.mock.invoices_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_status_checks_use_up_attempts() {
    let fixture = TestFixture::with_poll(3).await;
    fixture.configure().await;
    *fixture.mock.fail_status_checks.lock().unwrap() = true;

    let invoice = fixture.create_invoice(700, "bonus").await;
    let id = invoice["id"].as_i64().unwrap();
    // Would be seen as paid if any check got through
    fixture.mock.mark_paid("in-hash-1");

    let expired = fixture.wait_for_poll_state(id, "expired").await;
    assert_eq!(expired["paid"], false);
    assert_eq!(fixture.mock.status_checks.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invoice_remote_failure_leaves_list_unchanged() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;
    *fixture.mock.fail_invoice_creation.lock().unwrap() = true;

    let (status, body) = fixture
        .post("/api/invoices", json!({ "amount": 1000, "memo": "salary" }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["message"], "Node is offline");

    let (_, body) = fixture.get("/api/invoices").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invoice_expires_after_attempt_budget() {
    let fixture = TestFixture::with_poll(3).await;
    fixture.configure().await;

    let invoice = fixture.create_invoice(500, "rent").await;
    let id = invoice["id"].as_i64().unwrap();

    let expired = fixture.wait_for_poll_state(id, "expired").await;
    assert_eq!(expired["paid"], false);
    assert_eq!(expired["deletable"], true);
    assert_eq!(expired["statusText"], "Invoice expired or unpaid.");
    assert_eq!(fixture.mock.status_checks.load(Ordering::SeqCst), 3);

    // Paying after expiry is not picked up without a new poll
    fixture.mock.mark_paid("in-hash-1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (_, body) = fixture.get(&format!("/api/invoices/{}", id)).await;
    assert_eq!(body["data"]["paid"], false);

    let (status, _) = fixture
        .delete(&format!("/api/invoices/{}?confirm=true", id))
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture.get("/api/invoices").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_new_invoice_cancels_previous_poll() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let first = fixture.create_invoice(100, "first").await;
    let first_id = first["id"].as_i64().unwrap();
    let second = fixture.create_invoice(200, "second").await;
    let second_id = second["id"].as_i64().unwrap();

    let (_, body) = fixture.get(&format!("/api/invoices/{}", first_id)).await;
    assert_eq!(body["data"]["poll"]["state"], "cancelled");

    // Newest first
    let (_, body) = fixture.get("/api/invoices").await;
    assert_eq!(body["data"][0]["id"], second_id);
    assert_eq!(body["data"][1]["id"], first_id);

    // The cancelled poll never observes the payment
    fixture.mock.mark_paid("in-hash-1");
    tokio::time::sleep(Duration::from_millis(150)).await;
    let (_, body) = fixture.get(&format!("/api/invoices/{}", first_id)).await;
    assert_eq!(body["data"]["paid"], false);

    // Restarting the poll picks it up, and takes over from the second invoice
    let (status, _) = fixture
        .post(&format!("/api/invoices/{}/poll", first_id), json!({}))
        .await;
    assert_eq!(status, 200);
    let settled = fixture.wait_for_poll_state(first_id, "paid").await;
    assert_eq!(settled["paid"], true);

    let (_, body) = fixture.get(&format!("/api/invoices/{}", second_id)).await;
    assert_eq!(body["data"]["poll"]["state"], "cancelled");
}

#[tokio::test]
async fn test_cancel_invoice_poll() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let invoice = fixture.create_invoice(100, "").await;
    let id = invoice["id"].as_i64().unwrap();

    let (status, body) = fixture.delete(&format!("/api/invoices/{}/poll", id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["poll"]["state"], "cancelled");
    assert_eq!(body["data"]["statusText"], "Payment check cancelled.");

    let (status, _) = fixture.delete("/api/invoices/999/poll").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_invoice_without_settings_is_rejected() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post("/api/invoices", json!({ "amount": 1000 }))
        .await;
    assert_eq!(status, 412);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
    assert_eq!(fixture.mock.calls(), 0);
}

// ==================== CAPTURE ====================

#[tokio::test]
async fn test_capture_frames_then_upload_pays_worker() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;
    let ana = fixture.add_worker("Ana").await;

    let (status, body) = fixture
        .post("/api/capture", json!({ "workerId": ana["id"] }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["camera"], "starting");
    assert_eq!(body["data"]["workerName"], "Ana");
    let capture = body["data"]["id"].as_str().unwrap().to_string();

    // A frame without a QR keeps scanning
    let (status, body) = fixture
        .post_bytes(&format!("/api/capture/{}/frame", capture), blank_png())
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "scanning");
    assert_eq!(body["data"]["session"]["camera"], "scanning");
    assert_eq!(
        body["data"]["session"]["statusLine"],
        "Point the camera at the QR..."
    );

    // An unreadable upload fails just that attempt
    let (status, body) = fixture
        .post_bytes(&format!("/api/capture/{}/upload", capture), blank_png())
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "DECODE_ERROR");
    let (status, _) = fixture.get(&format!("/api/capture/{}", capture)).await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .post_bytes(
            &format!("/api/capture/{}/upload", capture),
            qr_png("lnbc1500n1pworkerpay"),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["data"]["outcome"], "paid");
    assert_eq!(
        body["data"]["receipt"]["message"],
        "Payment to Ana succeeded. Hash: out-hash-1"
    );
    assert_eq!(fixture.mock.payments(), vec!["lnbc1500n1pworkerpay".to_string()]);

    // The surface closed itself
    let (status, _) = fixture.get(&format!("/api/capture/{}", capture)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_capture_rejects_oversized_image() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.post("/api/capture", json!({})).await;
    let capture = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post_bytes(
            &format!("/api/capture/{}/upload", capture),
            crate::capture::test_support::oversized_png(),
        )
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "DECODE_ERROR");

    let (status, _) = fixture.get(&format!("/api/capture/{}", capture)).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_capture_rejects_non_invoice_qr() {
    let fixture = TestFixture::new().await;
    fixture.configure().await;

    let (_, body) = fixture.post("/api/capture", json!({})).await;
    let capture = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post_bytes(&format!("/api/capture/{}/frame", capture), qr_png("abc123"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(fixture.mock.payments().is_empty());

    let (status, _) = fixture.get(&format!("/api/capture/{}", capture)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_capture_close_stops_camera() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.post("/api/capture", json!({})).await;
    let capture = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture.delete(&format!("/api/capture/{}", capture)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["camera"], "stopped");
    assert_eq!(body["data"]["open"], false);

    let (status, _) = fixture
        .post_bytes(&format!("/api/capture/{}/frame", capture), blank_png())
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_capture_for_unknown_worker() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post("/api/capture", json!({ "workerId": 42 }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ==================== REVISION ====================

#[tokio::test]
async fn test_revision_advances_on_mutation() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.get("/api/revision").await;
    let before = body["data"]["revisionId"].as_i64().unwrap();

    let (_, body) = fixture.post("/api/workers", json!({ "name": "Ana" })).await;
    let after = body["revisionId"].as_i64().unwrap();
    assert!(after > before);

    let (_, body) = fixture.get("/api/workers").await;
    assert_eq!(body["revisionId"], after);
}
