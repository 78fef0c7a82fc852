use crate::auth::{AuthUser, JwtAuth};
use crate::errors::{ApiError, ApiResult};
use crate::models::*;
use actix_web::{web, HttpResponse};
use wallet_ledger::{LedgerService, Lkr, Usd, VendorId};

// ===== Health Check =====
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ===== Prometheus Metrics =====
pub async fn metrics(ledger: web::Data<LedgerService>) -> ApiResult<HttpResponse> {
    let text = ledger.metrics().gather_text()?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(text))
}

// ===== Get Balance =====
pub async fn get_balance(
    user: AuthUser,
    ledger: web::Data<LedgerService>,
) -> ApiResult<HttpResponse> {
    let wallet = ledger.get_or_create_wallet(&user.user_id()?).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(&wallet)))
}

// ===== Top Up =====
pub async fn top_up(
    user: AuthUser,
    req: web::Json<TopUpRequest>,
    ledger: web::Data<LedgerService>,
) -> ApiResult<HttpResponse> {
    let user_id = user.user_id()?;
    let wallet = ledger.top_up(&user_id, Usd::new(req.amount)).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(&wallet)))
}

// ===== Pay Vendor =====
pub async fn pay(
    user: AuthUser,
    req: web::Json<PayRequest>,
    ledger: web::Data<LedgerService>,
) -> ApiResult<HttpResponse> {
    let user_id = user.user_id()?;
    let request = req.into_inner();

    let vendor_id = VendorId::parse(request.vendor_id)?;
    let amount = Lkr::from_decimal(request.amount)?;

    let wallet = ledger.deduct(&user_id, amount, &vendor_id).await?;
    Ok(HttpResponse::Ok().json(PayResponse {
        success: true,
        balance: wallet.balance.to_decimal(),
    }))
}

// ===== Transaction History =====
pub async fn list_transactions(
    user: AuthUser,
    query: web::Query<HistoryQuery>,
    ledger: web::Data<LedgerService>,
) -> ApiResult<HttpResponse> {
    let user_id = user.user_id()?;
    let records = match query.limit {
        Some(limit) => ledger.list_recent_transactions(&user_id, limit)?,
        None => ledger.list_transactions(&user_id)?,
    };

    Ok(HttpResponse::Ok().json(TransactionsResponse {
        transactions: records.into_iter().map(TransactionView::from).collect(),
    }))
}

// ===== Exchange Rate =====
pub async fn exchange_rate(ledger: web::Data<LedgerService>) -> HttpResponse {
    HttpResponse::Ok().json(RateResponse {
        usd_to_lkr: ledger.exchange_rate().lkr_per_usd(),
    })
}

// ===== Vendor Earnings =====
pub async fn vendor_earnings(
    user: AuthUser,
    ledger: web::Data<LedgerService>,
) -> ApiResult<HttpResponse> {
    let earnings = ledger.vendor_earnings(&user.vendor_id()?)?;
    Ok(HttpResponse::Ok().json(EarningsResponse::from(earnings)))
}

/// Malformed JSON bodies get the same shape as other validation errors
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

/// Malformed query strings likewise
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

// ===== Configure Routes =====
pub fn configure_routes(cfg: &mut web::ServiceConfig, auth: JwtAuth) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .service(
            web::scope("/api/wallet")
                .wrap(auth.clone())
                .route("/balance", web::get().to(get_balance))
                .route("/topup", web::post().to(top_up))
                .route("/pay", web::post().to(pay))
                .route("/transactions", web::get().to(list_transactions))
                .route("/rate", web::get().to(exchange_rate)),
        )
        .service(
            web::scope("/api/vendor")
                .wrap(auth)
                .route("/earnings", web::get().to(vendor_earnings)),
        )
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use actix_web::{http::StatusCode, test, App};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const SECRET: &str = "test-secret";

    fn test_ledger() -> (web::Data<LedgerService>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = wallet_ledger::Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        let ledger = LedgerService::open(&config).unwrap();
        (web::Data::new(ledger), temp_dir)
    }

    fn token_for(id: &str, secret: &str, ttl_seconds: i64) -> String {
        let claims = Claims {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
            exp: (chrono::Utc::now().timestamp() + ttl_seconds) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn bearer(id: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token_for(id, SECRET, 3600)))
    }

    macro_rules! test_app {
        ($ledger:expr) => {
            test::init_service(
                App::new()
                    .app_data($ledger.clone())
                    .configure(|cfg| configure_routes(cfg, JwtAuth::new(SECRET))),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_missing_token_rejected() {
        let (ledger, _temp) = test_ledger();
        let app = test_app!(ledger);

        let req = test::TestRequest::get().uri("/api/wallet/balance").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Unauthorized: Missing or malformed token");
    }

    #[actix_web::test]
    async fn test_invalid_and_expired_tokens_rejected() {
        let (ledger, _temp) = test_ledger();
        let app = test_app!(ledger);

        let wrong_secret = format!("Bearer {}", token_for("alice", "other-secret", 3600));
        let expired = format!("Bearer {}", token_for("alice", SECRET, -3600));

        for header in [wrong_secret, expired] {
            let req = test::TestRequest::get()
                .uri("/api/wallet/balance")
                .insert_header(("Authorization", header))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Invalid or expired token");
        }
    }

    #[actix_web::test]
    async fn test_wallet_flow() {
        let (ledger, _temp) = test_ledger();
        let app = test_app!(ledger);

        // New user starts at zero
        let req = test::TestRequest::get()
            .uri("/api/wallet/balance")
            .insert_header(bearer("traveller"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["balance"].as_f64(), Some(0.0));

        let req = test::TestRequest::post()
            .uri("/api/wallet/topup")
            .insert_header(bearer("traveller"))
            .set_json(json!({ "amount": 100 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["balance"].as_f64(), Some(30000.0));

        let req = test::TestRequest::post()
            .uri("/api/wallet/pay")
            .insert_header(bearer("traveller"))
            .set_json(json!({ "vendorId": "vendorX", "amount": "5000" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["balance"].as_f64(), Some(25000.0));

        let req = test::TestRequest::post()
            .uri("/api/wallet/pay")
            .insert_header(bearer("traveller"))
            .set_json(json!({ "vendorId": "vendorX", "amount": 999999 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "INSUFFICIENT_FUNDS");

        let req = test::TestRequest::get()
            .uri("/api/wallet/transactions")
            .insert_header(bearer("traveller"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let transactions = body["transactions"].as_array().unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0]["type"], "PAYMENT");
        assert_eq!(transactions[0]["vendorId"], "vendorX");
        assert_eq!(transactions[0]["amountLKR"].as_f64(), Some(5000.0));
        assert_eq!(transactions[1]["type"], "TOPUP");
        assert_eq!(transactions[1]["amountUSD"].as_f64(), Some(100.0));
        assert!(transactions[1].get("vendorId").is_none());

        let req = test::TestRequest::get()
            .uri("/api/wallet/transactions?limit=1")
            .insert_header(bearer("traveller"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transactions"].as_array().unwrap().len(), 1);

        // Payee sees the earnings
        let req = test::TestRequest::get()
            .uri("/api/vendor/earnings")
            .insert_header(bearer("vendorX"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["vendorId"], "vendorX");
        assert_eq!(body["totalEarnings"].as_f64(), Some(5000.0));
        assert_eq!(body["paymentCount"], 1);
    }

    #[actix_web::test]
    async fn test_validation_errors() {
        let (ledger, _temp) = test_ledger();
        let app = test_app!(ledger);

        let bodies = [
            ("/api/wallet/topup", json!({ "amount": 0 })),
            ("/api/wallet/topup", json!({ "amount": -5 })),
            ("/api/wallet/topup", json!({})),
            ("/api/wallet/pay", json!({ "vendorId": "", "amount": 50 })),
            ("/api/wallet/pay", json!({ "amount": 50 })),
            ("/api/wallet/pay", json!({ "vendorId": "guide", "amount": "10.005" })),
            ("/api/wallet/pay", json!({ "vendorId": "guide", "amount": 0 })),
        ];

        for (uri, body) in bodies {
            let req = test::TestRequest::post()
                .uri(uri)
                .insert_header(bearer("alice"))
                .set_json(body.clone())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{} {}", uri, body);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "VALIDATION_ERROR");
        }

        let req = test::TestRequest::get()
            .uri("/api/wallet/transactions?limit=0")
            .insert_header(bearer("alice"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Signed, but the id cannot name a wallet
        for uri in ["/api/wallet/balance", "/api/vendor/earnings"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .insert_header(bearer("alice|admin"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "VALIDATION_ERROR");
        }

        // Rejected top-ups created nothing
        assert!(ledger
            .list_transactions(&wallet_ledger::UserId::new("alice"))
            .unwrap()
            .is_empty());
    }

    #[actix_web::test]
    async fn test_rate_health_and_metrics() {
        let (ledger, _temp) = test_ledger();
        let app = test_app!(ledger);

        let req = test::TestRequest::get()
            .uri("/api/wallet/rate")
            .insert_header(bearer("alice"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["usdToLkr"].as_f64(), Some(300.0));

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let text = test::read_body(resp).await;
        assert!(std::str::from_utf8(&text)
            .unwrap()
            .contains("wallet_topups_total"));
    }
}
