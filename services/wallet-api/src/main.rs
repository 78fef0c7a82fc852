use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_api::{config::ApiConfig, handlers, JwtAuth};
use wallet_ledger::LedgerService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    info!("Starting Wallet API...");

    // Load configuration
    let config = ApiConfig::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Open ledger
    let ledger_config = config.ledger_config();
    info!("Opening wallet ledger at {}", ledger_config.data_dir.display());
    let ledger = LedgerService::open(&ledger_config).context("Failed to open wallet ledger")?;
    info!(
        usd_to_lkr = %ledger.exchange_rate().lkr_per_usd(),
        "Wallet ledger opened successfully"
    );

    let ledger = web::Data::new(ledger);
    let secret = config.auth.jwt_secret.clone();
    let server_config = config.server.clone();

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        let auth = JwtAuth::new(&secret);
        App::new()
            .app_data(ledger.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .configure(|cfg| handlers::configure_routes(cfg, auth))
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    info!("Wallet API stopped");
    Ok(())
}
