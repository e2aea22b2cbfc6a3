use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, Method, header};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parish_donations::config::Config;
use parish_donations::crypto::MasterKey;
use parish_donations::db::{AppState, create_pool, init_db, queries};
use parish_donations::error::{AppError, Result};
use parish_donations::handlers;
use parish_donations::models::{CreateCampaign, CreateParish};
use parish_donations::payments::PagarmeClient;

#[derive(Parser, Debug)]
#[command(name = "parish-donations")]
#[command(about = "Donation payments and Pagar.me reconciliation for parish campaigns")]
struct Cli {
    /// Seed the database with a demo parish and campaign (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Store an encrypted Pagar.me secret key for a parish. Requires --secret-key-file.
    #[arg(long, value_name = "PARISH_ID", requires = "secret_key_file")]
    set_parish_key: Option<String>,

    /// File holding the parish's Pagar.me secret key (for --set-parish-key)
    #[arg(long, value_name = "PATH", requires = "set_parish_key")]
    secret_key_file: Option<String>,

    /// Print a fresh base64 master key for MASTER_KEY, then exit
    #[arg(long)]
    generate_master_key: bool,

    /// Rebuild every campaign total from its paid donations, then exit
    #[arg(long)]
    recompute_totals: bool,
}

/// Seeds a parish with a test gateway key and one campaign.
/// Skipped when any campaign already exists.
fn seed_dev_data(state: &AppState) -> Result<()> {
    let conn = state.db.get()?;

    if !queries::list_campaigns(&conn)?.is_empty() {
        tracing::info!("Database already has data, skipping seed");
        return Ok(());
    }

    let parish = queries::create_parish(
        &conn,
        &CreateParish {
            name: "Paróquia São José".to_string(),
        },
    )?;
    let dev_key = std::env::var("PAGARME_DEV_SECRET_KEY").unwrap_or_else(|_| "sk_test_dev".to_string());
    queries::set_parish_gateway_key(&conn, &parish.id, &dev_key, &state.master_key)?;

    let campaign = queries::create_campaign(
        &conn,
        &CreateCampaign {
            parish_id: parish.id.clone(),
            title: "Reforma do telhado".to_string(),
            goal_cents: 5_000_000,
        },
    )?;

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Parish: {} (id: {})", parish.name, parish.id);
    tracing::info!(
        "Campaign: {} (id: {}, raised: R$ {})",
        campaign.title,
        campaign.id,
        campaign.current_amount()
    );
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  parish_id: {}", parish.id);
    println!("  campaign_id: {}", campaign.id);
    println!("--- END COPY ---");
    println!();
    Ok(())
}

fn set_parish_key(state: &AppState, parish_id: &str, key_file: &str) -> Result<()> {
    let secret = std::fs::read_to_string(key_file)
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", key_file, e)))?;
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(AppError::Validation(format!("{} is empty", key_file)));
    }

    let conn = state.db.get()?;
    if !queries::set_parish_gateway_key(&conn, parish_id, secret, &state.master_key)? {
        return Err(AppError::ParishNotFound);
    }
    println!("Stored encrypted Pagar.me key for parish {}", parish_id);
    Ok(())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            HeaderName::from_static("idempotency-key"),
        ])
}

async fn run(cli: Cli) -> Result<()> {
    if cli.generate_master_key {
        println!("{}", MasterKey::generate());
        return Ok(());
    }

    let config = Config::from_env()?;

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path)?;
    {
        let conn = db_pool.get()?;
        init_db(&conn)?;
    }

    let gateway = PagarmeClient::new(&config.pagarme_api_url, config.pagarme_timeout)?;

    let state = AppState {
        db: db_pool,
        master_key: config.master_key.clone(),
        gateway: Arc::new(gateway),
        payments: config.payments.clone(),
        webhook_secret: config.webhook_secret.clone(),
    };

    // One-shot admin commands exit before the server starts
    if let (Some(parish_id), Some(key_file)) = (&cli.set_parish_key, &cli.secret_key_file) {
        return set_parish_key(&state, parish_id, key_file);
    }
    if cli.recompute_totals {
        let conn = state.db.get()?;
        let changed = queries::recompute_campaign_totals(&conn)?;
        println!("Recomputed campaign totals: {} campaign(s) corrected", changed);
        return Ok(());
    }

    if cli.seed {
        if config.dev_mode {
            seed_dev_data(&state)?;
        } else {
            tracing::warn!("--seed flag ignored: not in dev mode (set APP_ENV=dev)");
        }
    }

    if state.webhook_secret.is_none() {
        tracing::warn!("PAGARME_WEBHOOK_SECRET not set; webhook signatures are not checked");
    }

    let app = Router::new()
        .merge(handlers::public::router(config.rate_limit))
        .merge(handlers::webhooks::router())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Parish donations server listening on {}", addr);

    // Connect info is required by the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::Internal(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parish_donations=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
