use mintswap::{api, AppState, Broker, Config, Database};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config.log_level)?;

    info!("Starting mintswap broker...");
    info!("Server: {}", config.server_address());
    info!("Database: {}", config.database_url);
    info!("Fee rate: {}%", config.fee_rate * 100.0);
    info!("Mints: {}", config.mints.len());

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database ready");

    // Initialize broker
    let broker_config = mintswap::types::BrokerConfig {
        mints: config.mints.clone(),
        fee_rate: config.fee_rate,
        min_swap_amount: config.min_swap_amount,
        max_swap_amount: config.max_swap_amount,
        quote_expiry_seconds: config.quote_expiry_seconds,
        mint_timeout_seconds: config.mint_timeout_seconds,
    };

    let broker = Arc::new(Broker::new(broker_config).await?);
    if config.initial_liquidity > 0 {
        info!(
            "Bootstrapping {} sats of liquidity per mint...",
            config.initial_liquidity
        );
        broker.initialize(config.initial_liquidity).await?;
    }
    info!("Broker ready to accept requests");

    // Housekeeping: quote expiry sweep and ledger logging
    {
        let broker = broker.clone();
        tokio::spawn(async move {
            if let Err(err) = broker.run().await {
                tracing::error!("broker housekeeping stopped: {err}");
            }
        });
    }

    // Create app state
    let state = AppState {
        broker,
        db,
    };

    // Create router
    let app = api::create_router(state, config.cors_origins.clone());

    // Start HTTP server
    let addr = config.server_address();
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}
