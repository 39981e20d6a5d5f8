//! Example: Running the swap broker against two local mints
//!
//! This walkthrough demonstrates:
//! 1. Starting the broker with liquidity on two mints
//! 2. A client requesting a swap quote
//! 3. The quote fields the client uses to drive the atomic swap
//!
//! To run this example:
//! 1. Start two local mints (e.g. with docker compose) on :3338 and :3339
//! 2. cargo run --example run_broker

use mintswap::{Broker, BrokerConfig, MintConfig, SwapRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Configure the broker with two local mints
    let config = BrokerConfig {
        mints: vec![
            MintConfig {
                mint_url: "http://localhost:3338".to_string(),
                name: "Mint A".to_string(),
                unit: "sat".to_string(),
            },
            MintConfig {
                mint_url: "http://localhost:3339".to_string(),
                name: "Mint B".to_string(),
                unit: "sat".to_string(),
            },
        ],
        fee_rate: 0.005, // 0.5% fee
        min_swap_amount: 1,
        max_swap_amount: 10_000,
        quote_expiry_seconds: 300, // 5 minutes
        mint_timeout_seconds: 30,
    };

    println!("Initializing the broker...");
    let broker = Broker::new(config).await?;

    println!("Setting up initial liquidity...");
    broker.initialize(100).await?;

    let status = broker.get_liquidity_status().await;
    for mint in &status.mints {
        println!("  {} ({}): {} sats", mint.name, mint.mint_url, mint.balance);
    }

    // A client asks to move 8 sats from Mint B to Mint A
    let quote = broker
        .request_quote(SwapRequest {
            client_id: Some("demo-client".to_string()),
            source_mint: "http://localhost:3339".to_string(),
            target_mint: "http://localhost:3338".to_string(),
            amount: 8,
            client_public_key: None,
        })
        .await?;

    println!("\nQuote {}:", quote.quote_id);
    println!("  amount in:      {} sats", quote.input_amount);
    println!("  amount out:     {} sats", quote.output_amount);
    println!("  fee:            {} sats", quote.fee);
    println!("  broker pubkey:  {}", hex::encode(&quote.broker_public_key));
    println!("  adaptor point:  {}", hex::encode(&quote.adaptor_point));
    println!("  tweaked pubkey: {}", hex::encode(&quote.tweaked_pubkey));
    println!("\nThe client now locks source tokens to the tweaked pubkey,");
    println!("calls accept/complete, and claims with its key plus the");
    println!("revealed adaptor secret.");

    // Keep sweeping expired quotes and logging status
    broker.run().await?;

    Ok(())
}
