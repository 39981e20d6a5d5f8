//! # mintswap
//!
//! A broker service for atomic swaps of bearer ecash between independent
//! Cashu-style mints, built on Schnorr adaptor signatures.
//!
//! ## Overview
//!
//! A user holding tokens on mint X wants tokens on mint Y; the broker holds
//! liquidity on both and exchanges them for a fee. Atomicity comes from the
//! adaptor-signature algebra: spending one locked output necessarily reveals
//! the adaptor secret that spends the other, so either both legs settle or
//! neither does, with no escrow, timelocks or mint extensions.
//!
//! ## Example
//!
//! ```no_run
//! use mintswap::{Broker, BrokerConfig, MintConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BrokerConfig {
//!         mints: vec![
//!             MintConfig {
//!                 mint_url: "http://localhost:3338".to_string(),
//!                 name: "Mint A".to_string(),
//!                 unit: "sat".to_string(),
//!             },
//!             MintConfig {
//!                 mint_url: "http://localhost:3339".to_string(),
//!                 name: "Mint B".to_string(),
//!                 unit: "sat".to_string(),
//!             },
//!         ],
//!         fee_rate: 0.005, // 0.5%
//!         ..Default::default()
//!     };
//!
//!     let broker = Broker::new(config).await?;
//!     broker.initialize(100).await?; // 100 sats on each mint
//!     broker.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod broker;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod db;
pub mod error;
pub mod liquidity;
pub mod mint;
pub mod p2pk;
pub mod swap;
pub mod token;
pub mod types;

pub use api::AppState;
pub use broker::Broker;
pub use config::Config;
pub use coordinator::{AtomicSwap, SwapEvent, SwapParty, SwapState};
pub use db::Database;
pub use error::{Result, SwapError};
pub use liquidity::LiquidityManager;
pub use mint::MintClient;
pub use token::{P2pkLock, Wallet};
pub use types::{BrokerConfig, MintConfig, Proof, SwapQuote, SwapRequest, SwapStatus};
