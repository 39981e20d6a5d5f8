//! Main broker service
//!
//! Owns one wallet per configured mint, the liquidity ledger and the quote
//! service, and exposes the three public swap operations: request a quote,
//! accept it, complete it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, SwapError};
use crate::liquidity::{LedgerEvent, LedgerEventType, LiquidityManager};
use crate::swap::QuoteService;
use crate::token::Wallet;
use crate::types::{BrokerConfig, Proof, SwapQuote, SwapRequest};

/// The broker: multi-mint orchestration on top of the ledger and the quote
/// service. Shared mutable state is the ledger and the quote table only.
pub struct Broker {
    config: BrokerConfig,
    wallets: HashMap<String, Arc<Wallet>>,
    liquidity: Arc<LiquidityManager>,
    quotes: QuoteService,
}

impl Broker {
    /// Create a new broker instance
    pub async fn new(config: BrokerConfig) -> Result<Self> {
        info!(
            fee_rate = config.fee_rate,
            min = config.min_swap_amount,
            max = config.max_swap_amount,
            mints = config.mints.len(),
            "starting broker"
        );

        let timeout = Duration::from_secs(config.mint_timeout_seconds);
        let mut wallets = HashMap::new();
        for mint in &config.mints {
            let wallet = Wallet::new(&mint.mint_url, &mint.unit, timeout)?;
            wallets.insert(mint.mint_url.clone(), Arc::new(wallet));
        }

        let liquidity = Arc::new(LiquidityManager::new(&config.mints));
        let quotes = QuoteService::new(config.clone());

        Ok(Self {
            config,
            wallets,
            liquidity,
            quotes,
        })
    }

    fn wallet(&self, mint_url: &str) -> Result<Arc<Wallet>> {
        self.wallets
            .get(mint_url)
            .cloned()
            .ok_or_else(|| SwapError::UnsupportedMint(mint_url.to_string()))
    }

    /// Bootstrap liquidity by minting `amount_per_mint` on every configured
    /// mint. In production the broker would fund itself from deposits or
    /// Lightning; test backends pay the quote instantly.
    pub async fn initialize(&self, amount_per_mint: u64) -> Result<()> {
        for (mint_url, wallet) in &self.wallets {
            match wallet.mint_tokens(amount_per_mint, None).await {
                Ok(proofs) => {
                    self.liquidity
                        .add_proofs(mint_url, proofs, LedgerEventType::Deposit, None)
                        .await?;
                }
                Err(err) => {
                    warn!(mint = %mint_url, error = %err, "failed to mint startup liquidity");
                }
            }
        }
        Ok(())
    }

    /// Request a swap quote from the broker
    pub async fn request_quote(&self, request: SwapRequest) -> Result<SwapQuote> {
        info!(
            source = %request.source_mint,
            target = %request.target_mint,
            amount = request.amount,
            "swap request"
        );
        self.quotes.create_quote(request, &self.liquidity).await
    }

    /// Accept a quote: lock target-mint tokens to the client's tweaked key
    /// and return them.
    pub async fn accept_quote(&self, quote_id: &str, client_pubkey: &[u8]) -> Result<Vec<Proof>> {
        let quote = self
            .quotes
            .get_quote(quote_id)
            .await
            .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
        let wallet = self.wallet(&quote.target_mint)?;
        self.quotes
            .accept_quote(quote_id, client_pubkey, &wallet, &self.liquidity)
            .await
    }

    /// Complete a swap with the client's locked source-mint proofs. Returns
    /// the adaptor secret (hex) the client needs to claim its target tokens.
    pub async fn complete_swap(
        &self,
        quote_id: &str,
        client_proofs: Vec<Proof>,
    ) -> Result<String> {
        let quote = self
            .quotes
            .get_quote(quote_id)
            .await
            .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
        let wallet = self.wallet(&quote.source_mint)?;
        self.quotes
            .complete_swap(quote_id, client_proofs, &wallet, &self.liquidity)
            .await
    }

    pub async fn get_quote(&self, quote_id: &str) -> Option<SwapQuote> {
        self.quotes.get_quote(quote_id).await
    }

    /// Get current liquidity status
    pub async fn get_liquidity_status(&self) -> LiquidityStatus {
        let mut mint_balances = Vec::new();
        for mint in &self.config.mints {
            let balance = self.liquidity.get_balance(&mint.mint_url).await;
            mint_balances.push(MintBalance {
                mint_url: mint.mint_url.clone(),
                name: mint.name.clone(),
                balance,
            });
        }
        let total_balance: u64 = mint_balances.iter().map(|mb| mb.balance).sum();

        LiquidityStatus {
            mints: mint_balances,
            total_balance,
        }
    }

    /// Recent inventory changes, newest last.
    pub async fn recent_ledger_events(&self, limit: usize) -> Vec<LedgerEvent> {
        self.liquidity.recent_events(limit).await
    }

    /// Take all unpersisted inventory changes.
    pub async fn drain_ledger_events(&self) -> Vec<LedgerEvent> {
        self.liquidity.drain_events().await
    }

    /// Get broker configuration
    pub fn get_config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Run the broker's housekeeping loop: sweep expired quotes and log the
    /// ledger state. The HTTP surface runs separately.
    pub async fn run(&self) -> Result<()> {
        info!("broker housekeeping running");
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.quotes.expire_stale().await;
            let status = self.get_liquidity_status().await;
            info!(total = status.total_balance, "ledger balance");
        }
    }
}

/// Liquidity status summary
#[derive(Debug, Clone)]
pub struct LiquidityStatus {
    pub mints: Vec<MintBalance>,
    pub total_balance: u64,
}

/// Balance on a specific mint
#[derive(Debug, Clone)]
pub struct MintBalance {
    pub mint_url: String,
    pub name: String,
    pub balance: u64,
}
