//! Broker quote lifecycle: issue, accept, complete
//!
//! The broker-knows-t variant of the swap protocol. Each quote owns a fresh
//! session keypair and adaptor secret; the client locks source tokens to
//! `sessionPubkey + T`, the broker locks target tokens to `clientPubkey + T`,
//! and the adaptor secret leaves this module only in the completion
//! response, after the broker has executed the source-mint swap.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use k256::{ProjectivePoint, Scalar};
use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::crypto::secp::{
    add_secret_keys, lift_x, mul_base, parse_point, point_to_bytes, scalar_to_bytes,
    tweak_public_key, KeyPair,
};
use crate::error::{Result, SwapError};
use crate::liquidity::{LedgerEventType, LiquidityManager};
use crate::p2pk::{P2pkSecret, SigFlag};
use crate::token::{attach_p2pk_witnesses, P2pkLock, Wallet};
use crate::types::{total_amount, BrokerConfig, Proof, SwapQuote, SwapRequest, SwapStatus};

/// Private per-quote state. Never serialised; wiped on drop.
struct QuoteSecrets {
    session_key: Scalar,
    adaptor_secret: Scalar,
}

impl Drop for QuoteSecrets {
    fn drop(&mut self) {
        self.session_key.zeroize();
        self.adaptor_secret.zeroize();
    }
}

struct QuoteData {
    quote: SwapQuote,
    secrets: QuoteSecrets,
    locked_target_proofs: Vec<Proof>,
    source_proofs: Vec<Proof>,
    /// Set at completion; once published to the client the adaptor secret
    /// stops being secret and the scalar copies are wiped.
    revealed_secret: Option<String>,
    /// Guards against concurrent accept/complete calls on the same quote
    /// while a mint round-trip is in flight.
    in_flight: bool,
}

/// Issues quotes and drives their settlement against the ledger and the
/// per-mint wallets supplied by the broker.
pub struct QuoteService {
    config: BrokerConfig,
    quotes: RwLock<HashMap<String, QuoteData>>,
}

impl QuoteService {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            quotes: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a swap quote for a client request.
    pub async fn create_quote(
        &self,
        request: SwapRequest,
        liquidity: &LiquidityManager,
    ) -> Result<SwapQuote> {
        self.validate_swap_request(&request)?;

        let fee = ((request.amount as f64) * self.config.fee_rate).ceil() as u64;
        let output_amount = request.amount.saturating_sub(fee);

        if !liquidity.can_serve(&request.target_mint, output_amount).await {
            return Err(SwapError::InsufficientLiquidity {
                mint_url: request.target_mint.clone(),
                needed: output_amount,
                available: liquidity.get_balance(&request.target_mint).await,
            });
        }

        let session = KeyPair::random();
        let (adaptor_secret, adaptor_point_x) = crate::crypto::generate_adaptor_secret();
        let adaptor_point = lift_x(&adaptor_point_x)?;
        let tweaked = tweak_public_key(&session.public, &adaptor_point)?;

        let now = SystemTime::now();
        let quote = SwapQuote {
            quote_id: Self::generate_quote_id(),
            source_mint: request.source_mint,
            target_mint: request.target_mint,
            input_amount: request.amount,
            output_amount,
            fee,
            fee_rate: self.config.fee_rate,
            broker_public_key: session.public_bytes().to_vec(),
            adaptor_point: point_to_bytes(&adaptor_point).to_vec(),
            tweaked_pubkey: point_to_bytes(&tweaked).to_vec(),
            created_at: now,
            expires_at: now + Duration::from_secs(self.config.quote_expiry_seconds),
            status: SwapStatus::Pending,
        };

        info!(
            quote_id = %quote.quote_id,
            amount_in = quote.input_amount,
            amount_out = quote.output_amount,
            fee = quote.fee,
            "quote issued"
        );

        let data = QuoteData {
            quote: quote.clone(),
            secrets: QuoteSecrets {
                session_key: session.secret,
                adaptor_secret,
            },
            locked_target_proofs: Vec::new(),
            source_proofs: Vec::new(),
            revealed_secret: None,
            in_flight: false,
        };
        self.quotes.write().await.insert(quote.quote_id.clone(), data);

        Ok(quote)
    }

    /// Accept a quote: lock `outputAmount` on the target mint to the
    /// client's tweaked key and hand the locked proofs out.
    ///
    /// Ledger inventory is reserved atomically before the mint round-trip
    /// and returned in full if the mint rejects the swap.
    pub async fn accept_quote(
        &self,
        quote_id: &str,
        client_pubkey: &[u8],
        target_wallet: &Wallet,
        liquidity: &LiquidityManager,
    ) -> Result<Vec<Proof>> {
        let client_point = decode_public_key(client_pubkey)?;

        // claim the quote under the table lock
        let (output_amount, target_mint, adaptor_point) = {
            let mut quotes = self.quotes.write().await;
            let data = quotes
                .get_mut(quote_id)
                .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
            if data.quote.is_expired(SystemTime::now()) {
                data.quote.status = SwapStatus::Expired;
                return Err(SwapError::QuoteExpired(quote_id.to_string()));
            }
            if data.quote.status != SwapStatus::Pending || data.in_flight {
                return Err(SwapError::InvalidSwapRequest(format!(
                    "quote {quote_id} is not pending"
                )));
            }
            let adaptor_point = parse_point(&data.quote.adaptor_point)?;
            data.in_flight = true;
            (
                data.quote.output_amount,
                data.quote.target_mint.clone(),
                adaptor_point,
            )
        };

        let result = self
            .lock_target_tokens(
                quote_id,
                &client_point,
                &adaptor_point,
                output_amount,
                &target_mint,
                target_wallet,
                liquidity,
            )
            .await;

        let mut quotes = self.quotes.write().await;
        let data = quotes
            .get_mut(quote_id)
            .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
        data.in_flight = false;
        match result {
            Ok(locked) => {
                data.quote.status = SwapStatus::Accepted;
                data.locked_target_proofs = locked.clone();
                info!(quote_id, amount = output_amount, "quote accepted, target tokens locked");
                Ok(locked)
            }
            Err(err) => {
                if !err.is_retryable() {
                    data.quote.status = SwapStatus::Failed;
                }
                Err(err)
            }
        }
    }

    async fn lock_target_tokens(
        &self,
        quote_id: &str,
        client_point: &ProjectivePoint,
        adaptor_point: &ProjectivePoint,
        output_amount: u64,
        target_mint: &str,
        target_wallet: &Wallet,
        liquidity: &LiquidityManager,
    ) -> Result<Vec<Proof>> {
        let client_tweaked = tweak_public_key(client_point, adaptor_point)?;
        let lock = P2pkLock {
            public_key: point_to_bytes(&client_tweaked).to_vec(),
            sig_flag: SigFlag::SigInputs,
        };

        let reserved = liquidity
            .reserve_proofs(target_mint, output_amount, Some(quote_id))
            .await?;

        match target_wallet
            .swap_with_lock(reserved.clone(), output_amount, &lock)
            .await
        {
            Ok((locked, change)) => {
                if !change.is_empty() {
                    liquidity
                        .add_proofs(target_mint, change, LedgerEventType::Deposit, Some(quote_id))
                        .await?;
                }
                Ok(locked)
            }
            Err(err) => {
                // the reserved proofs were not consumed; put them back
                warn!(quote_id, error = %err, "target lock failed, returning reserved liquidity");
                liquidity
                    .add_proofs(target_mint, reserved, LedgerEventType::Deposit, Some(quote_id))
                    .await?;
                Err(err)
            }
        }
    }

    /// Complete a swap: sign the client's source-mint proofs with the
    /// tweaked session key, swap them for fresh inventory, and reveal the
    /// adaptor secret to the client.
    ///
    /// Calling again after success returns the same secret with no further
    /// ledger effect.
    pub async fn complete_swap(
        &self,
        quote_id: &str,
        client_proofs: Vec<Proof>,
        source_wallet: &Wallet,
        liquidity: &LiquidityManager,
    ) -> Result<String> {
        // claim the quote and pull out what the signing needs
        let (tweaked_key, adaptor_secret_hex, source_mint, input_amount, tweaked_pubkey) = {
            let mut quotes = self.quotes.write().await;
            let data = quotes
                .get_mut(quote_id)
                .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
            if data.quote.status == SwapStatus::Completed {
                return data.revealed_secret.clone().ok_or_else(|| {
                    SwapError::Crypto("completed quote lost its revealed secret".to_string())
                });
            }
            if data.quote.is_expired(SystemTime::now()) {
                data.quote.status = SwapStatus::Expired;
                return Err(SwapError::QuoteExpired(quote_id.to_string()));
            }
            if data.quote.status != SwapStatus::Accepted || data.in_flight {
                return Err(SwapError::InvalidSwapRequest(format!(
                    "quote {quote_id} is not accepted"
                )));
            }
            let tweaked_key =
                add_secret_keys(&data.secrets.session_key, &data.secrets.adaptor_secret)?;
            data.in_flight = true;
            (
                tweaked_key,
                hex::encode(scalar_to_bytes(&data.secrets.adaptor_secret)),
                data.quote.source_mint.clone(),
                data.quote.input_amount,
                data.quote.tweaked_pubkey.clone(),
            )
        };

        let result = self
            .claim_source_tokens(
                quote_id,
                client_proofs,
                &tweaked_key,
                &tweaked_pubkey,
                input_amount,
                &source_mint,
                source_wallet,
                liquidity,
            )
            .await;

        let mut quotes = self.quotes.write().await;
        let data = quotes
            .get_mut(quote_id)
            .ok_or_else(|| SwapError::QuoteNotFound(quote_id.to_string()))?;
        data.in_flight = false;
        match result {
            Ok(source_proofs) => {
                data.quote.status = SwapStatus::Completed;
                data.source_proofs = source_proofs;
                data.revealed_secret = Some(adaptor_secret_hex.clone());
                // the quote is terminal; drop the scalar copies now
                data.secrets.session_key.zeroize();
                data.secrets.adaptor_secret.zeroize();
                info!(quote_id, "swap completed");
                Ok(adaptor_secret_hex)
            }
            Err(err) => {
                if !err.is_retryable() {
                    data.quote.status = SwapStatus::Failed;
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn claim_source_tokens(
        &self,
        quote_id: &str,
        mut client_proofs: Vec<Proof>,
        tweaked_key: &Scalar,
        tweaked_pubkey: &[u8],
        input_amount: u64,
        source_mint: &str,
        source_wallet: &Wallet,
        liquidity: &LiquidityManager,
    ) -> Result<Vec<Proof>> {
        if total_amount(&client_proofs) != input_amount {
            return Err(SwapError::InvalidSwapRequest(format!(
                "client proofs must total {input_amount}"
            )));
        }
        // every input must be locked to this quote's tweaked session key
        for proof in &client_proofs {
            let secret = P2pkSecret::from_str(&proof.secret)?;
            let recipient = secret.recipient()?;
            if point_to_bytes(&recipient).as_slice() != tweaked_pubkey {
                return Err(SwapError::InvalidSwapRequest(
                    "client proof is not locked to the quote's tweaked key".to_string(),
                ));
            }
        }

        // sanity: the tweaked key we sign with must match the advertised point
        debug_assert_eq!(
            point_to_bytes(&mul_base(tweaked_key)).as_slice(),
            tweaked_pubkey
        );

        attach_p2pk_witnesses(&mut client_proofs, tweaked_key)?;
        let fresh = source_wallet.swap_proofs(client_proofs, None).await?;
        liquidity
            .add_proofs(source_mint, fresh.clone(), LedgerEventType::SwapIn, Some(quote_id))
            .await?;
        Ok(fresh)
    }

    pub async fn get_quote(&self, quote_id: &str) -> Option<SwapQuote> {
        let quotes = self.quotes.read().await;
        quotes.get(quote_id).map(|data| data.quote.clone())
    }

    /// Mark stale pending/accepted quotes expired. Returns the ids swept.
    pub async fn expire_stale(&self) -> Vec<String> {
        let now = SystemTime::now();
        let mut swept = Vec::new();
        let mut quotes = self.quotes.write().await;
        for (id, data) in quotes.iter_mut() {
            if matches!(
                data.quote.status,
                SwapStatus::Pending | SwapStatus::Accepted
            ) && data.quote.is_expired(now)
                && !data.in_flight
            {
                data.quote.status = SwapStatus::Expired;
                swept.push(id.clone());
            }
        }
        if !swept.is_empty() {
            info!(count = swept.len(), "expired stale quotes");
        }
        swept
    }

    fn validate_swap_request(&self, request: &SwapRequest) -> Result<()> {
        if request.amount < self.config.min_swap_amount {
            return Err(SwapError::AmountTooLow {
                amount: request.amount,
                min: self.config.min_swap_amount,
            });
        }
        if request.amount > self.config.max_swap_amount {
            return Err(SwapError::AmountTooHigh {
                amount: request.amount,
                max: self.config.max_swap_amount,
            });
        }

        let supported: Vec<&str> = self
            .config
            .mints
            .iter()
            .map(|m| m.mint_url.as_str())
            .collect();
        if !supported.contains(&request.source_mint.as_str()) {
            return Err(SwapError::UnsupportedMint(request.source_mint.clone()));
        }
        if !supported.contains(&request.target_mint.as_str()) {
            return Err(SwapError::UnsupportedMint(request.target_mint.clone()));
        }
        if request.source_mint == request.target_mint {
            return Err(SwapError::SameMintSwap);
        }
        Ok(())
    }

    fn generate_quote_id() -> String {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        hex::encode(bytes)
    }
}

/// Accept a compressed (33-byte) or x-only (32-byte) client key.
fn decode_public_key(bytes: &[u8]) -> Result<ProjectivePoint> {
    match bytes.len() {
        33 => parse_point(bytes),
        32 => {
            let x: [u8; 32] = bytes.try_into().expect("length checked");
            lift_x(&x)
        }
        other => Err(SwapError::Encoding(format!(
            "client key must be 32 or 33 bytes, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MintConfig;

    fn config() -> BrokerConfig {
        BrokerConfig {
            mints: vec![
                MintConfig {
                    mint_url: "http://mint-a.test".to_string(),
                    name: "Mint A".to_string(),
                    unit: "sat".to_string(),
                },
                MintConfig {
                    mint_url: "http://mint-b.test".to_string(),
                    name: "Mint B".to_string(),
                    unit: "sat".to_string(),
                },
            ],
            fee_rate: 0.005,
            ..Default::default()
        }
    }

    fn request(amount: u64) -> SwapRequest {
        SwapRequest {
            client_id: None,
            source_mint: "http://mint-b.test".to_string(),
            target_mint: "http://mint-a.test".to_string(),
            amount,
            client_public_key: None,
        }
    }

    async fn funded_liquidity() -> LiquidityManager {
        let liquidity = LiquidityManager::new(&config().mints);
        liquidity
            .add_proofs(
                "http://mint-a.test",
                vec![Proof {
                    amount: 64,
                    id: "keyset".to_string(),
                    secret: "funding".to_string(),
                    c: "02aa".to_string(),
                    witness: None,
                }],
                LedgerEventType::Deposit,
                None,
            )
            .await
            .unwrap();
        liquidity
    }

    #[tokio::test]
    async fn quote_applies_ceiled_fee() {
        let service = QuoteService::new(config());
        let liquidity = funded_liquidity().await;

        let quote = service.create_quote(request(8), &liquidity).await.unwrap();
        assert_eq!(quote.input_amount, 8);
        assert_eq!(quote.fee, 1); // ceil(8 * 0.005)
        assert_eq!(quote.output_amount, 7);
        assert_eq!(quote.status, SwapStatus::Pending);
        assert_eq!(quote.adaptor_point.len(), 33);
        assert_eq!(quote.tweaked_pubkey.len(), 33);
    }

    #[tokio::test]
    async fn quote_rejects_unsupported_and_same_mints() {
        let service = QuoteService::new(config());
        let liquidity = funded_liquidity().await;

        let mut bad = request(8);
        bad.source_mint = "http://other.test".to_string();
        assert!(matches!(
            service.create_quote(bad, &liquidity).await,
            Err(SwapError::UnsupportedMint(_))
        ));

        let mut same = request(8);
        same.source_mint = same.target_mint.clone();
        assert!(matches!(
            service.create_quote(same, &liquidity).await,
            Err(SwapError::SameMintSwap)
        ));
    }

    #[tokio::test]
    async fn quote_enforces_amount_bounds() {
        let mut cfg = config();
        cfg.min_swap_amount = 4;
        cfg.max_swap_amount = 32;
        let service = QuoteService::new(cfg);
        let liquidity = funded_liquidity().await;

        assert!(matches!(
            service.create_quote(request(2), &liquidity).await,
            Err(SwapError::AmountTooLow { .. })
        ));
        assert!(matches!(
            service.create_quote(request(64), &liquidity).await,
            Err(SwapError::AmountTooHigh { .. })
        ));
    }

    #[tokio::test]
    async fn quote_requires_target_liquidity() {
        let service = QuoteService::new(config());
        let liquidity = LiquidityManager::new(&config().mints); // empty

        assert!(matches!(
            service.create_quote(request(8), &liquidity).await,
            Err(SwapError::InsufficientLiquidity { .. })
        ));
    }

    #[tokio::test]
    async fn quote_secrets_never_serialise() {
        let service = QuoteService::new(config());
        let liquidity = funded_liquidity().await;
        let quote = service.create_quote(request(8), &liquidity).await.unwrap();

        let json = serde_json::to_string(&quote).unwrap();
        let secret_hex = {
            let quotes = service.quotes.read().await;
            hex::encode(scalar_to_bytes(
                &quotes[&quote.quote_id].secrets.adaptor_secret,
            ))
        };
        assert!(!json.contains(&secret_hex));
    }

    #[test]
    fn client_key_decoding_accepts_both_encodings() {
        let keypair = KeyPair::random();
        assert!(decode_public_key(&keypair.public_bytes()).is_ok());
        assert!(decode_public_key(&keypair.xonly_bytes()).is_ok());
        assert!(decode_public_key(&[0u8; 31]).is_err());
    }
}
