//! Token engine: minting, unblinding and spending bearer tokens
//!
//! A [`Wallet`] owns one mint's client plus its cached keyset and turns
//! amounts into blinded outputs, mint responses into spendable proofs, and
//! witnessed proofs into fresh ones via the mint's swap endpoint.

use k256::Scalar;
use rand::RngCore;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;
use zeroize::Zeroize;

use crate::crypto::bdhke::{blind_message, unblind_signature};
use crate::crypto::schnorr::sign;
use crate::crypto::secp::point_to_bytes;
use crate::error::{Result, SwapError};
use crate::mint::MintClient;
use crate::p2pk::{sig_all_message, P2pkSecret, P2pkWitness, SigFlag};
use crate::types::{total_amount, BlindedMessage, BlindedSignature, Keyset, Proof};

const QUOTE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A P2PK locking condition for newly created outputs.
#[derive(Debug, Clone)]
pub struct P2pkLock {
    /// Recipient key, compressed (33 bytes) or x-only (32 bytes).
    pub public_key: Vec<u8>,
    pub sig_flag: SigFlag,
}

/// One blinded output awaiting a mint signature, with the private material
/// needed to unblind it.
struct PendingOutput {
    message: BlindedMessage,
    secret: String,
    factor: Scalar,
}

/// Per-mint token operations.
pub struct Wallet {
    client: MintClient,
    unit: String,
    keyset: RwLock<Option<Keyset>>,
    quote_deadline: Duration,
}

impl Wallet {
    pub fn new(mint_url: &str, unit: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: MintClient::new(mint_url, timeout)?,
            unit: unit.to_string(),
            keyset: RwLock::new(None),
            quote_deadline: timeout,
        })
    }

    pub fn mint_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn client(&self) -> &MintClient {
        &self.client
    }

    /// The mint's active keyset, fetched once and cached.
    pub async fn active_keyset(&self) -> Result<Keyset> {
        if let Some(keyset) = self.keyset.read().await.as_ref() {
            return Ok(keyset.clone());
        }
        let keysets = self.client.get_keys().await?;
        let chosen = keysets
            .iter()
            .find(|k| k.active.unwrap_or(false) && k.unit == self.unit)
            .or_else(|| keysets.first())
            .cloned()
            .ok_or_else(|| SwapError::MintRejected {
                mint_url: self.mint_url().to_string(),
                detail: "mint advertises no keysets".to_string(),
            })?;
        *self.keyset.write().await = Some(chosen.clone());
        Ok(chosen)
    }

    /// Split an amount into distinct powers of two (binary expansion).
    pub fn split_amount(amount: u64) -> Vec<u64> {
        (0..64)
            .map(|bit| amount & (1 << bit))
            .filter(|part| *part > 0)
            .collect()
    }

    /// Build one blinded output per denomination. Locked outputs get a P2PK
    /// secret each (fresh nonce per output); plain outputs get 32 random
    /// bytes of hex.
    fn build_outputs(
        &self,
        keyset_id: &str,
        amount: u64,
        lock: Option<&P2pkLock>,
    ) -> Result<Vec<PendingOutput>> {
        let mut outputs = Vec::new();
        for denomination in Self::split_amount(amount) {
            let secret = match lock {
                Some(lock) => {
                    P2pkSecret::new(&lock.public_key, lock.sig_flag)?.serialize()
                }
                None => {
                    let mut bytes = [0u8; 32];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    hex::encode(bytes)
                }
            };
            let blinded = blind_message(secret.as_bytes())?;
            outputs.push(PendingOutput {
                message: BlindedMessage {
                    amount: denomination,
                    id: keyset_id.to_string(),
                    blinded: hex::encode(point_to_bytes(&blinded.blinded)),
                },
                secret,
                factor: blinded.factor,
            });
        }
        Ok(outputs)
    }

    /// Unblind the mint's signatures into proofs. Signatures must arrive in
    /// output order; a count mismatch is a protocol violation.
    fn unblind_all(
        &self,
        outputs: Vec<PendingOutput>,
        signatures: Vec<BlindedSignature>,
        keyset: &Keyset,
    ) -> Result<Vec<Proof>> {
        if outputs.len() != signatures.len() {
            return Err(SwapError::MintRejected {
                mint_url: self.mint_url().to_string(),
                detail: format!(
                    "expected {} signatures, got {}",
                    outputs.len(),
                    signatures.len()
                ),
            });
        }

        let mut proofs = Vec::with_capacity(outputs.len());
        for (mut output, signature) in outputs.into_iter().zip(signatures) {
            let mint_key = keyset.key_for(output.message.amount).ok_or_else(|| {
                SwapError::MintRejected {
                    mint_url: self.mint_url().to_string(),
                    detail: format!("no mint key for amount {}", output.message.amount),
                }
            })?;
            let mint_key =
                hex::decode(mint_key).map_err(|e| SwapError::Encoding(e.to_string()))?;
            let c_ = hex::decode(&signature.signature)
                .map_err(|e| SwapError::Encoding(e.to_string()))?;
            let c = unblind_signature(&c_, &output.factor, &mint_key)?;
            output.factor.zeroize();
            proofs.push(Proof {
                amount: output.message.amount,
                id: signature.id,
                secret: output.secret,
                c: hex::encode(point_to_bytes(&c)),
                witness: None,
            });
        }
        Ok(proofs)
    }

    /// Mint `amount` fresh tokens, optionally P2PK-locked.
    ///
    /// Requests a quote, waits for it to be paid (instantaneous on test
    /// backends), submits the blinded outputs and unblinds the response.
    pub async fn mint_tokens(&self, amount: u64, lock: Option<&P2pkLock>) -> Result<Vec<Proof>> {
        let keyset = self.active_keyset().await?;
        let quote = self.client.request_mint_quote(amount, &self.unit).await?;
        if !quote.paid {
            self.wait_for_quote_paid(&quote.quote).await?;
        }

        let outputs = self.build_outputs(&keyset.id, amount, lock)?;
        let messages: Vec<BlindedMessage> = outputs.iter().map(|o| o.message.clone()).collect();
        let signatures = self.client.mint(&quote.quote, &messages).await?;
        debug!(mint = %self.mint_url(), amount, "minted {} outputs", signatures.len());
        self.unblind_all(outputs, signatures, &keyset)
    }

    async fn wait_for_quote_paid(&self, quote_id: &str) -> Result<()> {
        let deadline = Instant::now() + self.quote_deadline;
        loop {
            let status = self.client.check_mint_quote(quote_id).await?;
            if status.paid {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SwapError::QuoteUnpaid(quote_id.to_string()));
            }
            sleep(QUOTE_POLL_INTERVAL).await;
        }
    }

    /// Atomically retire `inputs` at the mint and receive fresh proofs of
    /// equal total value, optionally locking the replacements.
    ///
    /// Witnesses must already be attached to locked inputs. On success the
    /// returned proofs sum to exactly `total_amount(inputs)`.
    pub async fn swap_proofs(
        &self,
        inputs: Vec<Proof>,
        lock: Option<&P2pkLock>,
    ) -> Result<Vec<Proof>> {
        let keyset = self.active_keyset().await?;
        let amount = total_amount(&inputs);
        let outputs = self.build_outputs(&keyset.id, amount, lock)?;
        let messages: Vec<BlindedMessage> = outputs.iter().map(|o| o.message.clone()).collect();
        let signatures = self.client.swap(&inputs, &messages).await?;
        self.unblind_all(outputs, signatures, &keyset)
    }

    /// Split `inputs` into a locked portion of `locked_amount` and plain
    /// change, in a single mint swap. Returns `(locked, change)`.
    pub async fn swap_with_lock(
        &self,
        inputs: Vec<Proof>,
        locked_amount: u64,
        lock: &P2pkLock,
    ) -> Result<(Vec<Proof>, Vec<Proof>)> {
        let keyset = self.active_keyset().await?;
        let input_total = total_amount(&inputs);
        if locked_amount > input_total {
            return Err(SwapError::InvalidSwapRequest(format!(
                "cannot lock {locked_amount} from inputs totalling {input_total}"
            )));
        }

        let mut outputs = self.build_outputs(&keyset.id, locked_amount, Some(lock))?;
        let locked_count = outputs.len();
        outputs.extend(self.build_outputs(&keyset.id, input_total - locked_amount, None)?);

        let messages: Vec<BlindedMessage> = outputs.iter().map(|o| o.message.clone()).collect();
        let signatures = self.client.swap(&inputs, &messages).await?;
        let mut proofs = self.unblind_all(outputs, signatures, &keyset)?;
        let change = proofs.split_off(locked_count);
        Ok((proofs, change))
    }

    /// Swap `inputs` into one output carrying exactly `secret`.
    ///
    /// Used when the secret was negotiated out-of-band (the coordinator
    /// records one P2PK secret per swap leg); the whole input amount must
    /// fit a single denomination.
    pub async fn swap_into_secret(&self, inputs: Vec<Proof>, secret: &str) -> Result<Proof> {
        let keyset = self.active_keyset().await?;
        let amount = total_amount(&inputs);
        if !amount.is_power_of_two() {
            return Err(SwapError::InvalidSwapRequest(format!(
                "amount {amount} does not fit a single denomination"
            )));
        }

        let blinded = blind_message(secret.as_bytes())?;
        let outputs = vec![PendingOutput {
            message: BlindedMessage {
                amount,
                id: keyset.id.clone(),
                blinded: hex::encode(point_to_bytes(&blinded.blinded)),
            },
            secret: secret.to_string(),
            factor: blinded.factor,
        }];

        let messages: Vec<BlindedMessage> = outputs.iter().map(|o| o.message.clone()).collect();
        let signatures = self.client.swap(&inputs, &messages).await?;
        let mut proofs = self.unblind_all(outputs, signatures, &keyset)?;
        Ok(proofs.remove(0))
    }

    /// Query which of `proofs` the mint has already seen spent.
    pub async fn check_spent(&self, proofs: &[Proof]) -> Result<Vec<bool>> {
        let ys: Vec<String> = proofs
            .iter()
            .map(|p| p.y().map(hex::encode))
            .collect::<Result<_>>()?;
        let states = self.client.check_proof_states(&ys).await?;
        Ok(states
            .into_iter()
            .map(|entry| entry.state.eq_ignore_ascii_case("SPENT"))
            .collect())
    }
}

/// Attach P2PK witnesses to proofs about to be spent.
///
/// For `SIG_INPUTS` every proof gets a signature over its own secret string;
/// for `SIG_ALL` the first proof carries one signature over the joint
/// message of all input secrets.
pub fn attach_p2pk_witnesses(proofs: &mut [Proof], signing_key: &Scalar) -> Result<()> {
    if proofs.is_empty() {
        return Ok(());
    }
    let flag = P2pkSecret::from_str(&proofs[0].secret)?.sig_flag();
    match flag {
        SigFlag::SigInputs => {
            for proof in proofs.iter_mut() {
                let secret = P2pkSecret::from_str(&proof.secret)?;
                let signature = sign(signing_key, &secret.message())?;
                proof.witness = Some(P2pkWitness::new(signature.to_hex()).serialize());
            }
        }
        SigFlag::SigAll => {
            let secrets: Vec<String> = proofs.iter().map(|p| p.secret.clone()).collect();
            let signature = sign(signing_key, &sig_all_message(&secrets))?;
            proofs[0].witness = Some(P2pkWitness::new(signature.to_hex()).serialize());
        }
    }
    Ok(())
}
