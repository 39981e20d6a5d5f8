//! Two-party atomic swap state machine
//!
//! Drives one swap between an initiator and a responder holding tokens on
//! different mints. The seven steps are strictly sequential; every step
//! checks its precondition state and returns a structured error instead of
//! advancing when called out of order.
//!
//! The responder always claims first: its claim publishes the completed
//! signature, from which the initiator extracts the adaptor secret and
//! becomes able to claim unconditionally. Before the responder's claim the
//! swap can be abandoned by either side with no on-mint effect; after it,
//! the initiator can always force completion.

use std::time::SystemTime;

use k256::Scalar;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::crypto::schnorr::{
    adaptor_sign, adaptor_verify, complete_adaptor, extract_secret as schnorr_extract,
    generate_adaptor_secret, AdaptorSignature, Signature,
};
use crate::crypto::secp::parse_point;
use crate::error::{Result, SwapError};
use crate::p2pk::{P2pkSecret, P2pkWitness, SigFlag};
use crate::token::Wallet;
use crate::types::{total_amount, Proof};

/// One side of a swap. The secret key is present only for the party (or
/// parties) this process acts for.
#[derive(Debug, Clone)]
pub struct SwapParty {
    /// Compressed public key (33 bytes).
    pub public_key: Vec<u8>,
    pub secret_key: Option<Scalar>,
    pub mint_url: String,
    /// Amount this party locks on its own mint, a single power-of-two
    /// denomination so one P2PK secret covers the whole leg.
    pub amount: u64,
}

/// Coordinator states. `Completed`, `Failed`, `Cancelled` and `TimedOut`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    Negotiating,
    SecretsCreated,
    AdaptorSigsExchanged,
    Verified,
    Claiming,
    Extracting,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl SwapState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapState::Completed | SwapState::Failed | SwapState::Cancelled | SwapState::TimedOut
        )
    }
}

impl std::fmt::Display for SwapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwapState::Idle => "idle",
            SwapState::Negotiating => "negotiating",
            SwapState::SecretsCreated => "secrets_created",
            SwapState::AdaptorSigsExchanged => "adaptor_sigs_exchanged",
            SwapState::Verified => "verified",
            SwapState::Claiming => "claiming",
            SwapState::Extracting => "extracting",
            SwapState::Completed => "completed",
            SwapState::Failed => "failed",
            SwapState::Cancelled => "cancelled",
            SwapState::TimedOut => "timed_out",
        };
        write!(f, "{name}")
    }
}

/// Observable milestones of one swap, in emission order.
#[derive(Debug, Clone)]
pub enum SwapEvent {
    Created { adaptor_point: [u8; 32] },
    SecretsCreated,
    AdaptorSignaturesExchanged,
    Verified,
    ResponderClaimed { signature: String },
    SecretExtracted,
    Completed,
    Cancelled,
    TimedOut,
    Failed { reason: String },
}

/// The state machine for one atomic swap.
pub struct AtomicSwap {
    state: SwapState,
    initiator: SwapParty,
    responder: SwapParty,
    fee: u64,
    expires_at: SystemTime,
    adaptor_secret: Option<Scalar>,
    adaptor_point: Option<[u8; 32]>,
    /// Secret of the output the responder claims: created by the initiator
    /// on the initiator's mint, locked to the responder's key.
    responder_claim_secret: Option<P2pkSecret>,
    /// Secret of the output the initiator claims: created by the responder
    /// on the responder's mint, locked to the initiator's key.
    initiator_claim_secret: Option<P2pkSecret>,
    responder_adaptor_sig: Option<AdaptorSignature>,
    initiator_adaptor_sig: Option<AdaptorSignature>,
    extracted_secret: Option<Scalar>,
    events: Vec<SwapEvent>,
}

impl AtomicSwap {
    pub fn new(
        initiator: SwapParty,
        responder: SwapParty,
        fee: u64,
        expires_at: SystemTime,
    ) -> Result<Self> {
        if initiator.mint_url == responder.mint_url {
            return Err(SwapError::SameMintSwap);
        }
        for party in [&initiator, &responder] {
            if !party.amount.is_power_of_two() {
                return Err(SwapError::InvalidSwapRequest(format!(
                    "leg amount {} is not a single denomination",
                    party.amount
                )));
            }
            parse_point(&party.public_key)?;
        }

        Ok(Self {
            state: SwapState::Idle,
            initiator,
            responder,
            fee,
            expires_at,
            adaptor_secret: None,
            adaptor_point: None,
            responder_claim_secret: None,
            initiator_claim_secret: None,
            responder_adaptor_sig: None,
            initiator_adaptor_sig: None,
            extracted_secret: None,
            events: Vec::new(),
        })
    }

    pub fn state(&self) -> SwapState {
        self.state
    }

    pub fn events(&self) -> &[SwapEvent] {
        &self.events
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// x-only adaptor point `T`, once step 1 has run.
    pub fn adaptor_point(&self) -> Option<[u8; 32]> {
        self.adaptor_point
    }

    /// Precondition gate for every step: the machine must be in `expected`
    /// and not past its expiry.
    fn ensure(&mut self, expected: SwapState, action: &str) -> Result<()> {
        if !self.state.is_terminal() && SystemTime::now() >= self.expires_at {
            warn!(action, "swap expired before completion");
            self.state = SwapState::TimedOut;
            self.events.push(SwapEvent::TimedOut);
            self.wipe_secrets();
        }
        if self.state != expected {
            return Err(SwapError::InvalidTransition {
                state: self.state.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, reason: &str) {
        self.state = SwapState::Failed;
        self.events.push(SwapEvent::Failed {
            reason: reason.to_string(),
        });
        self.wipe_secrets();
    }

    fn wipe_secrets(&mut self) {
        if let Some(mut t) = self.adaptor_secret.take() {
            t.zeroize();
        }
        if let Some(mut t) = self.extracted_secret.take() {
            t.zeroize();
        }
        if let Some(mut key) = self.initiator.secret_key.take() {
            key.zeroize();
        }
        if let Some(mut key) = self.responder.secret_key.take() {
            key.zeroize();
        }
    }

    /// Step 1 (responder): generate the canonical adaptor secret and point.
    pub fn initialize(&mut self) -> Result<[u8; 32]> {
        self.ensure(SwapState::Idle, "initialize")?;
        let (secret, point) = generate_adaptor_secret();
        self.adaptor_secret = Some(secret);
        self.adaptor_point = Some(point);
        self.state = SwapState::Negotiating;
        self.events.push(SwapEvent::Created {
            adaptor_point: point,
        });
        info!(adaptor_point = %hex::encode(point), "swap created");
        Ok(point)
    }

    /// Step 2: build the P2PK secrets each side locks for the other,
    /// `SIG_INPUTS`. Returns `(responder_claim, initiator_claim)` serialised.
    pub fn create_secrets(&mut self) -> Result<(String, String)> {
        self.ensure(SwapState::Negotiating, "create_secrets")?;
        let responder_claim = P2pkSecret::new(&self.responder.public_key, SigFlag::SigInputs)?;
        let initiator_claim = P2pkSecret::new(&self.initiator.public_key, SigFlag::SigInputs)?;
        let serialized = (responder_claim.serialize(), initiator_claim.serialize());
        self.responder_claim_secret = Some(responder_claim);
        self.initiator_claim_secret = Some(initiator_claim);
        self.state = SwapState::SecretsCreated;
        self.events.push(SwapEvent::SecretsCreated);
        Ok(serialized)
    }

    /// Step 3: each party holding a private key signs the secret it will
    /// claim, under the shared adaptor secret. Both signatures carry the
    /// same `T`.
    pub fn create_adaptor_signatures(&mut self) -> Result<()> {
        self.ensure(SwapState::SecretsCreated, "create_adaptor_signatures")?;
        let adaptor_secret = self
            .adaptor_secret
            .ok_or_else(|| SwapError::Crypto("adaptor secret missing".to_string()))?;

        if let Some(key) = self.initiator.secret_key {
            let message = self
                .initiator_claim_secret
                .as_ref()
                .expect("secrets exist in this state")
                .message();
            self.initiator_adaptor_sig = Some(adaptor_sign(&key, &message, &adaptor_secret)?);
        }
        if let Some(key) = self.responder.secret_key {
            let message = self
                .responder_claim_secret
                .as_ref()
                .expect("secrets exist in this state")
                .message();
            self.responder_adaptor_sig = Some(adaptor_sign(&key, &message, &adaptor_secret)?);
        }

        self.state = SwapState::AdaptorSigsExchanged;
        self.events.push(SwapEvent::AdaptorSignaturesExchanged);
        Ok(())
    }

    /// Inject the initiator's adaptor signature computed by a remote party.
    pub fn set_initiator_adaptor_signature(&mut self, signature: AdaptorSignature) -> Result<()> {
        if !matches!(
            self.state,
            SwapState::SecretsCreated | SwapState::AdaptorSigsExchanged
        ) {
            return Err(SwapError::InvalidTransition {
                state: self.state.to_string(),
                action: "set_initiator_adaptor_signature".to_string(),
            });
        }
        self.initiator_adaptor_sig = Some(signature);
        Ok(())
    }

    /// Inject the responder's adaptor signature computed by a remote party.
    pub fn set_responder_adaptor_signature(&mut self, signature: AdaptorSignature) -> Result<()> {
        if !matches!(
            self.state,
            SwapState::SecretsCreated | SwapState::AdaptorSigsExchanged
        ) {
            return Err(SwapError::InvalidTransition {
                state: self.state.to_string(),
                action: "set_responder_adaptor_signature".to_string(),
            });
        }
        self.responder_adaptor_sig = Some(signature);
        Ok(())
    }

    /// Step 4: verify both adaptor signatures against their signers and
    /// check they commit to the same `T`. Failure is fatal but safe: nothing
    /// has touched a mint yet.
    pub fn verify_adaptor_signatures(&mut self) -> Result<()> {
        self.ensure(SwapState::AdaptorSigsExchanged, "verify_adaptor_signatures")?;

        let outcome = self.check_adaptor_signatures();
        match outcome {
            Ok(()) => {
                self.state = SwapState::Verified;
                self.events.push(SwapEvent::Verified);
                Ok(())
            }
            Err(err) => {
                self.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn check_adaptor_signatures(&self) -> Result<()> {
        let expected_point = self
            .adaptor_point
            .ok_or_else(|| SwapError::Crypto("adaptor point missing".to_string()))?;
        let initiator_sig = self
            .initiator_adaptor_sig
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?;
        let responder_sig = self
            .responder_adaptor_sig
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?;

        if initiator_sig.t != expected_point || responder_sig.t != expected_point {
            return Err(SwapError::AdaptorInvalid);
        }

        let initiator_key = parse_point(&self.initiator.public_key)?;
        let initiator_message = self
            .initiator_claim_secret
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?
            .message();
        adaptor_verify(&initiator_key, &initiator_message, initiator_sig)?;

        let responder_key = parse_point(&self.responder.public_key)?;
        let responder_message = self
            .responder_claim_secret
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?
            .message();
        adaptor_verify(&responder_key, &responder_message, responder_sig)?;

        Ok(())
    }

    /// The signature the responder publishes when claiming.
    pub fn responder_completed_signature(&self) -> Result<Signature> {
        let adaptor_secret = self
            .adaptor_secret
            .ok_or_else(|| SwapError::Crypto("adaptor secret missing".to_string()))?;
        let signature = self
            .responder_adaptor_sig
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?;
        complete_adaptor(signature, &adaptor_secret)
    }

    /// Step 5: the responder completes its adaptor signature with `t` and
    /// spends the initiator's locked proofs on the initiator's mint. On the
    /// mint's acceptance the completed signature is observable to the
    /// initiator; it is also returned here.
    ///
    /// A transport failure leaves the machine in `Verified` for retry; a
    /// mint rejection is fatal.
    pub async fn responder_claim(
        &mut self,
        wallet: &Wallet,
        locked: Vec<Proof>,
    ) -> Result<(Vec<Proof>, Signature)> {
        self.ensure(SwapState::Verified, "responder_claim")?;
        if wallet.mint_url() != self.initiator.mint_url {
            return Err(SwapError::InvalidSwapRequest(format!(
                "responder claims on {}, wallet is for {}",
                self.initiator.mint_url,
                wallet.mint_url()
            )));
        }

        let expected_secret = self
            .responder_claim_secret
            .as_ref()
            .expect("secrets exist in this state")
            .serialize();
        self.validate_locked(&locked, &expected_secret, self.initiator.amount)?;

        let completed = self.responder_completed_signature()?;
        let witness = P2pkWitness::new(completed.to_hex()).serialize();
        let mut inputs = locked;
        for proof in &mut inputs {
            proof.witness = Some(witness.clone());
        }

        match wallet.swap_proofs(inputs, None).await {
            Ok(new_proofs) => {
                self.state = SwapState::Claiming;
                self.events.push(SwapEvent::ResponderClaimed {
                    signature: completed.to_hex(),
                });
                info!(mint = %wallet.mint_url(), "responder claimed");
                Ok((new_proofs, completed))
            }
            Err(err) if err.is_retryable() => Err(err),
            Err(err) => {
                self.fail(&err.to_string());
                Err(err)
            }
        }
    }

    /// Step 6: the initiator recovers `t = s' - s` from the responder's
    /// published signature. A mismatch against `T` indicates a protocol
    /// violation and fails the swap.
    pub fn extract_secret(&mut self, completed: &Signature) -> Result<Scalar> {
        self.ensure(SwapState::Claiming, "extract_secret")?;
        let adaptor_sig = self
            .responder_adaptor_sig
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?;
        match schnorr_extract(adaptor_sig, completed) {
            Ok(secret) => {
                self.extracted_secret = Some(secret);
                self.state = SwapState::Extracting;
                self.events.push(SwapEvent::SecretExtracted);
                Ok(secret)
            }
            Err(err) => {
                self.fail(&err.to_string());
                Err(err)
            }
        }
    }

    /// The signature the initiator spends with, available after extraction.
    pub fn initiator_completed_signature(&self) -> Result<Signature> {
        let secret = self
            .extracted_secret
            .ok_or_else(|| SwapError::Crypto("no extracted secret".to_string()))?;
        let signature = self
            .initiator_adaptor_sig
            .as_ref()
            .ok_or(SwapError::AdaptorInvalid)?;
        complete_adaptor(signature, &secret)
    }

    /// Step 7: the initiator completes its adaptor signature with the
    /// extracted secret and spends the responder's locked proofs on the
    /// responder's mint.
    pub async fn initiator_claim(
        &mut self,
        wallet: &Wallet,
        locked: Vec<Proof>,
    ) -> Result<Vec<Proof>> {
        self.ensure(SwapState::Extracting, "initiator_claim")?;
        if wallet.mint_url() != self.responder.mint_url {
            return Err(SwapError::InvalidSwapRequest(format!(
                "initiator claims on {}, wallet is for {}",
                self.responder.mint_url,
                wallet.mint_url()
            )));
        }

        let expected_secret = self
            .initiator_claim_secret
            .as_ref()
            .expect("secrets exist in this state")
            .serialize();
        self.validate_locked(&locked, &expected_secret, self.responder.amount)?;

        let completed = self.initiator_completed_signature()?;
        let witness = P2pkWitness::new(completed.to_hex()).serialize();
        let mut inputs = locked;
        for proof in &mut inputs {
            proof.witness = Some(witness.clone());
        }

        match wallet.swap_proofs(inputs, None).await {
            Ok(new_proofs) => {
                self.state = SwapState::Completed;
                self.events.push(SwapEvent::Completed);
                self.wipe_secrets();
                info!(mint = %wallet.mint_url(), "initiator claimed, swap complete");
                Ok(new_proofs)
            }
            Err(err) if err.is_retryable() => Err(err),
            Err(err) => {
                self.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn validate_locked(&self, locked: &[Proof], expected_secret: &str, amount: u64) -> Result<()> {
        if locked.is_empty() || total_amount(locked) != amount {
            return Err(SwapError::InvalidSwapRequest(format!(
                "locked proofs must total {amount}"
            )));
        }
        for proof in locked {
            if proof.secret != expected_secret {
                return Err(SwapError::InvalidSwapRequest(
                    "locked proof does not carry the negotiated secret".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Abandon the swap. Possible from any state before the responder's
    /// claim; afterwards the machine must run to termination.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(SwapError::InvalidTransition {
                state: self.state.to_string(),
                action: "cancel".to_string(),
            });
        }
        if matches!(self.state, SwapState::Claiming | SwapState::Extracting) {
            return Err(SwapError::InvalidTransition {
                state: self.state.to_string(),
                action: "cancel".to_string(),
            });
        }
        self.state = SwapState::Cancelled;
        self.events.push(SwapEvent::Cancelled);
        self.wipe_secrets();
        Ok(())
    }
}

impl Drop for AtomicSwap {
    fn drop(&mut self) {
        self.wipe_secrets();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::secp::KeyPair;
    use std::time::Duration;

    fn party(keypair: &KeyPair, mint_url: &str, amount: u64) -> SwapParty {
        SwapParty {
            public_key: keypair.public_bytes().to_vec(),
            secret_key: Some(keypair.secret),
            mint_url: mint_url.to_string(),
            amount,
        }
    }

    fn fresh_swap() -> AtomicSwap {
        let initiator = KeyPair::random();
        let responder = KeyPair::random();
        AtomicSwap::new(
            party(&initiator, "http://mint-a.test", 8),
            party(&responder, "http://mint-b.test", 8),
            0,
            SystemTime::now() + Duration::from_secs(300),
        )
        .unwrap()
    }

    #[test]
    fn rejects_same_mint_legs() {
        let keypair = KeyPair::random();
        let result = AtomicSwap::new(
            party(&keypair, "http://mint-a.test", 8),
            party(&keypair, "http://mint-a.test", 8),
            0,
            SystemTime::now() + Duration::from_secs(300),
        );
        assert!(matches!(result, Err(SwapError::SameMintSwap)));
    }

    #[test]
    fn rejects_multi_denomination_amounts() {
        let a = KeyPair::random();
        let b = KeyPair::random();
        let result = AtomicSwap::new(
            party(&a, "http://mint-a.test", 6),
            party(&b, "http://mint-b.test", 8),
            0,
            SystemTime::now() + Duration::from_secs(300),
        );
        assert!(result.is_err());
    }

    #[test]
    fn steps_advance_in_declared_order() {
        let mut swap = fresh_swap();
        assert_eq!(swap.state(), SwapState::Idle);

        swap.initialize().unwrap();
        assert_eq!(swap.state(), SwapState::Negotiating);

        let (responder_claim, initiator_claim) = swap.create_secrets().unwrap();
        assert_ne!(responder_claim, initiator_claim);
        assert_eq!(swap.state(), SwapState::SecretsCreated);

        swap.create_adaptor_signatures().unwrap();
        assert_eq!(swap.state(), SwapState::AdaptorSigsExchanged);

        swap.verify_adaptor_signatures().unwrap();
        assert_eq!(swap.state(), SwapState::Verified);
    }

    #[test]
    fn skipping_a_step_is_detected() {
        let mut swap = fresh_swap();
        assert!(matches!(
            swap.create_secrets(),
            Err(SwapError::InvalidTransition { .. })
        ));

        swap.initialize().unwrap();
        assert!(matches!(
            swap.create_adaptor_signatures(),
            Err(SwapError::InvalidTransition { .. })
        ));
        assert!(matches!(
            swap.verify_adaptor_signatures(),
            Err(SwapError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn repeating_a_step_is_detected() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        assert!(matches!(
            swap.initialize(),
            Err(SwapError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn both_signatures_share_the_adaptor_point() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        swap.create_secrets().unwrap();
        swap.create_adaptor_signatures().unwrap();

        let point = swap.adaptor_point().unwrap();
        assert_eq!(swap.initiator_adaptor_sig.as_ref().unwrap().t, point);
        assert_eq!(swap.responder_adaptor_sig.as_ref().unwrap().t, point);
    }

    #[test]
    fn foreign_adaptor_point_fails_verification() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        swap.create_secrets().unwrap();
        swap.create_adaptor_signatures().unwrap();

        // replace the initiator's signature with one over a different T
        let (other_t, _) = generate_adaptor_secret();
        let rogue_key = KeyPair::random();
        let message = swap.initiator_claim_secret.as_ref().unwrap().message();
        let rogue = adaptor_sign(&rogue_key.secret, &message, &other_t).unwrap();
        swap.set_initiator_adaptor_signature(rogue).unwrap();

        assert!(swap.verify_adaptor_signatures().is_err());
        assert_eq!(swap.state(), SwapState::Failed);
    }

    #[test]
    fn invalid_signature_fails_before_any_mint_interaction() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        swap.create_secrets().unwrap();
        swap.create_adaptor_signatures().unwrap();

        // valid T, wrong signer
        let rogue_key = KeyPair::random();
        let message = swap.initiator_claim_secret.as_ref().unwrap().message();
        let t = swap.adaptor_secret.unwrap();
        let rogue = adaptor_sign(&rogue_key.secret, &message, &t).unwrap();
        swap.set_initiator_adaptor_signature(rogue).unwrap();

        assert!(swap.verify_adaptor_signatures().is_err());
        assert_eq!(swap.state(), SwapState::Failed);
        assert!(swap
            .events()
            .iter()
            .any(|e| matches!(e, SwapEvent::Failed { .. })));
    }

    #[test]
    fn completed_signature_reveals_the_adaptor_secret() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        swap.create_secrets().unwrap();
        swap.create_adaptor_signatures().unwrap();
        swap.verify_adaptor_signatures().unwrap();

        let completed = swap.responder_completed_signature().unwrap();
        let adaptor = swap.responder_adaptor_sig.as_ref().unwrap();
        let extracted = schnorr_extract(adaptor, &completed).unwrap();
        assert_eq!(
            crate::crypto::scalar_to_bytes(&extracted),
            crate::crypto::scalar_to_bytes(&swap.adaptor_secret.unwrap())
        );
    }

    #[test]
    fn cancellation_allowed_before_claiming() {
        let mut swap = fresh_swap();
        swap.initialize().unwrap();
        swap.create_secrets().unwrap();
        swap.cancel().unwrap();
        assert_eq!(swap.state(), SwapState::Cancelled);

        // terminal: nothing moves any more
        assert!(swap.create_adaptor_signatures().is_err());
        assert!(swap.cancel().is_err());
    }

    #[test]
    fn expiry_trips_the_machine_into_timeout() {
        let initiator = KeyPair::random();
        let responder = KeyPair::random();
        let mut swap = AtomicSwap::new(
            party(&initiator, "http://mint-a.test", 8),
            party(&responder, "http://mint-b.test", 8),
            0,
            SystemTime::now() - Duration::from_secs(1),
        )
        .unwrap();

        assert!(swap.initialize().is_err());
        assert_eq!(swap.state(), SwapState::TimedOut);
        assert!(swap
            .events()
            .iter()
            .any(|e| matches!(e, SwapEvent::TimedOut)));
    }
}
