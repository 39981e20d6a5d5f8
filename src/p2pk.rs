//! P2PK spending-condition secret and witness codec
//!
//! The serialised secret is what the mint's verifier hashes and what the
//! spender signs, so the encoder must be byte-deterministic: compact JSON,
//! fields in `nonce, data, tags` order, no reordering, no added whitespace.
//! Wire form: `["P2PK",{"nonce":"…","data":"…","tags":[["sigflag","SIG_INPUTS"]]}]`.

use k256::ProjectivePoint;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::schnorr::message_hash;
use crate::crypto::secp::{lift_x, parse_point, point_to_bytes};
use crate::error::{Result, SwapError};

/// Which inputs a witness authorises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigFlag {
    /// Each spent token carries its own witness over its own secret.
    SigInputs,
    /// One witness on the first input covers all inputs jointly.
    SigAll,
}

impl SigFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigFlag::SigInputs => "SIG_INPUTS",
            SigFlag::SigAll => "SIG_ALL",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "SIG_INPUTS" => Ok(SigFlag::SigInputs),
            "SIG_ALL" => Ok(SigFlag::SigAll),
            other => Err(SwapError::Encoding(format!("unknown sigflag: {other}"))),
        }
    }
}

/// Field order here is the wire order; serde emits struct fields in
/// declaration order and `serde_json::to_string` adds no whitespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct P2pkSecretData {
    nonce: String,
    data: String,
    tags: Vec<Vec<String>>,
}

/// A P2PK locking condition for one bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pkSecret {
    inner: P2pkSecretData,
}

impl P2pkSecret {
    /// Lock to `public_key` (33-byte compressed, or 32-byte x-only which is
    /// lifted to the even-y point) with a fresh random nonce.
    pub fn new(public_key: &[u8], sig_flag: SigFlag) -> Result<Self> {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(public_key, sig_flag, &nonce)
    }

    /// Lock with a caller-supplied nonce. Exposed for deterministic tests.
    pub fn with_nonce(public_key: &[u8], sig_flag: SigFlag, nonce: &[u8; 32]) -> Result<Self> {
        let data = encode_recipient_key(public_key)?;
        Ok(Self {
            inner: P2pkSecretData {
                nonce: hex::encode(nonce),
                data: hex::encode(data),
                tags: vec![vec!["sigflag".to_string(), sig_flag.as_str().to_string()]],
            },
        })
    }

    /// Parse a serialised secret. Returns an encoding error if the outer
    /// sequence is not a two-element `["P2PK", {...}]`.
    pub fn from_str(serialized: &str) -> Result<Self> {
        let (kind, inner): (String, P2pkSecretData) = serde_json::from_str(serialized)?;
        if kind != "P2PK" {
            return Err(SwapError::Encoding(format!(
                "expected P2PK secret, got kind {kind}"
            )));
        }
        Ok(Self { inner })
    }

    /// The canonical serialised form the mint hashes and the spender signs.
    pub fn serialize(&self) -> String {
        // Tuple of (literal, object) serialises as the two-element sequence.
        serde_json::to_string(&("P2PK", &self.inner))
            .expect("p2pk secret serialisation cannot fail")
    }

    /// The 32-byte digest a witness signature over this secret covers.
    pub fn message(&self) -> [u8; 32] {
        message_hash(self.serialize().as_bytes())
    }

    /// The recipient public key as a curve point.
    pub fn recipient(&self) -> Result<ProjectivePoint> {
        let bytes = hex::decode(&self.inner.data).map_err(|e| SwapError::Encoding(e.to_string()))?;
        parse_point(&bytes)
    }

    /// The sigflag tag, defaulting to `SIG_INPUTS` when absent.
    pub fn sig_flag(&self) -> SigFlag {
        self.inner
            .tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some("sigflag"))
            .and_then(|tag| tag.get(1))
            .and_then(|value| SigFlag::from_str(value).ok())
            .unwrap_or(SigFlag::SigInputs)
    }
}

/// Normalise a recipient key to its 33-byte compressed encoding.
///
/// An x-only input is lifted to the even-y point; a compressed input keeps
/// its prefix byte, preserving parity exactly as supplied.
fn encode_recipient_key(public_key: &[u8]) -> Result<[u8; 33]> {
    match public_key.len() {
        33 => {
            let point = parse_point(public_key)?;
            Ok(point_to_bytes(&point))
        }
        32 => {
            let x: [u8; 32] = public_key.try_into().expect("length checked");
            let point = lift_x(&x)?;
            Ok(point_to_bytes(&point))
        }
        other => Err(SwapError::Encoding(format!(
            "recipient key must be 32 or 33 bytes, got {other}"
        ))),
    }
}

/// Witness attached to a spent proof: `{"signatures":["<128 hex>"]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct P2pkWitness {
    pub signatures: Vec<String>,
}

impl P2pkWitness {
    pub fn new(signature_hex: String) -> Self {
        Self {
            signatures: vec![signature_hex],
        }
    }

    /// Serialise to the string embedded verbatim in a proof's witness field.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("witness serialisation cannot fail")
    }

    /// Parse and validate: every entry must be exactly 64 raw bytes of hex.
    pub fn from_str(serialized: &str) -> Result<Self> {
        let witness: P2pkWitness = serde_json::from_str(serialized)?;
        for signature in &witness.signatures {
            if signature.len() != 128 || hex::decode(signature).is_err() {
                return Err(SwapError::Encoding(
                    "witness signature must be 128 hex characters".to_string(),
                ));
            }
        }
        Ok(witness)
    }
}

/// Joint message for `SIG_ALL`: the digest of all input secrets concatenated
/// in input order.
pub fn sig_all_message(secrets: &[String]) -> [u8; 32] {
    let joined: String = secrets.concat();
    message_hash(joined.as_bytes())
}
