//! Shared data model: bearer tokens, mint wire objects and broker types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::crypto::hash_to_curve_bytes;
use crate::error::Result;

// ===== Bearer tokens & mint wire objects =====

/// A spendable bearer token.
///
/// `secret` is either an opaque random string (anyone-can-spend) or a
/// serialised P2PK secret; `c` is the mint's unblinded signature over it.
/// When spending a locked proof, `witness` carries the serialised
/// P2PK witness verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proof {
    pub amount: u64,
    pub id: String,
    pub secret: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
}

impl Proof {
    /// `Y = hash_to_curve(secret)`, the identifier the mint tracks spent
    /// tokens by.
    pub fn y(&self) -> Result<[u8; 33]> {
        hash_to_curve_bytes(self.secret.as_bytes())
    }
}

/// Sum of proof denominations.
pub fn total_amount(proofs: &[Proof]) -> u64 {
    proofs.iter().map(|p| p.amount).sum()
}

/// Blinded output sent to the mint for signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlindedMessage {
    pub amount: u64,
    pub id: String,
    #[serde(rename = "B_")]
    pub blinded: String,
}

/// The mint's blind signature over one output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlindedSignature {
    pub amount: u64,
    pub id: String,
    #[serde(rename = "C_")]
    pub signature: String,
}

/// A mint keyset: one compressed public key per power-of-two denomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyset {
    pub id: String,
    pub unit: String,
    #[serde(default)]
    pub active: Option<bool>,
    pub keys: BTreeMap<u64, String>,
}

impl Keyset {
    /// The mint's public key for one denomination, as hex.
    pub fn key_for(&self, amount: u64) -> Option<&str> {
        self.keys.get(&amount).map(String::as_str)
    }
}

/// Keyset listing entry (`GET /v1/keysets`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetInfo {
    pub id: String,
    pub unit: String,
    #[serde(default)]
    pub active: Option<bool>,
}

// ===== Broker configuration =====

/// Mint configuration that the broker supports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    pub mint_url: String,
    pub name: String,
    pub unit: String, // 'sat', 'usd', etc.
}

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub mints: Vec<MintConfig>,
    pub fee_rate: f64,             // Default 0.005 (0.5%)
    pub min_swap_amount: u64,      // Minimum swap in sats
    pub max_swap_amount: u64,      // Maximum swap in sats
    pub quote_expiry_seconds: u64, // How long quotes are valid
    pub mint_timeout_seconds: u64, // Per-request deadline on mint calls
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mints: Vec::new(),
            fee_rate: 0.005,
            min_swap_amount: 1,
            max_swap_amount: 10_000,
            quote_expiry_seconds: 300,
            mint_timeout_seconds: 30,
        }
    }
}

// ===== Quotes =====

/// Swap request from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(alias = "from_mint")]
    pub source_mint: String, // Mint URL the client has tokens on
    #[serde(alias = "to_mint")]
    pub target_mint: String, // Mint URL the client wants tokens on
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "user_pubkey")]
    pub client_public_key: Option<String>, // compressed, hex
}

/// Swap quote from the broker. Carries no secret material; the broker's
/// session private key and the adaptor secret stay inside the quote service
/// until the reveal phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    #[serde(rename = "id", alias = "quote_id")]
    pub quote_id: String,
    pub source_mint: String,
    pub target_mint: String,
    #[serde(rename = "amount_in")]
    pub input_amount: u64, // What the client pays
    #[serde(rename = "amount_out")]
    pub output_amount: u64, // What the client receives (after fee)
    pub fee: u64,
    pub fee_rate: f64,
    /// Broker's per-quote session public key (compressed).
    #[serde(rename = "broker_pubkey", with = "hex_serde")]
    pub broker_public_key: Vec<u8>,
    /// Adaptor point `T = tG` (compressed).
    #[serde(with = "hex_serde")]
    pub adaptor_point: Vec<u8>,
    /// `brokerSessionPubkey + T`: the key the client locks source tokens to.
    #[serde(with = "hex_serde")]
    pub tweaked_pubkey: Vec<u8>,
    #[serde(with = "system_time_serde")]
    pub created_at: SystemTime,
    #[serde(with = "system_time_serde")]
    pub expires_at: SystemTime,
    pub status: SwapStatus,
}

impl SwapQuote {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Status of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Completed,
    Expired,
    Failed,
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapStatus::Pending => write!(f, "pending"),
            SwapStatus::Accepted => write!(f, "accepted"),
            SwapStatus::Completed => write!(f, "completed"),
            SwapStatus::Expired => write!(f, "expired"),
            SwapStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SwapStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SwapStatus::Pending),
            "accepted" => Ok(SwapStatus::Accepted),
            "completed" => Ok(SwapStatus::Completed),
            "expired" => Ok(SwapStatus::Expired),
            "failed" => Ok(SwapStatus::Failed),
            _ => Err(format!("Invalid swap status: {}", s)),
        }
    }
}

// Helper for hex serialization of Vec<u8>
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        hex::decode(&hex_str).map_err(serde::de::Error::custom)
    }
}

// Helper for SystemTime serialization as unix seconds
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_wire_shape() {
        let proof = Proof {
            amount: 8,
            id: "009a1f293253e41e".to_string(),
            secret: "opaque".to_string(),
            c: "02aa".to_string(),
            witness: None,
        };
        let json = serde_json::to_string(&proof).unwrap();
        assert!(json.contains("\"C\":\"02aa\""));
        assert!(!json.contains("witness"));
    }

    #[test]
    fn blinded_message_uses_underscore_fields() {
        let msg = BlindedMessage {
            amount: 4,
            id: "k1".to_string(),
            blinded: "02bb".to_string(),
        };
        assert!(serde_json::to_string(&msg).unwrap().contains("\"B_\":"));

        let sig: BlindedSignature =
            serde_json::from_str("{\"amount\":4,\"id\":\"k1\",\"C_\":\"02cc\"}").unwrap();
        assert_eq!(sig.signature, "02cc");
    }

    #[test]
    fn keyset_integer_keys_round_trip() {
        let raw = "{\"id\":\"k1\",\"unit\":\"sat\",\"keys\":{\"1\":\"02aa\",\"8\":\"02bb\"}}";
        let keyset: Keyset = serde_json::from_str(raw).unwrap();
        assert_eq!(keyset.key_for(8), Some("02bb"));
        assert_eq!(keyset.key_for(2), None);
    }

    #[test]
    fn swap_status_round_trip() {
        for status in [
            SwapStatus::Pending,
            SwapStatus::Accepted,
            SwapStatus::Completed,
            SwapStatus::Expired,
            SwapStatus::Failed,
        ] {
            let parsed: SwapStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
