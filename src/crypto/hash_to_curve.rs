//! Deterministic hash-to-curve for bearer secrets
//!
//! Maps arbitrary bytes to a secp256k1 point by hashing with a fixed domain
//! separator and counting up a little-endian u32 until the digest is the
//! x-coordinate of a curve point. The output must stay byte-identical across
//! implementations: the mint computes the same map to track spent secrets.

use k256::ProjectivePoint;
use sha2::{Digest, Sha256};

use crate::crypto::secp::parse_point;
use crate::error::{Result, SwapError};

const DOMAIN_SEPARATOR: &[u8] = b"Secp256k1_HashToCurve_Cashu_";

/// Map `message` to a curve point.
pub fn hash_to_curve(message: &[u8]) -> Result<ProjectivePoint> {
    let msg_hash = Sha256::new()
        .chain_update(DOMAIN_SEPARATOR)
        .chain_update(message)
        .finalize();

    let mut candidate = [0u8; 33];
    candidate[0] = 0x02;

    for counter in 0u32..u32::MAX {
        let digest = Sha256::new()
            .chain_update(msg_hash)
            .chain_update(counter.to_le_bytes())
            .finalize();
        candidate[1..].copy_from_slice(&digest);
        if let Ok(point) = parse_point(&candidate) {
            return Ok(point);
        }
    }

    // ~2^32 consecutive invalid x-coordinates; fail closed.
    Err(SwapError::Crypto(
        "hash_to_curve exhausted counter space".to_string(),
    ))
}

/// Convenience: the 33-byte compressed encoding of `hash_to_curve(message)`.
pub fn hash_to_curve_bytes(message: &[u8]) -> Result<[u8; 33]> {
    Ok(crate::crypto::secp::point_to_bytes(&hash_to_curve(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vectors shared with the mint implementation.
    #[test]
    fn known_vectors() {
        let cases = [
            (
                "0000000000000000000000000000000000000000000000000000000000000000",
                "024cce997d3b518f739663b757deaec95bcd9473c30a14ac2fd04023a739d1a725",
            ),
            (
                "0000000000000000000000000000000000000000000000000000000000000001",
                "022e7158e11c9506f1aa4248bf531298daa7febd6194f003edcd9b93ade6253acf",
            ),
            // requires a counter iteration before landing on the curve
            (
                "0000000000000000000000000000000000000000000000000000000000000002",
                "026cdbe15362df59cd1dd3c9c11de8aedac2106eca69236ecd9fbe117af897be4f",
            ),
        ];

        for (message_hex, expected_hex) in cases {
            let message = hex::decode(message_hex).unwrap();
            let point = hash_to_curve_bytes(&message).unwrap();
            assert_eq!(hex::encode(point), expected_hex);
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let message = b"test_secret_123";
        let first = hash_to_curve_bytes(message).unwrap();
        for _ in 0..8 {
            assert_eq!(hash_to_curve_bytes(message).unwrap(), first);
        }
    }

    #[test]
    fn distinct_messages_distinct_points() {
        let a = hash_to_curve_bytes(b"secret_a").unwrap();
        let b = hash_to_curve_bytes(b"secret_b").unwrap();
        assert_ne!(a, b);
    }
}
