//! Blind Diffie-Hellman key exchange
//!
//! The blind-signature arithmetic behind bearer token issuance. The mint
//! holds `k` per denomination and publishes `K = kG`; the client hides the
//! secret's curve image `Y` under a blinding factor `r` and later strips
//! `rK` from the mint's response to obtain `C = kY`.

use k256::{ProjectivePoint, Scalar};

use crate::crypto::hash_to_curve::hash_to_curve;
use crate::crypto::secp::{mul_base, parse_point, random_scalar};
use crate::error::Result;

/// Output of blinding one secret: the wire value `B_` plus the private
/// material needed to unblind the mint's response.
pub struct BlindedPoint {
    /// `B_ = Y + rG`, sent to the mint.
    pub blinded: ProjectivePoint,
    /// Blinding factor `r`, held by the caller until unblinding.
    pub factor: Scalar,
    /// `Y = hash_to_curve(secret)`, the secret's curve image.
    pub y: ProjectivePoint,
}

/// Blind `secret` under a fresh blinding factor.
pub fn blind_message(secret: &[u8]) -> Result<BlindedPoint> {
    let y = hash_to_curve(secret)?;
    let factor = random_scalar();
    let blinded = y + mul_base(&factor);
    Ok(BlindedPoint { blinded, factor, y })
}

/// Unblind the mint's response: `C = C_ - rK`.
///
/// `blinded_signature` is the mint's `C_` and `mint_key` the compressed
/// public key `K` for the denomination that was signed.
pub fn unblind_signature(
    blinded_signature: &[u8],
    factor: &Scalar,
    mint_key: &[u8],
) -> Result<ProjectivePoint> {
    let c_ = parse_point(blinded_signature)?;
    let k = parse_point(mint_key)?;
    Ok(c_ - k * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::secp::{point_to_bytes, KeyPair};

    // For any secret and mint key pair (k, K): unblinding k*(Y + rG) with
    // r and K must land back on k*Y.
    #[test]
    fn blind_sign_unblind_round_trip() {
        let mint_key = KeyPair::random();
        let blinded = blind_message(b"round_trip_secret").unwrap();

        let c_ = blinded.blinded * mint_key.secret;
        let c = unblind_signature(
            &point_to_bytes(&c_),
            &blinded.factor,
            &mint_key.public_bytes(),
        )
        .unwrap();

        let expected = blinded.y * mint_key.secret;
        assert_eq!(point_to_bytes(&c), point_to_bytes(&expected));
    }

    #[test]
    fn fresh_factor_per_blinding() {
        let a = blind_message(b"same_secret").unwrap();
        let b = blind_message(b"same_secret").unwrap();
        assert_ne!(point_to_bytes(&a.blinded), point_to_bytes(&b.blinded));
        assert_eq!(point_to_bytes(&a.y), point_to_bytes(&b.y));
    }

    #[test]
    fn unblind_rejects_malformed_inputs() {
        let blinded = blind_message(b"x").unwrap();
        let key = KeyPair::random();
        assert!(unblind_signature(&[0u8; 33], &blinded.factor, &key.public_bytes()).is_err());
        assert!(
            unblind_signature(&key.public_bytes(), &blinded.factor, &[0u8; 10]).is_err()
        );
    }
}
