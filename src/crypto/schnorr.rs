//! Schnorr and adaptor signatures with the mint's challenge convention
//!
//! The challenge is `e = SHA256(P_x || R_x || m)` over raw x-only encodings,
//! deliberately not the BIP-340 tagged form: the reference mint verifies in
//! this mode and the two are not interchangeable. Private keys, nonces and
//! adaptor secrets are all negated to even-y form before use so that the
//! x-only encodings hashed by signer and verifier name the same points.
//!
//! Adaptor algebra:
//!
//! ```text
//! s  = r + e*x              plain signature      s*G  == R + e*P
//! s' = r + t + e*x          adaptor signature    s'*G == R + T + e*P
//! s  = s' - t               completion
//! t  = s' - s               extraction
//! ```

use k256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::secp::{
    canonical_secret, has_odd_y, lift_x, mul_base, parse_challenge, parse_scalar, point_to_xonly,
    random_scalar, scalar_to_bytes,
};
use crate::error::{Result, SwapError};

/// Length of a completed signature on the wire: `R_x || s`.
pub const SIGNATURE_SIZE: usize = 64;

/// A completed Schnorr signature `(s, R)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// x-only nonce point, even y.
    pub r: [u8; 32],
    pub s: Scalar,
}

impl Signature {
    /// Wire form: 64 bytes `R_x || s`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&scalar_to_bytes(&self.s));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(SwapError::Encoding(format!(
                "signature must be {SIGNATURE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        let s = parse_scalar(&bytes[32..])?;
        Ok(Self { r, s })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| SwapError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// An adaptor signature `(s', R, T)`.
///
/// Valid for key `P` and message `m` iff `s'*G == R + T + e*P`; becomes a
/// [`Signature`] when the holder of `t` subtracts it from `s'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptorSignature {
    /// x-only nonce point, even y.
    pub r: [u8; 32],
    /// x-only adaptor point `T = tG`, even y.
    pub t: [u8; 32],
    pub s: Scalar,
}

impl AdaptorSignature {
    /// 96 bytes `R_x || T_x || s'`, mirroring the completed wire form.
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.t);
        out[64..].copy_from_slice(&scalar_to_bytes(&self.s));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 96 {
            return Err(SwapError::Encoding(format!(
                "adaptor signature must be 96 bytes, got {}",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut t = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        t.copy_from_slice(&bytes[32..64]);
        let s = parse_scalar(&bytes[64..])?;
        Ok(Self { r, t, s })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| SwapError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// SHA-256 of arbitrary bytes, the digest form every signature here covers.
pub fn message_hash(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

/// `e = SHA256(P_x || R_x || m)`, decoded as a scalar.
fn challenge(public_x: &[u8; 32], nonce_x: &[u8; 32], message: &[u8; 32]) -> Result<Scalar> {
    let digest: [u8; 32] = Sha256::new()
        .chain_update(public_x)
        .chain_update(nonce_x)
        .chain_update(message)
        .finalize()
        .into();
    parse_challenge(&digest)
}

/// Fresh signing nonce with an even-y nonce point.
fn generate_nonce() -> Result<(Scalar, [u8; 32])> {
    let nonce = random_scalar();
    let point = mul_base(&nonce);
    if bool::from(k256::elliptic_curve::group::Group::is_identity(&point)) {
        // r is non-zero so this cannot happen; fail closed anyway.
        return Err(SwapError::Crypto("nonce point at infinity".to_string()));
    }
    if has_odd_y(&point) {
        let negated = -nonce;
        return Ok((negated, point_to_xonly(&mul_base(&negated))));
    }
    Ok((nonce, point_to_xonly(&point)))
}

/// Generate a canonical adaptor secret: `t` such that `T = tG` has even y.
/// Returns the secret and the x-only encoding of `T`.
pub fn generate_adaptor_secret() -> (Scalar, [u8; 32]) {
    let (t, point) = canonical_secret(random_scalar());
    (t, point_to_xonly(&point))
}

/// Sign a 32-byte message digest: `s = r + e*x`.
pub fn sign(secret: &Scalar, message: &[u8; 32]) -> Result<Signature> {
    let (x, public) = canonical_secret(*secret);
    let (mut r, r_x) = generate_nonce()?;
    let e = challenge(&point_to_xonly(&public), &r_x, message)?;
    let s = r + e * x;
    r.zeroize();
    Ok(Signature { r: r_x, s })
}

/// Verify `s*G == R + e*P`, comparing x-coordinates of even-y liftings.
pub fn verify(public_key: &ProjectivePoint, message: &[u8; 32], signature: &Signature) -> Result<()> {
    let public_x = point_to_xonly(public_key);
    let public_even = lift_x(&public_x)?;
    // reject a nonce x-coordinate that is not on the curve
    lift_x(&signature.r)?;
    if signature.s == Scalar::ZERO {
        return Err(SwapError::InvalidScalar);
    }

    let e = challenge(&public_x, &signature.r, message)?;
    // R_check = s*G - e*P must equal the even-y lift of r
    let r_check = mul_base(&signature.s) - public_even * e;
    if bool::from(k256::elliptic_curve::group::Group::is_identity(&r_check)) {
        return Err(SwapError::SignatureInvalid);
    }
    if has_odd_y(&r_check) || point_to_xonly(&r_check) != signature.r {
        return Err(SwapError::SignatureInvalid);
    }
    Ok(())
}

/// Produce an adaptor signature `s' = r + t + e*x` under the shared secret `t`.
pub fn adaptor_sign(secret: &Scalar, message: &[u8; 32], adaptor_secret: &Scalar) -> Result<AdaptorSignature> {
    let (x, public) = canonical_secret(*secret);
    let (t, t_point) = canonical_secret(*adaptor_secret);
    let (mut r, r_x) = generate_nonce()?;
    let e = challenge(&point_to_xonly(&public), &r_x, message)?;
    let s = r + t + e * x;
    r.zeroize();
    Ok(AdaptorSignature {
        r: r_x,
        t: point_to_xonly(&t_point),
        s,
    })
}

/// Verify `s'*G == R + T + e*P` without learning `t`.
pub fn adaptor_verify(
    public_key: &ProjectivePoint,
    message: &[u8; 32],
    signature: &AdaptorSignature,
) -> Result<()> {
    let public_x = point_to_xonly(public_key);
    let public_even = lift_x(&public_x)?;
    lift_x(&signature.r)?;
    let t_point = lift_x(&signature.t)?;
    if signature.s == Scalar::ZERO {
        return Err(SwapError::InvalidScalar);
    }

    let e = challenge(&public_x, &signature.r, message)?;
    // R_check = s'*G - e*P - T must equal the even-y lift of r
    let r_check = mul_base(&signature.s) - public_even * e - t_point;
    if bool::from(k256::elliptic_curve::group::Group::is_identity(&r_check)) {
        return Err(SwapError::AdaptorInvalid);
    }
    if has_odd_y(&r_check) || point_to_xonly(&r_check) != signature.r {
        return Err(SwapError::AdaptorInvalid);
    }
    Ok(())
}

/// Complete an adaptor signature with the secret it commits to: `s = s' - t`.
///
/// Fails unless `t*G` (after canonicalisation) matches the signature's `T`.
pub fn complete_adaptor(signature: &AdaptorSignature, adaptor_secret: &Scalar) -> Result<Signature> {
    let (t, t_point) = canonical_secret(*adaptor_secret);
    if point_to_xonly(&t_point) != signature.t {
        return Err(SwapError::ExtractionMismatch);
    }
    Ok(Signature {
        r: signature.r,
        s: signature.s - t,
    })
}

/// Recover the adaptor secret from an adaptor signature and the completed
/// signature published with the same nonce: `t = s' - s`.
pub fn extract_secret(adaptor: &AdaptorSignature, completed: &Signature) -> Result<Scalar> {
    if adaptor.r != completed.r {
        return Err(SwapError::AdaptorInvalid);
    }
    let t = adaptor.s - completed.s;
    let t_point = mul_base(&t);
    if bool::from(k256::elliptic_curve::group::Group::is_identity(&t_point)) {
        return Err(SwapError::ExtractionMismatch);
    }
    if has_odd_y(&t_point) || point_to_xonly(&t_point) != adaptor.t {
        return Err(SwapError::ExtractionMismatch);
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::secp::KeyPair;

    fn digest(label: &str) -> [u8; 32] {
        message_hash(label.as_bytes())
    }

    #[test]
    fn sign_verify_round_trip() {
        let keypair = KeyPair::random();
        let msg = digest("plain schnorr");
        let sig = sign(&keypair.secret, &msg).unwrap();
        verify(&keypair.public, &msg, &sig).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let keypair = KeyPair::random();
        let sig = sign(&keypair.secret, &digest("signed")).unwrap();
        assert!(verify(&keypair.public, &digest("other"), &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keypair = KeyPair::random();
        let other = KeyPair::random();
        let msg = digest("key mismatch");
        let sig = sign(&keypair.secret, &msg).unwrap();
        assert!(verify(&other.public, &msg, &sig).is_err());
    }

    #[test]
    fn signature_wire_round_trip() {
        let keypair = KeyPair::random();
        let msg = digest("wire");
        let sig = sign(&keypair.secret, &msg).unwrap();
        let parsed = Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
        verify(&keypair.public, &msg, &parsed).unwrap();
    }

    #[test]
    fn adaptor_round_trip() {
        let keypair = KeyPair::random();
        let msg = digest("adaptor");
        let (t, t_x) = generate_adaptor_secret();

        let adaptor = adaptor_sign(&keypair.secret, &msg, &t).unwrap();
        assert_eq!(adaptor.t, t_x);
        adaptor_verify(&keypair.public, &msg, &adaptor).unwrap();

        let completed = complete_adaptor(&adaptor, &t).unwrap();
        verify(&keypair.public, &msg, &completed).unwrap();

        let extracted = extract_secret(&adaptor, &completed).unwrap();
        assert_eq!(scalar_to_bytes(&extracted), scalar_to_bytes(&t));
    }

    #[test]
    fn adaptor_rejects_any_single_mismatch() {
        let keypair = KeyPair::random();
        let msg = digest("mismatch");
        let (t, _) = generate_adaptor_secret();
        let adaptor = adaptor_sign(&keypair.secret, &msg, &t).unwrap();

        // wrong key
        let other = KeyPair::random();
        assert!(adaptor_verify(&other.public, &msg, &adaptor).is_err());

        // wrong message
        assert!(adaptor_verify(&keypair.public, &digest("tampered"), &adaptor).is_err());

        // wrong adaptor point
        let (_, other_t_x) = generate_adaptor_secret();
        let mut swapped = adaptor.clone();
        swapped.t = other_t_x;
        assert!(adaptor_verify(&keypair.public, &msg, &swapped).is_err());

        // tampered nonce
        let mut bad_nonce = adaptor.clone();
        bad_nonce.r[0] ^= 0x01;
        assert!(adaptor_verify(&keypair.public, &msg, &bad_nonce).is_err());
    }

    #[test]
    fn completion_requires_matching_secret() {
        let keypair = KeyPair::random();
        let (t, _) = generate_adaptor_secret();
        let (wrong_t, _) = generate_adaptor_secret();
        let adaptor = adaptor_sign(&keypair.secret, &digest("complete"), &t).unwrap();
        assert!(complete_adaptor(&adaptor, &wrong_t).is_err());
    }

    #[test]
    fn extraction_requires_shared_nonce() {
        let keypair = KeyPair::random();
        let msg = digest("extract");
        let (t, _) = generate_adaptor_secret();
        let adaptor = adaptor_sign(&keypair.secret, &msg, &t).unwrap();

        // a signature over the same message with a different nonce
        let unrelated = sign(&keypair.secret, &msg).unwrap();
        assert!(extract_secret(&adaptor, &unrelated).is_err());
    }

    #[test]
    fn tweaked_key_signature_verifies_against_point_sum() {
        // A signature by x + t must verify under the point P + T: the mint
        // only ever sees the combined public key.
        let keypair = KeyPair::random();
        let (t, _) = generate_adaptor_secret();
        let msg = digest("tweak");

        let tweaked_secret = keypair.secret + t;
        let tweaked_point = keypair.public + mul_base(&t);

        let sig = sign(&tweaked_secret, &msg).unwrap();
        verify(&tweaked_point, &msg, &sig).unwrap();
    }
}
