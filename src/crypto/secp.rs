//! secp256k1 scalar and point primitives
//!
//! Everything above this module speaks in [`Scalar`] and [`ProjectivePoint`];
//! byte layouts (32-byte scalars, 33-byte compressed points, 32-byte x-only
//! encodings) only exist at the boundaries defined here.

use k256::elliptic_curve::group::prime::PrimeCurveAffine;
use k256::elliptic_curve::group::GroupEncoding;
use k256::elliptic_curve::point::{AffineCoordinates, DecompressPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, FieldBytes, NonZeroScalar, ProjectivePoint, Scalar};

use crate::error::{Result, SwapError};

/// Length of a compressed SEC1 point encoding.
pub const COMPRESSED_POINT_SIZE: usize = 33;

/// Length of an x-only point encoding.
pub const XONLY_POINT_SIZE: usize = 32;

/// Parse 32 bytes as a secp256k1 scalar in `[1, n-1]`.
///
/// Zero and out-of-range values are rejected; private keys, nonces and
/// adaptor secrets are never zero.
pub fn parse_scalar(bytes: &[u8]) -> Result<Scalar> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| SwapError::InvalidScalar)?;
    let repr = FieldBytes::from(arr);
    let opt = Scalar::from_repr(repr);
    if opt.is_none().into() {
        return Err(SwapError::InvalidScalar);
    }
    let scalar = opt.unwrap();
    if scalar == Scalar::ZERO {
        return Err(SwapError::InvalidScalar);
    }
    Ok(scalar)
}

/// Parse a 32-byte hash output as a challenge scalar.
///
/// A SHA-256 digest exceeds the curve order with probability ~2^-128; that
/// case is surfaced as a crypto error rather than silently reduced, matching
/// the reference verifier.
pub fn parse_challenge(bytes: &[u8; 32]) -> Result<Scalar> {
    let repr = FieldBytes::from(*bytes);
    let opt = Scalar::from_repr(repr);
    if opt.is_none().into() {
        return Err(SwapError::InvalidScalar);
    }
    Ok(opt.unwrap())
}

/// Serialize a scalar to its 32-byte big-endian form.
pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    scalar.to_bytes().into()
}

/// Generate a uniformly random scalar in `[1, n-1]`.
pub fn random_scalar() -> Scalar {
    *NonZeroScalar::random(&mut rand::thread_rng())
}

/// Base-point multiplication: `x * G`.
pub fn mul_base(scalar: &Scalar) -> ProjectivePoint {
    ProjectivePoint::GENERATOR * scalar
}

/// Parse a 33-byte SEC1-compressed encoding into a curve point.
pub fn parse_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != COMPRESSED_POINT_SIZE {
        return Err(SwapError::InvalidPoint);
    }
    let mut repr = <ProjectivePoint as GroupEncoding>::Repr::default();
    repr.copy_from_slice(bytes);
    let opt = ProjectivePoint::from_bytes(&repr);
    if opt.is_none().into() {
        return Err(SwapError::InvalidPoint);
    }
    let point = opt.unwrap();
    if bool::from(point.to_affine().is_identity()) {
        return Err(SwapError::InvalidPoint);
    }
    Ok(point)
}

/// Serialize a point to its 33-byte SEC1-compressed encoding.
pub fn point_to_bytes(point: &ProjectivePoint) -> [u8; 33] {
    let encoded = point.to_affine().to_bytes();
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_slice());
    out
}

/// Serialize a point to its 32-byte x-only encoding (parity dropped).
pub fn point_to_xonly(point: &ProjectivePoint) -> [u8; 32] {
    point.to_affine().x().into()
}

/// Lift a 32-byte x-only encoding to the curve point with even y.
pub fn lift_x(x_bytes: &[u8; 32]) -> Result<ProjectivePoint> {
    let fb = FieldBytes::from(*x_bytes);
    let opt = AffinePoint::decompress(&fb, 0u8.into());
    if opt.is_none().into() {
        return Err(SwapError::InvalidPoint);
    }
    Ok(ProjectivePoint::from(opt.unwrap()))
}

/// Whether the point's affine y-coordinate is odd.
pub fn has_odd_y(point: &ProjectivePoint) -> bool {
    point.to_affine().y_is_odd().into()
}

/// Negate `secret` if its public point has odd y, so that the public point
/// of the returned scalar is always even-y.
///
/// Challenge hashes are computed over x-only encodings, so signer and
/// verifier must agree on parity; even-y is the convention everywhere in
/// this crate, including tweaked keys.
pub fn canonical_secret(secret: Scalar) -> (Scalar, ProjectivePoint) {
    let public = mul_base(&secret);
    if has_odd_y(&public) {
        let negated = -secret;
        (negated, mul_base(&negated))
    } else {
        (secret, public)
    }
}

/// `P + T`: the effective public key a locked output is bound to, so that
/// a signature by `x + t` authorises spending.
pub fn tweak_public_key(
    public_key: &ProjectivePoint,
    tweak: &ProjectivePoint,
) -> Result<ProjectivePoint> {
    let sum = public_key + tweak;
    if bool::from(sum.to_affine().is_identity()) {
        return Err(SwapError::InvalidPoint);
    }
    Ok(sum)
}

/// `x + t mod n`, rejecting a zero result.
pub fn add_secret_keys(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let sum = a + b;
    if sum == Scalar::ZERO {
        return Err(SwapError::InvalidScalar);
    }
    Ok(sum)
}

/// A private scalar and its public point, canonicalised to even y.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret: Scalar,
    pub public: ProjectivePoint,
}

impl KeyPair {
    /// Build a keypair from a secret, negating it to even-y form.
    pub fn from_secret(secret: Scalar) -> Self {
        let (secret, public) = canonical_secret(secret);
        Self { secret, public }
    }

    /// Generate a fresh keypair.
    pub fn random() -> Self {
        Self::from_secret(random_scalar())
    }

    /// 33-byte compressed encoding of the public point.
    pub fn public_bytes(&self) -> [u8; 33] {
        point_to_bytes(&self.public)
    }

    /// 32-byte x-only encoding of the public point.
    pub fn xonly_bytes(&self) -> [u8; 32] {
        point_to_xonly(&self.public)
    }
}
