//! Cryptographic engine: secp256k1 arithmetic, hash-to-curve, BDHKE and the
//! Schnorr adaptor-signature algebra the swap protocol is built on.

pub mod bdhke;
pub mod hash_to_curve;
pub mod schnorr;
pub mod secp;

pub use bdhke::{blind_message, unblind_signature, BlindedPoint};
pub use hash_to_curve::{hash_to_curve, hash_to_curve_bytes};
pub use schnorr::{
    adaptor_sign, adaptor_verify, complete_adaptor, extract_secret, generate_adaptor_secret,
    message_hash, sign, verify, AdaptorSignature, Signature, SIGNATURE_SIZE,
};
pub use secp::{
    add_secret_keys, canonical_secret, lift_x, mul_base, parse_point, parse_scalar, point_to_bytes,
    point_to_xonly, random_scalar, scalar_to_bytes, tweak_public_key, KeyPair,
    COMPRESSED_POINT_SIZE, XONLY_POINT_SIZE,
};
