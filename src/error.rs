//! Error types for the swap broker

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SwapError>;

#[derive(Error, Debug)]
pub enum SwapError {
    // ----- encoding -----
    #[error("encoding error: {0}")]
    Encoding(String),

    // ----- crypto -----
    #[error("scalar out of range for secp256k1")]
    InvalidScalar,

    #[error("invalid secp256k1 point")]
    InvalidPoint,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("adaptor signature verification failed")]
    AdaptorInvalid,

    #[error("extracted secret does not match the adaptor point")]
    ExtractionMismatch,

    #[error("crypto error: {0}")]
    Crypto(String),

    // ----- coordinator / quote state -----
    #[error("invalid swap transition: cannot {action} while {state}")]
    InvalidTransition { state: String, action: String },

    #[error("quote not found: {0}")]
    QuoteNotFound(String),

    #[error("quote expired: {0}")]
    QuoteExpired(String),

    #[error("invalid swap request: {0}")]
    InvalidSwapRequest(String),

    // ----- liquidity -----
    #[error("insufficient liquidity on mint {mint_url}: need {needed}, have {available}")]
    InsufficientLiquidity {
        mint_url: String,
        needed: u64,
        available: u64,
    },

    #[error("swap amount {amount} below minimum {min}")]
    AmountTooLow { amount: u64, min: u64 },

    #[error("swap amount {amount} above maximum {max}")]
    AmountTooHigh { amount: u64, max: u64 },

    #[error("unsupported mint: {0}")]
    UnsupportedMint(String),

    #[error("cannot swap to same mint")]
    SameMintSwap,

    // ----- mint -----
    #[error("mint {mint_url} rejected the request: {detail}")]
    MintRejected { mint_url: String, detail: String },

    #[error("mint quote {0} was not paid before the deadline")]
    QuoteUnpaid(String),

    // ----- transport / infrastructure -----
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwapError {
    /// Whether a caller may retry the failed operation as-is.
    ///
    /// Only transport-level failures qualify; anything a mint or the crypto
    /// layer actually evaluated and rejected is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::Transport(_) | SwapError::Io(_))
    }
}
