//! Stateless HTTP client for the mint wire protocol
//!
//! Translates semantic operations into the mint's REST endpoints and decodes
//! responses into the crate's data model. Holds no per-mint state beyond the
//! base URL, never rewrites proof or witness bytes, and tolerates unknown
//! response fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, SwapError};
use crate::types::{BlindedMessage, BlindedSignature, Keyset, KeysetInfo, Proof};

/// Mint info including the NUT capability table.
#[derive(Debug, Clone, Deserialize)]
pub struct MintInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub nuts: HashMap<String, serde_json::Value>,
}

impl MintInfo {
    fn nut_supported(&self, nut: &str) -> bool {
        self.nuts
            .get(nut)
            .and_then(|entry| entry.get("supported"))
            .and_then(|flag| flag.as_bool())
            .unwrap_or(false)
    }

    /// NUT-11 pay-to-public-key spending conditions.
    pub fn supports_p2pk(&self) -> bool {
        self.nut_supported("11")
    }

    /// NUT-14 hash-timelock contracts.
    pub fn supports_htlc(&self) -> bool {
        self.nut_supported("14")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintQuoteResponse {
    pub quote: String,
    /// Payment request (bolt11 invoice) to fund the quote.
    pub request: String,
    pub paid: bool,
    #[serde(default)]
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeltQuoteResponse {
    pub quote: String,
    pub amount: u64,
    pub fee_reserve: u64,
    pub paid: bool,
    #[serde(default)]
    pub expiry: Option<u64>,
}

/// One entry of a `POST /v1/checkstate` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProofStateEntry {
    #[serde(rename = "Y")]
    pub y: String,
    pub state: String,
    #[serde(default)]
    pub witness: Option<String>,
}

#[derive(Deserialize)]
struct KeysResponse {
    keysets: Vec<Keyset>,
}

#[derive(Deserialize)]
struct KeysetsResponse {
    keysets: Vec<KeysetInfo>,
}

#[derive(Serialize)]
struct MintQuoteRequest<'a> {
    amount: u64,
    unit: &'a str,
}

#[derive(Serialize)]
struct MeltQuoteRequest<'a> {
    request: &'a str,
    unit: &'a str,
}

#[derive(Serialize)]
struct MintRequest<'a> {
    quote: &'a str,
    outputs: &'a [BlindedMessage],
}

#[derive(Serialize)]
struct SwapRequestBody<'a> {
    inputs: &'a [Proof],
    outputs: &'a [BlindedMessage],
}

#[derive(Serialize)]
struct CheckStateRequest<'a> {
    #[serde(rename = "Ys")]
    ys: &'a [String],
}

#[derive(Deserialize)]
struct SignaturesResponse {
    signatures: Vec<BlindedSignature>,
}

#[derive(Deserialize)]
struct CheckStateResponse {
    states: Vec<ProofStateEntry>,
}

#[derive(Deserialize)]
struct MintErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

/// Thin caller for one mint's endpoints.
#[derive(Debug, Clone)]
pub struct MintClient {
    base_url: String,
    http: reqwest::Client,
}

impl MintClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response: 5xx stays a retryable transport error,
    /// anything else is a final mint rejection.
    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        if status.is_server_error() {
            return Err(response.error_for_status().unwrap_err().into());
        }
        let detail = response
            .json::<MintErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(SwapError::MintRejected {
            mint_url: self.base_url.clone(),
            detail,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)).send().await?;
        self.decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        self.decode(response).await
    }

    pub async fn get_info(&self) -> Result<MintInfo> {
        self.get("/v1/info").await
    }

    pub async fn get_keys(&self) -> Result<Vec<Keyset>> {
        let response: KeysResponse = self.get("/v1/keys").await?;
        Ok(response.keysets)
    }

    pub async fn get_keysets(&self) -> Result<Vec<KeysetInfo>> {
        let response: KeysetsResponse = self.get("/v1/keysets").await?;
        Ok(response.keysets)
    }

    pub async fn request_mint_quote(&self, amount: u64, unit: &str) -> Result<MintQuoteResponse> {
        self.post("/v1/mint/quote/bolt11", &MintQuoteRequest { amount, unit })
            .await
    }

    pub async fn check_mint_quote(&self, quote_id: &str) -> Result<MintQuoteResponse> {
        self.get(&format!("/v1/mint/quote/bolt11/{quote_id}")).await
    }

    pub async fn request_melt_quote(&self, request: &str, unit: &str) -> Result<MeltQuoteResponse> {
        self.post("/v1/melt/quote/bolt11", &MeltQuoteRequest { request, unit })
            .await
    }

    /// Redeem a paid mint quote into blind signatures over `outputs`.
    /// Signatures come back in output order.
    pub async fn mint(
        &self,
        quote_id: &str,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>> {
        let response: SignaturesResponse = self
            .post(
                "/v1/mint/bolt11",
                &MintRequest {
                    quote: quote_id,
                    outputs,
                },
            )
            .await?;
        Ok(response.signatures)
    }

    /// The mint's atomic retire-inputs-issue-outputs endpoint.
    pub async fn swap(
        &self,
        inputs: &[Proof],
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>> {
        let response: SignaturesResponse = self
            .post("/v1/swap", &SwapRequestBody { inputs, outputs })
            .await?;
        Ok(response.signatures)
    }

    pub async fn check_proof_states(&self, ys: &[String]) -> Result<Vec<ProofStateEntry>> {
        let response: CheckStateResponse =
            self.post("/v1/checkstate", &CheckStateRequest { ys }).await?;
        Ok(response.states)
    }
}
