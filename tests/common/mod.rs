//! In-process fake mint implementing the wire contract the broker consumes:
//! keysets, bolt11 mint quotes (instantly paid), blind signing, the swap
//! endpoint with BDHKE + P2PK witness verification, and proof state checks.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use k256::Scalar;
use rand::{Rng, RngCore};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use mintswap::crypto::{
    hash_to_curve, mul_base, parse_point, parse_scalar, point_to_bytes, verify, Signature,
};
use mintswap::p2pk::{sig_all_message, P2pkSecret, P2pkWitness, SigFlag};
use mintswap::types::{BlindedMessage, Proof};

const MAX_DENOMINATION_BIT: u32 = 20;

struct MintState {
    keyset_id: String,
    keys: BTreeMap<u64, Scalar>,
    /// quote id -> amount, pending redemption
    quotes: Mutex<HashMap<String, u64>>,
    /// Y (hex) of every spent secret
    spent: Mutex<HashSet<String>>,
}

impl MintState {
    fn new() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);

        let mut keys = BTreeMap::new();
        for bit in 0..=MAX_DENOMINATION_BIT {
            let amount = 1u64 << bit;
            keys.insert(amount, derive_key(&seed, amount));
        }

        let mut hasher = Sha256::new();
        for key in keys.values() {
            hasher.update(point_to_bytes(&mul_base(key)));
        }
        let keyset_id = format!("00{}", hex::encode(&hasher.finalize()[..7]));

        Self {
            keyset_id,
            keys,
            quotes: Mutex::new(HashMap::new()),
            spent: Mutex::new(HashSet::new()),
        }
    }

    fn key_for(&self, amount: u64) -> Result<&Scalar, Reject> {
        self.keys
            .get(&amount)
            .ok_or_else(|| Reject(format!("no key for amount {amount}")))
    }

    fn sign_output(&self, output: &BlindedMessage) -> Result<Value, Reject> {
        let key = self.key_for(output.amount)?;
        let blinded = hex::decode(&output.blinded)
            .ok()
            .and_then(|bytes| parse_point(&bytes).ok())
            .ok_or_else(|| Reject("invalid blinded message".to_string()))?;
        let signed = blinded * key;
        Ok(json!({
            "amount": output.amount,
            "id": self.keyset_id,
            "C_": hex::encode(point_to_bytes(&signed)),
        }))
    }
}

fn derive_key(seed: &[u8], amount: u64) -> Scalar {
    for counter in 0u32.. {
        let digest = Sha256::new()
            .chain_update(seed)
            .chain_update(amount.to_be_bytes())
            .chain_update(counter.to_le_bytes())
            .finalize();
        if let Ok(scalar) = parse_scalar(&digest) {
            return scalar;
        }
    }
    unreachable!("a valid scalar appears within a few hashes")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// 400 with the `{"detail": …}` body the client maps to a mint rejection.
struct Reject(String);

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "detail": self.0 }))).into_response()
    }
}

#[derive(Deserialize)]
struct MintQuoteBody {
    amount: u64,
    #[allow(unused)]
    unit: String,
}

#[derive(Deserialize)]
struct MintBody {
    quote: String,
    outputs: Vec<BlindedMessage>,
}

#[derive(Deserialize)]
struct SwapBody {
    inputs: Vec<Proof>,
    outputs: Vec<BlindedMessage>,
}

#[derive(Deserialize)]
struct CheckStateBody {
    #[serde(rename = "Ys")]
    ys: Vec<String>,
}

#[derive(Deserialize)]
struct MeltQuoteBody {
    #[allow(unused)]
    request: String,
    #[allow(unused)]
    unit: String,
}

async fn get_info() -> Json<Value> {
    Json(json!({
        "name": "fake-mint",
        "version": "fake/0.1",
        "nuts": { "11": { "supported": true } },
    }))
}

async fn get_keys(State(state): State<Arc<MintState>>) -> Json<Value> {
    let mut keys = serde_json::Map::new();
    for (amount, key) in &state.keys {
        keys.insert(
            amount.to_string(),
            Value::String(hex::encode(point_to_bytes(&mul_base(key)))),
        );
    }
    Json(json!({
        "keysets": [{
            "id": state.keyset_id,
            "unit": "sat",
            "active": true,
            "keys": keys,
        }]
    }))
}

async fn get_keysets(State(state): State<Arc<MintState>>) -> Json<Value> {
    Json(json!({
        "keysets": [{ "id": state.keyset_id, "unit": "sat", "active": true }]
    }))
}

async fn post_mint_quote(
    State(state): State<Arc<MintState>>,
    Json(body): Json<MintQuoteBody>,
) -> Json<Value> {
    let quote_id = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
    state.quotes.lock().await.insert(quote_id.clone(), body.amount);
    Json(json!({
        "quote": quote_id,
        "request": format!("lnbcfake{}", body.amount),
        "paid": true,
        "expiry": unix_now() + 600,
    }))
}

async fn get_mint_quote(
    State(state): State<Arc<MintState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Reject> {
    let quotes = state.quotes.lock().await;
    let amount = quotes
        .get(&id)
        .ok_or_else(|| Reject("unknown quote".to_string()))?;
    Ok(Json(json!({
        "quote": id,
        "request": format!("lnbcfake{amount}"),
        "paid": true,
        "expiry": unix_now() + 600,
    })))
}

async fn post_mint(
    State(state): State<Arc<MintState>>,
    Json(body): Json<MintBody>,
) -> Result<Json<Value>, Reject> {
    let amount = {
        let mut quotes = state.quotes.lock().await;
        quotes
            .remove(&body.quote)
            .ok_or_else(|| Reject("quote unknown or already issued".to_string()))?
    };
    let total: u64 = body.outputs.iter().map(|o| o.amount).sum();
    if total != amount {
        return Err(Reject(format!(
            "outputs total {total} does not match quote amount {amount}"
        )));
    }

    let signatures = body
        .outputs
        .iter()
        .map(|output| state.sign_output(output))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(json!({ "signatures": signatures })))
}

/// Verify one input: the BDHKE equation `C == k * hash_to_curve(secret)`
/// plus the P2PK witness when the secret demands one.
fn verify_input(state: &MintState, proof: &Proof, all_secrets: &[String]) -> Result<String, Reject> {
    let y = hash_to_curve(proof.secret.as_bytes())
        .map_err(|_| Reject("invalid secret".to_string()))?;
    let key = state.key_for(proof.amount)?;
    let expected = y * key;

    let c = hex::decode(&proof.c)
        .ok()
        .and_then(|bytes| parse_point(&bytes).ok())
        .ok_or_else(|| Reject("invalid proof C".to_string()))?;
    if point_to_bytes(&c) != point_to_bytes(&expected) {
        return Err(Reject("proof verification failed".to_string()));
    }

    if let Ok(secret) = P2pkSecret::from_str(&proof.secret) {
        let recipient = secret
            .recipient()
            .map_err(|_| Reject("invalid P2PK recipient".to_string()))?;
        match secret.sig_flag() {
            SigFlag::SigInputs => {
                let witness = proof
                    .witness
                    .as_deref()
                    .ok_or_else(|| Reject("missing witness".to_string()))?;
                let witness = P2pkWitness::from_str(witness)
                    .map_err(|_| Reject("malformed witness".to_string()))?;
                let signature = witness
                    .signatures
                    .first()
                    .and_then(|hex| Signature::from_hex(hex).ok())
                    .ok_or_else(|| Reject("malformed witness signature".to_string()))?;
                verify(&recipient, &secret.message(), &signature)
                    .map_err(|_| Reject("witness signature invalid".to_string()))?;
            }
            SigFlag::SigAll => {
                // the joint witness rides on the first input; other inputs
                // carry none and are covered by it
                if let Some(witness) = proof.witness.as_deref() {
                    let witness = P2pkWitness::from_str(witness)
                        .map_err(|_| Reject("malformed witness".to_string()))?;
                    let signature = witness
                        .signatures
                        .first()
                        .and_then(|hex| Signature::from_hex(hex).ok())
                        .ok_or_else(|| Reject("malformed witness signature".to_string()))?;
                    verify(&recipient, &sig_all_message(all_secrets), &signature)
                        .map_err(|_| Reject("joint witness invalid".to_string()))?;
                }
            }
        }
    }

    Ok(hex::encode(point_to_bytes(&y)))
}

async fn post_swap(
    State(state): State<Arc<MintState>>,
    Json(body): Json<SwapBody>,
) -> Result<Json<Value>, Reject> {
    let input_total: u64 = body.inputs.iter().map(|p| p.amount).sum();
    let output_total: u64 = body.outputs.iter().map(|o| o.amount).sum();
    if input_total != output_total {
        return Err(Reject(format!(
            "inputs total {input_total}, outputs total {output_total}"
        )));
    }

    // SIG_ALL: the joint witness must sit on the first input
    let all_secrets: Vec<String> = body.inputs.iter().map(|p| p.secret.clone()).collect();
    if let Some(first) = body.inputs.first() {
        if let Ok(secret) = P2pkSecret::from_str(&first.secret) {
            if secret.sig_flag() == SigFlag::SigAll && first.witness.is_none() {
                return Err(Reject("missing joint witness".to_string()));
            }
        }
    }

    let mut ys = Vec::with_capacity(body.inputs.len());
    for proof in &body.inputs {
        ys.push(verify_input(&state, proof, &all_secrets)?);
    }

    {
        let mut spent = state.spent.lock().await;
        let mut batch = HashSet::new();
        for y in &ys {
            if spent.contains(y) || !batch.insert(y.clone()) {
                return Err(Reject("token already spent".to_string()));
            }
        }
        for y in ys {
            spent.insert(y);
        }
    }

    let signatures = body
        .outputs
        .iter()
        .map(|output| state.sign_output(output))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(json!({ "signatures": signatures })))
}

async fn post_checkstate(
    State(state): State<Arc<MintState>>,
    Json(body): Json<CheckStateBody>,
) -> Json<Value> {
    let spent = state.spent.lock().await;
    let states: Vec<Value> = body
        .ys
        .iter()
        .map(|y| {
            let status = if spent.contains(y) { "SPENT" } else { "UNSPENT" };
            json!({ "Y": y, "state": status })
        })
        .collect();
    Json(json!({ "states": states }))
}

async fn post_melt_quote(Json(_body): Json<MeltQuoteBody>) -> Json<Value> {
    Json(json!({
        "quote": hex::encode(rand::thread_rng().gen::<[u8; 16]>()),
        "amount": 0,
        "fee_reserve": 0,
        "paid": false,
        "expiry": unix_now() + 600,
    }))
}

fn router(state: Arc<MintState>) -> Router {
    Router::new()
        .route("/v1/info", get(get_info))
        .route("/v1/keys", get(get_keys))
        .route("/v1/keysets", get(get_keysets))
        .route("/v1/mint/quote/bolt11", post(post_mint_quote))
        .route("/v1/mint/quote/bolt11/:id", get(get_mint_quote))
        .route("/v1/mint/bolt11", post(post_mint))
        .route("/v1/swap", post(post_swap))
        .route("/v1/checkstate", post(post_checkstate))
        .route("/v1/melt/quote/bolt11", post(post_melt_quote))
        .with_state(state)
}

/// Start a fake mint on an ephemeral port; returns its base URL.
pub async fn spawn_mint() -> String {
    let state = Arc::new(MintState::new());
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake mint");
    let addr = listener.local_addr().expect("fake mint addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake mint serve");
    });
    format!("http://{addr}")
}
