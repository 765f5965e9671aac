//! The HTTP adapter: axum routes mapping the request surface onto the
//! node facade. Handlers stay thin; every decision lives in the core.

use crate::node::Node;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/chain", get(chain))
        .route("/transaction", post(create_transaction))
        .route("/transaction/:hash/status", get(transaction_status))
        .route("/mine", post(mine))
        .route("/balance", get(balance))
        .route("/stake", post(stake))
        .route("/validate", post(validate))
        .route("/odero/create", post(odero_create))
        .route("/odero/redeem", post(odero_redeem))
        .route("/odero/verify", post(odero_verify))
        .route("/porc/enable", post(porc_enable))
        .route("/porc/submit_log", post(porc_submit_log))
        .route("/porc/stats", get(porc_stats))
        .route("/porc/pools", get(porc_pools))
        .with_state(node)
}

fn reject(message: impl ToString) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message.to_string() })),
    )
}

async fn root(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(node.status())
}

#[derive(Deserialize)]
struct ChainQuery {
    include_blocks: Option<String>,
    limit: Option<usize>,
}

async fn chain(State(node): State<Arc<Node>>, Query(query): Query<ChainQuery>) -> Json<Value> {
    let include_blocks = query.include_blocks.as_deref() == Some("true");
    Json(node.chain_info(include_blocks, query.limit.unwrap_or(10)))
}

#[derive(Deserialize)]
struct TransactionRequest {
    sender: String,
    recipient: String,
    amount: f64,
}

async fn create_transaction(
    State(node): State<Arc<Node>>,
    Json(body): Json<TransactionRequest>,
) -> ApiResult {
    let tx = node
        .create_transaction(&body.sender, &body.recipient, body.amount)
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Transaction added to pending pool",
            "transaction_hash": tx.hash,
        })),
    ))
}

async fn transaction_status(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Json<Value> {
    let mut value = serde_json::to_value(node.transaction_status(&hash)).unwrap_or(Value::Null);
    value["transaction_hash"] = json!(hash);
    Json(value)
}

#[derive(Deserialize)]
struct MineRequest {
    miner_address: String,
}

async fn mine(State(node): State<Arc<Node>>, Json(body): Json<MineRequest>) -> ApiResult {
    if body.miner_address.is_empty() {
        return Err(reject("Missing miner_address field"));
    }
    let worker = Arc::clone(&node);
    let block = tokio::task::spawn_blocking(move || worker.mine(&body.miner_address))
        .await
        .map_err(|err| reject(format!("mining task failed: {err}")))?
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Block mined successfully",
            "block_hash": block.hash,
            "block_index": block.index,
        })),
    ))
}

#[derive(Deserialize)]
struct BalanceQuery {
    address: String,
}

async fn balance(State(node): State<Arc<Node>>, Query(query): Query<BalanceQuery>) -> Json<Value> {
    Json(json!({
        "address": query.address,
        "balance": node.ledger.get_balance(&query.address),
    }))
}

#[derive(Deserialize)]
struct StakeRequest {
    address: String,
    amount: f64,
}

async fn stake(State(node): State<Arc<Node>>, Json(body): Json<StakeRequest>) -> ApiResult {
    node.ledger.stake(&body.address, body.amount).map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Tokens staked successfully",
            "address": body.address,
            "staked_amount": body.amount,
        })),
    ))
}

#[derive(Deserialize)]
struct ValidateRequest {
    validator_address: String,
    signature: String,
    public_key: Option<String>,
}

async fn validate(State(node): State<Arc<Node>>, Json(body): Json<ValidateRequest>) -> ApiResult {
    let block = node
        .validate_pos(
            &body.validator_address,
            &body.signature,
            body.public_key.as_deref(),
        )
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Block validated and added successfully",
            "block_hash": block.hash,
            "validator": body.validator_address,
        })),
    ))
}

#[derive(Deserialize)]
struct OderoCreateRequest {
    creator: String,
    amount: f64,
}

async fn odero_create(
    State(node): State<Arc<Node>>,
    Json(body): Json<OderoCreateRequest>,
) -> ApiResult {
    let (token, tx) = node.odero_create(&body.creator, body.amount).map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Odero SLW token created successfully",
            "tokenId": token.token_id,
            "amount": token.amount,
            "creator": token.creator,
            "qrCode": token.qr_payload(),
            "transaction_hash": tx.hash,
            "metadata": token.metadata(),
        })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OderoRedeemRequest {
    redeemer: String,
    token_id: String,
}

async fn odero_redeem(
    State(node): State<Arc<Node>>,
    Json(body): Json<OderoRedeemRequest>,
) -> ApiResult {
    let tx = node
        .odero_redeem(&body.redeemer, &body.token_id)
        .map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Odero SLW token redemption request added to the pending pool",
            "redeemer": body.redeemer,
            "transaction_hash": tx.hash,
        })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OderoVerifyRequest {
    token_id: String,
}

async fn odero_verify(
    State(node): State<Arc<Node>>,
    Json(body): Json<OderoVerifyRequest>,
) -> Json<Value> {
    let (token_id, is_valid) = node.odero_verify(&body.token_id);
    Json(json!({
        "tokenId": token_id,
        "isValid": is_valid,
        "message": if is_valid { "Token is valid" } else { "Token verification failed" },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PorcEnableRequest {
    address: String,
    #[serde(default = "default_bandwidth_limit")]
    bandwidth_limit: u64,
    public_key: Option<String>,
}

fn default_bandwidth_limit() -> u64 {
    50
}

async fn porc_enable(
    State(node): State<Arc<Node>>,
    Json(body): Json<PorcEnableRequest>,
) -> ApiResult {
    let status = node
        .porc
        .enable(&body.address, body.bandwidth_limit, body.public_key)
        .map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "PoRC enabled successfully",
            "status": status,
        })),
    ))
}

async fn porc_submit_log(
    State(node): State<Arc<Node>>,
    Json(contribution): Json<nilotic_shared_types::porc::PorcContribution>,
) -> ApiResult {
    node.porc.submit_contribution(contribution).map_err(reject)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Contribution submitted successfully",
        })),
    ))
}

async fn porc_stats(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "stats": node.porc.stats(),
    }))
}

async fn porc_pools(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "pools": node.porc.active_pools(),
    }))
}
