//! IPC method handlers.
//!
//! Each handler owns one namespace. Rejections surface as JSON-RPC errors
//! whose code is the HTTP-equivalent status class; internal failures keep
//! their generic retry message so storage details never reach clients.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use murmur_core::format_usdc;
use murmur_ipc::server::{HandlerResult, IpcHandler};
use murmur_store::{TipRecord, TipStore};
use murmur_tips::{ConfessionService, TipPipeline};

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, (i32, String)> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| (400, format!("invalid params: {}", e)))
}

fn parse_params_or_default<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, (i32, String)> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => {
            serde_json::from_value(v).map_err(|e| (400, format!("invalid params: {}", e)))
        }
    }
}

fn tip_record_json(record: &TipRecord) -> Value {
    json!({
        "id": record.id,
        "subjectId": record.confession_id,
        "payer": record.payer_address,
        "amount": format_usdc(record.amount),
        "reference": record.tx_hash,
        "createdAt": record.created_at,
    })
}

// ---------------------------------------------------------------------------
// tips.*
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmitParams {
    subject_id: String,
    claimed_payer: String,
    reference: String,
}

pub struct TipsHandler {
    pub pipeline: Arc<TipPipeline>,
}

impl IpcHandler for TipsHandler {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move {
            match method.as_str() {
                "admit" => {
                    let p: AdmitParams = parse_params(params)?;
                    let admitted = self
                        .pipeline
                        .admit_tip(&p.subject_id, &p.claimed_payer, &p.reference)
                        .await
                        .map_err(|rej| (rej.status(), rej.to_string()))?;
                    Ok(json!({
                        "record": tip_record_json(&admitted.record),
                        "subject": admitted.subject,
                    }))
                }
                _ => Err((-32601, format!("unknown method: tips.{}", method))),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// confessions.*
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SubmitParams {
    owner: String,
    body: String,
}

#[derive(Deserialize)]
struct GetParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct TopParams {
    limit: u32,
}

impl Default for TopParams {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

pub struct ConfessionsHandler {
    pub confessions: Arc<ConfessionService>,
}

impl IpcHandler for ConfessionsHandler {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move {
            match method.as_str() {
                "submit" => {
                    let p: SubmitParams = parse_params(params)?;
                    let snapshot = self
                        .confessions
                        .submit(&p.owner, &p.body)
                        .await
                        .map_err(|e| (e.status(), e.to_string()))?;
                    Ok(json!(snapshot))
                }
                "get" => {
                    let p: GetParams = parse_params(params)?;
                    let snapshot = self
                        .confessions
                        .get(&p.id)
                        .map_err(|e| (e.status(), e.to_string()))?
                        .ok_or((404, "confession not found".to_string()))?;
                    Ok(json!(snapshot))
                }
                "top" => {
                    let p: TopParams = parse_params_or_default(params)?;
                    let top = self
                        .confessions
                        .top(p.limit)
                        .map_err(|e| (e.status(), e.to_string()))?;
                    Ok(json!(top))
                }
                _ => Err((-32601, format!("unknown method: confessions.{}", method))),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// users.*
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UserParams {
    address: String,
}

pub struct UsersHandler {
    pub confessions: Arc<ConfessionService>,
}

impl IpcHandler for UsersHandler {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move {
            match method.as_str() {
                "get" => {
                    let p: UserParams = parse_params(params)?;
                    let profile = self
                        .confessions
                        .user_profile(&p.address)
                        .map_err(|e| (e.status(), e.to_string()))?
                        .ok_or((404, "user not found".to_string()))?;
                    Ok(json!(profile))
                }
                _ => Err((-32601, format!("unknown method: users.{}", method))),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// default namespace
// ---------------------------------------------------------------------------

pub struct StatusHandler {
    pub store: Arc<TipStore>,
}

impl IpcHandler for StatusHandler {
    fn handle(
        &self,
        method: &str,
        _params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move {
            match method.as_str() {
                "status" => {
                    let tips = self
                        .store
                        .tip_count()
                        .map_err(|e| (500, format!("status unavailable: {}", e)))?;
                    Ok(json!({
                        "status": "ok",
                        "tips": tips,
                    }))
                }
                _ => Err((-32601, format!("unknown method: {}", method))),
            }
        })
    }
}
