use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    models::{alert::{Alert, AlertStatus}, audit_event::EventType},
    services::{
        siem_export::ExportEnvelope, Dashboard, EventDescriptor, ExportFormat, RequestContext,
        TransitionError,
    },
    state::AppState,
    types::AlertId,
};

const DEFAULT_BLOCK_REASON: &str = "Manual block by admin";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.dashboard.build().await?))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub limit: Option<i64>,
}

pub async fn export(
    State(state): State<AppState>,
    context: RequestContext,
    Query(q): Query<ExportQuery>,
) -> Result<Json<ExportEnvelope>, AppError> {
    let format = match q.format.as_deref() {
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|_| AppError::BadRequest("`format` must be `json` or `cef`".into()))?,
        None => ExportFormat::default(),
    };

    let envelope = state.exporter.export(format, q.limit).await?;

    let label = match format {
        ExportFormat::Json => "json",
        ExportFormat::Cef => "cef",
    };
    state
        .monitor
        .record(
            EventDescriptor::new(
                EventType::DataExport,
                format!("SIEM export of {} records ({})", envelope.len(), label),
            )
            .context(context)
            .extra("format", label)
            .extra("count", envelope.len()),
        )
        .await?;

    Ok(Json(envelope))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BlockIpPayload {
    #[serde(default)]
    #[validate(ip)]
    pub ip_address: String,
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlockIpResponse {
    pub message: String,
    pub created: bool,
}

/// Manual blocks never expire and replace any existing entry for the address.
pub async fn block_ip(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<BlockIpPayload>,
) -> Result<Json<BlockIpResponse>, AppError> {
    payload.validate()?;
    let ip = payload.ip_address;
    let reason = payload
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_string());

    let upsert = state.blocks.block(&ip, &reason, None, false).await?;

    state
        .monitor
        .record(
            EventDescriptor::new(
                EventType::SuspiciousActivity,
                format!("Admin manually blocked IP: {}", ip),
            )
            .context(context)
            .extra("blocked_ip", ip.clone())
            .extra("reason", reason),
        )
        .await?;

    Ok(Json(BlockIpResponse {
        message: format!("IP {} has been blocked", ip),
        created: upsert.created,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlertStatusPayload {
    pub status: String,
}

pub async fn update_alert_status(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    Json(payload): Json<UpdateAlertStatusPayload>,
) -> Result<Json<Alert>, AppError> {
    let alert_id: AlertId = alert_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid alert ID format".into()))?;
    let status: AlertStatus = serde_json::from_value(serde_json::Value::String(payload.status))
        .map_err(|err| AppError::BadRequest(format!("Invalid alert status: {}", err)))?;

    let alert = state
        .workflow
        .transition(alert_id, status)
        .await
        .map_err(|err| match err {
            TransitionError::NotFound => AppError::NotFound("Alert not found".into()),
            TransitionError::Invalid { .. } => AppError::BadRequest(err.to_string()),
            TransitionError::Store(err) => err.into(),
        })?;
    Ok(Json(alert))
}
