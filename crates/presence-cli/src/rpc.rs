//! JSON-RPC submission to the attendance service.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use presence_capture::{SubmissionDetails, SubmissionOutcome, SubmissionSink, SubmitError};
use presence_core::{Frame, GeoLocation};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams,
    id: i64,
}

#[derive(Serialize)]
struct RpcParams {
    image_data: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcResult {
    #[serde(default)]
    success: bool,
    msg: Option<String>,
    employee_name: Option<String>,
    location: Option<String>,
    action: Option<String>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    message: Option<String>,
}

/// Encode frame bytes as a `data:` URL, naming the format when it is recognisable.
pub fn data_url(bytes: &[u8]) -> String {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        _ => "image/jpeg",
    };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn request_body(frame: &Frame, location: Option<&GeoLocation>, id: i64) -> String {
    let request = RpcRequest {
        jsonrpc: "2.0",
        method: "call",
        params: RpcParams {
            image_data: data_url(frame.data()),
            latitude: location.map(|l| l.latitude),
            longitude: location.map(|l| l.longitude),
        },
        id,
    };
    // Serializing plain strings and floats cannot fail
    serde_json::to_string(&request).unwrap_or_default()
}

/// Interpret a JSON-RPC response body.
fn parse_response(body: &str) -> Result<SubmissionOutcome, SubmitError> {
    let response: RpcResponse =
        serde_json::from_str(body).map_err(|e| SubmitError::InvalidResponse(e.to_string()))?;

    match (response.result, response.error) {
        (Some(result), _) if result.success => Ok(SubmissionOutcome {
            success: true,
            message: result.msg.unwrap_or_default(),
            details: Some(SubmissionDetails {
                employee_name: result.employee_name,
                location: result.location,
                action: result.action,
            }),
        }),
        (Some(result), _) => Ok(SubmissionOutcome::failure(
            result.msg.unwrap_or_else(|| "Unknown error".to_string()),
        )),
        (None, Some(error)) => Ok(SubmissionOutcome::failure(
            error.message.unwrap_or_else(|| "Unknown error".to_string()),
        )),
        (None, None) => Err(SubmitError::InvalidResponse(
            "neither result nor error present".to_string(),
        )),
    }
}

/// Non-2xx reply, carrying the canonical reason phrase of the status.
fn http_error(status: u16) -> SubmitError {
    let reason = ureq::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown Status");
    SubmitError::Http {
        status,
        reason: reason.to_string(),
    }
}

pub struct RpcSubmissionSink {
    url: String,
    agent: ureq::Agent,
}

impl RpcSubmissionSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl SubmissionSink for RpcSubmissionSink {
    async fn submit(
        &self,
        frame: &Frame,
        location: Option<&GeoLocation>,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let body = request_body(frame, location, chrono::Utc::now().timestamp_millis());
        let agent = self.agent.clone();
        let url = self.url.clone();
        tracing::info!(url = %url, bytes = body.len(), "submitting attendance");

        // ureq is blocking
        let text = tokio::task::spawn_blocking(move || -> Result<String, SubmitError> {
            let mut response = agent
                .post(&url)
                .header("Content-Type", "application/json")
                .header("X-Requested-With", "XMLHttpRequest")
                .send(body)
                .map_err(|e| match e {
                    ureq::Error::StatusCode(status) => http_error(status),
                    other => SubmitError::Transport(other.to_string()),
                })?;
            response
                .body_mut()
                .read_to_string()
                .map_err(|e| SubmitError::Transport(e.to_string()))
        })
        .await
        .map_err(|e| SubmitError::Transport(e.to_string()))??;

        parse_response(&text)
    }
}

/// The sink behind `presence run`: a real endpoint, or a dry run that only logs.
pub enum CliSink {
    Rpc(RpcSubmissionSink),
    DryRun,
}

impl SubmissionSink for CliSink {
    async fn submit(
        &self,
        frame: &Frame,
        location: Option<&GeoLocation>,
    ) -> Result<SubmissionOutcome, SubmitError> {
        match self {
            CliSink::Rpc(sink) => sink.submit(frame, location).await,
            CliSink::DryRun => {
                tracing::info!(
                    bytes = frame.data().len(),
                    captured_at = %frame.timestamp(),
                    "dry run: submission skipped"
                );
                Ok(SubmissionOutcome {
                    success: true,
                    message: "Dry run: no submission endpoint configured".to_string(),
                    details: None,
                })
            }
        }
    }
}
