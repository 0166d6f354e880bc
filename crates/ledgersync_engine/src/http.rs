//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`], so any
//! blocking client library can carry the bytes. This module owns the
//! endpoint layout, headers, and the translation of server error responses
//! into [`SyncError`].

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use ledgersync_protocol::{KeyInfo, SyncRequest, SyncResponse};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Content type of sync request and response bodies.
pub const SYNC_CONTENT_TYPE: &str = "application/actual-sync";

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "X-ACTUAL-TOKEN";

/// Header carrying the file id.
pub const FILE_ID_HEADER: &str = "X-ACTUAL-FILE-ID";

/// One outgoing POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Extra headers.
    pub headers: Vec<(&'static str, String)>,
    /// Request body.
    pub body: Vec<u8>,
    /// Request timeout.
    pub timeout: Duration,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this with the HTTP library of your choice. An `Err` means no
/// response was received at all.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request.
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    token: String,
    timeout: Duration,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for the server and token in `config`.
    pub fn new(config: &SyncConfig, client: C) -> Self {
        Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the message of the last failed call.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post(&self, request: HttpRequest, file_id: &str, key_id: &str) -> SyncResult<Vec<u8>> {
        let url = request.url.clone();
        let result = self
            .client
            .post(request)
            .map_err(SyncError::transport)
            .and_then(|response| {
                if response.is_success() {
                    Ok(response.body)
                } else {
                    Err(classify_failure(response.status, &response.body, file_id, key_id))
                }
            });

        match &result {
            Ok(body) => {
                debug!(url = %url, bytes = body.len(), "request succeeded");
                *self.last_error.write() = None;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "request failed");
                *self.last_error.write() = Some(e.to_string());
            }
        }
        result
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let http = HttpRequest {
            url: format!("{}/sync/sync", self.base_url),
            content_type: SYNC_CONTENT_TYPE,
            headers: vec![
                (TOKEN_HEADER, self.token.clone()),
                (FILE_ID_HEADER, request.file_id.clone()),
            ],
            body: request.encode(),
            timeout: self.timeout,
        };
        let key_id = request.key_id.as_deref().unwrap_or_default();
        let body = self.post(http, &request.file_id, key_id)?;
        Ok(SyncResponse::decode(&body)?)
    }

    fn get_key(&self, file_id: &str) -> SyncResult<KeyInfo> {
        let payload = serde_json::json!({ "fileId": file_id, "token": self.token });
        let http = HttpRequest {
            url: format!("{}/sync/user-get-key", self.base_url),
            content_type: "application/json",
            headers: vec![(TOKEN_HEADER, self.token.clone())],
            body: payload.to_string().into_bytes(),
            timeout: self.timeout,
        };
        let body = self.post(http, file_id, "")?;

        let mut envelope: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| SyncError::protocol(format!("key response is not JSON: {e}")))?;
        if envelope.get("status").and_then(|s| s.as_str()) != Some("ok") {
            let reason = error_reason(&body);
            return Err(classify_reason(&reason, None, file_id, "")
                .unwrap_or_else(|| SyncError::protocol(format!("key fetch failed: {reason}"))));
        }
        let data = envelope
            .get_mut("data")
            .map(serde_json::Value::take)
            .ok_or_else(|| SyncError::protocol("key response has no data"))?;
        Ok(KeyInfo::from_value(data)?)
    }
}

/// Extracts the error reason from a response body.
///
/// The server answers either with a bare token such as `file-has-reset` or
/// with `{"status":"error","reason":...}`.
fn error_reason(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("reason")
                .and_then(|r| r.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| text.trim().to_string())
}

fn classify_reason(
    reason: &str,
    status: Option<u16>,
    file_id: &str,
    key_id: &str,
) -> Option<SyncError> {
    let err = match reason {
        "unauthorized" | "token-expired" => SyncError::Authorization {
            message: reason.to_string(),
        },
        "file-not-found" => SyncError::UnknownFileId {
            file_id: file_id.to_string(),
        },
        "file-has-reset" | "file-old-version" => SyncError::InvalidFile {
            reason: reason.to_string(),
        },
        "file-has-new-key" => SyncError::KeyMismatch {
            expected: key_id.to_string(),
            found: "a newer key".to_string(),
        },
        _ => {
            return match status {
                Some(401 | 403) => Some(SyncError::Authorization {
                    message: reason.to_string(),
                }),
                _ => None,
            }
        }
    };
    Some(err)
}

/// Maps a non-2xx response to the error taxonomy.
fn classify_failure(status: u16, body: &[u8], file_id: &str, key_id: &str) -> SyncError {
    let reason = error_reason(body);
    classify_reason(&reason, Some(status), file_id, key_id).unwrap_or_else(|| SyncError::Transport {
        message: if reason.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {reason}")
        },
        status: Some(status),
    })
}
