//! Transport boundary for sync operations.

use crate::error::{SyncError, SyncResult};
use ledgersync_protocol::{KeyInfo, SyncRequest, SyncResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Delivers sync requests to the remote store.
///
/// Implementations translate server error responses into [`SyncError`]
/// before returning; the session never sees raw status codes.
pub trait SyncTransport: Send + Sync {
    /// Sends one request and returns the server's response.
    fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse>;

    /// Fetches the key information for an encrypted file.
    fn get_key(&self, file_id: &str) -> SyncResult<KeyInfo>;
}

/// A scripted transport for testing.
///
/// Responses are served in the order they were queued; every request is
/// recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<SyncResult<SyncResponse>>>,
    key: Mutex<Option<KeyInfo>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl MockTransport {
    /// Creates a transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_response(&self, response: SyncResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Sets the key information served by [`SyncTransport::get_key`].
    pub fn set_key(&self, key: KeyInfo) {
        *self.key.lock() = Some(key);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SyncResponse::default()))
    }

    fn get_key(&self, file_id: &str) -> SyncResult<KeyInfo> {
        self.key
            .lock()
            .clone()
            .ok_or_else(|| SyncError::UnknownFileId {
                file_id: file_id.to_string(),
            })
    }
}
