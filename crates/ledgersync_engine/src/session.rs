//! The sync session: one remote file, one key, one cursor.

use crate::applier::ChangeApplier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::{SyncOutcome, SyncState, SyncStats};
use crate::transport::SyncTransport;
use ledgersync_core::crypto::{open_envelope, SessionKey};
use ledgersync_protocol::{
    ChangeMessage, HulcClock, LogicalTimestamp, MessageEnvelope, Outbox, SyncRequest,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives the request/response exchange for one remote file.
///
/// # Invariants
///
/// - At most one sync is in flight: `sync` takes `&mut self`
/// - A response is applied as one atomic batch, and the cursor moves with it
/// - After an error the session stays `Failed` until [`SyncSession::reset`]
/// - Nothing is retried automatically
pub struct SyncSession<T: SyncTransport, A: ChangeApplier> {
    config: SyncConfig,
    transport: T,
    applier: A,
    clock: HulcClock,
    key: Option<SessionKey>,
    outbox: Outbox,
    state: SyncState,
    stats: SyncStats,
}

impl<T: SyncTransport, A: ChangeApplier> SyncSession<T, A> {
    /// Creates a session.
    ///
    /// The clock starts after the applier's cursor, so local edits sort after
    /// every change already consumed.
    ///
    /// # Errors
    ///
    /// Fails if the configured client id is not a valid node id, or the
    /// applier cannot read its cursor.
    pub fn new(config: SyncConfig, transport: T, applier: A) -> SyncResult<Self> {
        let mut clock = match &config.client_id {
            Some(id) => HulcClock::new(id.clone())?,
            None => HulcClock::generate(),
        };
        if let Some(cursor) = applier.cursor()? {
            observe_cursor(&mut clock, &cursor);
        }
        debug!(client_id = %clock.node(), file_id = %config.file_id, "session created");

        Ok(Self {
            config,
            transport,
            applier,
            clock,
            key: None,
            outbox: Outbox::new(),
            state: SyncState::Idle,
            stats: SyncStats::default(),
        })
    }

    /// Installs an already validated key.
    pub fn with_key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the current stats.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Node id stamped on local changes.
    pub fn client_id(&self) -> &str {
        self.clock.node()
    }

    /// Id of the loaded key, if any.
    pub fn key_id(&self) -> Option<&str> {
        self.key.as_ref().map(SessionKey::key_id)
    }

    /// Number of local envelopes waiting for upload.
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The applier.
    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// Last consumed remote timestamp.
    ///
    /// # Errors
    ///
    /// Fails if the applier cannot read its cursor.
    pub fn cursor(&self) -> SyncResult<Option<LogicalTimestamp>> {
        self.applier.cursor()
    }

    /// Points the session at a new key id, after the server reported a key
    /// change. The old key is dropped; call [`SyncSession::unlock`] next.
    pub fn set_key_id(&mut self, key_id: impl Into<String>) {
        self.config.key_id = Some(key_id.into());
        self.key = None;
    }

    /// Fetches the file's key information, derives the key from `password`
    /// and validates it. Resets a failed session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::KeyMismatch`] if the server's key id differs from
    /// the configured one, and [`SyncError::Decryption`] for a wrong password.
    pub fn unlock(&mut self, password: &str) -> SyncResult<()> {
        let info = self.transport.get_key(&self.config.file_id)?;
        if let Some(expected) = &self.config.key_id {
            if *expected != info.key_id {
                return Err(SyncError::KeyMismatch {
                    expected: expected.clone(),
                    found: info.key_id,
                });
            }
        }

        let key = SessionKey::unlock(password, &info)?;
        info!(key_id = %info.key_id, "file key unlocked");
        self.config.key_id = Some(info.key_id);
        self.key = Some(key);
        self.reset();
        Ok(())
    }

    /// Clears `Failed` so the next sync may run.
    pub fn reset(&mut self) {
        if self.state == SyncState::Failed {
            debug!("session reset");
            self.state = SyncState::Idle;
        }
    }

    /// Applies local edits to the mirror and queues them for upload.
    ///
    /// Each change gets a fresh timestamp and is encrypted when a key is
    /// loaded. Returns the number of changes queued.
    ///
    /// # Errors
    ///
    /// Fails without touching the mirror or the outbox if the session is
    /// `Failed`, the loaded key does not match the configured key id, the
    /// clock cannot stamp every change, or the mirror rejects the batch.
    pub fn queue_changes(&mut self, changes: &[ChangeMessage]) -> SyncResult<usize> {
        if self.state == SyncState::Failed {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: "queue changes".into(),
            });
        }
        self.check_key()?;

        let mut envelopes = Vec::with_capacity(changes.len());
        for change in changes {
            let timestamp = self.clock.now()?;
            envelopes.push(match &self.key {
                Some(key) => key.seal(timestamp, change)?,
                None => MessageEnvelope::plain(timestamp, change)?,
            });
        }
        self.applier.apply_batch(changes, None)?;

        for envelope in envelopes {
            self.outbox.push(envelope);
        }
        debug!(queued = changes.len(), pending = self.outbox.len(), "local changes queued");
        Ok(changes.len())
    }

    /// Runs one sync exchange.
    ///
    /// Uploads every queued envelope, then applies the returned changes as
    /// one batch and advances the cursor to the last returned timestamp. An
    /// empty response leaves the cursor unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if the session is
    /// `Failed`. Any other error aborts the batch, leaves the mirror as it
    /// was, and moves the session to `Failed`.
    pub fn sync(&mut self) -> SyncResult<SyncOutcome> {
        self.transition(SyncState::Requesting)?;
        let start = Instant::now();

        match self.run_cycle() {
            Ok(outcome) => {
                self.state = SyncState::Idle;
                self.stats.cycles_completed += 1;
                self.stats.envelopes_sent += outcome.sent as u64;
                self.stats.changes_applied += outcome.applied as u64;
                self.stats.last_duration = Some(start.elapsed());
                self.stats.last_sync_time = Some(Instant::now());
                self.stats.last_error = None;
                info!(
                    sent = outcome.sent,
                    applied = outcome.applied,
                    cursor = ?outcome.cursor.as_ref().map(ToString::to_string),
                    "sync complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, state = ?self.state, "sync failed");
                self.state = SyncState::Failed;
                self.stats.failures += 1;
                self.stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_cycle(&mut self) -> SyncResult<SyncOutcome> {
        self.check_key()?;

        let since = match self.applier.cursor()? {
            Some(cursor) => cursor,
            None => self.clock.zero(),
        };
        let outgoing: Vec<MessageEnvelope> = self.outbox.pending().cloned().collect();
        let sent = outgoing.len();
        let request = SyncRequest::new(
            self.config.file_id.clone(),
            self.config.group_id.clone(),
            since.clone(),
        )
        .with_key_id(self.config.key_id.clone())
        .with_messages(outgoing);

        debug!(since = %since, outgoing = sent, "sending sync request");
        let response = self.transport.sync(&request)?;
        self.outbox.acknowledge(sent);

        self.transition(SyncState::Applying)?;
        let changes = response
            .messages
            .iter()
            .map(|envelope| self.open(envelope))
            .collect::<SyncResult<Vec<_>>>()?;

        let last = response.messages.last().map(|e| e.timestamp.clone());
        let applied = match &last {
            Some(cursor) => {
                let applied = self.applier.apply_batch(&changes, Some(cursor))?;
                observe_cursor(&mut self.clock, cursor);
                applied
            }
            None => 0,
        };
        self.transition(SyncState::Idle)?;

        Ok(SyncOutcome {
            sent,
            applied,
            cursor: self.applier.cursor()?,
            merkle: response.merkle,
        })
    }

    fn open(&self, envelope: &MessageEnvelope) -> SyncResult<ChangeMessage> {
        if envelope.is_encrypted && self.key.is_none() {
            return Err(SyncError::MissingKey);
        }
        Ok(open_envelope(envelope, self.key.as_ref())?)
    }

    /// Fails if the configured key id and the loaded key disagree.
    fn check_key(&self) -> SyncResult<()> {
        match (&self.config.key_id, &self.key) {
            (Some(expected), Some(key)) if key.key_id() != expected => Err(SyncError::KeyMismatch {
                expected: expected.clone(),
                found: key.key_id().to_string(),
            }),
            (Some(_), None) => Err(SyncError::MissingKey),
            _ => Ok(()),
        }
    }

    fn transition(&mut self, to: SyncState) -> SyncResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{to:?}"),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Moves the clock past a consumed remote timestamp.
///
/// The batch behind `cursor` is already committed, so an exhausted counter
/// only delays local stamping until the wall clock moves on.
fn observe_cursor(clock: &mut HulcClock, cursor: &LogicalTimestamp) {
    if let Err(e) = clock.observe(cursor) {
        warn!(cursor = %cursor, error = %e, "clock did not advance past cursor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::MemoryApplier;
    use crate::transport::MockTransport;
    use ledgersync_core::crypto::EncryptionKey;
    use ledgersync_protocol::{SyncResponse, TaggedValue};

    const NODE: &str = "0123456789abcdef";
    const REMOTE: &str = "fedcba9876543210";

    fn config() -> SyncConfig {
        SyncConfig::new("https://test.example.com", "file-1", "group-1").with_client_id(NODE)
    }

    fn remote_ts(millis: i64) -> LogicalTimestamp {
        LogicalTimestamp::new(millis, 0, REMOTE).unwrap()
    }

    fn plain(millis: i64, change: &ChangeMessage) -> MessageEnvelope {
        MessageEnvelope::plain(remote_ts(millis), change).unwrap()
    }

    fn session() -> SyncSession<MockTransport, MemoryApplier> {
        SyncSession::new(config(), MockTransport::new(), MemoryApplier::new()).unwrap()
    }

    #[test]
    fn initial_state() {
        let session = session();
        assert_eq!(session.state(), SyncState::Idle);
        assert_eq!(session.stats().cycles_completed, 0);
        assert_eq!(session.client_id(), NODE);
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn generated_client_id() {
        let config = SyncConfig::new("https://test.example.com", "file-1", "group-1");
        let session =
            SyncSession::new(config, MockTransport::new(), MemoryApplier::new()).unwrap();
        assert_eq!(session.client_id().len(), 16);
    }

    #[test]
    fn first_sync_requests_full_history() {
        let mut session = session();
        session.sync().unwrap();

        let requests = session.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].since, LogicalTimestamp::zero(NODE).unwrap());
        assert_eq!(requests[0].file_id, "file-1");
        assert_eq!(requests[0].group_id, "group-1");
        assert_eq!(requests[0].key_id, None);
    }

    #[test]
    fn applies_response_and_advances_cursor() {
        let mut session = session();
        let a = ChangeMessage::new("accounts", "r1", "name", "Checking");
        let b = ChangeMessage::new("accounts", "r1", "offbudget", false);
        session.transport().push_response(SyncResponse::new(
            vec![plain(100, &a), plain(200, &b)],
            "m1",
        ));

        let outcome = session.sync().unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.cursor, Some(remote_ts(200)));
        assert_eq!(outcome.merkle, "m1");
        assert_eq!(session.applier().batches(), vec![vec![a, b]]);
        assert_eq!(session.state(), SyncState::Idle);
        assert_eq!(session.stats().changes_applied, 2);

        session.sync().unwrap();
        assert_eq!(session.transport().requests()[1].since, remote_ts(200));
    }

    #[test]
    fn empty_response_keeps_cursor() {
        let mut session = session();
        let outcome = session.sync().unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.cursor, None);
        assert!(session.applier().batches().is_empty());
    }

    #[test]
    fn queued_changes_are_uploaded_once() {
        let mut session = session();
        let change = ChangeMessage::new("notes", "n1", "note", "hello");
        assert_eq!(session.queue_changes(&[change.clone()]).unwrap(), 1);
        assert_eq!(session.pending(), 1);
        // applied locally right away
        assert_eq!(session.applier().applied_count(), 1);

        let outcome = session.sync().unwrap();
        assert_eq!(outcome.sent, 1);
        assert_eq!(session.pending(), 0);

        let requests = session.transport().requests();
        let uploaded = &requests[0].messages;
        assert_eq!(uploaded.len(), 1);
        assert!(!uploaded[0].is_encrypted);
        assert_eq!(uploaded[0].timestamp.node(), NODE);
        assert_eq!(uploaded[0].change().unwrap(), change);

        session.sync().unwrap();
        assert!(session.transport().requests()[1].messages.is_empty());
    }

    #[test]
    fn failed_upload_keeps_outbox() {
        let mut session = session();
        session
            .queue_changes(&[ChangeMessage::new("notes", "n1", "note", "hello")])
            .unwrap();
        session.transport().push_error(SyncError::transport("offline"));

        assert!(session.sync().is_err());
        assert_eq!(session.pending(), 1);
        assert_eq!(session.state(), SyncState::Failed);
        assert_eq!(session.stats().failures, 1);
    }

    #[test]
    fn failed_is_sticky_until_reset() {
        let mut session = session();
        session.transport().push_error(SyncError::transport("offline"));
        assert!(matches!(session.sync(), Err(SyncError::Transport { .. })));

        let err = session.sync().unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
        assert_eq!(session.transport().requests().len(), 1);

        session.reset();
        assert_eq!(session.state(), SyncState::Idle);
        session.sync().unwrap();
    }

    #[test]
    fn encrypted_envelope_without_key() {
        let mut session = session();
        let key = SessionKey::new("key-1", &EncryptionKey::generate());
        let envelope = key
            .seal(remote_ts(1), &ChangeMessage::new("notes", "n1", "note", "x"))
            .unwrap();
        session
            .transport()
            .push_response(SyncResponse::new(vec![envelope], ""));

        assert!(matches!(session.sync(), Err(SyncError::MissingKey)));
        assert!(session.applier().batches().is_empty());
        assert_eq!(session.cursor().unwrap(), None);
    }

    #[test]
    fn encrypted_roundtrip() {
        let key = EncryptionKey::generate();
        let mut session = SyncSession::new(
            config().with_key_id("key-1"),
            MockTransport::new(),
            MemoryApplier::new(),
        )
        .unwrap()
        .with_key(SessionKey::new("key-1", &key));

        let change = ChangeMessage::new("payees", "p1", "name", "Grocer");
        session.queue_changes(&[change.clone()]).unwrap();
        session.sync().unwrap();

        let uploaded = session.transport().requests()[0].messages[0].clone();
        assert!(uploaded.is_encrypted);
        assert_eq!(session.transport().requests()[0].key_id.as_deref(), Some("key-1"));

        // the server echoes it back to another session holding the same key
        let mut other = SyncSession::new(
            config().with_key_id("key-1").with_client_id(REMOTE),
            MockTransport::new(),
            MemoryApplier::new(),
        )
        .unwrap()
        .with_key(SessionKey::new("key-1", &key));
        other
            .transport()
            .push_response(SyncResponse::new(vec![uploaded], ""));
        other.sync().unwrap();
        assert_eq!(other.applier().batches(), vec![vec![change]]);
    }

    #[test]
    fn wrong_key_fails_whole_batch() {
        let mut session = SyncSession::new(
            config().with_key_id("key-1"),
            MockTransport::new(),
            MemoryApplier::new(),
        )
        .unwrap()
        .with_key(SessionKey::new("key-1", &EncryptionKey::generate()));

        let writer = SessionKey::new("key-1", &EncryptionKey::generate());
        let good = plain(1, &ChangeMessage::new("notes", "n1", "note", "a"));
        let bad = writer
            .seal(remote_ts(2), &ChangeMessage::new("notes", "n2", "note", "b"))
            .unwrap();
        session
            .transport()
            .push_response(SyncResponse::new(vec![good, bad], ""));

        assert!(matches!(session.sync(), Err(SyncError::Decryption { .. })));
        assert!(session.applier().batches().is_empty());
        assert_eq!(session.state(), SyncState::Failed);
    }

    #[test]
    fn loaded_key_must_match_config() {
        let mut session = SyncSession::new(
            config().with_key_id("key-2"),
            MockTransport::new(),
            MemoryApplier::new(),
        )
        .unwrap()
        .with_key(SessionKey::new("key-1", &EncryptionKey::generate()));

        assert!(matches!(
            session.sync(),
            Err(SyncError::KeyMismatch { ref expected, ref found }) if expected == "key-2" && found == "key-1"
        ));
        assert!(session.transport().requests().is_empty());
    }

    #[test]
    fn local_changes_sort_after_cursor() {
        let applier = MemoryApplier::new();
        let far_future = LogicalTimestamp::new(4_000_000_000_000, 5, REMOTE).unwrap();
        applier.apply_batch(&[], Some(&far_future)).unwrap();

        let mut session = SyncSession::new(config(), MockTransport::new(), applier).unwrap();
        session
            .queue_changes(&[ChangeMessage::new("notes", "n1", "note", TaggedValue::Null)])
            .unwrap();
        session.sync().unwrap();

        let sent = &session.transport().requests()[0].messages[0];
        assert!(sent.timestamp > far_future);
    }

    #[test]
    fn exhausted_clock_queues_nothing() {
        let applier = MemoryApplier::new();
        let cursor = LogicalTimestamp::new(4_000_000_000_000, 0xFFFE, REMOTE).unwrap();
        applier.apply_batch(&[], Some(&cursor)).unwrap();
        let mut session = SyncSession::new(config(), MockTransport::new(), applier).unwrap();

        let err = session
            .queue_changes(&[ChangeMessage::new("notes", "n1", "note", "lost")])
            .unwrap_err();
        assert!(matches!(err, SyncError::ClockOverflow { .. }));
        assert_eq!(session.applier().applied_count(), 0);
        assert_eq!(session.pending(), 0);
        assert_eq!(session.state(), SyncState::Idle);
    }

    #[test]
    fn exhausted_counter_in_response_still_commits() {
        let mut session = session();
        let edge = LogicalTimestamp::new(4_000_000_000_000, 0xFFFF, REMOTE).unwrap();
        let change = ChangeMessage::new("notes", "n1", "note", "edge");
        session.transport().push_response(SyncResponse::new(
            vec![MessageEnvelope::plain(edge.clone(), &change).unwrap()],
            "",
        ));

        let outcome = session.sync().unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.cursor, Some(edge));
        assert_eq!(session.state(), SyncState::Idle);
        assert_eq!(session.applier().batches(), vec![vec![change]]);
    }
}
