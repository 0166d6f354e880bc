//! Integration tests: sessions syncing through an in-memory remote.

use ledgersync_core::crypto::{make_salt, EncryptionKey, SessionKey};
use ledgersync_core::{MirrorConfig, MirrorStore, Table};
use ledgersync_engine::{
    MirrorApplier, SyncConfig, SyncError, SyncResult, SyncSession, SyncState, SyncTransport,
};
use ledgersync_protocol::{
    ChangeMessage, KeyInfo, LogicalTimestamp, MessageEnvelope, SyncRequest, SyncResponse,
    TaggedValue,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// An append-only remote log, answering in arrival order.
#[derive(Default)]
struct FakeRemote {
    log: Mutex<Vec<MessageEnvelope>>,
    key: Mutex<Option<KeyInfo>>,
}

impl FakeRemote {
    fn encrypted(key_id: &str, password: &str) -> Arc<Self> {
        let remote = Arc::new(Self::default());
        remote.rotate_key(key_id, password);
        remote
    }

    fn rotate_key(&self, key_id: &str, password: &str) {
        let salt = make_salt();
        let key = SessionKey::new(key_id, &EncryptionKey::derive(password, &salt));
        let test = key.make_test().unwrap();
        *self.key.lock() = Some(KeyInfo {
            key_id: key_id.to_string(),
            salt,
            test,
        });
    }

    fn inject(&self, envelope: MessageEnvelope) {
        self.log.lock().push(envelope);
    }

    fn len(&self) -> usize {
        self.log.lock().len()
    }
}

struct Remote(Arc<FakeRemote>);

impl SyncTransport for Remote {
    fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let current = self.0.key.lock().as_ref().map(|k| k.key_id.clone());
        if request.key_id != current {
            return Err(SyncError::KeyMismatch {
                expected: request.key_id.clone().unwrap_or_default(),
                found: current.unwrap_or_default(),
            });
        }

        let mut log = self.0.log.lock();
        let newer: Vec<MessageEnvelope> = log
            .iter()
            .filter(|e| e.timestamp > request.since)
            .cloned()
            .collect();
        log.extend(request.messages.iter().cloned());
        Ok(SyncResponse::new(newer, format!("len-{}", log.len())))
    }

    fn get_key(&self, file_id: &str) -> SyncResult<KeyInfo> {
        self.0
            .key
            .lock()
            .clone()
            .ok_or_else(|| SyncError::UnknownFileId {
                file_id: file_id.to_string(),
            })
    }
}

type Session = SyncSession<Remote, MirrorApplier>;

fn config(client_id: &str) -> SyncConfig {
    SyncConfig::new("memory://", "file-1", "group-1").with_client_id(client_id)
}

fn session(remote: &Arc<FakeRemote>, config: SyncConfig) -> (Session, Arc<MirrorStore>) {
    let store = Arc::new(MirrorStore::in_memory().unwrap());
    let session = SyncSession::new(
        config,
        Remote(Arc::clone(remote)),
        MirrorApplier::new(Arc::clone(&store)),
    )
    .unwrap();
    (session, store)
}

fn remote_ts(millis: i64) -> LogicalTimestamp {
    LogicalTimestamp::new(millis, 0, "ffffffffffffffff").unwrap()
}

#[test]
fn encrypted_changes_reach_another_client() {
    let remote = FakeRemote::encrypted("key-1", "hunter2");
    let (mut alice, _) = session(&remote, config("aaaaaaaaaaaaaaaa").with_key_id("key-1"));
    let (mut bob, bob_store) = session(&remote, config("bbbbbbbbbbbbbbbb").with_key_id("key-1"));
    alice.unlock("hunter2").unwrap();
    bob.unlock("hunter2").unwrap();

    let change = ChangeMessage::new("accounts", "r1", "name", "Checking");
    alice.queue_changes(&[change]).unwrap();
    alice.sync().unwrap();
    assert_eq!(remote.len(), 1);

    let outcome = bob.sync().unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(
        bob_store.value(Table::Accounts, "r1", "name"),
        Some(TaggedValue::from("Checking"))
    );
    assert_eq!(bob_store.cursor(), outcome.cursor);
}

#[test]
fn wrong_password_is_decryption_error() {
    let remote = FakeRemote::encrypted("key-1", "hunter2");
    let (mut bob, _) = session(&remote, config("bbbbbbbbbbbbbbbb").with_key_id("key-1"));
    assert!(matches!(
        bob.unlock("hunter3"),
        Err(SyncError::Decryption { .. })
    ));
    assert_eq!(bob.key_id(), None);
}

#[test]
fn empty_history_leaves_cursor_unchanged() {
    let remote = Arc::new(FakeRemote::default());
    let (mut bob, store) = session(&remote, config("bbbbbbbbbbbbbbbb"));

    let outcome = bob.sync().unwrap();
    assert_eq!(outcome.applied, 0);
    assert_eq!(outcome.cursor, None);
    assert_eq!(store.cursor(), None);
    assert_eq!(store.journal_size().unwrap(), 0);
}

#[test]
fn resync_is_idempotent() {
    let remote = Arc::new(FakeRemote::default());
    remote.inject(
        MessageEnvelope::plain(remote_ts(10), &ChangeMessage::new("payees", "p1", "name", "Grocer"))
            .unwrap(),
    );
    remote.inject(
        MessageEnvelope::plain(remote_ts(20), &ChangeMessage::new("payees", "p1", "favorite", 1i64))
            .unwrap(),
    );
    let (mut bob, store) = session(&remote, config("bbbbbbbbbbbbbbbb"));

    bob.sync().unwrap();
    let first = store.rows(Table::Payees);
    let cursor = store.cursor();

    let outcome = bob.sync().unwrap();
    assert_eq!(outcome.applied, 0);
    assert_eq!(store.rows(Table::Payees), first);
    assert_eq!(store.cursor(), cursor);
    assert_eq!(cursor, Some(remote_ts(20)));
}

#[test]
fn unknown_table_leaves_mirror_unchanged() {
    let remote = Arc::new(FakeRemote::default());
    remote.inject(
        MessageEnvelope::plain(remote_ts(10), &ChangeMessage::new("accounts", "r1", "name", "Checking"))
            .unwrap(),
    );
    remote.inject(
        MessageEnvelope::plain(remote_ts(20), &ChangeMessage::new("ghosts", "g1", "name", "Boo"))
            .unwrap(),
    );
    let (mut bob, store) = session(&remote, config("bbbbbbbbbbbbbbbb"));

    assert!(matches!(bob.sync(), Err(SyncError::MirrorSchema { .. })));
    assert_eq!(bob.state(), SyncState::Failed);
    assert_eq!(store.row_count(Table::Accounts), 0);
    assert_eq!(store.cursor(), None);
}

#[test]
fn list_order_wins_over_timestamps() {
    let remote = Arc::new(FakeRemote::default());
    remote.inject(
        MessageEnvelope::plain(remote_ts(300), &ChangeMessage::new("notes", "n1", "note", "A"))
            .unwrap(),
    );
    remote.inject(
        MessageEnvelope::plain(remote_ts(200), &ChangeMessage::new("notes", "n1", "note", "B"))
            .unwrap(),
    );
    let (mut bob, store) = session(&remote, config("bbbbbbbbbbbbbbbb"));

    let outcome = bob.sync().unwrap();
    assert_eq!(
        store.value(Table::Notes, "n1", "note"),
        Some(TaggedValue::from("B"))
    );
    // the cursor is the last consumed envelope, not the newest timestamp
    assert_eq!(outcome.cursor, Some(remote_ts(200)));
}

#[test]
fn key_rotation_requires_unlock() {
    let remote = FakeRemote::encrypted("key-1", "old");
    let (mut alice, store) = session(&remote, config("aaaaaaaaaaaaaaaa").with_key_id("key-1"));
    alice.unlock("old").unwrap();
    alice.sync().unwrap();

    remote.rotate_key("key-2", "new");
    let err = alice.sync().unwrap_err();
    assert!(err.requires_rekey());
    assert_eq!(alice.state(), SyncState::Failed);

    // unlocking with the stale key id is refused
    assert!(matches!(
        alice.unlock("new"),
        Err(SyncError::KeyMismatch { .. })
    ));

    alice.set_key_id("key-2");
    alice.unlock("new").unwrap();
    assert_eq!(alice.state(), SyncState::Idle);
    alice
        .queue_changes(&[ChangeMessage::new("notes", "n1", "note", "rotated")])
        .unwrap();
    alice.sync().unwrap();
    assert_eq!(
        store.value(Table::Notes, "n1", "note"),
        Some(TaggedValue::from("rotated"))
    );
}

#[test]
fn cursor_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file-1.journal");
    let remote = Arc::new(FakeRemote::default());
    remote.inject(
        MessageEnvelope::plain(remote_ts(10), &ChangeMessage::new("categories", "c1", "name", "Food"))
            .unwrap(),
    );

    {
        let store = Arc::new(MirrorStore::open_file(&path, MirrorConfig::default()).unwrap());
        let mut bob = SyncSession::new(
            config("bbbbbbbbbbbbbbbb"),
            Remote(Arc::clone(&remote)),
            MirrorApplier::new(Arc::clone(&store)),
        )
        .unwrap();
        assert_eq!(bob.sync().unwrap().applied, 1);
    }

    remote.inject(
        MessageEnvelope::plain(remote_ts(20), &ChangeMessage::new("categories", "c1", "hidden", true))
            .unwrap(),
    );

    let store = Arc::new(MirrorStore::open_file(&path, MirrorConfig::default()).unwrap());
    assert_eq!(store.cursor(), Some(remote_ts(10)));
    let mut bob = SyncSession::new(
        config("bbbbbbbbbbbbbbbb"),
        Remote(Arc::clone(&remote)),
        MirrorApplier::new(Arc::clone(&store)),
    )
    .unwrap();

    let outcome = bob.sync().unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(
        store.value(Table::Categories, "c1", "name"),
        Some(TaggedValue::from("Food"))
    );
    assert_eq!(
        store.value(Table::Categories, "c1", "hidden"),
        Some(TaggedValue::Bool(true))
    );
}
