//! Test doubles for the connection and the local cache.

#![allow(dead_code)]

use record_engine::{
    CachedRecord, Connection, Error, Message, RecordCore, RecordOptions, RecordServices,
    RecordStorage, StorageCallback, StorageGetCallback, Version,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

pub const NAME: &str = "recordA";

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "record_engine=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A connection that records every message sent through it.
#[derive(Default)]
pub struct MockConnection {
    connected: AtomicBool,
    sent: Mutex<Vec<Message>>,
}

impl MockConnection {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<Message> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Connection for MockConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_message(&self, message: Message) {
        self.sent.lock().unwrap().push(message);
    }
}

/// A cache write observed by [`MockStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub name: String,
    pub version: Version,
    pub data: Value,
}

/// A cache that answers reads synchronously with a configured entry.
///
/// Deletes are held until [`MockStorage::confirm_delete`] unless
/// auto-confirmation is on.
pub struct MockStorage {
    entry: Mutex<CachedRecord>,
    gets: AtomicUsize,
    writes: Mutex<Vec<CacheWrite>>,
    deletes: Mutex<Vec<StorageCallback>>,
    auto_delete: AtomicBool,
}

impl MockStorage {
    pub fn miss() -> Arc<Self> {
        Self::with_entry(CachedRecord::miss(NAME))
    }

    pub fn hit(version: Version, data: Value) -> Arc<Self> {
        Self::with_entry(CachedRecord::hit(NAME, version, data))
    }

    fn with_entry(entry: CachedRecord) -> Arc<Self> {
        Arc::new(Self {
            entry: Mutex::new(entry),
            gets: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            auto_delete: AtomicBool::new(false),
        })
    }

    pub fn auto_confirm_deletes(&self) {
        self.auto_delete.store(true, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<CacheWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn pending_deletes(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    /// Answer the oldest held delete request.
    pub fn confirm_delete(&self, result: Result<(), Error>) {
        let callback = self.deletes.lock().unwrap().remove(0);
        callback(result);
    }
}

impl RecordStorage for MockStorage {
    fn get(&self, _name: &str, callback: StorageGetCallback) {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let entry = self.entry.lock().unwrap().clone();
        callback(entry);
    }

    fn set(&self, name: &str, version: Version, data: &Value, callback: StorageCallback) {
        self.writes.lock().unwrap().push(CacheWrite {
            name: name.to_string(),
            version,
            data: data.clone(),
        });
        *self.entry.lock().unwrap() = CachedRecord::hit(name, version, data.clone());
        callback(Ok(()));
    }

    fn delete(&self, name: &str, callback: StorageCallback) {
        if self.auto_delete.load(Ordering::SeqCst) {
            *self.entry.lock().unwrap() = CachedRecord::miss(name);
            callback(Ok(()));
        } else {
            self.deletes.lock().unwrap().push(callback);
        }
    }
}

/// Names passed to the completion callback.
pub type Completed = Arc<Mutex<Vec<String>>>;

pub struct Harness {
    pub record: RecordCore,
    pub connection: Arc<MockConnection>,
    pub storage: Arc<MockStorage>,
    pub completed: Completed,
}

pub fn options() -> RecordOptions {
    RecordOptions::default()
        .with_discard_timeout(Duration::from_millis(50))
        .with_record_read_timeout(Duration::from_millis(200))
        .with_subscription_interval(None)
}

pub fn harness(connected: bool, storage: Arc<MockStorage>) -> Harness {
    harness_with(connected, storage, options())
}

pub fn harness_with(connected: bool, storage: Arc<MockStorage>, options: RecordOptions) -> Harness {
    init_tracing();
    let connection = MockConnection::new(connected);
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();

    let services = RecordServices::new(connection.clone(), storage.clone());
    let record = RecordCore::new(NAME, services, options, move |name| {
        sink.lock().unwrap().push(name.to_string());
    });

    Harness {
        record,
        connection,
        storage,
        completed,
    }
}

impl Harness {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Deliver the server's answer to the subscribe request.
    pub fn read_response(&mut self, version: Version, data: Value) {
        self.record
            .handle(Message::read_response(NAME, version, data));
    }
}

/// Collects write acknowledgment outcomes.
#[derive(Clone, Default)]
pub struct Acks(Arc<Mutex<Vec<Result<(), Error>>>>);

impl Acks {
    pub fn callback(&self) -> impl FnOnce(Result<(), Error>) + Send + 'static {
        let acks = self.0.clone();
        move |result| acks.lock().unwrap().push(result)
    }

    pub fn results(&self) -> Vec<Result<(), Error>> {
        self.0.lock().unwrap().clone()
    }
}

/// Let `duration` of paused time pass so that timers due in it fire.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    tokio::task::yield_now().await;
}
