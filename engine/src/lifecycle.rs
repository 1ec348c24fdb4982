//! The record state machine.
//!
//! A [`RecordCore`] owns one record's version and data and reconciles three
//! sources: the server (through [`Connection`](crate::Connection)), the local
//! cache (through [`RecordStorage`](crate::RecordStorage)) and local writes.
//!
//! ## Execution model
//!
//! All methods take `&mut self` and run to completion. Asynchronous results
//! (cache reads and deletes, timer firings, offline write acknowledgments)
//! are queued and applied by [`RecordCore::poll_completions`] or
//! [`RecordCore::next_completion`]. Every public operation applies what is
//! already queued before doing its own work, and never applies what it queues
//! itself, so offline acknowledgments always arrive after `set` returns.
//!
//! Timers are Tokio tasks, so a record must live inside a Tokio runtime.
//!
//! ## States
//!
//! - `VOID` to `SUBSCRIBING` when connected, to `LOADING` when offline
//! - `SUBSCRIBING`/`LOADING` to `READY` on the first read, network or cache
//! - `READY` to `UNSUBSCRIBING` when the last consumer discards
//! - `UNSUBSCRIBING` back to `READY` on `acquire`, to `UNSUBSCRIBED` when the
//!   discard timer fires
//! - `READY`/`UNSUBSCRIBING` to `DELETING` on `delete`, then `DELETED` once
//!   confirmed
//! - any active state to `DELETED` when the server reports a deletion

use crate::config::RecordOptions;
use crate::correlator::WriteCorrelator;
use crate::error::{Error, Result};
use crate::message::{Inbound, Message, RecordAction};
use crate::operation::{Mutation, SetRequest, WriteCallback};
use crate::ready::ReadyGate;
use crate::record::RecordData;
use crate::scheduler::DiscardScheduler;
use crate::services::{CachedRecord, RecordServices};
use crate::timer::{take_if_current, TimerHandle, TimerKind, Timers};
use crate::{RecordName, Version};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Void,
    Subscribing,
    Loading,
    Ready,
    Unsubscribing,
    Unsubscribed,
    Deleting,
    Deleted,
}

impl RecordState {
    /// Ready states keep serving reads until teardown completes.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            RecordState::Ready | RecordState::Unsubscribing | RecordState::Deleting
        )
    }

    /// No message or request is processed in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordState::Unsubscribed | RecordState::Deleted)
    }
}

/// Called once with the record name when the record reaches a terminal state.
pub type CompletionCallback = Box<dyn FnOnce(&str) + Send + 'static>;

/// Work finished outside the record, waiting to be applied.
pub(crate) enum Completion {
    CacheLoaded(CachedRecord),
    CacheDeleted(Result<()>),
    DeferredAck {
        callback: WriteCallback,
        result: Result<()>,
    },
    TimerFired {
        kind: TimerKind,
        id: u64,
    },
}

/// Client-side synchronization engine for a single named record.
pub struct RecordCore {
    name: RecordName,
    options: RecordOptions,
    services: RecordServices,
    state: RecordState,
    record: RecordData,
    writes: WriteCorrelator,
    ready: ReadyGate,
    discard: DiscardScheduler,
    timers: Timers,
    read_timer: Option<TimerHandle>,
    subscribe_timer: Option<TimerHandle>,
    last_subscribe: Option<Instant>,
    awaiting_read: bool,
    /// Cache result kept as a fallback while the network read is outstanding
    cached: Option<CachedRecord>,
    /// Set by offline writes, cleared once they are pushed to the server
    dirty: bool,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    when_completed: Option<CompletionCallback>,
}

impl RecordCore {
    /// Create a record and start loading it.
    ///
    /// The cache is always queried. When the connection is up a
    /// subscribe-create-and-read request is sent as well and the network
    /// read becomes authoritative; otherwise the cache result alone makes the
    /// record ready.
    pub fn new<F>(
        name: impl Into<RecordName>,
        services: RecordServices,
        options: RecordOptions,
        when_completed: F,
    ) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let mut core = Self {
            name: name.into(),
            options,
            services,
            state: RecordState::Void,
            record: RecordData::unloaded(),
            writes: WriteCorrelator::new(),
            ready: ReadyGate::new(),
            discard: DiscardScheduler::new(),
            timers: Timers::new(completions_tx.clone()),
            read_timer: None,
            subscribe_timer: None,
            last_subscribe: None,
            awaiting_read: false,
            cached: None,
            dirty: false,
            completions_tx,
            completions,
            when_completed: Some(Box::new(when_completed)),
        };

        let loaded = core.completions_tx.clone();
        core.services.storage.get(
            &core.name,
            Box::new(move |cached| {
                let _ = loaded.send(Completion::CacheLoaded(cached));
            }),
        );

        if core.is_connected() {
            core.transition(RecordState::Subscribing);
            core.request_subscribe();
        } else {
            core.transition(RecordState::Loading);
        }

        core.poll_completions();
        core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Current version, `-1` until loaded.
    pub fn version(&self) -> Version {
        self.record.version
    }

    pub fn usages(&self) -> usize {
        self.discard.usages()
    }

    /// Writes still waiting for a server acknowledgment.
    pub fn pending_writes(&self) -> usize {
        self.writes.pending_count()
    }

    /// A copy of the record's data.
    pub fn get(&self) -> serde_json::Value {
        self.record.snapshot()
    }

    /// A copy of the value at `path`.
    pub fn get_path(&self, path: &str) -> Result<Option<serde_json::Value>> {
        self.record.snapshot_at(path)
    }

    /// Apply every completion that is already queued. Returns how many ran.
    pub fn poll_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Wait for the next completion and apply it.
    ///
    /// Cancel safe, so it can drive a record from a `select!` loop next to
    /// the inbound message stream.
    pub async fn next_completion(&mut self) {
        if let Some(completion) = self.completions.recv().await {
            self.apply_completion(completion);
        }
    }

    /// Run `callback` with `context` once the record is ready.
    ///
    /// Runs immediately if the record is ready already. Queued callbacks run
    /// in registration order; they receive an error if the initial read
    /// times out or the record is deleted first.
    pub fn when_ready<C, F>(&mut self, context: C, callback: F)
    where
        C: Send + 'static,
        F: FnOnce(Result<C>) + Send + 'static,
    {
        self.poll_completions();

        if self.state.is_terminal() {
            callback(Err(Error::Destroyed {
                name: self.name.clone(),
            }));
            return;
        }

        self.ready
            .register(Box::new(move |result| callback(result.map(|()| context))));
    }

    /// Like [`when_ready`](Self::when_ready) but returns a future resolving
    /// to `context`.
    pub fn when_ready_deferred<C>(
        &mut self,
        context: C,
    ) -> impl Future<Output = Result<C>> + Send + 'static
    where
        C: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.when_ready((), move |result| {
            let _ = tx.send(result);
        });

        let name = self.name.clone();
        async move {
            match rx.await {
                Ok(result) => result.map(|()| context),
                Err(_) => Err(Error::Destroyed { name }),
            }
        }
    }

    /// Apply a local write.
    ///
    /// Writes before the record is ready are dropped. Once ready, the change
    /// is applied locally and the version advances by one; it is then sent
    /// to the server, or persisted to the cache when offline. Offline writes
    /// that asked for an acknowledgment get [`Error::ClientOffline`], delivered
    /// asynchronously.
    pub fn set(&mut self, request: SetRequest) {
        self.poll_completions();
        let SetRequest { mutation, callback } = request;

        if !matches!(self.state, RecordState::Ready | RecordState::Unsubscribing) {
            tracing::debug!(
                record = %self.name,
                state = ?self.state,
                kind = mutation.kind(),
                "dropping write, record is not ready"
            );
            return;
        }

        let version = match self.record.apply(&mutation) {
            Ok(version) => version,
            Err(err) => {
                tracing::warn!(record = %self.name, error = %err, "rejecting write");
                if let Some(callback) = callback {
                    self.defer_ack(callback, Err(err));
                }
                return;
            }
        };

        if self.is_connected() {
            if self.awaiting_read {
                // the pending read would otherwise replace this write
                self.dirty = true;
            }
            let mut message = write_message(&self.name, mutation, version);
            if let Some(callback) = callback {
                message.action = message.action.with_write_ack();
                message.correlation_id = Some(self.writes.register(callback));
            }
            self.send(message);
        } else {
            self.dirty = true;
            self.persist(version);
            if let Some(callback) = callback {
                let offline = Error::ClientOffline {
                    name: self.name.clone(),
                };
                self.defer_ack(callback, Err(offline));
            }
        }
    }

    /// Register one more consumer, canceling a pending discard.
    pub fn acquire(&mut self) {
        self.poll_completions();
        if self.discard.acquire() && self.state == RecordState::Unsubscribing {
            tracing::debug!(record = %self.name, "discard canceled, record in use again");
            self.transition(RecordState::Ready);
        }
    }

    /// Release one consumer.
    ///
    /// When no consumer is left the record unsubscribes after
    /// `discard_timeout`, unless it is acquired again first.
    pub fn discard(&mut self) {
        self.poll_completions();
        if self.discard.release() > 0 {
            return;
        }

        match self.state {
            RecordState::Ready | RecordState::Unsubscribing => self.start_discard(),
            RecordState::Void | RecordState::Subscribing | RecordState::Loading => {
                self.discard.defer()
            }
            state => {
                tracing::debug!(record = %self.name, state = ?state, "ignoring discard");
            }
        }
    }

    /// Delete the record on the server, or in the cache when offline.
    ///
    /// Repeated or premature requests are ignored.
    pub fn delete(&mut self) {
        self.poll_completions();
        if !matches!(self.state, RecordState::Ready | RecordState::Unsubscribing) {
            tracing::warn!(record = %self.name, state = ?self.state, "ignoring delete request");
            return;
        }

        self.discard.cancel();
        self.transition(RecordState::Deleting);

        if self.is_connected() {
            self.send(Message::delete(self.name.clone()));
        } else {
            let deleted = self.completions_tx.clone();
            self.services.storage.delete(
                &self.name,
                Box::new(move |result| {
                    let _ = deleted.send(Completion::CacheDeleted(result));
                }),
            );
        }
    }

    /// Process a message from the server.
    pub fn handle(&mut self, message: Message) {
        self.poll_completions();

        if self.state.is_terminal() {
            tracing::debug!(record = %self.name, action = ?message.action, "record is gone, dropping message");
            return;
        }
        if message.name != self.name {
            tracing::warn!(record = %self.name, other = %message.name, "message for another record");
            return;
        }

        match Inbound::from(message) {
            Inbound::ReadResponse { version, data } => self.on_read_response(version, data),
            Inbound::WriteAck {
                correlation_id,
                outcome,
            } => {
                let result = outcome.map_err(|reason| Error::Remote {
                    name: self.name.clone(),
                    reason,
                });
                if !self.writes.resolve(&correlation_id, result) {
                    tracing::warn!(
                        record = %self.name,
                        correlation_id = %correlation_id,
                        "ignoring stale write acknowledgement"
                    );
                }
            }
            Inbound::RemoteUpdate { version, data } => {
                self.apply_remote(Mutation::Update { data }, version)
            }
            Inbound::RemotePatch {
                version,
                path,
                data,
            } => self.apply_remote(Mutation::Patch { path, data }, version),
            Inbound::RemoteErase { version, path } => {
                self.apply_remote(Mutation::Erase { path }, version)
            }
            Inbound::DeleteSuccess => {
                if self.state == RecordState::Deleting {
                    self.finish(RecordState::Deleted);
                } else {
                    tracing::debug!(record = %self.name, state = ?self.state, "unexpected delete confirmation");
                }
            }
            Inbound::Deleted => {
                tracing::info!(record = %self.name, "record deleted remotely");
                self.finish(RecordState::Deleted);
            }
            Inbound::Ignored { action, reason } => {
                tracing::debug!(record = %self.name, action = ?action, reason, "ignoring message");
            }
        }
    }

    /// The connection dropped.
    ///
    /// Writes awaiting acknowledgment resolve with [`Error::ClientOffline`].
    /// A record still waiting for its first read falls back to the cache.
    pub fn on_connection_lost(&mut self) {
        self.poll_completions();

        let name = self.name.clone();
        let failed = self
            .writes
            .fail_all(|| Error::ClientOffline { name: name.clone() });
        self.read_timer = None;
        self.subscribe_timer = None;
        self.awaiting_read = false;

        tracing::debug!(record = %self.name, failed_writes = failed, "connection lost");

        match self.state {
            RecordState::Subscribing => {
                self.transition(RecordState::Loading);
                if self.cached.is_some() {
                    self.ready_from_cache();
                }
            }
            RecordState::Deleting => {
                tracing::warn!(record = %self.name, "delete request lost with the connection");
                self.transition(RecordState::Ready);
            }
            _ => {}
        }
    }

    /// The connection is back. Active records subscribe again and push
    /// writes made while offline.
    pub fn on_connection_reestablished(&mut self) {
        self.poll_completions();

        match self.state {
            RecordState::Loading => {
                self.transition(RecordState::Subscribing);
                self.request_subscribe();
            }
            RecordState::Ready | RecordState::Unsubscribing => self.request_subscribe(),
            _ => {}
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::DeferredAck { callback, result } => callback(result),
            _ if self.state.is_terminal() => {}
            Completion::CacheLoaded(cached) => self.on_cache_loaded(cached),
            Completion::CacheDeleted(result) => self.on_cache_deleted(result),
            Completion::TimerFired { kind, id } => match kind {
                TimerKind::Discard => self.on_discard_timer(id),
                TimerKind::ReadTimeout => self.on_read_timeout(id),
                TimerKind::Subscribe => self.on_subscribe_timer(id),
            },
        }
    }

    fn on_cache_loaded(&mut self, cached: CachedRecord) {
        tracing::debug!(
            record = %self.name,
            version = cached.version,
            miss = cached.is_miss(),
            "cache read completed"
        );
        let usable = !cached.is_miss();
        self.cached = Some(cached);

        match self.state {
            RecordState::Loading => self.ready_from_cache(),
            RecordState::Subscribing if usable && !self.record.is_loaded() => {
                // the network read replaces this once it arrives
                self.ready_from_cache();
            }
            _ => {}
        }
    }

    fn ready_from_cache(&mut self) {
        let Some(cached) = self.cached.take() else {
            return;
        };
        match cached.data {
            Some(data) if cached.version >= 0 => self.record.load(cached.version, data),
            _ => self
                .record
                .load(0, serde_json::Value::Object(Default::default())),
        }
        self.become_ready();
    }

    fn on_read_response(&mut self, version: Version, data: serde_json::Value) {
        if !self.awaiting_read {
            tracing::debug!(record = %self.name, version, "unsolicited read response");
            return;
        }
        self.awaiting_read = false;
        self.read_timer = None;
        self.cached = None;

        match self.state {
            RecordState::Subscribing => {
                self.record.load(version, data);
                self.become_ready();
            }
            RecordState::Ready | RecordState::Unsubscribing if self.dirty => {
                self.push_offline_changes(version)
            }
            RecordState::Ready | RecordState::Unsubscribing => self.record.load(version, data),
            state => {
                tracing::debug!(record = %self.name, state = ?state, "read response ignored");
            }
        }
    }

    /// Rebase local writes the server has not seen on its version and send
    /// them. The version never moves backwards.
    fn push_offline_changes(&mut self, remote_version: Version) {
        let base = remote_version.max(self.record.version);
        let Some(version) = base.checked_add(1) else {
            tracing::error!(
                record = %self.name,
                version = base,
                "cannot push local changes, version exhausted"
            );
            return;
        };
        tracing::info!(
            record = %self.name,
            local_version = self.record.version,
            remote_version,
            "pushing offline changes"
        );

        self.record.version = version;
        self.dirty = false;
        let message = Message::new(RecordAction::Update, self.name.clone())
            .with_data(self.record.snapshot())
            .with_version(version);
        self.send(message);
    }

    fn apply_remote(&mut self, mutation: Mutation, version: Version) {
        if !self.state.is_ready() {
            tracing::debug!(record = %self.name, state = ?self.state, "remote change before ready");
            return;
        }
        if version <= self.record.version {
            tracing::debug!(
                record = %self.name,
                version,
                local_version = self.record.version,
                "ignoring stale remote change"
            );
            return;
        }
        if let Err(err) = self.record.apply_at(&mutation, version) {
            tracing::warn!(record = %self.name, error = %err, "could not apply remote change");
        }
    }

    fn become_ready(&mut self) {
        self.transition(RecordState::Ready);
        let released = self.ready.open();
        tracing::debug!(record = %self.name, version = self.record.version, released, "record ready");

        if self.discard.take_deferred() && self.discard.usages() == 0 {
            self.start_discard();
        }
    }

    fn request_subscribe(&mut self) {
        if self.subscribe_timer.is_some() || self.awaiting_read {
            return;
        }

        let delay = match (self.options.subscription_interval, self.last_subscribe) {
            (Some(interval), Some(last)) => interval.saturating_sub(last.elapsed()),
            _ => Duration::ZERO,
        };

        if delay.is_zero() {
            self.send_subscribe();
        } else {
            tracing::debug!(record = %self.name, delay = ?delay, "subscribe rate limited");
            self.subscribe_timer = Some(self.timers.start(TimerKind::Subscribe, delay));
        }
    }

    fn send_subscribe(&mut self) {
        if !self.send(Message::subscribe_create_and_read(self.name.clone())) {
            return;
        }
        self.awaiting_read = true;
        self.last_subscribe = Some(Instant::now());
        self.read_timer = Some(
            self.timers
                .start(TimerKind::ReadTimeout, self.options.record_read_timeout),
        );
    }

    fn on_subscribe_timer(&mut self, id: u64) {
        if !take_if_current(&mut self.subscribe_timer, id) {
            return;
        }
        if matches!(
            self.state,
            RecordState::Subscribing | RecordState::Ready | RecordState::Unsubscribing
        ) {
            self.send_subscribe();
        }
    }

    fn on_read_timeout(&mut self, id: u64) {
        if !take_if_current(&mut self.read_timer, id) {
            return;
        }

        let timeout = self.options.record_read_timeout;
        if self.state.is_ready() {
            tracing::warn!(record = %self.name, timeout = ?timeout, "read response overdue, serving cached data");
            return;
        }

        let error = Error::ReadTimeout {
            name: self.name.clone(),
            timeout,
        };
        let failed = self.ready.fail(&error);
        tracing::warn!(record = %self.name, timeout = ?timeout, failed_waiters = failed, "read timed out");
    }

    fn start_discard(&mut self) {
        self.discard.cancel();
        let timer = self
            .timers
            .start(TimerKind::Discard, self.options.discard_timeout);
        self.discard.arm(timer);
        self.transition(RecordState::Unsubscribing);
    }

    fn on_discard_timer(&mut self, id: u64) {
        if !self.discard.take_fired(id) || self.state != RecordState::Unsubscribing {
            return;
        }
        if self.discard.usages() > 0 {
            self.transition(RecordState::Ready);
            return;
        }

        if self.is_connected() {
            self.send(Message::unsubscribe(self.name.clone()));
        }
        self.finish(RecordState::Unsubscribed);
    }

    fn on_cache_deleted(&mut self, result: Result<()>) {
        if self.state != RecordState::Deleting {
            return;
        }
        match result {
            Ok(()) => self.finish(RecordState::Deleted),
            Err(err) => {
                tracing::error!(record = %self.name, error = %err, "failed to delete record from local storage");
                self.transition(RecordState::Ready);
            }
        }
    }

    /// Enter a terminal state, release everything still pending and notify
    /// the owner.
    fn finish(&mut self, state: RecordState) {
        self.discard.cancel();
        self.read_timer = None;
        self.subscribe_timer = None;
        self.awaiting_read = false;

        let name = self.name.clone();
        self.writes
            .fail_all(|| Error::Destroyed { name: name.clone() });
        let waiter_error = match state {
            RecordState::Deleted => Error::Deleted { name: name.clone() },
            _ => Error::Destroyed { name: name.clone() },
        };
        self.ready.fail(&waiter_error);
        self.ready.close();

        self.transition(state);
        // flush acknowledgments queued by earlier writes
        self.poll_completions();

        tracing::info!(record = %self.name, state = ?state, "record closed");
        if let Some(when_completed) = self.when_completed.take() {
            when_completed(&name);
        }
    }

    fn transition(&mut self, to: RecordState) {
        if self.state != to {
            tracing::debug!(record = %self.name, from = ?self.state, to = ?to, "state transition");
            self.state = to;
        }
    }

    fn is_connected(&self) -> bool {
        self.services.connection.is_connected()
    }

    /// Send `message` if connected. Nothing is ever sent while offline.
    fn send(&self, message: Message) -> bool {
        if !self.is_connected() {
            tracing::debug!(record = %self.name, action = ?message.action, "offline, not sending");
            return false;
        }
        self.services.connection.send_message(message);
        true
    }

    fn persist(&self, version: Version) {
        let name = self.name.clone();
        self.services.storage.set(
            &self.name,
            version,
            &self.record.data,
            Box::new(move |result| {
                if let Err(err) = result {
                    tracing::error!(record = %name, version, error = %err, "failed to persist record");
                }
            }),
        );
    }

    fn defer_ack(&self, callback: WriteCallback, result: Result<()>) {
        let _ = self
            .completions_tx
            .send(Completion::DeferredAck { callback, result });
    }
}

impl Drop for RecordCore {
    fn drop(&mut self) {
        let name = self.name.clone();
        self.writes
            .fail_all(|| Error::Destroyed { name: name.clone() });
        self.ready.fail(&Error::Destroyed { name });

        while let Ok(completion) = self.completions.try_recv() {
            if let Completion::DeferredAck { callback, result } = completion {
                callback(result);
            }
        }
    }
}

impl std::fmt::Debug for RecordCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCore")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("version", &self.record.version)
            .field("usages", &self.discard.usages())
            .field("writes", &self.writes)
            .field("ready", &self.ready)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Build the outbound message for a local write at `version`.
fn write_message(name: &str, mutation: Mutation, version: Version) -> Message {
    let message = match mutation {
        Mutation::Update { data } => Message::new(RecordAction::Update, name).with_data(data),
        Mutation::Patch { path, data } => Message::new(RecordAction::Patch, name)
            .with_path(path)
            .with_data(data),
        Mutation::Erase { path } => Message::new(RecordAction::Erase, name).with_path(path),
    };
    message.with_version(version)
}
