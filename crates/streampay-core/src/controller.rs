// Stream lifecycle controller
//
// Owns every status transition of a stream payment: prepare a draft, commit
// it, start, pause, finish. Starting arms the per-stream ticker (see
// scheduler.rs); every failure after a stream exists goes through
// `handle_error`.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use log::{debug, error, info, warn};

use streampay_client::PaymentClient;
use streampay_types::{EngineConfig, StreamError, StreamPart, StreamPayment, StreamStatus, StreamStore};

use crate::events::EventSink;
use crate::registry::{StreamRegistry, StreamTable};

struct Shared<S, P> {
    registry: StreamRegistry,
    store: S,
    client: P,
    events: EventSink,
    config: EngineConfig,
    draft: Mutex<Option<StreamPayment>>,
}

/// Drives stream payments through their lifecycle.
///
/// Cheap to clone; clones share the same registry, store and client.
pub struct StreamController<S, P> {
    shared: Arc<Shared<S, P>>,
}

impl<S, P> Clone for StreamController<S, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: StreamStore, P: PaymentClient> StreamController<S, P> {
    pub fn new(store: S, client: P, config: EngineConfig, events: EventSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: StreamRegistry::new(),
                store,
                client,
                events,
                config,
                draft: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.shared.registry
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn client(&self) -> &P {
        &self.shared.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.shared.events
    }

    /// Process-start recovery: no stream can still be running after a
    /// restart, so stored "running" rows go back to "paused" before the
    /// registry is hydrated. Returns the number of active streams loaded.
    pub fn recover(&self) -> Result<usize> {
        if let Err(e) = self.shared.store.reset_running_to_paused() {
            error!("failed to reset running streams: {:#}", e);
        }
        self.shared.registry.load(&self.shared.store)
    }

    /// Quote the fee and build an unpersisted draft. The draft replaces any
    /// earlier one and is what the next [`commit`](Self::commit) persists.
    pub async fn prepare(
        &self,
        counterparty_id: &str,
        price: u64,
        delay: u64,
        total_parts: u32,
        name: &str,
    ) -> Result<StreamPayment, StreamError> {
        validate_draft(counterparty_id, price, delay, total_parts)?;

        if !self.shared.client.check_connection().await {
            return Err(StreamError::NoBackendConnection);
        }

        let fee = self
            .shared
            .client
            .quote_fee(counterparty_id, price)
            .await
            .map_err(|e| StreamError::FeeQuote(format!("{e:#}")))?;

        let draft = StreamPayment::draft(
            counterparty_id,
            price,
            delay,
            total_parts,
            name,
            fee,
            &self.shared.config.memo_prefix,
        );
        debug!(
            "prepared stream {} to {}: {} x {} (fee {})",
            draft.id, draft.counterparty_id, draft.total_parts, draft.price, draft.fee
        );
        *self.draft_slot() = Some(draft.clone());
        Ok(draft)
    }

    /// The active draft, if any.
    pub fn draft(&self) -> Option<StreamPayment> {
        self.draft_slot().clone()
    }

    pub fn discard_draft(&self) {
        self.draft_slot().take();
    }

    /// Persist the active draft as a paused stream and register it.
    pub fn commit(&self) -> Result<StreamPayment, StreamError> {
        let mut stream = self.draft_slot().take().ok_or(StreamError::MissingDraft)?;
        stream.status = StreamStatus::Paused;

        if let Err(e) = self.shared.store.insert_stream(&stream.to_record()) {
            error!("failed to persist stream {}: {:#}", stream.id, e);
        }
        self.shared.registry.insert(stream.clone());

        info!("committed stream {} ({})", stream.id, stream.name);
        self.shared
            .events
            .status_changed(&stream.id, StreamStatus::Paused);
        Ok(stream)
    }

    /// Pause every other stream, then start this one.
    ///
    /// Only one stream streams at a time: starting always pauses the others,
    /// including this stream if it was already running, so a restart begins
    /// from a clean state.
    pub fn start(&self, id: &str) {
        let mut table = self.shared.registry.lock();
        match table.get(id) {
            None => {
                debug!("start: unknown stream {}", id);
                return;
            }
            Some(entry) if entry.stream.status.is_terminal() => {
                warn!("start: stream {} has already finished", id);
                return;
            }
            Some(_) => {}
        }

        self.pause_all_locked(&mut table);

        let Some(entry) = table.get_mut(id) else {
            return;
        };
        entry.epoch += 1;
        entry.stream.status = StreamStatus::Streaming;
        entry.stream.parts_requested = 0;
        self.persist_progress(&entry.stream);
        entry.timers = Some(self.arm(id, entry.stream.delay_duration(), entry.epoch));

        info!(
            "started stream {} ({}/{} parts paid)",
            id, entry.stream.parts_paid, entry.stream.total_parts
        );
        self.shared
            .events
            .status_changed(id, StreamStatus::Streaming);
    }

    /// Stop a streaming stream. Unknown or non-streaming ids are ignored.
    pub fn pause(&self, id: &str) {
        let mut table = self.shared.registry.lock();
        self.pause_locked(&mut table, id);
    }

    pub fn pause_all(&self) {
        let mut table = self.shared.registry.lock();
        self.pause_all_locked(&mut table);
    }

    /// End a stream for good, whether its parts are all paid or not.
    pub fn finish(&self, id: &str) {
        let mut table = self.shared.registry.lock();
        self.finish_locked(&mut table, id);
    }

    /// User-initiated end of a stream.
    pub fn cancel(&self, id: &str) {
        info!("cancelling stream {}", id);
        self.finish(id);
    }

    /// Pause the stream and notify about `err`.
    pub fn handle_error(&self, id: &str, err: StreamError) {
        let mut table = self.shared.registry.lock();
        self.fail_locked(&mut table, id, err);
    }

    /// Registered streams, newest first.
    pub fn streams(&self) -> Vec<StreamPayment> {
        self.shared.registry.list()
    }

    pub fn stream(&self, id: &str) -> Option<StreamPayment> {
        self.shared.registry.get(id)
    }

    /// Stored parts of a stream.
    pub fn parts(&self, id: &str) -> Result<Vec<StreamPart>> {
        self.shared.store.list_parts(id)
    }

    /// Drop a finished stream from the registry. Returns false for streams
    /// that are unknown or not finished.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut table = self.shared.registry.lock();
        match table.get(id) {
            Some(entry) if entry.stream.status.is_terminal() => {
                table.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Pause everything before exit so nothing stays "running" on disk.
    pub fn shutdown(&self) {
        self.pause_all();
        self.discard_draft();
    }

    pub(crate) fn pause_locked(&self, table: &mut StreamTable, id: &str) -> bool {
        let Some(entry) = table.get_mut(id) else {
            return false;
        };
        if entry.stream.status != StreamStatus::Streaming {
            return false;
        }

        if let Some(timers) = entry.timers.take() {
            timers.cancel();
        }
        entry.stream.status = StreamStatus::Paused;
        entry.stream.parts_requested = 0;
        self.persist_progress(&entry.stream);

        info!(
            "paused stream {} ({}/{} parts paid)",
            id, entry.stream.parts_paid, entry.stream.total_parts
        );
        self.shared.events.status_changed(id, StreamStatus::Paused);
        true
    }

    pub(crate) fn fail_locked(&self, table: &mut StreamTable, id: &str, err: StreamError) {
        warn!("stream {} failed: {} [{}]", id, err, err.code());
        self.pause_locked(table, id);
        self.shared.events.error(id, &err);
    }

    pub(crate) fn pause_all_locked(&self, table: &mut StreamTable) {
        let streaming: Vec<String> = table
            .values()
            .filter(|entry| entry.stream.status == StreamStatus::Streaming)
            .map(|entry| entry.stream.id.clone())
            .collect();
        for id in streaming {
            self.pause_locked(table, &id);
        }
    }

    pub(crate) fn finish_locked(&self, table: &mut StreamTable, id: &str) {
        match table.get(id) {
            None => return,
            Some(entry) if entry.stream.status.is_terminal() => return,
            Some(_) => {}
        }

        self.pause_all_locked(table);

        let Some(entry) = table.get_mut(id) else {
            return;
        };
        entry.timers = None;
        entry.stream.status = StreamStatus::Finished;
        entry.stream.parts_requested = 0;
        self.persist_progress(&entry.stream);

        info!(
            "finished stream {} ({}/{} parts paid)",
            id, entry.stream.parts_paid, entry.stream.total_parts
        );
        self.shared.events.status_changed(id, StreamStatus::Finished);
    }

    /// Best-effort write of progress and status.
    pub(crate) fn persist_progress(&self, stream: &StreamPayment) {
        if let Err(e) = self.shared.store.update_stream_progress(
            &stream.id,
            stream.parts_paid,
            stream.status.persisted(),
        ) {
            error!("failed to persist progress of stream {}: {:#}", stream.id, e);
        }
    }

    pub(crate) fn persist_part(&self, part: &StreamPart) {
        if let Err(e) = self.shared.store.insert_part(part) {
            error!(
                "failed to record part {} of stream {}: {:#}",
                part.payment_hash, part.stream_id, e
            );
        }
    }

    fn draft_slot(&self) -> MutexGuard<'_, Option<StreamPayment>> {
        self.shared.draft.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_draft(
    counterparty_id: &str,
    price: u64,
    delay: u64,
    total_parts: u32,
) -> Result<(), StreamError> {
    if counterparty_id.trim().is_empty() {
        return Err(StreamError::InvalidDraft("counterparty is empty".to_string()));
    }
    if price == 0 {
        return Err(StreamError::InvalidDraft("price must be positive".to_string()));
    }
    if delay == 0 {
        return Err(StreamError::InvalidDraft("delay must be positive".to_string()));
    }
    if total_parts == 0 {
        return Err(StreamError::InvalidDraft(
            "at least one part is required".to_string(),
        ));
    }
    Ok(())
}
