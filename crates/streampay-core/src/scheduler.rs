// Per-stream iteration scheduler
//
// A streaming stream owns one ticker task. Each tick reserves one part and
// spawns it into the ticker's JoinSet, where the remote calls race a
// watchdog. Aborting the ticker drops the JoinSet and with it every
// in-flight part.

use std::time::Duration;

use log::{debug, error};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use streampay_client::{InvoiceRequest, PayRequest, PaymentClient, Receipt, is_unreachable};
use streampay_types::{StreamError, StreamPart, StreamStatus, StreamStore};

use crate::controller::StreamController;
use crate::timers::StreamTimers;

/// Shortest tick period; `interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Outcome of the synchronous part of a tick.
#[derive(Debug)]
pub(crate) enum TickStep {
    Stop,
    Idle,
    Part(PartTicket),
}

/// A reserved part, ready for its remote calls.
#[derive(Debug)]
pub(crate) struct PartTicket {
    pub(crate) request: InvoiceRequest,
    pub(crate) epoch: u64,
}

impl<S: StreamStore, P: PaymentClient> StreamController<S, P> {
    /// Spawn the ticker of run `epoch`. The first tick fires one `delay`
    /// from now.
    pub(crate) fn arm(&self, id: &str, delay: Duration, epoch: u64) -> StreamTimers {
        let controller = self.clone();
        let id = id.to_string();
        let ticker = tokio::spawn(async move {
            controller.run_ticker(id, delay, epoch).await;
        });
        StreamTimers::new(ticker.abort_handle())
    }

    async fn run_ticker(self, id: String, delay: Duration, epoch: u64) {
        let period = delay.max(MIN_TICK);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut parts = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.begin_tick(&id, epoch) {
                        TickStep::Stop => break,
                        TickStep::Idle => {}
                        TickStep::Part(ticket) => {
                            let controller = self.clone();
                            let id = id.clone();
                            parts.spawn(async move {
                                controller.run_part(id, ticket).await;
                            });
                        }
                    }
                }
                Some(joined) = parts.join_next(), if !parts.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("part task of stream {} panicked: {}", id, e);
                        }
                    }
                }
            }
        }
        debug!("ticker of stream {} stopped", id);
    }

    /// Completion check and part reservation, under the registry lock.
    ///
    /// The part is counted in `parts_requested` before its invoice is
    /// requested, so `parts_paid + parts_requested` never exceeds
    /// `total_parts` however many ticks overlap.
    pub(crate) fn begin_tick(&self, id: &str, epoch: u64) -> TickStep {
        let mut table = self.registry().lock();
        if !table.contains_key(id) {
            self.fail_locked(&mut table, id, StreamError::NotInStore(id.to_string()));
            return TickStep::Stop;
        }
        let Some(entry) = table.get_mut(id) else {
            return TickStep::Stop;
        };
        if entry.epoch != epoch || entry.stream.status != StreamStatus::Streaming {
            return TickStep::Stop;
        }

        let stream = &mut entry.stream;
        if stream.is_fully_requested() {
            if stream.parts_requested > 0 {
                debug!(
                    "stream {}: waiting on {} part(s) in flight",
                    id, stream.parts_requested
                );
                return TickStep::Idle;
            }
            self.finish_locked(&mut table, id);
            return TickStep::Stop;
        }

        stream.parts_requested += 1;
        let n = stream.parts_paid + stream.parts_requested;
        let request = InvoiceRequest {
            counterparty_id: stream.counterparty_id.clone(),
            amount: stream.price,
            memo: stream.part_memo(n),
        };
        debug!("stream {}: requesting part {}/{}", id, n, stream.total_parts);
        TickStep::Part(PartTicket { request, epoch })
    }

    async fn run_part(self, id: String, ticket: PartTicket) {
        let watchdog = self.config().stream_error_timeout();
        let outcome = tokio::select! {
            result = self.request_and_pay(ticket.request) => result,
            _ = time::sleep(watchdog) => Err(StreamError::RemoteNotResponding),
        };
        self.settle_part(&id, ticket.epoch, outcome);
    }

    async fn request_and_pay(&self, request: InvoiceRequest) -> Result<Receipt, StreamError> {
        let invoice = self
            .client()
            .create_invoice(request)
            .await
            .map_err(|e| {
                if is_unreachable(&e) {
                    StreamError::RemoteOffline
                } else {
                    StreamError::Remote(format!("{e:#}"))
                }
            })?;

        self.client()
            .pay_invoice(PayRequest {
                invoice: invoice.invoice,
            })
            .await
            .map_err(|e| StreamError::Remote(format!("{e:#}")))
    }

    /// Apply a part's outcome, unless the run it belongs to is over.
    pub(crate) fn settle_part(&self, id: &str, epoch: u64, outcome: Result<Receipt, StreamError>) {
        let mut table = self.registry().lock();
        let Some(entry) = table.get_mut(id) else {
            debug!("stream {}: dropping part result of a removed stream", id);
            return;
        };
        if entry.epoch != epoch || entry.stream.status != StreamStatus::Streaming {
            debug!("stream {}: discarding late part result", id);
            return;
        }
        entry.stream.parts_requested = entry.stream.parts_requested.saturating_sub(1);

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(err) => {
                self.fail_locked(&mut table, id, err);
                return;
            }
        };

        if !entry.stream.record_paid_part() {
            debug!("stream {}: all parts already paid", id);
            return;
        }
        self.persist_progress(&entry.stream);
        self.persist_part(&StreamPart::new(receipt.payment_hash, id));
        debug!(
            "stream {}: part {}/{} paid",
            id, entry.stream.parts_paid, entry.stream.total_parts
        );
        self.events().progress(&entry.stream);
        self.events().refresh(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventReceiver, EventSink};
    use streampay_client::testing::ScriptedPaymentClient;
    use streampay_db::SqliteStreamStore;
    use streampay_types::{EngineConfig, StreamEvent, StreamPayment};

    type Controller = StreamController<SqliteStreamStore, ScriptedPaymentClient>;

    fn controller() -> (Controller, EventReceiver) {
        let (events, rx) = EventSink::channel();
        let controller = StreamController::new(
            SqliteStreamStore::open_in_memory().unwrap(),
            ScriptedPaymentClient::new(),
            EngineConfig::default(),
            events,
        );
        (controller, rx)
    }

    fn streaming(controller: &Controller, total_parts: u32) -> (String, u64) {
        let mut stream = StreamPayment::draft("abc", 100, 1000, total_parts, "s", 1, "tip");
        stream.status = StreamStatus::Streaming;
        let id = stream.id.clone();
        controller
            .store()
            .insert_stream(&stream.to_record())
            .unwrap();
        controller.registry().insert(stream);
        let mut table = controller.registry().lock();
        let entry = table.get_mut(&id).unwrap();
        entry.epoch = 1;
        (id, entry.epoch)
    }

    fn receipt(hash: &str) -> Receipt {
        Receipt {
            payment_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_missing_stream_is_routed_as_error() {
        let (controller, mut rx) = controller();
        assert!(matches!(controller.begin_tick("gone", 1), TickStep::Stop));

        match rx.try_recv().unwrap() {
            StreamEvent::Error {
                stream_id, code, ..
            } => {
                assert_eq!(stream_id, "gone");
                assert_eq!(code, "not_in_store");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_tick_reserves_before_requesting() {
        let (controller, _rx) = controller();
        let (id, epoch) = streaming(&controller, 2);

        let TickStep::Part(first) = controller.begin_tick(&id, epoch) else {
            panic!("expected a part");
        };
        assert_eq!(first.request.memo, "tips (1/2)");
        assert_eq!(first.request.amount, 100);

        let TickStep::Part(second) = controller.begin_tick(&id, epoch) else {
            panic!("expected a part");
        };
        assert!(second.request.memo.ends_with("(2/2)"));

        // Two parts in flight cover the stream: the next tick idles.
        assert!(matches!(controller.begin_tick(&id, epoch), TickStep::Idle));
        assert_eq!(controller.stream(&id).unwrap().parts_requested, 2);
    }

    #[test]
    fn test_tick_from_older_run_stops() {
        let (controller, _rx) = controller();
        let (id, epoch) = streaming(&controller, 2);
        assert!(matches!(controller.begin_tick(&id, epoch - 1), TickStep::Stop));
        assert_eq!(controller.stream(&id).unwrap().parts_requested, 0);
    }

    #[test]
    fn test_settled_part_is_recorded() {
        let (controller, mut rx) = controller();
        let (id, epoch) = streaming(&controller, 1);
        let TickStep::Part(ticket) = controller.begin_tick(&id, epoch) else {
            panic!("expected a part");
        };

        controller.settle_part(&id, ticket.epoch, Ok(receipt("h1")));
        let stream = controller.stream(&id).unwrap();
        assert_eq!(stream.parts_paid, 1);
        assert_eq!(stream.parts_requested, 0);
        assert_eq!(controller.parts(&id).unwrap(), vec![StreamPart::new("h1", &id)]);
        assert_eq!(controller.store().get_stream(&id).unwrap().unwrap().parts_paid, 1);

        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Progress { parts_paid: 1, .. }));
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::RefreshRequested { .. }));

        // Everything paid and nothing in flight: the next tick finishes.
        assert!(matches!(controller.begin_tick(&id, epoch), TickStep::Stop));
        assert_eq!(controller.stream(&id).unwrap().status, StreamStatus::Finished);
    }

    #[test]
    fn test_failed_part_pauses() {
        let (controller, mut rx) = controller();
        let (id, epoch) = streaming(&controller, 3);
        let TickStep::Part(ticket) = controller.begin_tick(&id, epoch) else {
            panic!("expected a part");
        };

        controller.settle_part(&id, ticket.epoch, Err(StreamError::RemoteOffline));
        let stream = controller.stream(&id).unwrap();
        assert_eq!(stream.status, StreamStatus::Paused);
        assert_eq!(stream.parts_paid, 0);
        assert_eq!(stream.parts_requested, 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(
            events.as_slice(),
            [
                StreamEvent::StatusChanged { status: StreamStatus::Paused, .. },
                StreamEvent::Error { code: "remote_offline", .. },
            ]
        ));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let (controller, mut rx) = controller();
        let (id, epoch) = streaming(&controller, 3);
        let TickStep::Part(ticket) = controller.begin_tick(&id, epoch) else {
            panic!("expected a part");
        };
        controller.pause(&id);
        let _ = rx.try_recv();

        controller.settle_part(&id, ticket.epoch, Ok(receipt("late")));
        assert_eq!(controller.stream(&id).unwrap().parts_paid, 0);
        assert!(controller.parts(&id).unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_progress_stays_within_total(total in 1u32..6, ops in proptest::collection::vec(0u8..4, 0..60)) {
            let (controller, _rx) = controller();
            let (id, mut epoch) = streaming(&controller, total);
            let mut in_flight = Vec::new();
            let mut settled = 0;

            for op in ops {
                match op {
                    0 => {
                        if let TickStep::Part(ticket) = controller.begin_tick(&id, epoch) {
                            in_flight.push(ticket);
                        }
                    }
                    1 | 2 if !in_flight.is_empty() => {
                        let ticket = in_flight.remove(0);
                        settled += 1;
                        let outcome = if op == 1 {
                            Ok(receipt(&format!("h{settled}")))
                        } else {
                            Err(StreamError::Remote("declined".to_string()))
                        };
                        controller.settle_part(&id, ticket.epoch, outcome);
                    }
                    3 => {
                        // Restart without a ticker.
                        let mut table = controller.registry().lock();
                        let entry = table.get_mut(&id).unwrap();
                        if entry.stream.status == StreamStatus::Paused {
                            entry.epoch += 1;
                            entry.stream.status = StreamStatus::Streaming;
                            entry.stream.parts_requested = 0;
                            epoch = entry.epoch;
                        }
                    }
                    _ => {}
                }

                let stream = controller.stream(&id).unwrap();
                prop_assert!(stream.parts_paid <= stream.total_parts);
                prop_assert!(stream.parts_paid + stream.parts_requested <= stream.total_parts);
                prop_assert_eq!(controller.parts(&id).unwrap().len() as u32, stream.parts_paid);
            }
        }
    }
}
