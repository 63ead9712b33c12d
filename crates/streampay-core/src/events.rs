use tokio::sync::mpsc;

use streampay_types::{STREAM_ERROR_CATEGORY, StreamError, StreamEvent, StreamPayment, StreamStatus};

pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Outbound side of the engine's notifications.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                log::debug!("event receiver dropped");
            }
        }
    }

    pub(crate) fn status_changed(&self, stream_id: &str, status: StreamStatus) {
        self.emit(StreamEvent::StatusChanged {
            stream_id: stream_id.to_string(),
            status,
        });
    }

    pub(crate) fn progress(&self, stream: &StreamPayment) {
        self.emit(StreamEvent::Progress {
            stream_id: stream.id.clone(),
            parts_paid: stream.parts_paid,
            total_parts: stream.total_parts,
        });
    }

    pub(crate) fn refresh(&self, stream_id: &str) {
        self.emit(StreamEvent::RefreshRequested {
            stream_id: stream_id.to_string(),
        });
    }

    pub(crate) fn error(&self, stream_id: &str, err: &StreamError) {
        self.emit(StreamEvent::Error {
            stream_id: stream_id.to_string(),
            category: STREAM_ERROR_CATEGORY,
            code: err.code(),
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitted_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.status_changed("s1", StreamStatus::Streaming);
        sink.error("s1", &StreamError::RemoteOffline);

        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::StatusChanged {
                stream_id: "s1".to_string(),
                status: StreamStatus::Streaming,
            }
        );
        match rx.try_recv().unwrap() {
            StreamEvent::Error {
                category, code, ..
            } => {
                assert_eq!(category, STREAM_ERROR_CATEGORY);
                assert_eq!(code, "remote_offline");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.refresh("s1");
        EventSink::disabled().refresh("s1");
    }
}
