//! # Lossless path for the service's own output.
//!
//! The [`Bus`](super::Bus) drops events for receivers that fall behind, which is fine for
//! supervision events but not for the service's stdout/stderr: a build log must contain
//! every line. Output therefore travels on a bounded queue of its own:
//!
//! ```text
//! stdout forwarder ──┐
//!                    ├─► OutputSink ══ mpsc (bounded) ══► listener ──► SubscriberSet::emit_wait
//! stderr forwarder ──┘        ▲
//!                             └─ full queue: line() waits, the forwarder stops reading the pipe
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use super::event::Event;

/// Sending half of the process output queue.
///
/// Cheap to clone; every forwarder holds its own clone. The receiving side sees the end
/// of the stream once all clones are dropped.
#[derive(Clone, Debug)]
pub struct OutputSink {
    tx: mpsc::Sender<Event>,
}

impl OutputSink {
    /// Creates a sink and the receiver its lines arrive on (capacity clamped to at least 1).
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues one output line, waiting while the queue is full.
    ///
    /// Returns `false` once the receiving side is gone; the line is then discarded.
    pub async fn line(&self, line: impl Into<Arc<str>>) -> bool {
        self.tx.send(Event::output(line)).await.is_ok()
    }

    /// `true` once the receiving side was dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_full_queue_waits_instead_of_dropping() {
        let (sink, mut rx) = OutputSink::channel(1);

        let writer = tokio::spawn({
            let sink = sink.clone();
            async move {
                for i in 0..100 {
                    assert!(sink.line(i.to_string()).await);
                }
            }
        });
        drop(sink);

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            assert_eq!(ev.kind, EventKind::ProcessOutput);
            seen.push(ev.reason.unwrap().to_string());
        }
        writer.await.unwrap();

        let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_reported() {
        let (sink, rx) = OutputSink::channel(4);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.line("lost").await);
    }
}
