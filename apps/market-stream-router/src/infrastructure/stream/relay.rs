//! Output Relay
//!
//! Background consumer owned by a stream runner. Drains the stream's
//! internal queue and republishes every batch onto the shared event queue,
//! wrapped according to the stream's output mode.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::services::queue::{EventQueue, QueueError};
use crate::domain::streaming::{OutputMode, RawBatch, StreamId, StreamKind};
use crate::infrastructure::metrics;

/// Per-stream relay task.
#[derive(Debug)]
pub struct OutputRelay {
    stream_id: StreamId,
    kind: StreamKind,
    mode: OutputMode,
    input: mpsc::Receiver<RawBatch>,
    events: EventQueue,
    stop: CancellationToken,
}

impl OutputRelay {
    /// Create a relay.
    ///
    /// `stop` must only be cancelled once the producer side has stopped
    /// producing; the relay then performs one final drain.
    #[must_use]
    pub fn new(
        stream_id: impl Into<StreamId>,
        kind: StreamKind,
        mode: OutputMode,
        input: mpsc::Receiver<RawBatch>,
        events: EventQueue,
        stop: CancellationToken,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            kind,
            mode,
            input,
            events,
            stop,
        }
    }

    /// Run until stopped, returning the number of events relayed.
    pub async fn run(mut self) -> u64 {
        let mut relayed = 0;

        loop {
            tokio::select! {
                biased;
                batch = self.input.recv() => {
                    let Some(batch) = batch else {
                        tracing::debug!(stream_id = %self.stream_id, "Relay input closed");
                        break;
                    };
                    if self.forward(batch).await.is_err() {
                        return self.closed(relayed);
                    }
                    relayed += 1;
                }
                () = self.stop.cancelled() => {
                    while let Ok(batch) = self.input.try_recv() {
                        if self.forward(batch).await.is_err() {
                            return self.closed(relayed);
                        }
                        relayed += 1;
                    }
                    break;
                }
            }
        }

        tracing::info!(stream_id = %self.stream_id, relayed, "Output relay stopped");
        relayed
    }

    async fn forward(&self, batch: RawBatch) -> Result<(), QueueError> {
        let event = self.mode.wrap(self.kind, batch);
        let kind = event.kind();
        self.events.put(event).await?;
        metrics::record_event_relayed(&self.stream_id, kind);
        Ok(())
    }

    fn closed(&self, relayed: u64) -> u64 {
        tracing::warn!(
            stream_id = %self.stream_id,
            relayed,
            "Event queue closed, output relay stopped"
        );
        relayed
    }
}
