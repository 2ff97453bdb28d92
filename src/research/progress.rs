//! Progress consumers.
//!
//! The orchestrator reports every transition to a single [`ProgressSink`].
//! Sinks are called inline on the orchestration path and must return
//! quickly; anything slow (I/O, persistence) belongs behind a
//! [`ChannelSink`].

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::types::ResearchStep;

/// Receiver of research progress events.
pub trait ProgressSink: Send + Sync {
    /// Called once per event, in emission order for any single branch.
    fn on_progress(&self, step: &ResearchStep);
}

impl<F> ProgressSink for F
where
    F: Fn(&ResearchStep) + Send + Sync,
{
    fn on_progress(&self, step: &ResearchStep) {
        self(step)
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ResearchStep>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResearchStep>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, step: &ResearchStep) {
        if self.sender.send(step.clone()).is_err() {
            trace!(kind = step.kind(), "Progress receiver closed, dropping event");
        }
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, step: &ResearchStep) {
        match step {
            ResearchStep::Error { node_id, message } => {
                warn!(node_id = %node_id, error = %message, "Research node error");
            }
            ResearchStep::GeneratingQueryReasoning { .. }
            | ResearchStep::ProcessingSearchResultReasoning { .. } => {
                trace!(node_id = %step.node_id(), kind = step.kind(), "Research progress");
            }
            _ => {
                debug!(node_id = %step.node_id(), kind = step.kind(), "Research progress");
            }
        }
    }
}

/// Delivers each event to several sinks, in the order they were added.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    /// An empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of attached sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when no sink is attached.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for FanoutSink {
    fn on_progress(&self, step: &ResearchStep) {
        for sink in &self.sinks {
            sink.on_progress(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn error_step(id: &str) -> ResearchStep {
        ResearchStep::Error {
            node_id: id.to_string(),
            message: "m".to_string(),
        }
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |step: &ResearchStep| seen.lock().unwrap().push(step.node_id().to_string())
        };
        sink.on_progress(&error_step("0"));
        sink.on_progress(&error_step("0-1"));
        assert_eq!(*seen.lock().unwrap(), vec!["0", "0-1"]);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut receiver) = ChannelSink::new();
        sink.on_progress(&error_step("a"));
        sink.on_progress(&error_step("b"));
        drop(sink);

        let mut ids = Vec::new();
        while let Some(step) = receiver.recv().await {
            ids.push(step.node_id().to_string());
        }
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.on_progress(&error_step("a"));
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(Mutex::new(0));
        let second = Arc::new(Mutex::new(0));
        let counter = |c: Arc<Mutex<i32>>| -> Arc<dyn ProgressSink> {
            Arc::new(move |_: &ResearchStep| *c.lock().unwrap() += 1)
        };

        let fanout = FanoutSink::new()
            .with(counter(Arc::clone(&first)))
            .with(counter(Arc::clone(&second)))
            .with(Arc::new(TracingSink));
        assert_eq!(fanout.len(), 3);

        fanout.on_progress(&error_step("0"));
        assert_eq!(*first.lock().unwrap(), 1);
        assert_eq!(*second.lock().unwrap(), 1);
    }
}
