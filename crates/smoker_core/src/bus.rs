//! Event fan-out to reporters.
//!
//! Producers push onto one unbounded channel. A dispatcher task forwards
//! every event, in arrival order, to a private queue per reporter, and each
//! reporter drains its own queue on its own task. A slow reporter therefore
//! never delays producers or other reporters.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ReporterError, ReporterStage};
use crate::event::Event;
use crate::options::SmokerOptions;

/// Error type reporters return from their hooks.
pub type ReporterFailure = Box<dyn std::error::Error + Send + Sync>;

/// A live reporter instance, owned by exactly one sink.
#[async_trait]
pub trait Reporter: Send {
    fn name(&self) -> &str;

    async fn setup(&mut self) -> Result<(), ReporterFailure> {
        Ok(())
    }

    async fn handle(&mut self, event: &Event) -> Result<(), ReporterFailure>;

    async fn teardown(&mut self) -> Result<(), ReporterFailure> {
        Ok(())
    }
}

/// A reporter as registered in the component catalog.
pub trait ReporterDef: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Creates a fresh instance for one run.
    fn create(&self, options: &SmokerOptions) -> Box<dyn Reporter>;
}

enum Message {
    Event(Arc<Event>),
    Close,
}

/// Cloneable handle used by workers and the controller to emit events.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl EventSender {
    /// Queues an event. Events emitted after shutdown are dropped.
    pub fn emit(&self, event: Event) {
        if self.tx.send(Message::Event(Arc::new(event))).is_err() {
            debug!("Event emitted after the bus closed");
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender").finish_non_exhaustive()
    }
}

/// The running bus.
pub struct EventBus {
    sender: EventSender,
    dispatcher: JoinHandle<Vec<ReporterError>>,
}

impl EventBus {
    /// Spawns one sink per reporter plus the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(reporters: Vec<Box<dyn Reporter>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let mut queues = Vec::with_capacity(reporters.len());
        let mut sinks = Vec::with_capacity(reporters.len());
        for reporter in reporters {
            let (sink_tx, sink_rx) = mpsc::unbounded_channel::<Arc<Event>>();
            queues.push(sink_tx);
            sinks.push(tokio::spawn(drain(reporter, sink_rx)));
        }

        let dispatcher = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Event(event) => {
                        for queue in &queues {
                            // A closed queue means the sink task panicked.
                            let _ = queue.send(Arc::clone(&event));
                        }
                    }
                    Message::Close => break,
                }
            }
            drop(queues);

            let mut errors = Vec::new();
            for joined in join_all(sinks).await {
                match joined {
                    Ok(sink_errors) => errors.extend(sink_errors),
                    Err(e) => errors.push(ReporterError {
                        reporter: "<unknown>".to_string(),
                        stage: ReporterStage::Event,
                        message: format!("reporter task failed: {e}"),
                    }),
                }
            }
            errors
        });

        Self {
            sender: EventSender { tx },
            dispatcher,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn emit(&self, event: Event) {
        self.sender.emit(event);
    }

    /// Flushes every queued event, runs reporter teardowns and returns all
    /// reporter failures in sink order.
    pub async fn shutdown(self) -> Vec<ReporterError> {
        let _ = self.sender.tx.send(Message::Close);
        match self.dispatcher.await {
            Ok(errors) => errors,
            Err(e) => vec![ReporterError {
                reporter: "<bus>".to_string(),
                stage: ReporterStage::Teardown,
                message: format!("event bus failed: {e}"),
            }],
        }
    }
}

async fn drain(
    mut reporter: Box<dyn Reporter>,
    mut queue: mpsc::UnboundedReceiver<Arc<Event>>,
) -> Vec<ReporterError> {
    let name = reporter.name().to_string();
    let mut errors = Vec::new();
    let failure = |stage: ReporterStage, err: ReporterFailure| {
        warn!("Reporter {} failed during {}: {}", name, stage, err);
        ReporterError {
            reporter: name.clone(),
            stage,
            message: err.to_string(),
        }
    };

    let ready = match reporter.setup().await {
        Ok(()) => true,
        Err(e) => {
            errors.push(failure(ReporterStage::Setup, e));
            false
        }
    };

    while let Some(event) = queue.recv().await {
        if !ready {
            continue;
        }
        if let Err(e) = reporter.handle(&event).await {
            errors.push(failure(ReporterStage::Event, e));
        }
    }

    if let Err(e) = reporter.teardown().await {
        errors.push(failure(ReporterStage::Teardown, e));
    }
    errors
}
