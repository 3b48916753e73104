//! Observable agent adapter
//!
//! Turns one push-style agent invocation into a pull-style, ordered
//! [`AgentEventStream`]. A single writer task owns the sending half of the
//! stream and is the only place it can be closed, so a run never yields two
//! terminal events and never leaves the stream open after the agent settles.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::capability::{AgentCapability, RunNotification, RunObserver};
use crate::error::{AgentError, Result};
use crate::event::{AgentEvent, ErrorEvent, FinishEvent, Observation, StepEvent};

/// Default capacity of the per-run event channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Options for a single observable run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Deadline for the agent call; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Capacity of the event channel
    pub buffer: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Ordered events of one agent run
pub struct AgentEventStream {
    inner: ReceiverStream<AgentEvent>,
}

impl AgentEventStream {
    fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Drain the stream into its ordered steps and the finish event.
    ///
    /// Fails with the run's error, or with [`AgentError::NoFinishEvent`] if the
    /// stream closed without a terminal event.
    pub async fn collect_run(mut self) -> Result<(Vec<StepEvent>, FinishEvent)> {
        let mut steps = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                AgentEvent::Step(step) => steps.push(step),
                AgentEvent::Finish(finish) => return Ok((steps, finish)),
                AgentEvent::Error(error) => return Err(error.into()),
            }
        }
        Err(AgentError::NoFinishEvent)
    }
}

impl Stream for AgentEventStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for AgentEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEventStream").finish_non_exhaustive()
    }
}

/// Start an agent run and return its event stream.
///
/// Must be called from within a Tokio runtime. Each call is independent; any
/// number of runs may be in flight and drained concurrently.
pub fn run_observable(
    agent: Arc<dyn AgentCapability>,
    prompt: impl Into<String>,
    options: RunOptions,
) -> Result<AgentEventStream> {
    let prompt = prompt.into();
    if prompt.trim().is_empty() {
        return Err(AgentError::EmptyPrompt);
    }

    let (event_tx, event_rx) = mpsc::channel(options.buffer.max(1));
    tokio::spawn(drive_run(agent, prompt, options.timeout, event_tx));

    Ok(AgentEventStream::new(event_rx))
}

/// Run an agent to completion and return its ordered steps and finish event
pub async fn observe(
    agent: Arc<dyn AgentCapability>,
    prompt: impl Into<String>,
    options: RunOptions,
) -> Result<(Vec<StepEvent>, FinishEvent)> {
    run_observable(agent, prompt, options)?.collect_run().await
}

/// Sole owner of a run's event sender
struct EventWriter {
    tx: Option<mpsc::Sender<AgentEvent>>,
}

impl EventWriter {
    fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    async fn step(&mut self, step: StepEvent) {
        let Some(tx) = &self.tx else {
            debug!(tool = %step.tool_name, "Dropping step reported after the run ended");
            return;
        };
        if tx.send(AgentEvent::Step(step)).await.is_err() {
            debug!("Event stream dropped by its consumer");
        }
    }

    /// Emit the terminal event and close the stream. No-op once closed.
    async fn terminate(&mut self, event: AgentEvent) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(event).await;
        }
    }

    async fn forward(&mut self, notification: RunNotification) {
        match notification {
            RunNotification::StepStarted {
                call_id,
                tool,
                input,
            } => {
                self.step(StepEvent::new(call_id, tool, input, Observation::Pending))
                    .await
            }
            RunNotification::StepEnded {
                call_id,
                tool,
                input,
                observation,
            } => self.step(StepEvent::new(call_id, tool, input, observation)).await,
            RunNotification::Completed { output } => {
                self.terminate(AgentEvent::Finish(FinishEvent::new(output)))
                    .await
            }
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

async fn drive_run(
    agent: Arc<dyn AgentCapability>,
    prompt: String,
    timeout: Option<Duration>,
    events: mpsc::Sender<AgentEvent>,
) {
    // Subscribed before the invocation starts so no early tool call is missed.
    let (observer, mut notifications) = RunObserver::channel();
    let mut writer = EventWriter::new(events);

    let invocation = async move { agent.invoke(&prompt, observer).await };
    tokio::pin!(invocation);
    let expiry = deadline(timeout);
    tokio::pin!(expiry);

    let settled = loop {
        tokio::select! {
            biased;
            Some(notification) = notifications.recv() => writer.forward(notification).await,
            result = &mut invocation => break Some(result),
            _ = &mut expiry => break None,
        }
    };

    // Anything pushed before the agent settled still belongs to this run.
    while let Ok(notification) = notifications.try_recv() {
        writer.forward(notification).await;
    }

    match settled {
        Some(Ok(Some(output))) => {
            writer
                .terminate(AgentEvent::Finish(FinishEvent::new(output)))
                .await
        }
        Some(Ok(None)) => {
            if !writer.is_closed() {
                warn!("Agent settled without signalling completion or returning output");
            }
        }
        Some(Err(err)) => {
            debug!(cause = %err, "Agent rejected");
            writer
                .terminate(AgentEvent::Error(ErrorEvent::capability(err.message)))
                .await
        }
        None => {
            let millis = timeout.map(|d| d.as_millis() as u64).unwrap_or_default();
            warn!(millis, "Agent call timed out");
            writer
                .terminate(AgentEvent::Error(ErrorEvent::timeout(millis)))
                .await
        }
    }
}
