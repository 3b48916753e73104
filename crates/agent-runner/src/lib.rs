//! Agent Runner - observable agent runs and multi-step pipelines
//!
//! This crate turns an opaque, callback-driven agent capability into an
//! ordered stream of [`AgentEvent`]s and composes such runs into pipelines.

mod adapter;
mod capability;
mod client;
mod error;
mod event;
mod pipeline;
mod tools;

#[cfg(test)]
mod testing;

pub use adapter::{observe, run_observable, AgentEventStream, RunOptions, DEFAULT_EVENT_BUFFER};
pub use capability::{AgentCapability, InvokeOutput, RunNotification, RunObserver};
pub use client::WorkerAgent;
pub use error::{AgentError, CapabilityError, Result};
pub use event::{AgentEvent, ErrorEvent, FailureKind, FinishEvent, Observation, StepEvent};
pub use pipeline::{
    chain, pipeline, run_stage, run_stage_with_fallback, with_fallback, BoxedStage, Chain,
    ExtractFn, Pipeline, PipelineStage, PromptFn, Stage, StageResult, WithFallback,
};
pub use tools::{output_text, Tool};
