//! Multi-step agent workflows
//!
//! A [`PipelineStage`] wraps one observable agent run between a prompt builder
//! and an output extractor. Stages compose with [`chain`] and [`pipeline`];
//! the first failing stage stops the chain unless it was wrapped with
//! [`with_fallback`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::adapter::{run_observable, RunOptions};
use crate::capability::AgentCapability;
use crate::error::{AgentError, Result};
use crate::event::{FinishEvent, StepEvent};

pub type PromptFn<In> = Arc<dyn Fn(&In) -> String + Send + Sync>;
pub type ExtractFn<Out> =
    Arc<dyn Fn(&FinishEvent) -> std::result::Result<Out, String> + Send + Sync>;

/// Outcome of running a stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult<T> {
    /// Name of the stage that produced this result
    pub stage: String,
    pub steps: Vec<StepEvent>,
    /// `None` when no agent run finished, i.e. for fallbacks and empty pipelines
    pub finish: Option<FinishEvent>,
    pub data: T,
    /// Whether `data` is a fallback value standing in for a failed stage
    pub fallback: bool,
}

impl<T> StageResult<T> {
    /// Zero-step result carrying a fallback value
    pub fn from_fallback(stage: impl Into<String>, data: T) -> Self {
        Self {
            stage: stage.into(),
            steps: Vec::new(),
            finish: None,
            data,
            fallback: true,
        }
    }
}

/// Anything that turns an input into a [`StageResult`] by running agents
#[async_trait]
pub trait Stage<In: Send + 'static>: Send + Sync {
    type Output: Send + 'static;

    fn name(&self) -> &str;

    async fn run(&self, input: In) -> Result<StageResult<Self::Output>>;
}

#[async_trait]
impl<In, S> Stage<In> for Arc<S>
where
    In: Send + 'static,
    S: Stage<In> + ?Sized,
{
    type Output = S::Output;

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, input: In) -> Result<StageResult<Self::Output>> {
        (**self).run(input).await
    }
}

/// One agent run: `input -> prompt -> agent -> finish -> output`
pub struct PipelineStage<In, Out> {
    name: String,
    agent: Arc<dyn AgentCapability>,
    prompt_builder: PromptFn<In>,
    output_extractor: ExtractFn<Out>,
    options: RunOptions,
}

impl<In, Out> PipelineStage<In, Out> {
    pub fn new<P, E>(
        name: impl Into<String>,
        agent: Arc<dyn AgentCapability>,
        prompt_builder: P,
        output_extractor: E,
    ) -> Self
    where
        P: Fn(&In) -> String + Send + Sync + 'static,
        E: Fn(&FinishEvent) -> std::result::Result<Out, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            agent,
            prompt_builder: Arc::new(prompt_builder),
            output_extractor: Arc::new(output_extractor),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

impl<In> PipelineStage<In, String> {
    /// Stage whose output is the agent's final answer text
    pub fn text<P>(name: impl Into<String>, agent: Arc<dyn AgentCapability>, prompt_builder: P) -> Self
    where
        P: Fn(&In) -> String + Send + Sync + 'static,
    {
        Self::new(name, agent, prompt_builder, |finish: &FinishEvent| {
            Ok(finish.output_text())
        })
    }
}

impl<In, Out> Clone for PipelineStage<In, Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            agent: Arc::clone(&self.agent),
            prompt_builder: Arc::clone(&self.prompt_builder),
            output_extractor: Arc::clone(&self.output_extractor),
            options: self.options.clone(),
        }
    }
}

impl<In, Out> std::fmt::Debug for PipelineStage<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<In, Out> Stage<In> for PipelineStage<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    type Output = Out;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: In) -> Result<StageResult<Out>> {
        let started = Instant::now();
        info!(stage = %self.name, "Running stage");

        let prompt = (self.prompt_builder)(&input);
        drop(input);

        let outcome = async {
            let stream = run_observable(Arc::clone(&self.agent), prompt, self.options.clone())?;
            stream.collect_run().await
        }
        .await;

        let (steps, finish) = match outcome {
            Ok(run) => run,
            Err(err) => {
                warn!(stage = %self.name, error = %err, "Stage failed");
                return Err(err.in_stage(&self.name));
            }
        };

        let data = (self.output_extractor)(&finish).map_err(|message| {
            warn!(stage = %self.name, error = %message, "Stage output extraction failed");
            AgentError::Extraction {
                stage: self.name.clone(),
                message,
            }
        })?;

        info!(
            stage = %self.name,
            steps = steps.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage completed"
        );

        Ok(StageResult {
            stage: self.name.clone(),
            steps,
            finish: Some(finish),
            data,
            fallback: false,
        })
    }
}

/// Two stages run back to back; the first's output feeds the second
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    name: String,
    first: A,
    second: B,
}

#[async_trait]
impl<In, A, B> Stage<In> for Chain<A, B>
where
    In: Send + 'static,
    A: Stage<In>,
    B: Stage<A::Output>,
{
    type Output = B::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: In) -> Result<StageResult<B::Output>> {
        let first = self.first.run(input).await?;
        self.second.run(first.data).await
    }
}

/// Compose two stages into one
pub fn chain<In, A, B>(first: A, second: B) -> Chain<A, B>
where
    In: Send + 'static,
    A: Stage<In>,
    B: Stage<A::Output>,
{
    Chain {
        name: format!("{} -> {}", first.name(), second.name()),
        first,
        second,
    }
}

pub type BoxedStage<T> = Arc<dyn Stage<T, Output = T>>;

/// Left-to-right fold over same-typed stages
pub struct Pipeline<T: Send + 'static> {
    name: String,
    stages: Vec<BoxedStage<T>>,
}

impl<T: Send + 'static> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for Pipeline<T> {
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: T) -> Result<StageResult<T>> {
        let mut result = StageResult {
            stage: self.name.clone(),
            steps: Vec::new(),
            finish: None,
            data: input,
            fallback: false,
        };
        for (index, stage) in self.stages.iter().enumerate() {
            info!(pipeline = %self.name, index, stage = %stage.name(), "Pipeline step");
            result = stage.run(result.data).await?;
        }
        Ok(result)
    }
}

/// Build a pipeline. An empty pipeline returns its input unchanged.
pub fn pipeline<T: Send + 'static>(stages: Vec<BoxedStage<T>>) -> Pipeline<T> {
    let name = if stages.is_empty() {
        "pipeline".to_string()
    } else {
        stages
            .iter()
            .map(|stage| stage.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    };
    Pipeline { name, stages }
}

/// A stage that substitutes a fixed value when the inner stage fails
#[derive(Debug, Clone)]
pub struct WithFallback<S, Out> {
    stage: S,
    fallback: Out,
}

#[async_trait]
impl<In, S, Out> Stage<In> for WithFallback<S, Out>
where
    In: Send + 'static,
    S: Stage<In, Output = Out>,
    Out: Clone + Send + Sync + 'static,
{
    type Output = Out;

    fn name(&self) -> &str {
        self.stage.name()
    }

    async fn run(&self, input: In) -> Result<StageResult<Out>> {
        match self.stage.run(input).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(stage = %self.stage.name(), error = %err, "Stage failed, using fallback value");
                Ok(StageResult::from_fallback(
                    self.stage.name(),
                    self.fallback.clone(),
                ))
            }
        }
    }
}

pub fn with_fallback<In, S>(stage: S, fallback: S::Output) -> WithFallback<S, S::Output>
where
    In: Send + 'static,
    S: Stage<In>,
{
    WithFallback { stage, fallback }
}

/// Run a single stage
pub async fn run_stage<In, S>(stage: &S, input: In) -> Result<StageResult<S::Output>>
where
    In: Send + 'static,
    S: Stage<In> + ?Sized,
{
    stage.run(input).await
}

/// Run a single stage, returning `fallback` instead of any error
pub async fn run_stage_with_fallback<In, S>(
    stage: &S,
    input: In,
    fallback: S::Output,
) -> StageResult<S::Output>
where
    In: Send + 'static,
    S: Stage<In> + ?Sized,
{
    match stage.run(input).await {
        Ok(result) => result,
        Err(err) => {
            warn!(stage = %stage.name(), error = %err, "Stage failed, using fallback value");
            StageResult::from_fallback(stage.name(), fallback)
        }
    }
}
