//! Test doubles shared by the unit tests of this crate

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::capability::{AgentCapability, InvokeOutput, RunObserver};
use crate::error::CapabilityError;

/// Agent capability backed by a closure
pub struct FnAgent<F>(pub F);

#[async_trait]
impl<F, Fut> AgentCapability for FnAgent<F>
where
    F: Fn(String, RunObserver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvokeOutput, CapabilityError>> + Send + 'static,
{
    async fn invoke(
        &self,
        prompt: &str,
        observer: RunObserver,
    ) -> Result<InvokeOutput, CapabilityError> {
        (self.0)(prompt.to_string(), observer).await
    }
}

pub fn agent<F, Fut>(f: F) -> Arc<dyn AgentCapability>
where
    F: Fn(String, RunObserver) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvokeOutput, CapabilityError>> + Send + 'static,
{
    Arc::new(FnAgent(f))
}

/// `{"output": text}`
pub fn answer(text: &str) -> Map<String, Value> {
    match json!({ "output": text }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}
