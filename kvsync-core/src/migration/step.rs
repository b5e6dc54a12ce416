//! Migration functions
//!
//! A migration maps the items of version `v - 1` to the items of version
//! `v`. Plain closures `Fn(Vec<Value>) -> Value` work directly; fallible or
//! async migrations go through [`async_step`].

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

#[async_trait]
pub trait MigrationFn: Send + Sync {
    /// Transform items; the result must be a JSON array
    async fn apply(&self, items: Vec<Value>) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F> MigrationFn for F
where
    F: Fn(Vec<Value>) -> Value + Send + Sync,
{
    async fn apply(&self, items: Vec<Value>) -> anyhow::Result<Value> {
        Ok(self(items))
    }
}

/// Migration backed by an async, fallible function
pub struct AsyncStep<F> {
    f: F,
}

/// Wrap an async function as a migration
pub fn async_step<F, Fut>(f: F) -> AsyncStep<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    AsyncStep { f }
}

#[async_trait]
impl<F, Fut> MigrationFn for AsyncStep<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn apply(&self, items: Vec<Value>) -> anyhow::Result<Value> {
        (self.f)(items).await
    }
}

/// Add a field with a default to every object item
pub fn add_field(name: &'static str, default: Value) -> impl Fn(Vec<Value>) -> Value + Send + Sync {
    move |items| {
        Value::Array(
            items
                .into_iter()
                .map(|mut item| {
                    if let Value::Object(map) = &mut item {
                        map.entry(name).or_insert_with(|| default.clone());
                    }
                    item
                })
                .collect(),
        )
    }
}
