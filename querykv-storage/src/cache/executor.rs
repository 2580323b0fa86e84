//! The downstream executor seam.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Executes one operation against the underlying data store.
///
/// This is the callable the execution engine hands to the interception
/// point. Its error type is passed through the cache untouched.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    type Error: Send;

    async fn execute(&self, args: Value) -> Result<Value, Self::Error>;
}

/// Adapts an async closure into a [`QueryExecutor`].
///
/// ```ignore
/// let executor = FnExecutor::new(|args| async move { db.find_many(args).await });
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, E> QueryExecutor for FnExecutor<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: Send + 'static,
{
    type Error = E;

    async fn execute(&self, args: Value) -> Result<Value, E> {
        (self.f)(args).await
    }
}
