//! Asynchronous utilities for use with Tokio.

use std::pin::Pin;

use tokio::task::JoinHandle;

use crate::prelude::*;

pub mod io;

/// A type alias for a boxed future. This is used to make it easier to work
/// with complex futures.
pub type BoxedFuture<Output> = Pin<Box<dyn Future<Output = Output> + Send>>;

/// A handle for a background worker that produces a `T`. This can be awaited
/// to wait for the worker to complete normally.
pub struct JoinWorker<T> {
    /// The task handle.
    future: BoxedFuture<Result<T>>,
}

impl<T: Send + 'static> JoinWorker<T> {
    /// Create a new worker handle from a [`JoinHandle`].
    pub fn from_handle(handle: JoinHandle<Result<T>>) -> Self {
        Self {
            future: Box::pin(async move { handle.await.context("could not join task")? }),
        }
    }

    /// Spawn `future` on its own task.
    pub fn spawn(future: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self::from_handle(tokio::spawn(future))
    }

    /// Wait for the worker to complete.
    pub async fn join(self) -> Result<T> {
        self.future.await
    }
}
