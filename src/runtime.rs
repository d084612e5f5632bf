//! Runtime seam for async operations.
//!
//! The tile pipeline is the only part of the crate that spawns tasks; it
//! goes through this module so the runtime dependency stays in one place.

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a future onto the ambient tokio runtime.
///
/// Panics if called outside a tokio runtime context, which is a host setup
/// error (the host contract requires an async runtime capable of HTTP).
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}
