use std::future::Future;
use tokio::task::JoinHandle;

/// Holds at most one managed task. Starting a new one cancels the previous task and waits
/// for it to stop first.
#[derive(Debug)]
pub struct TaskSlot<T> {
    current: Option<JoinHandle<T>>,
}

impl<T> Default for TaskSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T: Send + 'static> TaskSlot<T> {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort the running task (if any) and wait for it to stop.
    pub async fn cancel(&mut self) {
        let Some(handle) = self.current.take() else {
            return;
        };
        handle.abort();
        match handle.await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => tracing::debug!("superseded task cancelled"),
            Err(e) => tracing::error!(error = %e, "superseded task panicked"),
        }
    }

    pub async fn start<F>(&mut self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.cancel().await;
        self.current = Some(tokio::spawn(fut));
    }

    /// Wait for the running task to finish on its own.
    pub async fn join(&mut self) -> Option<T> {
        let handle = self.current.take()?;
        match handle.await {
            Ok(v) => Some(v),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                tracing::error!(error = %e, "task panicked");
                None
            }
        }
    }
}
