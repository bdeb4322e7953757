//! Single-flight gate in front of every capability handler.
//!
//! At most one handler body runs at a time. A call that arrives while one is running is not
//! queued: it gets [`ResultEnvelope::busy`] straight away.

use futures::FutureExt;
use helpme_core::{Error, ResultEnvelope};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

/// A handler failure paired with the sentence to speak for it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    #[source]
    pub source: Error,
}

impl HandlerError {
    pub fn new(message: impl Into<String>, source: Error) -> Self {
        Self {
            message: message.into(),
            source,
        }
    }

    pub fn into_envelope(self) -> ResultEnvelope {
        ResultEnvelope::from_error_with(self.message, &self.source)
    }
}

impl From<Error> for HandlerError {
    fn from(source: Error) -> Self {
        Self {
            message: source.spoken(),
            source,
        }
    }
}

/// Attach a spoken failure message to a library error.
pub trait OrSay<T> {
    fn or_say(self, message: &str) -> Result<T, HandlerError>;
}

impl<T> OrSay<T> for Result<T, Error> {
    fn or_say(self, message: &str) -> Result<T, HandlerError> {
        self.map_err(|e| HandlerError::new(message, e))
    }
}

/// Clears the busy flag however the dispatch ends, including when its future is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
    gate: tokio::sync::Mutex<()>,
}

fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `handler` unless another handler is already running.
    pub async fn dispatch<F, T>(&self, kind: &str, handler: F) -> ResultEnvelope
    where
        F: Future<Output = Result<T, HandlerError>>,
        T: Into<ResultEnvelope>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!(kind, "request rejected: previous request still running");
            return ResultEnvelope::busy();
        }
        let _busy = BusyGuard(&self.busy);
        let _gate = self.gate.lock().await;

        let t0 = std::time::Instant::now();
        let envelope = match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(Ok(v)) => v.into(),
            Ok(Err(e)) => {
                tracing::warn!(kind, error = %e.source, "handler failed");
                e.into_envelope()
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                tracing::error!(kind, cause = %cause, "handler panicked");
                ResultEnvelope::failure("Sorry, something went wrong while handling that.", cause)
            }
        };
        tracing::info!(
            kind,
            ok = envelope.is_success(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "handler finished"
        );
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpme_core::{Payload, BUSY_MESSAGE};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn overlapping_call_gets_busy_message() {
        let sf = Arc::new(SingleFlight::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let sf = sf.clone();
            tokio::spawn(async move {
                sf.dispatch("slow", async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, HandlerError>(Payload::text("first done"))
                })
                .await
            })
        };
        started_rx.await.unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let second = sf
            .dispatch("fast", async move {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(Payload::text("second"))
            })
            .await;
        assert_eq!(second.as_text(), Some(BUSY_MESSAGE));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().as_text(), Some("first done"));
        assert!(!sf.is_busy());
    }

    #[tokio::test]
    async fn concurrent_bodies_never_exceed_one() {
        let sf = Arc::new(SingleFlight::new());
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let (sf, live, peak) = (sf.clone(), live.clone(), peak.clone());
            tasks.push(tokio::spawn(async move {
                sf.dispatch("probe", async move {
                    let n = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(Payload::text("ok"))
                })
                .await
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_becomes_failure_and_releases() {
        let sf = SingleFlight::new();
        let env = sf
            .dispatch("search", async {
                Err::<Payload, _>(HandlerError::new(
                    "Sorry, I encountered an error while searching.",
                    Error::Upstream("HTTP 500".into()),
                ))
            })
            .await;
        assert_eq!(
            env.speech_text(),
            "Sorry, I encountered an error while searching."
        );
        assert!(!env.is_success());
        assert!(!sf.is_busy());
    }

    #[tokio::test]
    async fn panic_becomes_failure_and_releases() {
        let sf = SingleFlight::new();
        let env = sf
            .dispatch("boom", async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<_, HandlerError>(Payload::text("unreachable"))
            })
            .await;
        match env {
            ResultEnvelope::Failure { cause, .. } => assert!(cause.contains("exploded")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!sf.is_busy());
        let next = sf
            .dispatch("next", async { Ok::<_, HandlerError>(Payload::text("fine")) })
            .await;
        assert_eq!(next.as_text(), Some("fine"));
    }

    #[tokio::test]
    async fn cancellation_releases() {
        let sf = SingleFlight::new();
        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            sf.dispatch("stuck", async {
                std::future::pending::<()>().await;
                Ok::<_, HandlerError>(Payload::text("never"))
            }),
        )
        .await;
        assert!(dropped.is_err());
        assert!(!sf.is_busy());
    }
}
