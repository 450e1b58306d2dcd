use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::{DriverError, Result};

/// Drives transport futures to completion on behalf of blocking callers.
///
/// Either owns a small runtime or borrows the handle of one supplied by the caller.
pub struct Blocker {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Blocker {
    /// Build a blocker backed by its own single-worker runtime.
    ///
    /// # Errors
    /// Returns `DriverError::Config` if the runtime cannot be created.
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("blocking-tx-driver")
            .enable_all()
            .build()
            .map_err(|e| DriverError::Config(format!("failed to create runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    /// Build a blocker that drives futures on an existing multi-thread runtime.
    ///
    /// A current-thread runtime only drives its timers and IO from its own
    /// `block_on`, so calls made through its handle could wait forever.
    ///
    /// # Errors
    /// Returns `DriverError::Config` for a current-thread runtime handle.
    pub fn from_handle(handle: Handle) -> Result<Self> {
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(DriverError::Config(
                "a current-thread runtime cannot drive blocking calls; use a multi-thread runtime"
                    .into(),
            ));
        }
        Ok(Self {
            runtime: None,
            handle,
        })
    }

    /// Block the calling thread until `fut` completes or `timeout` elapses.
    ///
    /// `None` waits without bound. When called from a thread that is already
    /// inside a runtime the future is driven from a scoped helper thread, since
    /// blocking a runtime thread directly panics.
    ///
    /// # Errors
    /// Returns `DriverError::Timeout` when the deadline passes, otherwise whatever the
    /// future resolved to.
    pub fn run<T, F>(&self, operation: &'static str, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let bounded = async move {
            match timeout {
                Some(after) => match tokio::time::timeout(after, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::debug!(operation, ?after, "blocking call timed out");
                        Err(DriverError::Timeout { operation, after })
                    }
                },
                None => fut.await,
            }
        };

        if Handle::try_current().is_ok() {
            std::thread::scope(|s| {
                s.spawn(|| self.handle.block_on(bounded))
                    .join()
                    .map_err(|_| DriverError::Execution(format!("{operation}: worker panicked")))?
            })
        } else {
            self.handle.block_on(bounded)
        }
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker")
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl Drop for Blocker {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics; shut down without waiting instead.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_returns_future_output() {
        let blocker = Blocker::new().expect("runtime");
        let value = blocker
            .run("add", None, async { Ok::<_, DriverError>(40 + 2) })
            .expect("run");
        assert_eq!(value, 42);
    }

    #[test]
    fn run_times_out() {
        let blocker = Blocker::new().expect("runtime");
        let err = blocker
            .run("sleep", Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DriverError>(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Timeout {
                operation: "sleep",
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_from_inside_a_runtime() {
        let blocker = Blocker::from_handle(Handle::current()).expect("multi-thread handle");
        let value = blocker
            .run("nested", None, async { Ok::<_, DriverError>("ok") })
            .expect("run");
        assert_eq!(value, "ok");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn current_thread_handle_is_rejected() {
        let err = Blocker::from_handle(Handle::current()).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }
}
