//! Deferred calls: actions a hook schedules to run after the operation's
//! hook chains succeeded and before its transaction commits.

use crate::error::HookResult;
use crate::hook::HookFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type DeferredCall = Box<dyn FnOnce() -> HookFuture<()> + Send>;

/// The deferred call list of one operation. Cloning shares the list.
#[derive(Clone, Default)]
pub struct DeferredCalls {
    calls: Arc<Mutex<Vec<DeferredCall>>>,
}

impl DeferredCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `call`. Calls run in registration order.
    pub fn defer<F, Fut>(&self, call: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HookResult<()>> + Send + 'static,
    {
        let boxed: DeferredCall = Box::new(move || -> HookFuture<()> { Box::pin(call()) });
        self.lock().push(boxed);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeferredCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs every scheduled call in order, including calls scheduled by
    /// earlier calls. Stops at the first failure.
    pub(crate) async fn run(&self) -> HookResult<()> {
        let mut ran = 0usize;
        loop {
            let next = {
                let mut calls = self.lock();
                if calls.is_empty() {
                    break;
                }
                calls.remove(0)
            };
            next().await?;
            ran += 1;
        }
        if ran > 0 {
            debug!(calls = ran, "deferred calls completed");
        }
        Ok(())
    }
}

impl fmt::Debug for DeferredCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCalls").field("pending", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_in_registration_order_and_drains() {
        let calls = DeferredCalls::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            calls.defer(move || async move {
                log.lock().unwrap().push(i);
                Ok(())
            });
        }
        tokio_test::block_on(calls.run()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let calls = DeferredCalls::new();
        let counter = Arc::new(AtomicUsize::new(0));
        calls.defer(|| async { Err(crate::HookError::bad_request("boom")) });
        let c = Arc::clone(&counter);
        calls.defer(move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(calls.run().await.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn calls_scheduled_while_running_also_run() {
        let calls = DeferredCalls::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner_calls = calls.clone();
        let c = Arc::clone(&counter);
        calls.defer(move || async move {
            let c2 = Arc::clone(&c);
            inner_calls.defer(move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        calls.run().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
