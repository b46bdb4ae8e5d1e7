//! Ordered, freezable hook chains.
//!
//! # Responsibilities
//! - Keep async callbacks in registration order
//! - Reject registration once frozen
//! - Fire callbacks sequentially, stopping at the first failure

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::{Error, HookError, Result};

type Hook<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

struct Chain<A> {
    hooks: Vec<Hook<A>>,
    frozen: bool,
}

/// An ordered chain of async callbacks taking an argument of type `A`.
///
/// Each application owns one signal per lifecycle phase. `send` can be
/// called in any state; `register` only until [`Signal::freeze`].
pub struct Signal<A> {
    name: &'static str,
    chain: Mutex<Chain<A>>,
}

impl<A> Signal<A>
where
    A: Clone + Send + 'static,
{
    /// Create an empty, unfrozen signal. `name` appears in errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            chain: Mutex::new(Chain {
                hooks: Vec::new(),
                frozen: false,
            }),
        }
    }

    /// Append a callback to the end of the chain.
    pub fn register<F, Fut>(&self, hook: F) -> Result<()>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let mut chain = self.chain.lock();
        if chain.frozen {
            return Err(Error::Frozen { what: self.name });
        }
        chain
            .hooks
            .push(Arc::new(move |arg| Box::pin(hook(arg)) as BoxFuture<'static, _>));
        Ok(())
    }

    /// Mark the chain immutable. Idempotent.
    pub fn freeze(&self) {
        self.chain.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.chain.lock().frozen
    }

    pub fn len(&self) -> usize {
        self.chain.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invoke every callback in registration order, awaiting each one before
    /// starting the next. The first error is returned and later callbacks are
    /// not invoked.
    pub async fn send(&self, arg: A) -> Result<(), HookError> {
        // Snapshot so hooks may touch this signal without deadlocking.
        let hooks: Vec<Hook<A>> = self.chain.lock().hooks.clone();

        for (index, hook) in hooks.iter().enumerate() {
            if let Err(e) = hook(arg.clone()).await {
                tracing::debug!(signal = self.name, index, error = %e, "Hook failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self.chain.lock();
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("hooks", &chain.hooks.len())
            .field("frozen", &chain.frozen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn recorder() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn send_runs_in_registration_order() {
        let signal: Signal<()> = Signal::new("on_test");
        let seen = recorder();

        for i in 0..3u32 {
            let seen = seen.clone();
            signal
                .register(move |_| {
                    let seen = seen.clone();
                    async move {
                        // Later hooks are faster; ordering must still hold.
                        tokio::time::sleep(Duration::from_millis(u64::from(3 - i) * 5)).await;
                        seen.lock().push(i);
                        Ok(())
                    }
                })
                .unwrap();
        }

        signal.send(()).await.unwrap();
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn frozen_rejects_register_but_still_sends() {
        let signal: Signal<u32> = Signal::new("on_test");
        let seen = recorder();

        let s = seen.clone();
        signal
            .register(move |v| {
                let s = s.clone();
                async move {
                    s.lock().push(v);
                    Ok(())
                }
            })
            .unwrap();

        signal.freeze();
        signal.freeze();
        assert!(signal.is_frozen());

        let err = signal.register(|_| async { Ok(()) }).unwrap_err();
        assert!(matches!(err, Error::Frozen { what: "on_test" }));
        assert_eq!(signal.len(), 1);

        signal.send(7).await.unwrap();
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_chain() {
        let signal: Signal<()> = Signal::new("on_test");
        let seen = recorder();

        let s = seen.clone();
        signal
            .register(move |_| {
                let s = s.clone();
                async move {
                    s.lock().push(1);
                    Ok(())
                }
            })
            .unwrap();
        signal
            .register(|_| async { Err::<(), HookError>("boom".into()) })
            .unwrap();
        let s = seen.clone();
        signal
            .register(move |_| {
                let s = s.clone();
                async move {
                    s.lock().push(3);
                    Ok(())
                }
            })
            .unwrap();

        let err = signal.send(()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn empty_signal_sends() {
        let signal: Signal<()> = Signal::new("on_test");
        assert!(signal.is_empty());
        signal.send(()).await.unwrap();
    }
}
