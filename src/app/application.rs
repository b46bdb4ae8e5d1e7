//! The application: lifecycle signals plus shared state.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::app::signal::Signal;
use crate::app::state::{ApplicationState, FrozenPolicy, StateValue};
use crate::error::{Error, Phase, Result};

struct Inner {
    state: RwLock<ApplicationState>,
    frozen: AtomicBool,
    on_startup: Signal<Application>,
    on_shutdown: Signal<Application>,
    on_cleanup: Signal<Application>,
}

/// A handle to one application instance.
///
/// Cloning is cheap and yields a handle to the same instance. Equality is
/// identity: two handles are equal only if they refer to the same instance,
/// regardless of the state they hold.
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

impl Application {
    /// Create an application that rejects state mutation after freeze.
    pub fn new() -> Self {
        Self::with_policy(FrozenPolicy::Reject)
    }

    pub fn with_policy(policy: FrozenPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ApplicationState::new(policy)),
                frozen: AtomicBool::new(false),
                on_startup: Signal::new("on_startup"),
                on_shutdown: Signal::new("on_shutdown"),
                on_cleanup: Signal::new("on_cleanup"),
            }),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    /// Freeze the application, its state and all three signals.
    ///
    /// Calling this again is a no-op.
    pub fn freeze(&self) {
        if self.inner.frozen.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.state.write().freeze();
        self.inner.on_startup.freeze();
        self.inner.on_shutdown.freeze();
        self.inner.on_cleanup.freeze();
        tracing::debug!(app = ?self, "Application frozen");
    }

    pub fn on_startup(&self) -> &Signal<Application> {
        &self.inner.on_startup
    }

    pub fn on_shutdown(&self) -> &Signal<Application> {
        &self.inner.on_shutdown
    }

    pub fn on_cleanup(&self) -> &Signal<Application> {
        &self.inner.on_cleanup
    }

    /// Fire the startup hooks.
    ///
    /// The owning runner calls `startup`, `shutdown` and `cleanup` once each,
    /// in that order. The application itself does not enforce the sequence.
    pub async fn startup(&self) -> Result<()> {
        self.fire(Phase::Startup, &self.inner.on_startup).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.fire(Phase::Shutdown, &self.inner.on_shutdown).await
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.fire(Phase::Cleanup, &self.inner.on_cleanup).await
    }

    async fn fire(&self, phase: Phase, signal: &Signal<Application>) -> Result<()> {
        tracing::debug!(%phase, hooks = signal.len(), "Firing lifecycle hooks");
        signal
            .send(self.clone())
            .await
            .map_err(|source| Error::Hook { phase, source })
    }

    // State access

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.inner.state.read().get(key)
    }

    pub fn insert<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<StateValue>> {
        self.inner.state.write().insert(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<Option<StateValue>> {
        self.inner.state.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().is_empty()
    }

    /// Snapshot of the current keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.read().keys().map(str::to_owned).collect()
    }

    /// Run `f` with shared access to the full state.
    pub fn with_state<R>(&self, f: impl FnOnce(&ApplicationState) -> R) -> R {
        f(&self.inner.state.read())
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Application {}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Application {:p}>", Arc::as_ptr(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;

    #[test]
    fn equality_is_identity() {
        let a1 = Application::new();
        let a2 = Application::new();
        a1.insert("k", 1u32).unwrap();
        a2.insert("k", 1u32).unwrap();

        assert_ne!(a1, a2);
        assert_eq!(a1, a1.clone());
    }

    #[test]
    fn freeze_is_idempotent_and_freezes_signals() {
        let app = Application::new();
        app.insert("before", true).unwrap();

        for _ in 0..3 {
            app.freeze();
            assert!(app.is_frozen());
            assert!(app.on_startup().is_frozen());
            assert!(app.on_shutdown().is_frozen());
            assert!(app.on_cleanup().is_frozen());
        }

        assert!(matches!(app.insert("after", true), Err(Error::Frozen { .. })));
        assert!(matches!(
            app.on_cleanup().register(|_| async { Ok(()) }),
            Err(Error::Frozen { what: "on_cleanup" })
        ));
        assert_eq!(app.keys(), vec!["before".to_string()]);
    }

    #[test]
    fn warn_policy_app_mutates_after_freeze() {
        let app = Application::with_policy(FrozenPolicy::Warn);
        app.freeze();
        app.insert("late", 1u8).unwrap();
        assert!(app.contains_key("late"));
        assert_eq!(app.with_state(|s| s.policy()), FrozenPolicy::Warn);
    }

    #[tokio::test]
    async fn hooks_receive_the_same_instance() {
        let app = Application::new();
        let expected = app.clone();
        app.on_shutdown()
            .register(move |got: Application| {
                let expected = expected.clone();
                async move {
                    if got == expected {
                        Ok(())
                    } else {
                        Err::<(), HookError>("wrong application".into())
                    }
                }
            })
            .unwrap();

        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn hook_error_is_tagged_with_phase() {
        let app = Application::new();
        app.on_cleanup()
            .register(|_| async { Err::<(), HookError>("disk gone".into()) })
            .unwrap();

        let err = app.cleanup().await.unwrap_err();
        assert!(matches!(err, Error::Hook { phase: Phase::Cleanup, .. }));
    }
}
