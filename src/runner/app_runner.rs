//! Drives one application through setup and cleanup and serves its sites.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::app::Application;
use crate::error::{Error, Result};
use crate::runner::handler::Handler;
use crate::runner::server::Server;

/// Externally visible runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Created,
    SettingUp,
    Ready,
    /// A startup hook failed. Terminal.
    Failed,
    /// Cleanup has run (successfully or not). Terminal.
    CleanedUp,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunnerState::Created => "created",
            RunnerState::SettingUp => "setting up",
            RunnerState::Ready => "ready",
            RunnerState::Failed => "failed",
            RunnerState::CleanedUp => "cleaned up",
        };
        f.write_str(s)
    }
}

enum Stage {
    Created,
    SettingUp,
    Ready(Arc<Server>),
    Failed,
    CleanedUp,
}

impl Stage {
    fn state(&self) -> RunnerState {
        match self {
            Stage::Created => RunnerState::Created,
            Stage::SettingUp => RunnerState::SettingUp,
            Stage::Ready(_) => RunnerState::Ready,
            Stage::Failed => RunnerState::Failed,
            Stage::CleanedUp => RunnerState::CleanedUp,
        }
    }
}

pub(crate) struct RunnerInner {
    app: Application,
    handler: Arc<dyn Handler>,
    stage: Mutex<Stage>,
    /// Started sites by id, with their current names.
    sites: Mutex<BTreeMap<u64, String>>,
}

impl RunnerInner {
    /// Hand out the shared server to a starting site and reserve its slot, so
    /// `cleanup` cannot slip in between.
    pub(crate) fn claim_server(&self, site_id: u64, name: &str) -> Result<Arc<Server>> {
        let stage = self.stage.lock();
        match &*stage {
            Stage::Ready(server) => {
                self.sites.lock().insert(site_id, name.to_string());
                Ok(Arc::clone(server))
            }
            other => Err(Error::LifecycleOrder(format!(
                "{name} cannot start: runner is {}",
                other.state()
            ))),
        }
    }

    pub(crate) fn register_site(&self, site_id: u64, name: &str) {
        self.sites.lock().insert(site_id, name.to_string());
    }

    pub(crate) fn release_site(&self, site_id: u64) {
        self.sites.lock().remove(&site_id);
    }
}

/// Orchestrates an [`Application`]'s lifecycle and bridges sites to its handler.
///
/// ```text
/// Runner::new → setup() → Site::start()... → Site::stop()... → cleanup()
/// ```
pub struct Runner {
    inner: Arc<RunnerInner>,
}

impl Runner {
    pub fn new(app: Application, handler: impl Handler) -> Self {
        Self::with_shared_handler(app, Arc::new(handler))
    }

    /// Like [`Runner::new`] for a handler that is already shared.
    pub fn with_shared_handler(app: Application, handler: Arc<dyn Handler>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                app,
                handler,
                stage: Mutex::new(Stage::Created),
                sites: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn app(&self) -> &Application {
        &self.inner.app
    }

    pub fn state(&self) -> RunnerState {
        self.inner.stage.lock().state()
    }

    /// Names of the sites currently started against this runner.
    pub fn addresses(&self) -> Vec<String> {
        self.inner.sites.lock().values().cloned().collect()
    }

    pub(crate) fn downgrade(&self) -> Weak<RunnerInner> {
        Arc::downgrade(&self.inner)
    }

    /// Freeze the startup signal, run the startup hooks, then freeze the
    /// application and build the server sites will feed.
    ///
    /// On hook failure the application stays unfrozen and the runner becomes
    /// [`RunnerState::Failed`]: no site can be started against it.
    pub async fn setup(&self) -> Result<()> {
        {
            let mut stage = self.inner.stage.lock();
            if !matches!(*stage, Stage::Created) {
                return Err(Error::LifecycleOrder(format!(
                    "setup called on a runner that is {}",
                    stage.state()
                )));
            }
            *stage = Stage::SettingUp;
        }

        let app = &self.inner.app;
        app.on_startup().freeze();
        if let Err(e) = app.startup().await {
            *self.inner.stage.lock() = Stage::Failed;
            tracing::error!(error = %e, "Startup aborted");
            return Err(e);
        }
        app.freeze();

        let server = Arc::new(Server::new(app.clone(), Arc::clone(&self.inner.handler)));
        *self.inner.stage.lock() = Stage::Ready(server);
        tracing::info!(app = ?app, "Runner ready");
        Ok(())
    }

    /// Run the shutdown hooks, then the cleanup hooks.
    ///
    /// All sites must be stopped first. The runner is terminal afterwards
    /// even if a hook fails. Cleanup hooks still run when a shutdown hook
    /// failed; the first error is returned.
    pub async fn cleanup(&self) -> Result<()> {
        {
            let mut stage = self.inner.stage.lock();
            if !matches!(*stage, Stage::Ready(_)) {
                return Err(Error::LifecycleOrder(format!(
                    "cleanup called on a runner that is {}",
                    stage.state()
                )));
            }
            let sites = self.inner.sites.lock();
            if !sites.is_empty() {
                let names: Vec<&str> = sites.values().map(String::as_str).collect();
                return Err(Error::LifecycleOrder(format!(
                    "cleanup called with sites still started: {}",
                    names.join(", ")
                )));
            }
            *stage = Stage::CleanedUp;
        }

        let app = &self.inner.app;
        let shutdown = app.shutdown().await;
        if let Err(e) = &shutdown {
            tracing::error!(error = %e, "Shutdown hooks failed");
        }
        let cleanup = app.cleanup().await;
        if let Err(e) = &cleanup {
            tracing::error!(error = %e, "Cleanup hooks failed");
        }

        tracing::info!(app = ?app, "Runner cleaned up");
        shutdown.and(cleanup)
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("app", &self.inner.app)
            .field("state", &self.state())
            .field("sites", &self.addresses())
            .finish()
    }
}
