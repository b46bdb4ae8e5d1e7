//! Application and runner lifecycle: hook ordering, freezing and error paths.

mod common;

use std::io;

use asyncapp::{Application, Error, FrozenPolicy, HookError, Phase, Runner, RunnerState, Site, SiteState};

use common::{EchoHandler, EventLog};

fn hook_failure(message: &str) -> HookError {
    Box::new(io::Error::other(message.to_string()))
}

#[tokio::test]
async fn startup_hook_sets_state_then_app_is_frozen() {
    let app = Application::new();
    app.on_startup()
        .register(|app: Application| async move {
            app.insert("ready", true)?;
            Ok::<(), HookError>(())
        })
        .unwrap();

    let runner = Runner::new(app.clone(), EchoHandler);
    runner.setup().await.unwrap();

    assert_eq!(app.get::<bool>("ready").as_deref(), Some(&true));
    assert!(app.is_frozen());
    assert_eq!(runner.state(), RunnerState::Ready);
}

#[tokio::test]
async fn failing_startup_hook_propagates_and_blocks_sites() {
    let app = Application::new();
    app.on_startup()
        .register(|_app: Application| async move { Err(hook_failure("database unreachable")) })
        .unwrap();

    let runner = Runner::new(app.clone(), EchoHandler);
    let err = runner.setup().await.unwrap_err();
    assert!(matches!(err, Error::Hook { phase: Phase::Startup, .. }));
    assert!(err.to_string().contains("database unreachable"));
    assert!(!app.is_frozen());
    assert_eq!(runner.state(), RunnerState::Failed);

    let mut site = Site::tcp(&runner, "127.0.0.1", 0);
    let err = site.start().await.unwrap_err();
    assert!(matches!(err, Error::LifecycleOrder(_)));
    assert_eq!(site.state(), SiteState::Failed);
    assert!(runner.addresses().is_empty());
}

#[tokio::test]
async fn startup_hooks_run_in_order_and_stop_at_first_failure() {
    let app = Application::new();
    let log = EventLog::default();

    for (name, fail) in [("first", false), ("second", true), ("third", false)] {
        let log = log.clone();
        app.on_startup()
            .register(move |_app: Application| {
                let log = log.clone();
                async move {
                    log.push(name);
                    if fail {
                        Err(hook_failure(name))
                    } else {
                        Ok(())
                    }
                }
            })
            .unwrap();
    }

    let runner = Runner::new(app, EchoHandler);
    assert!(runner.setup().await.is_err());
    assert_eq!(log.events(), vec!["first", "second"]);
}

#[tokio::test]
async fn startup_signal_is_frozen_while_hooks_run_but_app_is_not() {
    let app = Application::new();
    let log = EventLog::default();

    let observed = log.clone();
    app.on_startup()
        .register(move |app: Application| {
            let observed = observed.clone();
            async move {
                observed.push(format!("startup frozen: {}", app.on_startup().is_frozen()));
                observed.push(format!("app frozen: {}", app.is_frozen()));

                let late = app
                    .on_startup()
                    .register(|_app: Application| async move { Ok(()) });
                observed.push(format!("late startup hook rejected: {}", late.is_err()));

                let shutdown_log = observed.clone();
                app.on_shutdown().register(move |_app: Application| {
                    let shutdown_log = shutdown_log.clone();
                    async move {
                        shutdown_log.push("shutdown hook ran");
                        Ok(())
                    }
                })?;
                Ok::<(), HookError>(())
            }
        })
        .unwrap();

    let runner = Runner::new(app.clone(), EchoHandler);
    runner.setup().await.unwrap();
    runner.cleanup().await.unwrap();

    assert_eq!(
        log.events(),
        vec![
            "startup frozen: true",
            "app frozen: false",
            "late startup hook rejected: true",
            "shutdown hook ran",
        ]
    );
}

#[tokio::test]
async fn registration_and_mutation_rejected_after_freeze() {
    let app = Application::new();
    let runner = Runner::new(app.clone(), EchoHandler);
    runner.setup().await.unwrap();

    let err = app
        .on_cleanup()
        .register(|_app: Application| async move { Ok(()) })
        .unwrap_err();
    assert!(matches!(err, Error::Frozen { .. }));

    assert!(matches!(app.insert("late", 1u32), Err(Error::Frozen { .. })));
    assert!(!app.contains_key("late"));
}

#[tokio::test]
async fn warn_policy_allows_mutation_after_freeze() {
    let app = Application::with_policy(FrozenPolicy::Warn);
    let runner = Runner::new(app.clone(), EchoHandler);
    runner.setup().await.unwrap();

    app.insert("late", 7u32).unwrap();
    assert_eq!(app.get::<u32>("late").as_deref(), Some(&7));
}

#[tokio::test]
async fn cleanup_runs_shutdown_then_cleanup_hooks() {
    let app = Application::new();
    let log = EventLog::default();

    for (signal, name) in [
        (app.on_cleanup(), "cleanup"),
        (app.on_shutdown(), "shutdown"),
    ] {
        let log = log.clone();
        signal
            .register(move |_app: Application| {
                let log = log.clone();
                async move {
                    log.push(name);
                    Ok(())
                }
            })
            .unwrap();
    }

    let runner = Runner::new(app, EchoHandler);
    runner.setup().await.unwrap();
    runner.cleanup().await.unwrap();

    assert_eq!(log.events(), vec!["shutdown", "cleanup"]);
    assert_eq!(runner.state(), RunnerState::CleanedUp);
}

#[tokio::test]
async fn cleanup_hooks_run_even_when_shutdown_hook_fails() {
    let app = Application::new();
    let log = EventLog::default();

    app.on_shutdown()
        .register(|_app: Application| async move { Err(hook_failure("flush failed")) })
        .unwrap();
    let cleanup_log = log.clone();
    app.on_cleanup()
        .register(move |_app: Application| {
            let cleanup_log = cleanup_log.clone();
            async move {
                cleanup_log.push("cleanup");
                Ok(())
            }
        })
        .unwrap();

    let runner = Runner::new(app, EchoHandler);
    runner.setup().await.unwrap();
    let err = runner.cleanup().await.unwrap_err();

    assert!(matches!(err, Error::Hook { phase: Phase::Shutdown, .. }));
    assert_eq!(log.events(), vec!["cleanup"]);
    assert_eq!(runner.state(), RunnerState::CleanedUp);
}

#[tokio::test]
async fn cleanup_refuses_while_a_site_is_started() {
    let runner = Runner::new(Application::new(), EchoHandler);
    runner.setup().await.unwrap();

    let mut site = Site::tcp(&runner, "127.0.0.1", 0);
    site.start().await.unwrap();

    let err = runner.cleanup().await.unwrap_err();
    assert!(matches!(err, Error::LifecycleOrder(ref msg) if msg.contains(site.name())));
    assert_eq!(runner.state(), RunnerState::Ready);

    site.stop().await;
    runner.cleanup().await.unwrap();
}

#[tokio::test]
async fn lifecycle_methods_out_of_order() {
    let runner = Runner::new(Application::new(), EchoHandler);

    assert!(matches!(runner.cleanup().await, Err(Error::LifecycleOrder(_))));

    let mut early = Site::tcp(&runner, "127.0.0.1", 0);
    assert!(matches!(early.start().await, Err(Error::LifecycleOrder(_))));

    runner.setup().await.unwrap();
    assert!(matches!(runner.setup().await, Err(Error::LifecycleOrder(_))));

    runner.cleanup().await.unwrap();
    assert!(matches!(runner.cleanup().await, Err(Error::LifecycleOrder(_))));

    let mut late = Site::tcp(&runner, "127.0.0.1", 0);
    assert!(matches!(late.start().await, Err(Error::LifecycleOrder(_))));
}

#[tokio::test]
async fn handles_share_identity_not_state() {
    let a = Application::new();
    let b = Application::new();
    assert_eq!(a, a.clone());
    assert_ne!(a, b);

    let runner = Runner::new(a.clone(), EchoHandler);
    assert_eq!(runner.app(), &a);
}
