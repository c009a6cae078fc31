mod common;

use common::{test_config, wait_for, Call, Failure, Harness, ScriptedClient};
use recorder_core::{EngineStatus, PartialConfig, RecorderConfig, RecorderError};

#[tokio::test]
async fn test_start_requires_credentials() {
    let config = RecorderConfig {
        session_token: String::new(),
        ..test_config()
    };
    let h = Harness::with_config(ScriptedClient::with_markets(&["1.101"]), config);

    let err = h.engine.start().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(h.engine.status(), EngineStatus::Stopped);
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_start_with_rejected_session_enters_auth_error() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    *h.client.session_failure.lock() = Some(Failure::Auth);

    assert!(h.engine.start().await.is_err());
    assert_eq!(h.engine.status(), EngineStatus::AuthError);
    assert!(!h.engine.is_loop_active());
    assert_eq!(h.engine.dashboard().errors.len(), 1);
}

#[tokio::test]
async fn test_start_runs_first_cycle_then_stop() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101", "1.102"]));

    let status = h.engine.start().await.unwrap();
    assert!(status.is_active());
    assert_eq!(h.client.calls()[0], Call::Validate);

    assert!(wait_for(|| h.engine.status() == EngineStatus::Running).await);
    assert_eq!(h.engine.dashboard().poll_count, 1);
    assert_eq!(h.engine.cache().snapshot().catalogue.len(), 2);

    // a manual poll while running settles back on RUNNING
    h.engine.run_once().await.unwrap();
    assert_eq!(h.engine.status(), EngineStatus::Running);

    let err = h.engine.start().await.unwrap_err();
    assert!(matches!(err, RecorderError::Busy(_)));

    h.engine.stop().await;
    assert!(wait_for(|| h.engine.status() == EngineStatus::Stopped).await);
    assert!(wait_for(|| !h.engine.is_loop_active()).await);
    assert!(h.state_path().exists());
    assert!(h.config_path().exists());
}

#[tokio::test]
async fn test_empty_catalogue_still_reaches_running() {
    let h = Harness::new(ScriptedClient::with_markets(&[]));
    *h.client.catalogue_failure.lock() = Some(Failure::Empty);

    h.engine.start().await.unwrap();
    assert!(wait_for(|| h.engine.dashboard().poll_count == 1).await);
    assert!(wait_for(|| h.engine.status() == EngineStatus::Running).await);
    assert!(h.engine.cache().snapshot().catalogue.is_empty());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_loop() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    h.engine.start().await.unwrap();
    assert!(wait_for(|| h.engine.status() == EngineStatus::Running).await);

    h.engine.shutdown().await;
    assert_eq!(h.engine.status(), EngineStatus::Stopped);
    assert!(!h.engine.is_loop_active());
}

#[tokio::test]
async fn test_stop_when_idle_settles_stopped() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    *h.client.session_failure.lock() = Some(Failure::Auth);
    let _ = h.engine.start().await;
    assert_eq!(h.engine.status(), EngineStatus::AuthError);

    assert_eq!(h.engine.stop().await, EngineStatus::Stopped);
}

#[tokio::test]
async fn test_auth_error_ends_loop() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    *h.client.catalogue_failure.lock() = Some(Failure::Auth);

    h.engine.start().await.unwrap();
    assert!(wait_for(|| h.engine.status() == EngineStatus::AuthError).await);
    assert!(wait_for(|| !h.engine.is_loop_active()).await);
    assert_eq!(h.engine.status(), EngineStatus::AuthError);
}

#[tokio::test]
async fn test_session_probe_restarts_from_auth_error() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    *h.client.keepalive_failure.lock() = Some(Failure::Auth);
    h.engine.run_once().await.unwrap();
    assert_eq!(h.engine.status(), EngineStatus::AuthError);

    *h.client.session_failure.lock() = Some(Failure::Auth);
    let probe = h.engine.probe_session().await;
    assert!(!probe.validation.valid);
    assert!(!probe.restarted);

    *h.client.session_failure.lock() = None;
    *h.client.keepalive_failure.lock() = None;
    let probe = h.engine.probe_session().await;
    assert!(probe.validation.valid);
    assert!(probe.restarted);

    assert!(wait_for(|| h.engine.status() == EngineStatus::Running).await);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_session_probe_does_not_start_a_stopped_engine() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    let probe = h.engine.probe_session().await;

    assert!(probe.validation.valid);
    assert!(!probe.restarted);
    assert_eq!(probe.status, EngineStatus::Stopped);
    assert_eq!(h.engine.session().status().valid, Some(true));
}

#[tokio::test]
async fn test_config_update_validates_and_saves() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));

    let err = h
        .engine
        .update_config(PartialConfig {
            poll_interval_seconds: Some(3),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Config(_)));
    assert_eq!(h.engine.config().poll_interval_seconds, 60);

    let update = h
        .engine
        .update_config(PartialConfig {
            poll_interval_seconds: Some(30),
            countries: Some(vec!["IE".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(update.config.poll_interval_seconds, 30);
    assert!(update.saved.local);
    assert_eq!(update.saved.durable, Some(true));
    assert_eq!(h.engine.config().countries, vec!["IE".to_string()]);
    assert!(h.config_path().exists());
    assert!(h
        .store
        .object("betfair-live/config/runtime_config.json")
        .is_some());
}

#[tokio::test]
async fn test_masked_token_does_not_overwrite_secret() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    let masked = h.engine.dashboard().config.session_token;

    h.engine
        .update_config(PartialConfig {
            session_token: Some(masked),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(h.engine.session().credentials().session_token, common::TOKEN);
}

#[tokio::test]
async fn test_token_update_resets_keepalive_clock() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    h.engine.run_once().await.unwrap();
    h.client.clear_calls();

    h.engine.run_once().await.unwrap();
    assert!(!h.client.calls().contains(&Call::Keepalive));

    h.engine
        .update_config(PartialConfig {
            session_token: Some("a-brand-new-session-token".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    h.client.clear_calls();
    h.engine.run_once().await.unwrap();
    assert_eq!(h.client.calls()[0], Call::Keepalive);
}

#[tokio::test]
async fn test_storage_probe() {
    let h = Harness::new(ScriptedClient::with_markets(&["1.101"]));
    let description = h.engine.probe_storage().await.unwrap();
    assert!(description.contains("memory"));
}
