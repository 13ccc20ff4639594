// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token manager tests: refresh margin, bootstrap fallback and
//! single-flight refresh under concurrency.

use chrono::Duration;
use courier_sync::db::Store;
use courier_sync::error::AppError;
use courier_sync::models::AuthToken;
use courier_sync::time_utils::Clock;
use std::sync::atomic::Ordering;

mod common;
use common::{midday, FakeAuth, Harness};

async fn seed_token_expiring_in(harness: &Harness, secs: i64) {
    let now = harness.clock.now();
    harness
        .store
        .replace_token(&AuthToken {
            access_token: "stored-access".to_string(),
            refresh_token: "stored-refresh".to_string(),
            expires_at: now + Duration::seconds(secs),
            updated_at: now - Duration::hours(1),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_token_used_when_nothing_stored() {
    let harness = Harness::new(midday());
    let tokens = harness.token_manager();

    let access = tokens.get_valid_token().await.unwrap();

    assert_eq!(access, "access-1");
    assert_eq!(harness.auth.exchange_count(), 1);
    assert_eq!(
        harness.auth.used_refresh_tokens.lock().unwrap().as_slice(),
        ["bootstrap-refresh"]
    );

    let stored = harness.store.get_token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token, "refresh-1");
    assert_eq!(stored.expires_at, midday() + Duration::seconds(3600));
    assert_eq!(stored.updated_at, midday());
}

#[tokio::test]
async fn test_valid_token_returned_without_refresh() {
    let harness = Harness::new(midday());
    seed_token_expiring_in(&harness, 3600).await;

    let access = harness.token_manager().get_valid_token().await.unwrap();

    assert_eq!(access, "stored-access");
    assert_eq!(harness.auth.exchange_count(), 0);
}

#[tokio::test]
async fn test_token_at_exact_margin_is_still_used() {
    let harness = Harness::new(midday());
    seed_token_expiring_in(&harness, 5 * 60).await;

    let access = harness.token_manager().get_valid_token().await.unwrap();

    assert_eq!(access, "stored-access");
    assert_eq!(harness.auth.exchange_count(), 0);
}

#[tokio::test]
async fn test_token_inside_margin_is_refreshed_with_stored_refresh_token() {
    let harness = Harness::new(midday());
    seed_token_expiring_in(&harness, 4 * 60).await;

    let access = harness.token_manager().get_valid_token().await.unwrap();

    assert_eq!(access, "access-1");
    assert_eq!(
        harness.auth.used_refresh_tokens.lock().unwrap().as_slice(),
        ["stored-refresh"]
    );
    let stored = harness.store.get_token().await.unwrap().unwrap();
    assert_eq!(stored.refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let harness = Harness::new(midday());
    seed_token_expiring_in(&harness, -60).await;

    let access = harness.token_manager().get_valid_token().await.unwrap();

    assert_eq!(access, "access-1");
    assert_eq!(harness.auth.exchange_count(), 1);
}

#[tokio::test]
async fn test_refreshed_token_reused_until_margin() {
    let harness = Harness::new(midday());
    let tokens = harness.token_manager();

    assert_eq!(tokens.get_valid_token().await.unwrap(), "access-1");

    // 54 minutes later: 6 minutes left, still outside the margin
    harness.clock.advance(Duration::minutes(54));
    assert_eq!(tokens.get_valid_token().await.unwrap(), "access-1");

    // 2 more minutes: inside the margin
    harness.clock.advance(Duration::minutes(2));
    assert_eq!(tokens.get_valid_token().await.unwrap(), "access-2");
    assert_eq!(
        harness.auth.used_refresh_tokens.lock().unwrap().as_slice(),
        ["bootstrap-refresh", "refresh-1"]
    );
}

#[tokio::test]
async fn test_missing_token_without_bootstrap_fails() {
    let mut harness = Harness::new(midday());
    harness.config.fleet.bootstrap_refresh_token = None;

    let err = harness.token_manager().get_valid_token().await.unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(harness.auth.exchange_count(), 0);
}

#[tokio::test]
async fn test_failed_exchange_leaves_stored_token_untouched() {
    let harness = Harness::new(midday());
    seed_token_expiring_in(&harness, 60).await;
    harness.auth.fail.store(true, Ordering::SeqCst);

    let err = harness.token_manager().get_valid_token().await.unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
    let stored = harness.store.get_token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "stored-access");
    assert_eq!(stored.refresh_token, "stored-refresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    let auth = FakeAuth {
        latency: std::time::Duration::from_millis(50),
        ..FakeAuth::default()
    };
    let harness = Harness::with_auth(midday(), auth);
    let tokens = harness.token_manager();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let tokens = tokens.clone();
        handles.push(tokio::spawn(async move { tokens.get_valid_token().await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "access-1");
    }
    assert_eq!(harness.auth.exchange_count(), 1);
}
