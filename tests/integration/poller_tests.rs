use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use listing_watcher::AppError;

use super::*;

#[tokio::test]
async fn test_listing_failure_fails_cycle_and_closes_browser() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = two_listing_site();
    browser.fail(LISTING_URL);
    let transport = RecordingTransport::new();
    let poller = create_test_poller(&config, &browser, &transport).await?;

    let result = poller.run_once().await;
    assert!(matches!(result, Err(AppError::Browser(_))));

    let stats = poller.stats().await;
    assert_eq!(stats.cycles_run, 1);
    assert_eq!(stats.cycles_failed, 1);
    assert!(stats.last_error.is_some());

    assert_eq!(browser.launches(), 1);
    assert_eq!(browser.sessions_closed(), 1);
    assert!(transport.sent().is_empty());
    assert!(poller.store().load().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_results_container_fails_cycle() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = FakeBrowser::new();
    browser.serve(LISTING_URL, "<html><body><p>Maintenance</p></body></html>".to_string());
    let transport = RecordingTransport::new();
    let poller = create_test_poller(&config, &browser, &transport).await?;

    let result = poller.run_once().await;
    assert!(matches!(result, Err(AppError::ElementNotFound { .. })));
    assert_eq!(browser.sessions_closed(), 1);

    Ok(())
}

#[tokio::test]
async fn test_loop_survives_failing_cycles() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = two_listing_site();
    browser.fail(LISTING_URL);
    let transport = RecordingTransport::new();
    let poller = Arc::new(create_test_poller(&config, &browser, &transport).await?);

    let cancel = CancellationToken::new();
    let handle = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    let recovered = wait_for_condition(
        || {
            let poller = Arc::clone(&poller);
            async move { poller.stats().await.cycles_failed >= 3 }
        },
        5,
    )
    .await;
    assert!(recovered, "Poll loop stopped after a failed cycle");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await??;

    assert_eq!(browser.launches(), browser.sessions_closed());
    Ok(())
}

#[tokio::test]
async fn test_loop_picks_up_after_recovery() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = two_listing_site();
    browser.fail(LISTING_URL);
    let transport = RecordingTransport::new();
    let poller = Arc::new(create_test_poller(&config, &browser, &transport).await?);

    let cancel = CancellationToken::new();
    let handle = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    let failed = wait_for_condition(
        || {
            let poller = Arc::clone(&poller);
            async move { poller.stats().await.cycles_failed >= 1 }
        },
        5,
    )
    .await;
    assert!(failed);

    // Site comes back.
    browser.recover(LISTING_URL);

    let persisted = wait_for_condition(
        || {
            let poller = Arc::clone(&poller);
            async move { poller.stats().await.records_persisted == 1 }
        },
        5,
    )
    .await;
    assert!(persisted);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await??;

    assert_eq!(transport.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancel_interrupts_hanging_cycle() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = get_test_config(dir.path());
    config.scraper.request_timeout = 30;
    let browser = two_listing_site();
    browser.hang(LISTING_URL);
    let transport = RecordingTransport::new();
    let poller = Arc::new(create_test_poller(&config, &browser, &transport).await?);

    let cancel = CancellationToken::new();
    let handle = {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    let started = wait_for_condition(
        || {
            let browser = browser.clone();
            async move { !browser.navigations().is_empty() }
        },
        5,
    )
    .await;
    assert!(started);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await??;

    assert_eq!(browser.launches(), 1);
    assert_eq!(browser.sessions_closed(), 1);

    let stats = poller.stats().await;
    assert_eq!(stats.cycles_failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_hanging_navigation_times_out() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = get_test_config(dir.path());
    config.scraper.request_timeout = 1;
    let browser = two_listing_site();
    browser.hang(LISTING_URL);
    let transport = RecordingTransport::new();
    let poller = create_test_poller(&config, &browser, &transport).await?;

    let result = tokio::time::timeout(Duration::from_secs(5), poller.run_once()).await?;
    assert!(matches!(result, Err(AppError::Timeout { .. })));
    assert_eq!(browser.sessions_closed(), 1);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_store_fails_cycle() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = two_listing_site();
    let transport = RecordingTransport::new();
    let poller = create_test_poller(&config, &browser, &transport).await?;

    std::fs::write(&config.store.path, "{ not a list")?;

    let result = poller.run_once().await;
    assert!(matches!(result, Err(AppError::StoreCorrupt { .. })));
    assert!(transport.sent().is_empty());
    assert_eq!(browser.sessions_closed(), 1);

    // Left as found.
    assert_eq!(std::fs::read_to_string(&config.store.path)?, "{ not a list");
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_fails_cycle() -> Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let browser = FakeBrowser::failing_launch();
    let transport = RecordingTransport::new();
    let poller = create_test_poller(&config, &browser, &transport).await?;

    let result = poller.run_once().await;
    assert!(matches!(result, Err(AppError::Browser(_))));
    assert_eq!(browser.sessions_closed(), 0);
    assert_eq!(poller.stats().await.cycles_failed, 1);

    Ok(())
}
