use super::*;
use shelfscan::config::StorageConfig;
use shelfscan::models::RuntimeMessage;
use shelfscan::results_view::poll_for_results;
use shelfscan::storage::SqliteStateStore;
use shelfscan::{SearchRequest, SearchSettings, StoreId};
use std::time::Duration;
use tokio::time::Instant;

const POLL: Duration = Duration::from_millis(500);

#[tokio::test(start_paused = true)]
async fn test_all_stores_report_and_publish_in_store_order() -> anyhow::Result<()> {
    let browser = ScriptedBrowser::new();
    let pages = [
        ("kroger.com", ScriptedPage::new("https://www.kroger.com/search?query=milk", &[KROGER_PAGE])),
        ("meijer.com", ScriptedPage::new("https://www.meijer.com/shopping/search.html?text=milk", &["", MEIJER_PAGE])),
        ("aldi.us", ScriptedPage::new("https://www.aldi.us/results?q=milk", &[ALDI_PAGE])),
        ("walmart.com", ScriptedPage::new("https://www.walmart.com/search?q=milk", &[WALMART_PAGE])),
        ("costco.com", ScriptedPage::new("https://www.costco.com/s?keyword=milk", &[COSTCO_PAGE])),
    ];
    for (fragment, page) in &pages {
        browser.serve(fragment, page.clone());
    }

    let app = start_coordinator(browser.clone());
    let started = Instant::now();
    app.handle
        .search(SearchRequest::new("milk", SearchSettings::default())?)
        .await?;

    let results = poll_for_results(&app.state, POLL).await;
    assert!(started.elapsed() < Duration::from_secs(15), "finalized by completion, not the deadline");

    let stores: Vec<_> = results.iter().map(|r| r.store).collect();
    assert_eq!(stores, StoreId::ALL.to_vec());
    assert_eq!(results[0].products[0].price, "$3.29");
    assert_eq!(results[1].products[0].name, "Meijer 2% Milk, Gallon");
    assert_eq!(results[3].products[0].price, "$3.12");
    assert!(results[3].products[0].discount);
    assert_eq!(results[4].products[0].price, "$12.99");

    assert_eq!(browser.opened().len(), 5);
    assert!(pages.iter().all(|(_, page)| page.is_closed()));
    // Meijer needed a second read before its tile rendered.
    assert_eq!(pages[1].1.reads(), 2);
    assert_eq!(*app.view.opened.lock().unwrap(), vec!["milk".to_string()]);

    app.handle.shutdown();
    app.task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deadline_publishes_partial_results() -> anyhow::Result<()> {
    // Kroger is never served, so its page never shows a card.
    let browser = ScriptedBrowser::new();
    browser.serve("meijer.com", ScriptedPage::new("https://www.meijer.com/", &[MEIJER_PAGE]));
    browser.serve("aldi.us", ScriptedPage::new("https://www.aldi.us/", &[ALDI_PAGE]));
    browser.serve("walmart.com", ScriptedPage::new("https://www.walmart.com/", &[WALMART_PAGE]));
    browser.serve("costco.com", ScriptedPage::new("https://www.costco.com/", &[COSTCO_PAGE]));

    let app = start_coordinator(browser);
    let started = Instant::now();
    app.handle
        .search(SearchRequest::new("milk", SearchSettings::default())?)
        .await?;

    let results = poll_for_results(&app.state, POLL).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15), "published after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(16), "published after {:?}", elapsed);

    let stores: Vec<_> = results.iter().map(|r| r.store).collect();
    assert_eq!(
        stores,
        vec![StoreId::Meijer, StoreId::Aldi, StoreId::Walmart, StoreId::Costco]
    );

    // Kroger exhausts its budget after the deadline; the published set stays as it was.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(app.state.current_results().await?.map(|r| r.len()), Some(4));

    app.handle.shutdown();
    app.task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_store_reports_sentinel() -> anyhow::Result<()> {
    let app = start_coordinator(ScriptedBrowser::new());
    let settings = SearchSettings::only([StoreId::Walmart], true);
    let started = Instant::now();
    app.handle.search(SearchRequest::new("milk", settings)?).await?;

    let results = poll_for_results(&app.state, POLL).await;
    // Ten reads half a second apart, then the empty report.
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].products.len(), 1);
    assert!(results[0].products[0].is_sentinel());
    assert!(results[0].source_url.contains("walmart.com"));

    app.handle.shutdown();
    app.task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_new_search_supersedes_pending_one() -> anyhow::Result<()> {
    let browser = ScriptedBrowser::new();
    let kroger = ScriptedPage::new("https://www.kroger.com/search?query=milk", &[""]);
    browser.serve("kroger.com", kroger.clone());
    browser.serve("aldi.us", ScriptedPage::new("https://www.aldi.us/results?q=eggs", &[ALDI_PAGE]));
    let app = start_coordinator(browser);

    app.handle
        .search(SearchRequest::new("milk", SearchSettings::only([StoreId::Kroger], true))?)
        .await?;
    app.handle
        .search(SearchRequest::new("eggs", SearchSettings::only([StoreId::Aldi], true))?)
        .await?;

    let results = poll_for_results(&app.state, POLL).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].store, StoreId::Aldi);
    assert_eq!(app.state.current_term().await?.as_deref(), Some("eggs"));

    // The abandoned Kroger runner reports long after; it must not leak in.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let results = app.state.current_results().await?.unwrap_or_default();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].store, StoreId::Aldi);
    // Its tab was still closed once the runner gave up.
    assert_eq!(kroger.reads(), 20);
    assert!(kroger.is_closed());

    app.handle.shutdown();
    app.task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_external_report_completes_search() -> anyhow::Result<()> {
    let app = start_coordinator(ScriptedBrowser::new());
    app.handle
        .search(SearchRequest::new("milk", SearchSettings::only([StoreId::Kroger], false))?)
        .await?;

    let report = RuntimeMessage::from_json(
        r#"{"action":"krogerResults","results":[{"name":"Kroger Whole Milk","price":"$3.49"}],"searchUrl":"https://www.kroger.com/search?query=milk"}"#,
    )?;
    assert_eq!(app.handle.deliver(report).await?, None);

    let results = poll_for_results(&app.state, POLL).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].products[0].name, "Kroger Whole Milk");

    app.handle.shutdown();
    app.task.await?;
    Ok(())
}

#[tokio::test]
async fn test_results_persist_in_sqlite() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = StorageConfig {
        url: format!("sqlite://{}", dir.path().join("shelfscan.db").display()),
        max_connections: 2,
    };

    let browser = ScriptedBrowser::new();
    browser.serve("aldi.us", ScriptedPage::new("https://www.aldi.us/results?q=milk", &[ALDI_PAGE]));
    let state = SharedState::new(Arc::new(SqliteStateStore::connect(&config).await?));
    let app = start_coordinator_with_state(browser, state);

    app.handle
        .search(SearchRequest::new("milk", SearchSettings::only([StoreId::Aldi], true))?)
        .await?;
    let results = tokio::time::timeout(Duration::from_secs(5), poll_for_results(&app.state, POLL)).await?;
    assert_eq!(results.len(), 1);

    app.handle.shutdown();
    app.task.await?;

    let reopened = SharedState::new(Arc::new(SqliteStateStore::connect(&config).await?));
    let snapshot = reopened.snapshot().await?;
    assert_eq!(snapshot.current_search_term.as_deref(), Some("milk"));
    assert_eq!(snapshot.search_results, Some(results));
    assert_eq!(
        snapshot.store_settings,
        Some(SearchSettings::only([StoreId::Aldi], true))
    );
    Ok(())
}
