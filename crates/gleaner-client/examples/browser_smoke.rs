/// Smoke-test for `BrowserSessionFactory`.
///
/// Launches a headless Chromium, opens <https://example.com>, waits for the
/// `<h1>` by CSS and by XPath, and reads it back.
///
/// Run with:
///   cargo run --example browser_smoke --features browser
use std::time::Duration;

use gleaner_client::{BrowserOptions, BrowserSessionFactory};
use gleaner_core::profile::Locator;
use gleaner_core::traits::{PageSession, SessionFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("Launching headless browser…");
    let factory = BrowserSessionFactory::launch(BrowserOptions::default()).await?;
    let mut page = factory.open().await?;
    let timeout = Duration::from_secs(25);

    let url = "https://example.com";
    println!("Opening {url} …");
    page.navigate(url, timeout).await?;

    let css = Locator::Css("h1".into());
    let xpath = Locator::XPath("//div/h1".into());
    let missing = Locator::Css("#does-not-exist".into());
    page.wait_for_ready(&css, timeout).await?;
    page.wait_for_ready(&xpath, timeout).await?;

    let values = page.read_texts(&[&css, &xpath, &missing]).await?;
    assert_eq!(
        values,
        vec![
            Some("Example Domain".to_string()),
            Some("Example Domain".to_string()),
            None
        ],
        "Unexpected values read from the page"
    );

    page.close().await?;
    println!("OK — read {values:?}");
    Ok(())
}
