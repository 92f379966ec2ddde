use std::time::Duration;

use gleaner_core::error::AppError;
use gleaner_core::profile::Locator;
use gleaner_core::traits::{PageSession, SessionFactory};
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

/// Desktop user agent sent by every backend.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari";

/// Plain-HTTP page sessions using reqwest.
///
/// Pages are fetched once and queried as static HTML, so only CSS
/// locators are supported and readiness markers must be present in the
/// served document. Use the browser backend for script-rendered pages.
#[derive(Clone)]
pub struct HttpSessionFactory {
    client: Client,
}

impl HttpSessionFactory {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(25))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    async fn open(&self) -> Result<HttpSession, AppError> {
        Ok(HttpSession {
            client: self.client.clone(),
            document: None,
        })
    }
}

/// One worker's HTTP "page": the last fetched document.
pub struct HttpSession {
    client: Client,
    document: Option<String>,
}

impl HttpSession {
    fn document(&self) -> Result<&str, AppError> {
        self.document
            .as_deref()
            .ok_or_else(|| AppError::ExtractionError("No page loaded".to_string()))
    }
}

impl PageSession for HttpSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AppError> {
        validate_url(url)?;
        self.document = None;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(timeout.as_secs())
                } else {
                    AppError::NavigationError(format!("Request to {url} failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::NavigationError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::NavigationError(format!("Failed to read response body: {e}")))?;
        self.document = Some(body);
        Ok(())
    }

    async fn wait_for_ready(&mut self, marker: &Locator, timeout: Duration) -> Result<(), AppError> {
        let found = select_texts(self.document()?, &[marker])?;
        match found.first() {
            Some(Some(_)) => Ok(()),
            _ => Err(AppError::ReadinessTimeout {
                marker: marker.to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn read_texts(&mut self, locators: &[&Locator]) -> Result<Vec<Option<String>>, AppError> {
        select_texts(self.document()?, locators)
    }

    async fn close(self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Only absolute http(s) URLs are fetched.
fn validate_url(url: &str) -> Result<(), AppError> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::NavigationError(format!("Invalid URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::NavigationError(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}

/// Trimmed text of the first match for each CSS locator.
fn select_texts(html: &str, locators: &[&Locator]) -> Result<Vec<Option<String>>, AppError> {
    let selectors = locators
        .iter()
        .map(|locator| match locator {
            Locator::Css(css) => Selector::parse(css)
                .map_err(|e| AppError::ProfileError(format!("Invalid CSS selector '{css}': {e}"))),
            Locator::XPath(_) => Err(AppError::UnsupportedLocator(locator.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let document = Html::parse_document(html);
    Ok(selectors
        .iter()
        .map(|selector| {
            document.select(selector).next().map(|element| {
                let text: String = element.text().collect();
                text.trim().to_string()
            })
        })
        .collect())
}
