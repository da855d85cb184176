//! Scripted browser sessions over WebDriver.
//!
//! Carrier pages that render their status client-side are driven through a
//! [`BrowserSession`]. The production implementation talks to a chromedriver via
//! `fantoccini`; tests substitute scripted fakes.

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::BrowserConfig;
use crate::error::{Result, TrackerError};

/// One open browser tab.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url`.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Scroll to the bottom of the page so lazy content renders.
    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Wait up to `timeout` for the element with `id`, clear it and type `text`.
    async fn fill_by_id(&self, id: &str, text: &str, timeout: Duration) -> Result<()>;

    /// Text of the first element whose own text contains `phrase`, if present now.
    async fn find_text(&self, phrase: &str) -> Result<Option<String>>;

    /// Click the first control labelled `label` (case-insensitive): `input` elements by
    /// their `value`, then `button` elements by text. Returns false when none matches.
    async fn click_labelled(&self, label: &str) -> Result<bool>;

    /// Full-page screenshot as PNG bytes.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    /// Rendered text of every `table` element.
    async fn table_texts(&self) -> Result<Vec<String>>;

    /// Current page source.
    async fn page_source(&self) -> Result<String>;

    /// End the session and release the browser.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens fresh browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Close `session`, logging instead of failing when the driver misbehaves.
pub async fn close_quietly(session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        debug!("Browser session did not close cleanly: {e}");
    }
}

/// XPath matching elements whose text node contains `phrase`.
#[must_use]
pub fn contains_text_xpath(phrase: &str) -> String {
    format!("//*[contains(text(),'{}')]", phrase.replace('\'', ""))
}

// ---------------------------------------------------------------------------
// chromedriver
// ---------------------------------------------------------------------------

/// Launches Chrome sessions through a running chromedriver.
pub struct WebDriverLauncher {
    webdriver_url: String,
    capabilities: Map<String, Value>,
}

impl WebDriverLauncher {
    pub fn new(config: &BrowserConfig) -> Self {
        let mut args = vec![format!("--window-size={},{}", config.window_width, config.window_height)];
        if config.headless {
            args.push("--headless=new".to_string());
        }
        let mut capabilities = Map::new();
        capabilities.insert("browserName".to_string(), json!("chrome"));
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        Self {
            webdriver_url: config.webdriver_url.clone(),
            capabilities,
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities.clone())
            .connect(&self.webdriver_url)
            .await?;
        Ok(Box::new(WebDriverSession { client }))
    }
}

/// A chromedriver-backed session.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    async fn first_matching(elements: Vec<Element>, label: &str, by_value: bool) -> Result<Option<Element>> {
        let label = label.to_uppercase();
        for element in elements {
            let text = if by_value {
                element.attr("value").await?.unwrap_or_default()
            } else {
                element.text().await?
            };
            if text.to_uppercase().contains(&label) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Browser navigating to {url}");
        Ok(self.client.goto(url).await?)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.client
            .execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
            .await?;
        Ok(())
    }

    async fn fill_by_id(&self, id: &str, text: &str, timeout: Duration) -> Result<()> {
        let element = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Id(id))
            .await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn find_text(&self, phrase: &str) -> Result<Option<String>> {
        let xpath = contains_text_xpath(phrase);
        let elements = self.client.find_all(Locator::XPath(&xpath)).await?;
        match elements.into_iter().next() {
            Some(element) => Ok(Some(element.text().await?.trim().to_string())),
            None => Ok(None),
        }
    }

    async fn click_labelled(&self, label: &str) -> Result<bool> {
        let inputs = self.client.find_all(Locator::Css("input")).await?;
        let mut control = Self::first_matching(inputs, label, true).await?;
        if control.is_none() {
            let buttons = self.client.find_all(Locator::Css("button")).await?;
            control = Self::first_matching(buttons, label, false).await?;
        }
        match control {
            Some(element) => {
                element.click().await?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn table_texts(&self) -> Result<Vec<String>> {
        let tables = self.client.find_all(Locator::Css("table")).await?;
        let mut texts = Vec::with_capacity(tables.len());
        for table in tables {
            texts.push(table.text().await?);
        }
        Ok(texts)
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.client.source().await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| TrackerError::Browser(format!("close failed: {e}")))
    }
}
