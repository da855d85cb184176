//! Starken status lookup through a scripted browser.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::browser::{close_quietly, BrowserLauncher, BrowserSession};
use crate::config::{tracking_url, BrowserConfig};
use crate::error::Result;
use crate::lookup::StatusLookup;
use crate::models::Carrier;
use crate::poll::{poll_until, PollPolicy, Probe};

/// Status phrases, most specific first.
pub const STATUS_PHRASES: [&str; 7] = [
    "Entregado con fecha",
    "El envío ya fue entregado",
    "En tránsito",
    "En reparto",
    "En sucursal destino",
    "Recibido por Starken",
    "Solicitud de Envío Creado",
];

/// Element carrying the delivery date.
pub const DELIVERY_DATE_PHRASE: &str = "Entregado con fecha";

/// Returned when no status phrase shows up in time.
pub const NO_CLEAR_STATUS: &str = "No se detectó estado claro.";

#[allow(clippy::expect_used)]
fn delivery_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{2}[-/]\d{2}[-/]\d{4} \d{2}:\d{2}(?::\d{2})?").expect("date pattern is valid")
    })
}

/// Append the delivery date found in `date_text` unless `status` already carries it.
pub fn with_delivery_date(status: &str, date_text: Option<&str>) -> String {
    let date = date_text.and_then(|t| delivery_date_pattern().find(t)).map(|m| m.as_str());
    match date {
        Some(date) if !status.contains(date) => format!("{status} - {date}"),
        _ => status.to_string(),
    }
}

/// Starken tracking page driven through a browser session.
pub struct StarkenLookup {
    launcher: Arc<dyn BrowserLauncher>,
    url_template: String,
    settle: Duration,
    policy: PollPolicy,
}

impl StarkenLookup {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &BrowserConfig) -> Self {
        Self {
            launcher,
            url_template: config.starken_url.clone(),
            settle: Duration::from_millis(config.starken_settle_ms),
            policy: PollPolicy::within(
                Duration::from_secs(config.starken_wait_secs),
                Duration::from_millis(config.starken_poll_interval_ms),
            ),
        }
    }

    async fn first_phrase(session: &dyn BrowserSession) -> Result<Probe<String>> {
        for phrase in STATUS_PHRASES {
            if let Some(text) = session.find_text(phrase).await? {
                return Ok(Probe::Ready(text));
            }
        }
        Ok(Probe::Pending)
    }

    async fn read_status(&self, session: &dyn BrowserSession, tracking_number: &str) -> Result<String> {
        session.goto(&tracking_url(&self.url_template, tracking_number)).await?;
        tokio::time::sleep(self.settle).await;
        session.scroll_to_bottom().await?;

        let found = poll_until(self.policy, |_| Self::first_phrase(session)).await?;
        let Some(status) = found else {
            if tracing::enabled!(tracing::Level::DEBUG) {
                let source = session.page_source().await.unwrap_or_default();
                debug!("No Starken status for {tracking_number}; page source:\n{source}");
            }
            return Ok(NO_CLEAR_STATUS.to_string());
        };

        // A date that cannot be read leaves the status as found
        let date_text = match session.find_text(DELIVERY_DATE_PHRASE).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Delivery date unreadable for {tracking_number}: {e}");
                None
            },
        };
        Ok(with_delivery_date(&status, date_text.as_deref()))
    }
}

#[async_trait]
impl StatusLookup for StarkenLookup {
    fn carrier(&self) -> Carrier {
        Carrier::Starken
    }

    async fn lookup(&self, tracking_number: &str) -> Option<String> {
        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => return Some(format!("Error navegador: {e}")),
        };
        let result = self.read_status(session.as_ref(), tracking_number).await;
        close_quietly(session).await;

        Some(result.unwrap_or_else(|e| format!("Error navegador: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Page whose phrases appear after a number of probes.
    #[derive(Default)]
    struct FakePage {
        texts: HashMap<&'static str, String>,
        visible_after: u32,
        /// Reads of the delivery date fail after this many polls
        date_fails_after: Option<u32>,
        probes: AtomicU32,
        visited: Mutex<Vec<String>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserSession for FakePage {
        async fn goto(&self, url: &str) -> Result<()> {
            self.visited.lock().expect("lock").push(url.to_string());
            Ok(())
        }
        async fn scroll_to_bottom(&self) -> Result<()> {
            Ok(())
        }
        async fn fill_by_id(&self, _: &str, _: &str, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn find_text(&self, phrase: &str) -> Result<Option<String>> {
            if phrase == STATUS_PHRASES[0] {
                let probes = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
                if self.date_fails_after.is_some_and(|limit| probes > limit) {
                    return Err(TrackerError::Browser("stale element reference".to_string()));
                }
            }
            if self.probes.load(Ordering::SeqCst) <= self.visible_after {
                return Ok(None);
            }
            Ok(self.texts.get(phrase).cloned())
        }
        async fn click_labelled(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn screenshot_png(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn table_texts(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn page_source(&self) -> Result<String> {
            Ok("<html></html>".to_string())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct OneShot {
        page: Mutex<Option<FakePage>>,
    }

    #[async_trait]
    impl BrowserLauncher for OneShot {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            match self.page.lock().expect("lock").take() {
                Some(page) => Ok(Box::new(page)),
                None => Err(TrackerError::Browser("chromedriver unreachable".to_string())),
            }
        }
    }

    fn fast_config() -> BrowserConfig {
        BrowserConfig {
            starken_settle_ms: 0,
            starken_wait_secs: 1,
            starken_poll_interval_ms: 10,
            ..crate::config::AppConfig::default().browser
        }
    }

    fn lookup_for(page: Option<FakePage>) -> StarkenLookup {
        StarkenLookup::new(Arc::new(OneShot { page: Mutex::new(page) }), &fast_config())
    }

    #[test]
    fn test_with_delivery_date() {
        assert_eq!(
            with_delivery_date("El envío ya fue entregado", Some("Entregado con fecha 03-05-2025 10:15")),
            "El envío ya fue entregado - 03-05-2025 10:15"
        );
        assert_eq!(
            with_delivery_date("Entregado con fecha 03/05/2025 10:15:09", Some("Entregado con fecha 03/05/2025 10:15:09")),
            "Entregado con fecha 03/05/2025 10:15:09"
        );
        assert_eq!(with_delivery_date("En reparto", None), "En reparto");
        assert_eq!(with_delivery_date("En reparto", Some("Entregado con fecha")), "En reparto");
    }

    #[tokio::test]
    async fn test_status_found_after_page_renders() {
        let closed = Arc::new(AtomicBool::new(false));
        let page = FakePage {
            texts: HashMap::from([("En reparto", "En reparto".to_string())]),
            visible_after: 2,
            closed: Arc::clone(&closed),
            ..FakePage::default()
        };
        let status = lookup_for(Some(page)).lookup("T-001").await;
        assert_eq!(status.as_deref(), Some("En reparto"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_most_specific_phrase_wins() {
        let page = FakePage {
            texts: HashMap::from([
                ("En tránsito", "En tránsito".to_string()),
                ("El envío ya fue entregado", "El envío ya fue entregado".to_string()),
                (DELIVERY_DATE_PHRASE, "Entregado con fecha 01-02-2025 09:30".to_string()),
            ]),
            ..FakePage::default()
        };
        let status = lookup_for(Some(page)).lookup("T-002").await;
        assert_eq!(status.as_deref(), Some("Entregado con fecha 01-02-2025 09:30"));
    }

    #[tokio::test]
    async fn test_unreadable_delivery_date_keeps_status() {
        let page = FakePage {
            texts: HashMap::from([("En reparto", "En reparto".to_string())]),
            date_fails_after: Some(1),
            ..FakePage::default()
        };
        let status = lookup_for(Some(page)).lookup("T-005").await;
        assert_eq!(status.as_deref(), Some("En reparto"));
    }

    #[tokio::test]
    async fn test_no_phrase_gives_unclear_status() {
        let closed = Arc::new(AtomicBool::new(false));
        let page = FakePage {
            closed: Arc::clone(&closed),
            ..FakePage::default()
        };
        let status = lookup_for(Some(page)).lookup("T-003").await;
        assert_eq!(status.as_deref(), Some(NO_CLEAR_STATUS));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let status = lookup_for(None).lookup("T-004").await;
        assert_eq!(
            status.as_deref(),
            Some("Error navegador: Browser error: chromedriver unreachable")
        );
    }
}
