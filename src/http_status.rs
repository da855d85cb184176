//! Status lookups that scrape a carrier's public tracking page over plain HTTP.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::config::{tracking_url, HttpConfig};
use crate::error::{Result, TrackerError};
use crate::lookup::{error_status, StatusLookup};
use crate::models::Carrier;

/// Build the shared HTTP client.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-CL,es;q=0.9"));
    let user_agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|e| TrackerError::InvalidConfig(format!("Invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, user_agent);

    Ok(Client::builder().default_headers(headers).build()?)
}

async fn fetch(client: &Client, url: &str, timeout: Duration) -> Result<String> {
    debug!("GET {url}");
    let response = client.get(url).timeout(timeout).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

/// Concatenated text of a parsed document, whitespace collapsed.
fn page_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[allow(clippy::expect_used)]
fn situation_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Situaci[oó]n:").expect("label pattern is valid"))
}

// ---------------------------------------------------------------------------
// FedEx
// ---------------------------------------------------------------------------

/// FedEx (TNT Chile) tracking page scraper.
pub struct FedExLookup {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl FedExLookup {
    pub fn new(client: Client, config: &HttpConfig) -> Self {
        Self {
            client,
            url_template: config.fedex_url.clone(),
            timeout: config.fedex_timeout(),
        }
    }
}

/// Status from a FedEx tracking page.
///
/// Uses the text after the `Situación:` label (or the next text node when the label
/// stands alone), then the `ENTREGADA` token, then `"No disponible"`.
pub fn parse_fedex_status(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut nodes = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    while let Some(node) = nodes.next() {
        let Some(label) = situation_label().find(node) else {
            continue;
        };
        let trailing = node[label.end()..].trim();
        if !trailing.is_empty() {
            return trailing.to_string();
        }
        if let Some(next) = nodes.next() {
            return next.to_string();
        }
    }

    if page_text(&document).to_uppercase().contains("ENTREGADA") {
        return "Entregada".to_string();
    }
    "No disponible".to_string()
}

#[async_trait]
impl StatusLookup for FedExLookup {
    fn carrier(&self) -> Carrier {
        Carrier::FedEx
    }

    async fn lookup(&self, tracking_number: &str) -> Option<String> {
        let url = tracking_url(&self.url_template, tracking_number);
        Some(match fetch(&self.client, &url, self.timeout).await {
            Ok(html) => parse_fedex_status(&html),
            Err(e) => error_status(e),
        })
    }
}

// ---------------------------------------------------------------------------
// Correos de Chile
// ---------------------------------------------------------------------------

/// Correos de Chile tracking page scraper.
pub struct CorreosLookup {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl CorreosLookup {
    pub fn new(client: Client, config: &HttpConfig) -> Self {
        Self {
            client,
            url_template: config.correos_url.clone(),
            timeout: config.correos_timeout(),
        }
    }
}

/// Status from a Correos de Chile tracking page.
///
/// Prefers the first non-empty `.estado` element, then page-wide keywords.
#[allow(clippy::expect_used)]
pub fn parse_correos_status(html: &str) -> String {
    static ESTADO: OnceLock<Selector> = OnceLock::new();
    let selector = ESTADO.get_or_init(|| Selector::parse(".estado").expect("selector is valid"));
    let document = Html::parse_document(html);

    let estado = document
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty());
    if let Some(estado) = estado {
        return estado;
    }

    let text = page_text(&document).to_uppercase();
    if text.contains("ENTREGADO") {
        "Entregado".to_string()
    } else if text.contains("NO REGISTRA INFORMACI") {
        "No registra información".to_string()
    } else {
        "En tránsito o no disponible".to_string()
    }
}

#[async_trait]
impl StatusLookup for CorreosLookup {
    fn carrier(&self) -> Carrier {
        Carrier::CorreosDeChile
    }

    async fn lookup(&self, tracking_number: &str) -> Option<String> {
        let url = tracking_url(&self.url_template, tracking_number);
        Some(match fetch(&self.client, &url, self.timeout).await {
            Ok(html) => parse_correos_status(&html),
            Err(e) => error_status(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fedex_situation_inline() {
        let html = "<html><body><td>Situación: EN TRANSITO A DESTINO</td></body></html>";
        assert_eq!(parse_fedex_status(html), "EN TRANSITO A DESTINO");
    }

    #[test]
    fn test_fedex_situation_keeps_time_of_day() {
        let html = "<td>Situación: ENTREGADA 20/05/2025 14:30</td>";
        assert_eq!(parse_fedex_status(html), "ENTREGADA 20/05/2025 14:30");
    }

    #[test]
    fn test_fedex_situation_in_next_cell() {
        let html = "<table><tr><td><b>Situacion:</b></td><td> Entregada a destinatario </td></tr></table>";
        assert_eq!(parse_fedex_status(html), "Entregada a destinatario");
    }

    #[test]
    fn test_fedex_delivered_token_fallback() {
        let html = "<p>Guia 123 ENTREGADA</p>";
        assert_eq!(parse_fedex_status(html), "Entregada");
    }

    #[test]
    fn test_fedex_unavailable() {
        assert_eq!(parse_fedex_status("<p>Sin datos</p>"), "No disponible");
    }

    #[test]
    fn test_correos_estado_element() {
        let html = r#"<div><span class="estado"> En reparto </span></div>"#;
        assert_eq!(parse_correos_status(html), "En reparto");
    }

    #[test]
    fn test_correos_keyword_fallbacks() {
        assert_eq!(parse_correos_status("<p>Envío entregado</p>"), "Entregado");
        assert_eq!(
            parse_correos_status("<p>El envío no registra información</p>"),
            "No registra información"
        );
        assert_eq!(parse_correos_status("<p>Hola</p>"), "En tránsito o no disponible");
    }

    #[test]
    fn test_correos_empty_estado_falls_through() {
        let html = r#"<span class="estado">  </span><p>ENTREGADO</p>"#;
        assert_eq!(parse_correos_status(html), "Entregado");
    }
}
