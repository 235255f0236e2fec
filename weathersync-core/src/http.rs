//! Single-shot GET retrieval used by every adapter.

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::ProviderError;

const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("weathersync/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper around [`reqwest::Client`] that returns the body text of a
/// GET request or a [`ProviderError`]. No retries happen at this layer.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    accepted: Vec<StatusCode>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                Client::new()
            });

        Self {
            http,
            accepted: vec![StatusCode::OK],
        }
    }

    /// Replace the set of statuses treated as success.
    pub fn accepting(mut self, statuses: &[StatusCode]) -> Self {
        self.accepted = statuses.to_vec();
        self
    }

    pub async fn retrieve(&self, url: &str) -> Result<String, ProviderError> {
        tracing::debug!(url = %redact(url), "GET");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                url: redact(url),
                source,
            })?;

        let status = res.status();
        if !self.accepted.contains(&status) {
            let body = res.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %truncate_body(&body), "request rejected");
            return Err(ProviderError::Status {
                url: redact(url),
                status,
            });
        }

        let body = res.text().await.map_err(|source| ProviderError::Transport {
            url: redact(url),
            source,
        })?;

        if body.trim().is_empty() {
            return Err(ProviderError::EmptyBody { url: redact(url) });
        }

        Ok(body)
    }
}

/// Percent-encode a value for use in a query string or path segment.
/// Spaces become `%20`, which every upstream accepts in both positions.
pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Strip credentials before a URL is logged: known key query parameters and
/// the path segment after `/forecast/`, where Pirate Weather puts its key.
fn redact(url: &str) -> String {
    const SECRET_KEYS: [&str; 4] = ["appid=", "apikey=", "apiKey=", "key="];
    const KEYED_PATH: &str = "/forecast/";

    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };

    let base = match base.split_once(KEYED_PATH) {
        Some((head, rest)) => match rest.split_once('/') {
            Some((_, tail)) => format!("{head}{KEYED_PATH}***/{tail}"),
            None => base.to_string(),
        },
        None => base.to_string(),
    };

    let Some(query) = query else {
        return base;
    };
    let query = query
        .split('&')
        .map(|pair| {
            if SECRET_KEYS.iter().any(|k| pair.starts_with(k)) {
                let name = pair.split('=').next().unwrap_or_default();
                format!("{name}=***")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn redact_hides_api_keys() {
        let url = "https://host/data?lat=1&appid=SECRET&units=metric";
        assert_eq!(redact(url), "https://host/data?lat=1&appid=***&units=metric");
        assert_eq!(redact("https://host/plain"), "https://host/plain");
    }

    #[test]
    fn redact_hides_key_in_forecast_path() {
        assert_eq!(
            redact("https://host/forecast/SECRET/1.0,2.0?units=ca&lang=en"),
            "https://host/forecast/***/1.0,2.0?units=ca&lang=en"
        );
        assert_eq!(
            redact("https://host/v1/forecast?latitude=1&timezone=auto"),
            "https://host/v1/forecast?latitude=1&timezone=auto"
        );
    }

    #[test]
    fn encode_escapes_reserved_characters() {
        assert_eq!(encode("São Paulo&x"), "S%C3%A3o%20Paulo%26x");
        assert_eq!(encode("1+1"), "1%2B1");
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "ä".repeat(300);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
    }

    #[tokio::test]
    async fn retrieve_returns_body_on_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}"))
            .mount(&server)
            .await;

        let body = HttpClient::new()
            .retrieve(&format!("{}/ok", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "{\"a\":1}");
    }

    #[tokio::test]
    async fn retrieve_rejects_unaccepted_status_and_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/partial"))
            .respond_with(ResponseTemplate::new(203).set_body_string("data"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let err = client
            .retrieve(&format!("{}/partial", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status, .. } if status.as_u16() == 203));

        let err = client
            .retrieve(&format!("{}/empty", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyBody { .. }));

        let lenient = HttpClient::new().accepting(&[StatusCode::OK, StatusCode::NON_AUTHORITATIVE_INFORMATION]);
        let body = lenient
            .retrieve(&format!("{}/partial", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "data");
    }

    #[tokio::test]
    async fn retrieve_sends_custom_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", "probe/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = HttpClient::with_user_agent("probe/1.0")
            .retrieve(&format!("{}/ua", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
