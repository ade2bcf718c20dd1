use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{FetchErrorKind, FetchResult, Fetcher};
use crate::config::Config;
use crate::error::Result;
use crate::models::{FetchStrategy, MonitoredItem};

/// Plain HTTP GET for `Static` items.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_options(
            &config.user_agent,
            Duration::from_secs(config.fetch_timeout_secs.max(1)),
        )
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: Url) -> FetchResult {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Request to {} failed: {}", url, e);
                return FetchResult::failed(classify(&e), e.to_string(), elapsed(started));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Failed to fetch {}: {}", url, status);
            return FetchResult::failed(
                FetchErrorKind::Http(status.as_u16()),
                status.to_string(),
                elapsed(started),
            );
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!("Fetched {} bytes from {}", body.len(), url);
                FetchResult::ok(body, Some(status.as_u16()), elapsed(started))
            }
            Err(e) => FetchResult::failed(classify(&e), e.to_string(), elapsed(started)),
        }
    }
}

fn classify(error: &reqwest::Error) -> FetchErrorKind {
    if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if let Some(status) = error.status() {
        FetchErrorKind::Http(status.as_u16())
    } else {
        FetchErrorKind::Network
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &MonitoredItem) -> FetchResult {
        if item.fetch_strategy == FetchStrategy::Scripted {
            return FetchResult::failed(
                FetchErrorKind::Unsupported,
                "scripted pages need a browser engine",
                0,
            );
        }

        let url = match Url::parse(&item.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return FetchResult::failed(
                    FetchErrorKind::Unsupported,
                    format!("unsupported scheme {}", url.scheme()),
                    0,
                )
            }
            Err(e) => {
                return FetchResult::failed(
                    FetchErrorKind::Unsupported,
                    format!("invalid URL {}: {}", item.url, e),
                    0,
                )
            }
        };

        self.get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComparisonConfig, Schedule};
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn item(url: &str) -> MonitoredItem {
        let now = Utc::now();
        MonitoredItem {
            id: 1,
            name: "test".into(),
            url: url.into(),
            fetch_strategy: FetchStrategy::Static,
            comparison: ComparisonConfig::full_html(),
            schedules: Schedule::default_list(),
            enabled: true,
            last_check: None,
            last_change_percent: 0,
            last_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/page", addr)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::with_options("sitewatch-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_page_body() {
        let url = serve_once("HTTP/1.1 200 OK", "<p>hello</p>").await;
        let result = fetcher().fetch(&item(&url)).await;
        assert!(result.success);
        assert_eq!(result.raw_content, "<p>hello</p>");
        assert_eq!(result.http_status, Some(200));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let url = serve_once("HTTP/1.1 404 Not Found", "gone").await;
        let result = fetcher().fetch(&item(&url)).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(FetchErrorKind::Http(404)));
        assert!(result.error_kind.unwrap().is_retryable());
    }

    #[tokio::test]
    async fn scripted_items_are_unsupported() {
        let mut item = item("https://example.com");
        item.fetch_strategy = FetchStrategy::Scripted;
        let result = fetcher().fetch(&item).await;
        assert_eq!(result.error_kind, Some(FetchErrorKind::Unsupported));
        assert!(!FetchErrorKind::Unsupported.is_retryable());
    }

    #[tokio::test]
    async fn bad_urls_are_unsupported() {
        for url in ["not a url", "ftp://example.com/file"] {
            let result = fetcher().fetch(&item(url)).await;
            assert_eq!(result.error_kind, Some(FetchErrorKind::Unsupported));
        }
    }
}
