use async_trait::async_trait;
use futures::future::join_all;
use locus_core::Result;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::ProbeConfig;
use crate::sources::normalize_source_links;

/// Answers whether a single URL responds. Implementations swallow their own
/// failures: anything that goes wrong means "unreachable".
#[async_trait]
pub trait LinkChecker: Send + Sync + fmt::Debug {
    async fn is_reachable(&self, url: &Url) -> bool;
}

/// HEAD request, retried as GET for servers that refuse HEAD.
pub struct HttpLinkChecker {
    client: Client,
}

impl fmt::Debug for HttpLinkChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLinkChecker")
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

impl HttpLinkChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("locus/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn reachable_status(status: StatusCode) -> bool {
    status.as_u16() < 400
}

#[async_trait]
impl LinkChecker for HttpLinkChecker {
    async fn is_reachable(&self, url: &Url) -> bool {
        match self.client.head(url.clone()).send().await {
            Ok(response)
                if response.status() == StatusCode::METHOD_NOT_ALLOWED
                    || response.status() == StatusCode::NOT_IMPLEMENTED =>
            {
                match self.client.get(url.clone()).send().await {
                    Ok(response) => reachable_status(response.status()),
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "source link GET failed");
                        false
                    }
                }
            }
            Ok(response) => reachable_status(response.status()),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "source link HEAD failed");
                false
            }
        }
    }
}

/// Reachability prober for one run. Results are memoized, so revisions that
/// keep the same links do not hit the network again.
pub struct SourceLinkProber {
    checker: Arc<dyn LinkChecker>,
    config: ProbeConfig,
    cache: Mutex<HashMap<String, bool>>,
}

impl fmt::Debug for SourceLinkProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLinkProber")
            .field("checker", &self.checker)
            .field("config", &self.config)
            .field("cached", &self.cached_count())
            .finish()
    }
}

impl SourceLinkProber {
    pub fn new(checker: Arc<dyn LinkChecker>, config: ProbeConfig) -> Self {
        Self {
            checker,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn cached(&self, url: &str) -> Option<bool> {
        self.cache.lock().ok().and_then(|c| c.get(url).copied())
    }

    /// Reachable subset of `urls` after normalization, in first-seen order.
    /// Each uncached URL is checked concurrently under the per-request
    /// timeout. Returns nothing when probing is disabled.
    pub async fn probe(&self, urls: &[String]) -> Vec<String> {
        let normalized = normalize_source_links(urls);
        if !self.config.enabled {
            tracing::debug!(links = normalized.len(), "source probing disabled");
            return Vec::new();
        }

        let pending: Vec<Url> = normalized
            .iter()
            .filter(|u| self.cached(u).is_none())
            .filter_map(|u| Url::parse(u).ok())
            .collect();

        let timeout = self.config.timeout;
        let checks = pending.iter().map(|url| {
            let checker = self.checker.clone();
            async move {
                let reachable = tokio::time::timeout(timeout, checker.is_reachable(url))
                    .await
                    .unwrap_or(false);
                (url.to_string(), reachable)
            }
        });
        let results = join_all(checks).await;

        if let Ok(mut cache) = self.cache.lock() {
            for (url, reachable) in results {
                cache.insert(url, reachable);
            }
        }

        let reachable: Vec<String> = normalized
            .into_iter()
            .filter(|u| self.cached(u).unwrap_or(false))
            .collect();
        tracing::debug!(
            checked = pending.len(),
            reachable = reachable.len(),
            "source links probed"
        );
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct HostChecker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LinkChecker for HostChecker {
        async fn is_reachable(&self, url: &Url) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            url.host_str() != Some("down.example.com")
        }
    }

    #[derive(Debug)]
    struct HangingChecker;

    #[async_trait]
    impl LinkChecker for HangingChecker {
        async fn is_reachable(&self, _url: &Url) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    fn links(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_probe_filters_unreachable_and_caches() {
        let checker = Arc::new(HostChecker::default());
        let prober = SourceLinkProber::new(checker.clone(), ProbeConfig::default());

        let urls = links(&[
            "https://up.example.com/a?x=1",
            "https://down.example.com/b",
            "https://up.example.com/a#frag",
        ]);
        assert_eq!(prober.probe(&urls).await, vec!["https://up.example.com/a"]);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);

        assert_eq!(prober.probe(&urls).await.len(), 1);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(prober.cached_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_times_out_slow_hosts() {
        let config = ProbeConfig {
            enabled: true,
            timeout: Duration::from_millis(20),
        };
        let prober = SourceLinkProber::new(Arc::new(HangingChecker), config);
        let started = std::time::Instant::now();
        assert!(prober.probe(&links(&["https://slow.example.com"])).await.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disabled_probe_checks_nothing() {
        let checker = Arc::new(HostChecker::default());
        let config = ProbeConfig {
            enabled: false,
            ..ProbeConfig::default()
        };
        let prober = SourceLinkProber::new(checker.clone(), config);
        assert!(prober.probe(&links(&["https://up.example.com"])).await.is_empty());
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reachable_status() {
        assert!(reachable_status(StatusCode::OK));
        assert!(reachable_status(StatusCode::MOVED_PERMANENTLY));
        assert!(!reachable_status(StatusCode::NOT_FOUND));
        assert!(!reachable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
