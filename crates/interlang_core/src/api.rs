use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::InterlangConfig;
use crate::page_index::{PageIndex, PageIndexBuilder};
use crate::redirects::{RedirectEntry, RedirectMap};

/// Read access to the wiki's langlink and redirect data.
pub trait LanglinkSource {
    /// Raw page objects (title, pageid, ns, langlinks, latest revision id and
    /// timestamp) for every non-redirect page in `namespace`. A title may appear in several partial objects.
    fn fetch_langlink_pages(&mut self, namespace: i32) -> Result<Vec<Value>>;
    fn fetch_redirects(&mut self, namespace: i32) -> Result<Vec<RedirectEntry>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &InterlangConfig) -> Self {
        let api_default = config.wiki.api_url.as_deref().unwrap_or("");
        Self::from_env_with_defaults(api_default, &config.user_agent())
    }

    fn from_env_with_defaults(api_url_default: &str, user_agent_default: &str) -> Self {
        Self {
            api_url: env_value("WIKI_API_URL", api_url_default),
            user_agent: env_value("WIKI_USER_AGENT", user_agent_default),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("wiki API URL is not configured (set WIKI_API_URL or [wiki].api_url)");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn request_json_get(&mut self, params: &[(String, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push((key.clone(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(error) = payload.get("error") {
                        let code = error
                            .get("code")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error");
                        let info = error
                            .get("info")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown info");
                        bail!("MediaWiki API error [{code}]: {info}");
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    /// Run a query to completion, echoing each `continue` object back until
    /// the API stops returning one.
    fn query_continued<F>(&mut self, params: Vec<(String, String)>, mut on_batch: F) -> Result<()>
    where
        F: FnMut(QueryPayload) -> Result<()>,
    {
        let mut continuation: Vec<(String, String)> = Vec::new();
        loop {
            let mut request = params.clone();
            request.extend(continuation.iter().cloned());

            let response = self.request_json_get(&request)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode query API response")?;
            on_batch(parsed.query)?;

            continuation = continuation_params(parsed.continuation.as_ref());
            if continuation.is_empty() {
                return Ok(());
            }
            debug!(continuation = ?continuation, "continuing query");
        }
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_read_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl LanglinkSource for MediaWikiClient {
    fn fetch_langlink_pages(&mut self, namespace: i32) -> Result<Vec<Value>> {
        let params = owned_params(&[
            ("action", "query"),
            ("generator", "allpages"),
            ("gapfilterredir", "nonredirects"),
            ("gapnamespace", &namespace.to_string()),
            ("gaplimit", "max"),
            ("prop", "langlinks|revisions"),
            ("lllimit", "max"),
            ("rvprop", "ids|timestamp"),
        ]);
        let mut pages = Vec::new();
        self.query_continued(params, |query| {
            pages.extend(query.pages);
            Ok(())
        })
        .with_context(|| format!("failed to fetch langlinks for namespace {namespace}"))?;
        Ok(pages)
    }

    fn fetch_redirects(&mut self, namespace: i32) -> Result<Vec<RedirectEntry>> {
        let params = owned_params(&[
            ("action", "query"),
            ("generator", "allpages"),
            ("gapfilterredir", "redirects"),
            ("gapnamespace", &namespace.to_string()),
            ("gaplimit", "max"),
            ("redirects", "1"),
        ]);
        let mut redirects = Vec::new();
        self.query_continued(params, |query| {
            redirects.extend(query.redirects);
            Ok(())
        })
        .with_context(|| format!("failed to fetch redirects for namespace {namespace}"))?;
        Ok(redirects)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Fetch every page of the given namespaces, merging partial page objects
/// returned across continuation batches.
pub fn fetch_page_index<S: LanglinkSource>(source: &mut S, namespaces: &[i32]) -> Result<PageIndex> {
    let mut builder = PageIndexBuilder::new();
    for namespace in namespaces {
        let pages = source.fetch_langlink_pages(*namespace)?;
        info!(namespace, objects = pages.len(), "fetched langlink pages");
        for page in pages {
            builder.merge(page)?;
        }
    }
    builder.finish()
}

pub fn fetch_redirect_map<S: LanglinkSource>(source: &mut S, namespaces: &[i32]) -> Result<RedirectMap> {
    let mut entries = Vec::new();
    for namespace in namespaces {
        let batch = source.fetch_redirects(*namespace)?;
        info!(namespace, redirects = batch.len(), "fetched redirects");
        entries.extend(batch);
    }
    Ok(RedirectMap::from_entries(entries))
}

fn owned_params(params: &[(&str, &str)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

fn continuation_params(continuation: Option<&serde_json::Map<String, Value>>) -> Vec<(String, String)> {
    let Some(continuation) = continuation else {
        return Vec::new();
    };
    continuation
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<Value>,
    #[serde(default)]
    redirects: Vec<RedirectEntry>,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    #[derive(Default)]
    struct MockSource {
        pages_by_namespace: BTreeMap<i32, Vec<Value>>,
        redirects_by_namespace: BTreeMap<i32, Vec<RedirectEntry>>,
        request_count: usize,
    }

    impl LanglinkSource for MockSource {
        fn fetch_langlink_pages(&mut self, namespace: i32) -> Result<Vec<Value>> {
            self.request_count += 1;
            Ok(self
                .pages_by_namespace
                .get(&namespace)
                .cloned()
                .unwrap_or_default())
        }

        fn fetch_redirects(&mut self, namespace: i32) -> Result<Vec<RedirectEntry>> {
            self.request_count += 1;
            Ok(self
                .redirects_by_namespace
                .get(&namespace)
                .cloned()
                .unwrap_or_default())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    #[test]
    fn fetch_page_index_merges_continuation_fragments() {
        let mut source = MockSource::default();
        source.pages_by_namespace.insert(
            0,
            vec![
                json!({"title": "Bash", "pageid": 7, "ns": 0,
                       "langlinks": [{"lang": "cs", "title": "Bash"}]}),
                json!({"title": "Bash (Česky)", "pageid": 8, "ns": 0,
                       "revisions": [{"revid": 120, "parentid": 99,
                                      "timestamp": "2024-05-01T10:00:00Z"}]}),
                json!({"title": "Bash", "langlinks": [{"lang": "fr", "*": "Bash"}]}),
            ],
        );
        source.pages_by_namespace.insert(
            14,
            vec![json!({"title": "Category:Shells", "pageid": 9, "ns": 14})],
        );

        let index = fetch_page_index(&mut source, &[0, 4, 14]).expect("fetch");
        assert_eq!(source.request_count(), 3);
        assert_eq!(index.len(), 3);
        let bash = index.get("Bash").expect("bash");
        assert_eq!(bash.page_id, Some(7));
        let tags: Vec<&str> = bash.langlinks.iter().map(|link| link.tag.as_str()).collect();
        assert_eq!(tags, vec!["cs", "fr"]);
        assert_eq!(index.get("Category:Shells").map(|page| page.namespace), Some(14));

        let revision = index
            .get("Bash (Česky)")
            .and_then(|page| page.latest_revision())
            .expect("revision");
        assert_eq!(revision.revid, Some(120));
        assert_eq!(revision.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn fetch_redirect_map_collects_all_namespaces() {
        let mut source = MockSource::default();
        source.redirects_by_namespace.insert(
            0,
            vec![RedirectEntry {
                from: "Old bash".to_string(),
                to: "Bash".to_string(),
            }],
        );
        source.redirects_by_namespace.insert(
            4,
            vec![RedirectEntry {
                from: "ArchWiki:Old".to_string(),
                to: "ArchWiki:New".to_string(),
            }],
        );

        let redirects = fetch_redirect_map(&mut source, &[0, 4]).expect("fetch");
        assert_eq!(redirects.len(), 2);
        assert_eq!(redirects.resolve("Old bash"), "Bash");
        assert_eq!(redirects.resolve("ArchWiki:Old"), "ArchWiki:New");
    }

    #[test]
    fn continuation_params_echo_every_key() {
        let payload: QueryResponse = serde_json::from_value(json!({
            "continue": {"gapcontinue": "Bash", "llcontinue": "7|fr", "continue": "gapcontinue||"},
            "query": {"pages": [{"title": "Bash"}]}
        }))
        .expect("decode");
        let mut params = continuation_params(payload.continuation.as_ref());
        params.sort();
        assert_eq!(
            params,
            vec![
                ("continue".to_string(), "gapcontinue||".to_string()),
                ("gapcontinue".to_string(), "Bash".to_string()),
                ("llcontinue".to_string(), "7|fr".to_string()),
            ]
        );
        assert_eq!(payload.query.pages.len(), 1);
        assert!(continuation_params(None).is_empty());
    }

    #[test]
    fn query_payload_decodes_redirects() {
        let payload: QueryResponse = serde_json::from_value(json!({
            "batchcomplete": true,
            "query": {"redirects": [{"from": "A", "to": "B", "tofragment": "x"}]}
        }))
        .expect("decode");
        assert!(payload.continuation.is_none());
        assert_eq!(payload.query.redirects[0].to, "B");
    }

    #[test]
    fn client_requires_api_url() {
        let config = MediaWikiClientConfig {
            api_url: "  ".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 1_000,
            rate_limit_read_ms: 0,
            max_retries: 0,
            retry_delay_ms: 0,
        };
        let error = MediaWikiClient::new(config).err().expect("must fail");
        assert!(error.to_string().contains("not configured"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
