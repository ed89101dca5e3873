use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use refscout_contracts::{normalize_tags, split_raw, CandidateSelector, PolicyError, Post};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_FALLBACK_TAG: &str = "1girl";
pub const DEFAULT_RESULT_LIMIT: u32 = 20;
pub const DEFAULT_ATTEMPT_PAUSE: Duration = Duration::from_millis(100);

const GELBOORU_API_MAX_LIMIT: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// The API answers default reqwest user agents with an empty document.
const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub trait PostProvider: Send + Sync {
    fn name(&self) -> &str;
    fn search(&self, tags: &[String], limit: u32) -> Result<Vec<Post>>;
}

/// Tag-query client for the Gelbooru post API.
#[derive(Debug, Clone)]
pub struct GelbooruProvider {
    api_base: String,
    http: HttpClient,
    credentials: Option<(String, String)>,
}

impl GelbooruProvider {
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed building Gelbooru HTTP client")?;
        Ok(Self::with_client(http))
    }

    /// Build against a caller-supplied client (custom timeout, proxy, test
    /// transport). `GELBOORU_API_BASE` still overrides the endpoint.
    pub fn with_client(http: HttpClient) -> Self {
        let api_base = env::var("GELBOORU_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "https://gelbooru.com".to_string());
        Self {
            api_base,
            http,
            credentials: credentials_from_env(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/index.php", self.api_base)
    }

    /// Download the raw bytes behind a resolved URL, reusing the provider's
    /// client so the same user agent and timeout apply.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading reference image ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "reference image download failed ({code}): {}",
                truncate_text(&body, 256)
            );
        }
        let bytes = response
            .bytes()
            .context("failed reading reference image bytes")?
            .to_vec();
        Ok(bytes)
    }
}

impl PostProvider for GelbooruProvider {
    fn name(&self) -> &str {
        "gelbooru"
    }

    fn search(&self, tags: &[String], limit: u32) -> Result<Vec<Post>> {
        let query = tags.join(" ");
        let limit = limit.clamp(1, GELBOORU_API_MAX_LIMIT);
        let mut request = self
            .http
            .get(self.endpoint())
            .query(&[
                ("page", "dapi"),
                ("s", "post"),
                ("q", "index"),
                ("json", "1"),
                ("tags", query.as_str()),
            ])
            .query(&[("limit", limit)]);
        if let Some((api_key, user_id)) = &self.credentials {
            request = request.query(&[
                ("api_key", api_key.as_str()),
                ("user_id", user_id.as_str()),
            ]);
        }
        let response = request
            .send()
            .with_context(|| format!("Gelbooru request failed (tags: {query})"))?;
        let payload = response_json_or_error("Gelbooru", response)?;
        Ok(posts_from_payload(&payload))
    }
}

fn credentials_from_env() -> Option<(String, String)> {
    match (
        non_empty_env("GELBOORU_API_KEY"),
        non_empty_env("GELBOORU_USER_ID"),
    ) {
        (Some(api_key), Some(user_id)) => Some((api_key, user_id)),
        _ => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 256)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Extract post records from whatever shape the API answered with: an object
/// keyed by `"post"`, a bare array, or (for anything else) nothing. Records
/// that fail to deserialize are skipped rather than failing the batch.
fn posts_from_payload(payload: &Value) -> Vec<Post> {
    let rows = match payload {
        Value::Object(map) => map
            .get("post")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        Value::Array(rows) => rows.clone(),
        _ => Vec::new(),
    };
    rows.into_iter()
        .filter_map(|row| serde_json::from_value::<Post>(row).ok())
        .collect()
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub fallback_tag: String,
    pub result_limit: u32,
    pub attempt_pause: Duration,
    pub max_attempts: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fallback_tag: DEFAULT_FALLBACK_TAG.to_string(),
            result_limit: DEFAULT_RESULT_LIMIT,
            attempt_pause: DEFAULT_ATTEMPT_PAUSE,
            max_attempts: None,
        }
    }
}

impl SearchConfig {
    fn validated(mut self) -> Result<Self, PolicyError> {
        let mut fallback = normalize_tags([self.fallback_tag.as_str()]);
        if fallback.len() != 1 {
            return Err(PolicyError::InvalidFallbackTag);
        }
        self.fallback_tag = fallback.remove(0);
        if self.result_limit == 0 {
            return Err(PolicyError::ZeroResultLimit);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub tags: Vec<String>,
    pub posts_returned: usize,
    pub provider_error: Option<String>,
    pub resolved: bool,
}

/// What one fallback search did: the resolved URL (if any), every query
/// issued, and how many provider failures were swallowed along the way.
/// Provider failures and genuine zero-match rounds degrade identically, but
/// stay distinguishable here and in the logs.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub url: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub transient_errors: usize,
}

impl SearchOutcome {
    pub fn is_resolved(&self) -> bool {
        self.url.is_some()
    }
}

/// Drives repeated provider queries with progressively relaxed tag sets
/// until a candidate is selected or the attempts are spent.
///
/// Each failed round drops the last (least important) tag; once a single
/// tag remains and fails, the canonical fallback tag gets one try before
/// the search reports exhaustion. Strictly sequential: every degradation
/// decision depends on the previous round's outcome.
pub struct FallbackSearcher {
    provider: Box<dyn PostProvider>,
    selector: CandidateSelector,
    config: SearchConfig,
}

impl FallbackSearcher {
    pub fn new(
        provider: Box<dyn PostProvider>,
        selector: CandidateSelector,
        config: SearchConfig,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            provider,
            selector,
            config: config.validated()?,
        })
    }

    /// Convenience entry point for the free-form tag string a text
    /// understanding service hands back.
    pub fn search_description(&self, raw: &str) -> SearchOutcome {
        self.search_with_fallback(split_raw(raw))
    }

    pub fn search_with_fallback<I, S>(&self, tags: I) -> SearchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let initial = normalize_tags(tags);
        let max_attempts = self.config.max_attempts.unwrap_or(initial.len() + 2);
        let mut outcome = SearchOutcome::default();
        let mut current = initial;

        for _ in 0..max_attempts {
            if current.is_empty() {
                break;
            }
            debug!(
                provider = self.provider.name(),
                tags = %current.join(" "),
                "issuing search attempt"
            );
            let mut record = AttemptRecord {
                tags: current.clone(),
                posts_returned: 0,
                provider_error: None,
                resolved: false,
            };
            let posts = match self.provider.search(&current, self.config.result_limit) {
                Ok(posts) => posts,
                Err(err) => {
                    let text = format!("{err:#}");
                    warn!(
                        provider = self.provider.name(),
                        error = text.as_str(),
                        "provider error treated as empty result"
                    );
                    outcome.transient_errors += 1;
                    record.provider_error = Some(text);
                    Vec::new()
                }
            };
            record.posts_returned = posts.len();

            if let Some(url) = self.selector.select(&posts) {
                info!(url = url.as_str(), "reference image resolved");
                record.resolved = true;
                outcome.attempts.push(record);
                outcome.url = Some(url);
                return outcome;
            }
            outcome.attempts.push(record);

            if current.len() > 1 {
                current.pop();
            } else if current[0] != self.config.fallback_tag {
                current = vec![self.config.fallback_tag.clone()];
            } else {
                // The fallback tag itself just came up empty.
                break;
            }

            if !self.config.attempt_pause.is_zero() {
                thread::sleep(self.config.attempt_pause);
            }
        }

        outcome
    }
}
