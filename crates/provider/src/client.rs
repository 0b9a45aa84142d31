//! Low-level vendor HTTP clients and the process-wide client cache.

use manta_core::{Error, Provider};
use parking_lot::Mutex;
use reqwest::header::{self, HeaderMap};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use ulid::Ulid;

/// Default vendor endpoints.
pub mod endpoint {
    /// OpenAI Responses API.
    pub const OPENAI: &str = "https://api.openai.com/v1/responses";
    /// xAI Grok (Responses-compatible).
    pub const XAI: &str = "https://api.x.ai/v1/responses";
    /// DeepSeek chat completions.
    pub const DEEPSEEK: &str = "https://api.deepseek.com/chat/completions";
    /// Anthropic Messages API.
    pub const ANTHROPIC: &str = "https://api.anthropic.com/v1/messages";
    /// Google Gemini API base (model appended per call).
    pub const GEMINI: &str = "https://generativelanguage.googleapis.com/v1beta";
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connect and read phases time out independently: connection setup is
/// uniform, inference latency is not.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// A configured low-level client for one vendor API.
///
/// Never mutated after construction; shared via [`ClientCache`] for the
/// process lifetime until explicitly invalidated.
#[derive(Clone)]
pub struct LlmClient {
    /// Identity of this construction, for cache idempotence checks.
    pub id: Ulid,
    pub http: reqwest::Client,
    pub endpoint: String,
    pub headers: HeaderMap,
}

impl LlmClient {
    /// Construct the client for a provider with the resolved API key.
    pub fn for_provider(provider: Provider, api_key: &str) -> Result<Self, Error> {
        match provider {
            Provider::OpenAi => Self::bearer(provider, endpoint::OPENAI, api_key),
            Provider::Xai => Self::bearer(provider, endpoint::XAI, api_key),
            Provider::DeepSeek => Self::bearer(provider, endpoint::DEEPSEEK, api_key),
            Provider::Anthropic => {
                let mut headers = Self::base_headers(provider)?;
                headers.insert(
                    "x-api-key",
                    api_key
                        .parse()
                        .map_err(|e| Error::llm(provider, format!("invalid api key: {e}")))?,
                );
                headers.insert(
                    "anthropic-version",
                    ANTHROPIC_VERSION
                        .parse()
                        .map_err(|e| Error::llm(provider, e))?,
                );
                Self::build(provider, endpoint::ANTHROPIC, headers)
            }
            Provider::Gemini => {
                let mut headers = Self::base_headers(provider)?;
                headers.insert(
                    "x-goog-api-key",
                    api_key
                        .parse()
                        .map_err(|e| Error::llm(provider, format!("invalid api key: {e}")))?,
                );
                Self::build(provider, endpoint::GEMINI, headers)
            }
            Provider::Unknown => Err(Error::llm(
                provider,
                "no client construction for unknown provider",
            )),
        }
    }

    /// Construct a client against an arbitrary endpoint with bearer auth,
    /// for OpenAI-compatible proxies and local test servers.
    pub fn custom(provider: Provider, url: &str, api_key: &str) -> Result<Self, Error> {
        Self::bearer(provider, url, api_key)
    }

    fn bearer(provider: Provider, url: &str, api_key: &str) -> Result<Self, Error> {
        let mut headers = Self::base_headers(provider)?;
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {api_key}")
                .parse()
                .map_err(|e| Error::llm(provider, format!("invalid api key: {e}")))?,
        );
        Self::build(provider, url, headers)
    }

    fn base_headers(provider: Provider) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json"
                .parse()
                .map_err(|e| Error::llm(provider, e))?,
        );
        headers.insert(
            header::ACCEPT,
            "application/json"
                .parse()
                .map_err(|e| Error::llm(provider, e))?,
        );
        Ok(headers)
    }

    fn build(provider: Provider, url: &str, headers: HeaderMap) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| Error::llm(provider, format!("client construction failed: {e}")))?;

        Ok(Self {
            id: Ulid::new(),
            http,
            endpoint: url.to_owned(),
            headers,
        })
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Concurrent cache of vendor clients keyed by `(provider, api_key)`.
///
/// Injectable so tests can construct isolated instances; [`ClientCache::global`]
/// is the one process-wide instance shared by default across all gateways.
/// Entries are only ever successfully constructed clients and are never
/// silently expired; [`ClientCache::clear`] is the explicit invalidation.
#[derive(Clone, Default)]
pub struct ClientCache {
    inner: Arc<Mutex<HashMap<(Provider, String), LlmClient>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide shared instance.
    pub fn global() -> &'static ClientCache {
        static CACHE: OnceLock<ClientCache> = OnceLock::new();
        CACHE.get_or_init(ClientCache::new)
    }

    /// Return the cached client for the key, constructing it at most once
    /// per distinct key even under concurrent first use. The lock is held
    /// across construction so concurrent callers observe one instance.
    pub fn get_or_create<F>(
        &self,
        provider: Provider,
        api_key: &str,
        create: F,
    ) -> Result<LlmClient, Error>
    where
        F: FnOnce() -> Result<LlmClient, Error>,
    {
        let mut map = self.inner.lock();
        let key = (provider, api_key.to_owned());
        if let Some(client) = map.get(&key) {
            return Ok(client.clone());
        }

        let client = create()?;
        map.insert(key, client.clone());
        Ok(client)
    }

    /// Drop every cached client, forcing full reconnection on next use.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("len", &self.len())
            .finish()
    }
}
