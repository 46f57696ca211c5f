//! 📡 The IMDb (rapidapi `imdb8`) lookup client.
//!
//! Two calls, strictly in order, because the second needs the first one's answer:
//! 1. `GET /title/find?q=<name>`, first result wins, no beauty contest.
//! 2. `GET /title/get-seasons?tconst=<id>`, only when `fetch_episodes` is on.
//!
//! 🔄 This client does not retry. Redelivery is the transport's job.

use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use super::dto::{FindResponse, FindResult, SeasonDto, flatten_seasons};
use super::extract_series_id;
use crate::common::CanonicalSeriesRecord;
use crate::errors::LookupError;

const FIND_ENDPOINT: &str = "/title/find";
const SEASONS_ENDPOINT: &str = "/title/get-seasons";

/// 🔧 How to reach the provider and how much to ask it for.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// 📡 Provider root. Tests point this at a wiremock server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 🏷️ `x-rapidapi-host` header. Defaults to the host part of `base_url`.
    #[serde(default)]
    pub api_host: Option<String>,
    /// 🔒 `x-rapidapi-key` header. The one and only credential.
    pub api_key: String,
    /// 🎞️ Second call on or off. Off means records arrive with no episodes.
    #[serde(default = "default_fetch_episodes")]
    pub fetch_episodes: bool,
    /// ⏱️ Whole-request timeout. None = whatever reqwest does, which is wait.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "https://imdb8.p.rapidapi.com".to_string()
}

fn default_fetch_episodes() -> bool {
    true
}

/// 🔍 Resolves series names against the provider. Cheap to share: `reqwest::Client` pools internally.
#[derive(Debug, Clone)]
pub struct ImdbClient {
    client: reqwest::Client,
    find_url: Url,
    seasons_url: Url,
    api_host: String,
    api_key: String,
    fetch_episodes: bool,
}

impl ImdbClient {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/')).with_context(|| {
            format!(
                "💀 provider base_url '{}' is not a URL. it is a cry for help.",
                config.base_url
            )
        })?;
        let api_host = match config.api_host {
            Some(host) => host,
            None => base
                .host_str()
                .map(str::to_string)
                .context("💀 provider base_url has no host, so there is no default for api_host either")?,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS. It's always TLS.")?;

        Ok(Self {
            client,
            find_url: endpoint_url(&base, FIND_ENDPOINT),
            seasons_url: endpoint_url(&base, SEASONS_ENDPOINT),
            api_host,
            api_key: config.api_key,
            fetch_episodes: config.fetch_episodes,
        })
    }

    /// 🎯 Name in, canonical record out. Two ordered suspension points when episodes are on.
    pub async fn resolve(&self, name: &str) -> Result<CanonicalSeriesRecord, LookupError> {
        let mut find_url = self.find_url.clone();
        find_url.query_pairs_mut().append_pair("q", name);
        let found: FindResponse = self.get_json(FIND_ENDPOINT, find_url).await?;

        let Some(first) = found.results.into_iter().next() else {
            return Err(LookupError::NotFound {
                name: name.to_string(),
            });
        };
        // 🎭 the id decides whether this is a title at all, before any field is trusted
        let raw_id = first.get("id").and_then(Value::as_str).unwrap_or_default();
        let series_id = extract_series_id(raw_id)?;
        let first: FindResult =
            serde_json::from_value(first).map_err(|source| LookupError::Decode {
                endpoint: FIND_ENDPOINT,
                source,
            })?;
        debug!("🔍 '{}' resolved to {} ({})", name, series_id, first.title);

        let episodes = if self.fetch_episodes {
            let mut seasons_url = self.seasons_url.clone();
            seasons_url.query_pairs_mut().append_pair("tconst", &series_id);
            let seasons: Vec<SeasonDto> = self.get_json(SEASONS_ENDPOINT, seasons_url).await?;
            flatten_seasons(seasons)
        } else {
            Vec::new()
        };

        let number_of_episodes = first
            .number_of_episodes
            .or_else(|| (!episodes.is_empty()).then(|| episodes.len() as u32));

        Ok(CanonicalSeriesRecord {
            series_id,
            title: first.title,
            number_of_episodes,
            episodes,
        })
    }

    /// 📡 GET, check the status, decode. Same three beats for both endpoints.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: Url,
    ) -> Result<T, LookupError> {
        trace!("📡 GET {}", url);
        let transport = |source| LookupError::Transport { endpoint, source };

        let response = self
            .client
            .get(url)
            .header("x-rapidapi-host", &self.api_host)
            .header("x-rapidapi-key", &self.api_key)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        let body = response.bytes().await.map_err(transport)?;

        serde_json::from_slice(&body).map_err(|source| LookupError::Decode { endpoint, source })
    }
}

fn endpoint_url(base: &Url, endpoint: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), endpoint);
    url.set_path(&path);
    url
}
