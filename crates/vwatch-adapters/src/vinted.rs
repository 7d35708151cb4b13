use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};
use url::Url;
use vwatch_core::Listing;

use crate::{AdapterError, HttpClientConfig, Marketplace, SearchPage};

/// Catalog URL array parameters and the API parameter they feed.
const ARRAY_PARAMS: &[(&str, &str)] = &[
    ("catalog[]", "catalog_ids"),
    ("catalog_ids[]", "catalog_ids"),
    ("size_id[]", "size_ids"),
    ("size_ids[]", "size_ids"),
    ("brand_id[]", "brand_ids"),
    ("brand_ids[]", "brand_ids"),
    ("status[]", "status_ids"),
    ("status_id[]", "status_ids"),
    ("status_ids[]", "status_ids"),
    ("color_id[]", "color_ids"),
    ("color_ids[]", "color_ids"),
    ("material_id[]", "material_ids"),
    ("material_ids[]", "material_ids"),
    ("patterns_ids[]", "patterns_ids"),
];

/// Paging and tracking parameters owned by the client, never copied from the query.
const IGNORED_PARAMS: &[&str] = &["page", "per_page", "time", "search_id"];

/// Resolved API host and query parameters for one saved search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub domain: String,
    pub params: Vec<(String, String)>,
}

/// Translate a saved search into catalog API parameters.
///
/// A `http(s)` catalog URL keeps its host and has its filters renamed to the
/// API's names (repeated values comma-joined). Any other text is a free-text
/// search against `default_domain`.
pub fn search_target(query: &str, default_domain: &str) -> Result<SearchTarget, AdapterError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AdapterError::InvalidQuery("empty query".to_string()));
    }

    if !(query.starts_with("https://") || query.starts_with("http://")) {
        return Ok(SearchTarget {
            domain: default_domain.to_string(),
            params: vec![("search_text".to_string(), query.to_string())],
        });
    }

    let parsed =
        Url::parse(query).map_err(|err| AdapterError::InvalidQuery(format!("{query}: {err}")))?;
    let domain = parsed
        .host_str()
        .ok_or_else(|| AdapterError::InvalidQuery(format!("{query}: missing host")))?
        .to_string();

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in parsed.query_pairs() {
        if value.is_empty() || IGNORED_PARAMS.contains(&key.as_ref()) {
            continue;
        }
        let name = ARRAY_PARAMS
            .iter()
            .find(|(raw, _)| *raw == key)
            .map(|(_, api)| (*api).to_string())
            .unwrap_or_else(|| key.trim_end_matches("[]").to_string());
        grouped.entry(name).or_default().push(value.into_owned());
    }

    Ok(SearchTarget {
        domain,
        params: grouped
            .into_iter()
            .map(|(key, values)| (key, values.join(",")))
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Amount {
        amount: JsonValue,
        #[serde(default)]
        currency_code: Option<String>,
    },
    Text(String),
    Number(f64),
}

#[derive(Debug, Default, Deserialize)]
struct RawHighResolution {
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPhoto {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    high_resolution: Option<RawHighResolution>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Option<RawPrice>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    size: Option<JsonValue>,
    #[serde(default)]
    size_title: Option<JsonValue>,
    #[serde(default)]
    status: Option<JsonValue>,
    #[serde(default)]
    created_at_ts: Option<RawTimestamp>,
    #[serde(default)]
    photos: Vec<RawPhoto>,
    #[serde(default)]
    photo: Option<RawPhoto>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

fn scalar_text(value: Option<&JsonValue>) -> Option<String> {
    let text = match value? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn timestamp_from_number(raw: i64) -> Option<DateTime<Utc>> {
    // Millisecond epochs are 13 digits for any date after 2001.
    if raw.abs() >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

impl RawTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Number(raw) => timestamp_from_number(*raw),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| text.trim().parse::<i64>().ok().and_then(timestamp_from_number)),
        }
    }
}

impl RawPrice {
    fn render(&self, fallback_currency: Option<&str>) -> Option<String> {
        let (amount, currency) = match self {
            Self::Amount {
                amount,
                currency_code,
            } => (scalar_text(Some(amount))?, currency_code.as_deref()),
            Self::Text(text) => (text.trim().to_string(), fallback_currency),
            Self::Number(n) => (n.to_string(), fallback_currency),
        };
        if amount.is_empty() {
            return None;
        }
        Some(match currency {
            Some(code) if !code.is_empty() => format!("{amount} {code}"),
            _ => amount,
        })
    }
}

impl RawItem {
    fn into_listing(self, domain: &str) -> Option<Listing> {
        let photos: Vec<&RawPhoto> = if self.photos.is_empty() {
            self.photo.iter().collect()
        } else {
            self.photos.iter().collect()
        };

        let created_at = self
            .created_at_ts
            .as_ref()
            .and_then(RawTimestamp::to_utc)
            .or_else(|| {
                photos
                    .iter()
                    .find_map(|p| p.high_resolution.as_ref()?.timestamp)
                    .and_then(timestamp_from_number)
            });
        let Some(created_at) = created_at else {
            debug!(item_id = self.id, "dropping catalog item without creation time");
            return None;
        };

        let photo_urls = photos
            .iter()
            .filter_map(|p| p.url.clone())
            .filter(|u| !u.is_empty())
            .collect();

        let url = match (self.url, self.path) {
            (Some(url), _) if !url.is_empty() => url,
            (_, Some(path)) if !path.is_empty() => format!("https://{domain}{path}"),
            _ => format!("https://{domain}/items/{}", self.id),
        };

        Some(Listing {
            id: self.id,
            title: self.title,
            price: self
                .price
                .as_ref()
                .and_then(|p| p.render(self.currency.as_deref())),
            size: scalar_text(self.size_title.as_ref()).or_else(|| scalar_text(self.size.as_ref())),
            status: scalar_text(self.status.as_ref()),
            created_at,
            photo_urls,
            url,
        })
    }
}

/// Decode a catalog API body.
///
/// JSON without an `items` array gives [`SearchPage::empty_response`]. Items
/// that cannot be decoded, or carry no usable creation time, are skipped.
pub fn parse_catalog_body(body: &[u8], domain: &str) -> Result<SearchPage, AdapterError> {
    let value: JsonValue = serde_json::from_slice(body)?;
    let Some(items) = value.get("items").and_then(JsonValue::as_array) else {
        debug!(domain, "catalog response carries no items field");
        return Ok(SearchPage::empty_response());
    };

    let listings = items
        .iter()
        .filter_map(|raw| match RawItem::deserialize(raw) {
            Ok(item) => item.into_listing(domain),
            Err(err) => {
                debug!(error = %err, "skipping undecodable catalog item");
                None
            }
        })
        .collect();
    Ok(SearchPage::with_items(listings))
}

/// Catalog search client for Vinted storefronts.
///
/// The API only answers requests carrying a session cookie, so the home page
/// of each storefront is fetched once and its cookies kept in the client's jar.
#[derive(Debug)]
pub struct VintedClient {
    client: reqwest::Client,
    default_domain: String,
    api_base: Option<String>,
    sessions: Mutex<HashSet<String>>,
}

impl VintedClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            default_domain: config.default_domain,
            api_base: config
                .api_base
                .map(|base| base.trim_end_matches('/').to_string()),
            sessions: Mutex::new(HashSet::new()),
        })
    }

    fn origin(&self, domain: &str) -> String {
        match &self.api_base {
            Some(base) => base.clone(),
            None => format!("https://{domain}"),
        }
    }

    async fn ensure_session(&self, domain: &str, force: bool) -> Result<(), AdapterError> {
        let mut sessions = self.sessions.lock().await;
        if !force && sessions.contains(domain) {
            return Ok(());
        }

        let url = format!("{}/", self.origin(domain));
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                url,
            });
        }

        sessions.insert(domain.to_string());
        debug!(domain, "marketplace session established");
        Ok(())
    }

    async fn request_catalog(
        &self,
        target: &SearchTarget,
        per_page: u32,
    ) -> Result<Response, AdapterError> {
        let api_url = format!("{}/api/v2/catalog/items", self.origin(&target.domain));
        let resp = self
            .client
            .get(&api_url)
            .header(ACCEPT, "application/json")
            .query(&target.params)
            .query(&[("per_page", per_page.to_string()), ("page", "1".to_string())])
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl Marketplace for VintedClient {
    async fn search(&self, query: &str, per_page: u32) -> Result<SearchPage, AdapterError> {
        let target = search_target(query, &self.default_domain)?;
        let span = info_span!("vinted_search", domain = %target.domain, per_page);

        async move {
            self.ensure_session(&target.domain, false).await?;
            let mut resp = self.request_catalog(&target, per_page).await?;
            if resp.status() == StatusCode::UNAUTHORIZED {
                self.ensure_session(&target.domain, true).await?;
                resp = self.request_catalog(&target, per_page).await?;
            }

            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::Status {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }

            let body = resp.bytes().await?;
            parse_catalog_body(&body, &target.domain)
        }
        .instrument(span)
        .await
    }
}
