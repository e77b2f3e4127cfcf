//! Read-only Radarr/Sonarr REST client.
//!
//! Used for tag and profile resolution on the webhook path and for the
//! `/test` and `/simulate` endpoints. Nothing here is allowed to fail a
//! webhook: [`ArrClient::media_context`] degrades to defaults instead.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use picker_core::{ArrConfig, PickerError, ReleaseCandidate, Service};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_PROFILE: &str = "default";

/// `GET /api/v3/system/status`, reduced to what we report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    pub version: Option<String>,
}

/// One entry of `GET /api/v3/qualityprofile`.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityProfile {
    pub id: u64,
    pub name: String,
}

/// One entry of `GET /api/v3/tag`.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub label: String,
}

/// A movie or series, reduced to the fields the picker reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaItem {
    pub id: u64,
    pub title: Option<String>,
    pub quality_profile_id: Option<u64>,
    pub tags: Vec<u64>,
}

impl MediaItem {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }
}

/// Profile name and tag labels of a media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContext {
    pub profile_name: String,
    /// Lowercased tag labels.
    pub tags: BTreeSet<String>,
}

impl Default for MediaContext {
    fn default() -> Self {
        Self {
            profile_name: FALLBACK_PROFILE.to_string(),
            tags: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QualityModel {
    quality: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiRelease {
    guid: Option<String>,
    title: Option<String>,
    indexer: Option<String>,
    size: u64,
    seeders: Option<u32>,
    quality: QualityModel,
    languages: Vec<Named>,
    custom_formats: Vec<Named>,
    custom_format_score: i64,
    age_minutes: f64,
    indexer_flags: serde_json::Value,
}

impl ApiRelease {
    fn into_candidate(self, is_selected: bool) -> ReleaseCandidate {
        let names = |items: Vec<Named>| -> Vec<String> {
            items.into_iter().filter_map(|n| n.name).collect()
        };
        // Radarr reports flags as a bitmask, newer builds as names.
        let indexer_flags = match self.indexer_flags {
            serde_json::Value::Array(flags) => flags
                .into_iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        ReleaseCandidate {
            guid: self.guid.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            size: self.size,
            seeders: self.seeders,
            quality: self
                .quality
                .quality
                .name
                .unwrap_or_else(|| "Unknown".to_string()),
            languages: names(self.languages),
            custom_formats: names(self.custom_formats),
            indexer: self.indexer.unwrap_or_default(),
            custom_format_score: self.custom_format_score,
            age_minutes: self.age_minutes,
            indexer_flags,
            is_selected,
        }
    }
}

/// Client for one configured arr instance.
///
/// # Examples
///
/// ```
/// use picker_core::{ArrConfig, Service};
/// use picker_engine::arr::ArrClient;
///
/// let client = ArrClient::new(
///     Service::Radarr,
///     &ArrConfig { url: "http://radarr:7878".into(), api_key: "key".into() },
/// )
/// .unwrap();
/// assert_eq!(client.service(), Service::Radarr);
/// ```
#[derive(Clone)]
pub struct ArrClient {
    service: Service,
    client: reqwest::Client,
    config: ArrConfig,
}

impl std::fmt::Debug for ArrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrClient")
            .field("service", &self.service)
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

impl ArrClient {
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] if the HTTP client cannot be built.
    pub fn new(service: Service, config: &ArrConfig) -> Result<Self, PickerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                PickerError::Config(format!(
                    "failed to create {} HTTP client: {e}",
                    service.display_name()
                ))
            })?;
        Ok(Self {
            service,
            client,
            config: config.clone(),
        })
    }

    pub fn service(&self) -> Service {
        self.service
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, PickerError> {
        let url = format!("{}/api/v3/{endpoint}", self.config.url);
        let name = self.service.display_name();

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| PickerError::Arr(format!("{name} request to {endpoint} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PickerError::Arr(format!(
                "{name} returned {status} for {endpoint}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PickerError::Arr(format!("{name} sent invalid JSON for {endpoint}: {e}")))
    }

    /// # Errors
    ///
    /// Returns [`PickerError::Arr`] on network, status, or decode errors.
    pub async fn system_status(&self) -> Result<SystemStatus, PickerError> {
        self.get_json("system/status").await
    }

    /// # Errors
    ///
    /// Returns [`PickerError::Arr`] on network, status, or decode errors.
    pub async fn quality_profiles(&self) -> Result<Vec<QualityProfile>, PickerError> {
        self.get_json("qualityprofile").await
    }

    /// # Errors
    ///
    /// Returns [`PickerError::Arr`] on network, status, or decode errors.
    pub async fn tags(&self) -> Result<Vec<Tag>, PickerError> {
        self.get_json("tag").await
    }

    /// Fetch a movie (Radarr) or series (Sonarr).
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Arr`] if the item does not exist or the
    /// request fails.
    pub async fn media(&self, id: u64) -> Result<MediaItem, PickerError> {
        self.get_json(&self.service.media_endpoint(id)).await
    }

    /// Run an interactive search and map the results to candidates.
    ///
    /// The arr returns releases best-first, so the first one is flagged as
    /// its own pick.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Arr`] on network, status, or decode errors.
    pub async fn releases(&self, id: u64) -> Result<Vec<ReleaseCandidate>, PickerError> {
        let releases: Vec<ApiRelease> = self.get_json(&self.service.release_endpoint(id)).await?;
        Ok(releases
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_candidate(i == 0))
            .collect())
    }

    /// Resolve the profile name and tag labels of an already fetched item.
    ///
    /// Lookup failures are logged; the profile falls back to `default`
    /// and the tags to none.
    pub async fn context_for(&self, media: &MediaItem) -> MediaContext {
        let mut context = MediaContext::default();

        match self.quality_profiles().await {
            Ok(profiles) => {
                if let Some(profile) = profiles
                    .into_iter()
                    .find(|p| Some(p.id) == media.quality_profile_id)
                {
                    context.profile_name = profile.name;
                }
            }
            Err(e) => tracing::warn!(service = %self.service, error = %e, "failed to get quality profile"),
        }

        if !media.tags.is_empty() {
            match self.tags().await {
                Ok(tags) => {
                    let labels: HashMap<u64, String> = tags
                        .into_iter()
                        .map(|t| (t.id, t.label.to_lowercase()))
                        .collect();
                    context.tags = media
                        .tags
                        .iter()
                        .filter_map(|id| labels.get(id).cloned())
                        .collect();
                }
                Err(e) => tracing::error!(service = %self.service, error = %e, "failed to get tags"),
            }
        }

        context
    }

    /// Fetch an item by id and resolve its context, degrading to defaults.
    pub async fn media_context(&self, id: u64) -> MediaContext {
        match self.media(id).await {
            Ok(media) => self.context_for(&media).await,
            Err(e) => {
                tracing::warn!(service = %self.service, id, error = %e, "failed to get media");
                MediaContext::default()
            }
        }
    }
}
