use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PickerError;

/// The media manager issuing the override webhook.
///
/// Both pipelines are identical apart from the REST endpoints and payload
/// keys selected here.
///
/// # Examples
///
/// ```
/// use picker_core::Service;
///
/// let s: Service = "Sonarr".parse().unwrap();
/// assert_eq!(s, Service::Sonarr);
/// assert_eq!(s.to_string(), "sonarr");
/// assert_eq!(s.media_key(), "series");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Movies.
    Radarr,
    /// Series, seasons, and episodes.
    Sonarr,
}

impl Service {
    /// Every supported service, in a stable order.
    pub const ALL: [Service; 2] = [Service::Radarr, Service::Sonarr];

    /// Directory and URL segment name.
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Radarr => "radarr",
            Service::Sonarr => "sonarr",
        }
    }

    /// Capitalized product name for log lines and messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Service::Radarr => "Radarr",
            Service::Sonarr => "Sonarr",
        }
    }

    /// Key of the media object in webhook payloads and simulate responses.
    pub fn media_key(self) -> &'static str {
        match self {
            Service::Radarr => "movie",
            Service::Sonarr => "series",
        }
    }

    /// REST endpoint (below `/api/v3/`) for a single media item.
    pub fn media_endpoint(self, id: u64) -> String {
        format!("{}/{id}", self.media_key())
    }

    /// REST endpoint (below `/api/v3/`) for an interactive release search.
    pub fn release_endpoint(self, id: u64) -> String {
        match self {
            Service::Radarr => format!("release?movieId={id}"),
            Service::Sonarr => format!("release?seriesId={id}"),
        }
    }

    /// ntfy emoji tag for override notifications.
    pub fn notification_tag(self) -> &'static str {
        match self {
            Service::Radarr => "movie_camera",
            Service::Sonarr => "tv",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = PickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "radarr" => Ok(Service::Radarr),
            "sonarr" => Ok(Service::Sonarr),
            other => Err(PickerError::InvalidRequest(format!(
                "unknown service '{other}', expected radarr or sonarr"
            ))),
        }
    }
}

/// One downloadable release offered by the arr.
///
/// Field names follow the override webhook payload. Identity is `guid`;
/// position in the request defines the 1-based index shown to the LLM.
///
/// # Examples
///
/// ```
/// use picker_core::ReleaseCandidate;
///
/// let json = r#"{"guid":"abc","title":"Movie.2024.1080p","size":4294967296,"seeders":12}"#;
/// let c: ReleaseCandidate = serde_json::from_str(json).unwrap();
/// assert_eq!(c.size, 4_294_967_296);
/// assert_eq!(c.seeders, Some(12));
/// assert!(c.languages.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseCandidate {
    /// Unique identifier within a request.
    pub guid: String,
    /// Release name as published by the indexer.
    pub title: String,
    /// Size in bytes.
    pub size: u64,
    /// Seeder count. Absent for usenet.
    pub seeders: Option<u32>,
    /// Quality label, e.g. `Bluray-1080p`.
    pub quality: String,
    /// Audio languages.
    pub languages: Vec<String>,
    /// Matched custom format names.
    pub custom_formats: Vec<String>,
    /// Indexer the release came from.
    pub indexer: String,
    /// Sum of the matched custom format scores.
    pub custom_format_score: i64,
    /// Minutes since publication.
    pub age_minutes: f64,
    /// Indexer flags such as `freeleech`.
    pub indexer_flags: Vec<String>,
    /// Whether this is the arr's own pick.
    pub is_selected: bool,
}

/// A validated request for one release decision.
///
/// Construct through [`OverrideRequest::new`], which enforces that there is
/// at least one candidate and that every guid is present and unique.
///
/// # Examples
///
/// ```
/// use picker_core::{OverrideRequest, ReleaseCandidate, Service};
/// use std::collections::BTreeSet;
///
/// let candidates = vec![ReleaseCandidate { guid: "a".into(), ..Default::default() }];
/// let req = OverrideRequest::new(
///     Service::Radarr,
///     "Dune",
///     "HD-1080p",
///     BTreeSet::new(),
///     candidates,
/// )
/// .unwrap();
/// assert_eq!(req.candidates().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRequest {
    service: Service,
    media_title: String,
    profile_name: String,
    tags: BTreeSet<String>,
    candidates: Vec<ReleaseCandidate>,
}

impl OverrideRequest {
    /// Validate and build a request. Tags are lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::InvalidRequest`] if `candidates` is empty, or a
    /// guid is empty or repeated.
    pub fn new(
        service: Service,
        media_title: impl Into<String>,
        profile_name: impl Into<String>,
        tags: BTreeSet<String>,
        candidates: Vec<ReleaseCandidate>,
    ) -> Result<Self, PickerError> {
        if candidates.is_empty() {
            return Err(PickerError::InvalidRequest("no candidates".into()));
        }

        let mut seen = HashSet::with_capacity(candidates.len());
        for (i, c) in candidates.iter().enumerate() {
            if c.guid.is_empty() {
                return Err(PickerError::InvalidRequest(format!(
                    "candidate #{} has no guid",
                    i + 1
                )));
            }
            if !seen.insert(c.guid.as_str()) {
                return Err(PickerError::InvalidRequest(format!(
                    "duplicate guid '{}'",
                    c.guid
                )));
            }
        }

        Ok(Self {
            service,
            media_title: media_title.into(),
            profile_name: profile_name.into(),
            tags: tags.into_iter().map(|t| t.to_lowercase()).collect(),
            candidates,
        })
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn media_title(&self) -> &str {
        &self.media_title
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Lowercased tag labels of the media item.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Candidates in the order the arr sent them. Never empty.
    pub fn candidates(&self) -> &[ReleaseCandidate] {
        &self.candidates
    }

    /// Candidate at a 1-based display index.
    pub fn candidate_at(&self, index: usize) -> Option<&ReleaseCandidate> {
        index.checked_sub(1).and_then(|i| self.candidates.get(i))
    }

    /// The release the arr would grab on its own.
    ///
    /// The candidate flagged `isSelected`, or the first one when the
    /// payload flags none.
    pub fn default_pick(&self) -> &ReleaseCandidate {
        self.candidates
            .iter()
            .find(|c| c.is_selected)
            .unwrap_or(&self.candidates[0])
    }
}

/// Why a request was left to the arr's own ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassThroughCause {
    /// No (usable) prompt for the service/profile pair.
    NoPrompt,
    /// The media carries the skip tag.
    SkipTag,
    /// Timeout or transport error talking to the LLM.
    LlmFailure,
    /// The LLM answered with something unusable.
    InvalidResponse,
    /// A choice was made but dry-run mode suppressed it.
    DryRun,
}

impl fmt::Display for PassThroughCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassThroughCause::NoPrompt => "no-prompt",
            PassThroughCause::SkipTag => "skip-tag",
            PassThroughCause::LlmFailure => "llm-failure",
            PassThroughCause::InvalidResponse => "invalid-response",
            PassThroughCause::DryRun => "dry-run",
        };
        f.write_str(s)
    }
}

/// Outcome of one decision round-trip.
///
/// # Examples
///
/// ```
/// use picker_core::{Decision, PassThroughCause};
///
/// let d = Decision::PassThrough {
///     cause: PassThroughCause::SkipTag,
///     reason: "tag no-ai present".into(),
/// };
/// assert!(d.selected_guid().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Decision {
    /// Grab `guid` instead of the arr's pick.
    Override { guid: String, reason: String },
    /// Let the arr proceed with its own ranking.
    PassThrough {
        cause: PassThroughCause,
        reason: String,
    },
}

impl Decision {
    pub fn selected_guid(&self) -> Option<&str> {
        match self {
            Decision::Override { guid, .. } => Some(guid),
            Decision::PassThrough { .. } => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Override { reason, .. } | Decision::PassThrough { reason, .. } => reason,
        }
    }
}

/// Kind of user-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Override,
    Failure,
}

/// An alert emitted by the decision engine for the notifier.
///
/// Never produced when the LLM merely confirms the arr's own pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub service: Service,
    pub media_title: String,
    pub profile_name: String,
    /// Chosen release (override) or absent (failure).
    pub release: Option<ReleaseSummary>,
    /// LLM reason or failure description.
    pub reason: String,
}

/// The parts of a release worth showing in a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub title: String,
    pub size: u64,
}

impl From<&ReleaseCandidate> for ReleaseSummary {
    fn from(c: &ReleaseCandidate) -> Self {
        Self {
            title: c.title.clone(),
            size: c.size,
        }
    }
}
