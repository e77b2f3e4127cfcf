use std::path::PathBuf;
use std::time::Duration;

use crate::error::PickerError;
use crate::types::Service;

/// Default hard deadline for one LLM decision.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 90;
/// Default skip tag.
pub const DEFAULT_SKIP_TAG: &str = "no-ai";
/// Default ntfy topic.
pub const DEFAULT_NTFY_TOPIC: &str = "arr-llm-release-picker";
/// Default prompt root.
pub const DEFAULT_PROMPTS_DIR: &str = "/config/prompts";
/// Default bound on concurrently handled requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Runtime configuration, read once from the environment at startup.
///
/// # Examples
///
/// ```
/// use picker_core::PickerConfig;
///
/// let config = PickerConfig::from_lookup(|key| match key {
///     "LLM_API_URL" => Some("http://localhost:11434/v1".into()),
///     "LLM_MODEL" => Some("qwen2.5".into()),
///     "RADARR_URL" => Some("http://radarr:7878/".into()),
///     "RADARR_API_KEY" => Some("secret".into()),
///     _ => None,
/// })
/// .unwrap();
/// assert_eq!(config.llm.timeout.as_secs(), 90);
/// assert_eq!(config.radarr.unwrap().url, "http://radarr:7878");
/// assert_eq!(config.skip_tag, "no-ai");
/// ```
#[derive(Debug, Clone)]
pub struct PickerConfig {
    /// LLM endpoint settings.
    pub llm: LlmConfig,
    /// Radarr connection, when configured.
    pub radarr: Option<ArrConfig>,
    /// Sonarr connection, when configured.
    pub sonarr: Option<ArrConfig>,
    /// Lowercased tag that disables AI selection for a media item.
    pub skip_tag: String,
    /// Decide but never override.
    pub dry_run: bool,
    /// ntfy notification settings.
    pub ntfy: NtfyConfig,
    /// Root of the `{service}/{profile}/system.txt` tree.
    pub prompts_dir: PathBuf,
    /// Upper bound on requests handled at once.
    pub max_concurrent_requests: usize,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` and `/models` are appended.
    pub api_url: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token. Optional for local servers.
    pub api_key: Option<String>,
    /// Hard wall-clock bound for one decision.
    pub timeout: Duration,
    /// Allow one extra attempt after a timeout or transport error.
    pub retry: bool,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Radarr or Sonarr REST connection.
#[derive(Clone)]
pub struct ArrConfig {
    /// Base URL without trailing slash.
    pub url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ArrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrConfig")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// ntfy publish target. Notifications are disabled without a URL.
#[derive(Debug, Clone)]
pub struct NtfyConfig {
    pub url: Option<String>,
    pub topic: String,
}

impl PickerConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] listing every missing or
    /// inconsistent option.
    pub fn from_env() -> Result<Self, PickerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Values are trimmed and empty values count as unset. Problems are
    /// collected so a single error names all of them.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] when `LLM_API_URL` or `LLM_MODEL` is
    /// missing, an arr URL/key pair is only half set, or no arr is
    /// configured at all.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PickerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut errors: Vec<String> = Vec::new();

        let llm_api_url = get("LLM_API_URL");
        let llm_model = get("LLM_MODEL");
        if llm_api_url.is_none() {
            errors.push("LLM_API_URL".into());
        }
        if llm_model.is_none() {
            errors.push("LLM_MODEL".into());
        }

        let radarr = arr_pair(&get, Service::Radarr, &mut errors);
        let sonarr = arr_pair(&get, Service::Sonarr, &mut errors);

        if radarr.is_none() && sonarr.is_none() && errors.is_empty() {
            errors.push("at least one of RADARR or SONARR must be configured".into());
        }

        if !errors.is_empty() {
            return Err(PickerError::Config(errors.join(", ")));
        }

        let timeout_secs = get("LLM_TIMEOUT")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);

        let max_concurrent_requests = get("MAX_CONCURRENT_REQUESTS")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS);

        Ok(Self {
            llm: LlmConfig {
                api_url: llm_api_url
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_default(),
                model: llm_model.unwrap_or_default(),
                api_key: get("LLM_API_KEY"),
                timeout: Duration::from_secs(timeout_secs),
                retry: get("LLM_RETRY").is_some_and(|v| is_truthy(&v)),
            },
            radarr,
            sonarr,
            skip_tag: get("SKIP_TAG")
                .unwrap_or_else(|| DEFAULT_SKIP_TAG.into())
                .to_lowercase(),
            dry_run: get("DRY_RUN").is_some_and(|v| is_truthy(&v)),
            ntfy: NtfyConfig {
                url: get("NTFY_URL"),
                topic: get("NTFY_TOPIC").unwrap_or_else(|| DEFAULT_NTFY_TOPIC.into()),
            },
            prompts_dir: get("PROMPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPTS_DIR)),
            max_concurrent_requests,
        })
    }

    /// Connection settings for `service`, if configured.
    pub fn arr(&self, service: Service) -> Option<&ArrConfig> {
        match service {
            Service::Radarr => self.radarr.as_ref(),
            Service::Sonarr => self.sonarr.as_ref(),
        }
    }

    /// Log the effective configuration without secrets.
    pub fn log_summary(&self) {
        for service in Service::ALL {
            match self.arr(service) {
                Some(arr) => tracing::info!(url = %arr.url, "{} configured", service.display_name()),
                None => tracing::info!("{} not configured", service.display_name()),
            }
        }
        let api_key = if self.llm.api_key.is_some() { "set" } else { "not set" };
        let notifications = if self.ntfy.url.is_some() { "enabled" } else { "disabled" };
        tracing::info!(
            api_url = %self.llm.api_url,
            model = %self.llm.model,
            api_key,
            timeout_secs = self.llm.timeout.as_secs(),
            retry = self.llm.retry,
            "LLM endpoint"
        );
        tracing::info!(
            prompts_dir = %self.prompts_dir.display(),
            skip_tag = %self.skip_tag,
            dry_run = self.dry_run,
            notifications,
            max_concurrent_requests = self.max_concurrent_requests,
            "decision settings"
        );
    }
}

fn arr_pair<G>(get: &G, service: Service, errors: &mut Vec<String>) -> Option<ArrConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let prefix = service.as_str().to_ascii_uppercase();
    let url = get(&format!("{prefix}_URL"));
    let api_key = get(&format!("{prefix}_API_KEY"));
    match (url, api_key) {
        (Some(url), Some(api_key)) => Some(ArrConfig {
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }),
        (None, None) => None,
        _ => {
            errors.push(format!(
                "{prefix}_URL and {prefix}_API_KEY (both required if using {})",
                service.display_name()
            ));
            None
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("LLM_API_URL", "http://llm:8000/v1"),
        ("LLM_MODEL", "gpt-4o-mini"),
        ("SONARR_URL", "http://sonarr:8989"),
        ("SONARR_API_KEY", "key"),
    ];

    #[test]
    fn minimal_config_uses_defaults() {
        let config = PickerConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(90));
        assert!(!config.llm.retry);
        assert!(config.llm.api_key.is_none());
        assert!(config.radarr.is_none());
        assert!(config.sonarr.is_some());
        assert_eq!(config.skip_tag, "no-ai");
        assert!(!config.dry_run);
        assert!(config.ntfy.url.is_none());
        assert_eq!(config.ntfy.topic, "arr-llm-release-picker");
        assert_eq!(config.prompts_dir, PathBuf::from("/config/prompts"));
        assert_eq!(config.max_concurrent_requests, 8);
    }

    #[test]
    fn missing_llm_settings_are_all_reported() {
        let err = PickerConfig::from_lookup(lookup(&[
            ("RADARR_URL", "http://radarr"),
            ("RADARR_API_KEY", "k"),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("LLM_API_URL"));
        assert!(msg.contains("LLM_MODEL"));
    }

    #[test]
    fn no_arr_is_an_error() {
        let err = PickerConfig::from_lookup(lookup(&[
            ("LLM_API_URL", "http://llm"),
            ("LLM_MODEL", "m"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("at least one of RADARR or SONARR"));
    }

    #[test]
    fn half_configured_arr_is_an_error() {
        let err = PickerConfig::from_lookup(lookup(&[
            ("LLM_API_URL", "http://llm"),
            ("LLM_MODEL", "m"),
            ("RADARR_URL", "http://radarr"),
            ("SONARR_URL", "http://sonarr"),
            ("SONARR_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RADARR_API_KEY"));
    }

    #[test]
    fn whitespace_only_counts_as_unset() {
        let err = PickerConfig::from_lookup(lookup(&[
            ("LLM_API_URL", "   "),
            ("LLM_MODEL", "m"),
            ("RADARR_URL", "http://radarr"),
            ("RADARR_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LLM_API_URL"));
    }

    #[test]
    fn optional_values_are_parsed() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend_from_slice(&[
            ("LLM_TIMEOUT", "25"),
            ("LLM_RETRY", "yes"),
            ("LLM_API_KEY", "sk-test"),
            ("DRY_RUN", "TRUE"),
            ("SKIP_TAG", "Manual-Pick"),
            ("NTFY_URL", "https://ntfy.sh"),
            ("NTFY_TOPIC", "media"),
            ("PROMPTS_DIR", "/srv/prompts"),
            ("MAX_CONCURRENT_REQUESTS", "2"),
        ]);
        let config = PickerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(25));
        assert!(config.llm.retry);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(config.dry_run);
        assert_eq!(config.skip_tag, "manual-pick");
        assert_eq!(config.ntfy.url.as_deref(), Some("https://ntfy.sh"));
        assert_eq!(config.ntfy.topic, "media");
        assert_eq!(config.prompts_dir, PathBuf::from("/srv/prompts"));
        assert_eq!(config.max_concurrent_requests, 2);
    }

    #[test]
    fn bad_timeout_falls_back_to_default() {
        for bad in ["ninety", "0", "-5"] {
            let mut pairs = MINIMAL.to_vec();
            pairs.push(("LLM_TIMEOUT", bad));
            let config = PickerConfig::from_lookup(lookup(&pairs)).unwrap();
            assert_eq!(config.llm.timeout, Duration::from_secs(90), "value {bad}");
        }
    }

    #[test]
    fn urls_lose_trailing_slash() {
        let config = PickerConfig::from_lookup(lookup(&[
            ("LLM_API_URL", "http://llm:8000/v1/"),
            ("LLM_MODEL", "m"),
            ("RADARR_URL", "http://radarr:7878/"),
            ("RADARR_API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(config.llm.api_url, "http://llm:8000/v1");
        assert_eq!(config.arr(Service::Radarr).unwrap().url, "http://radarr:7878");
        assert!(config.arr(Service::Sonarr).is_none());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("LLM_API_KEY", "sk-very-secret"));
        let config = PickerConfig::from_lookup(lookup(&pairs)).unwrap();
        let text = format!("{config:?}");
        assert!(!text.contains("sk-very-secret"));
        assert!(!text.contains("\"key\""));
    }
}
