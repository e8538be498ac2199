use std::path::PathBuf;
use std::time::Duration;

const URL_KEYS: [&str; 2] = ["SUPABASE_URL", "VITE_SUPABASE_URL"];
const KEY_KEYS: [&str; 2] = ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"];
const MIRROR_DIR_KEY: &str = "DIGIMAGANG_MIRROR_DIR";

/// Remote data store endpoint configuration
///
/// Both the project URL and the anonymous access key are required; without
/// them no gateway is ever built and every store serves its defaults.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Anonymous (public) API key
    pub anon_key: String,

    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,

    /// Interval of the polling change feed
    pub poll_interval: Duration,
}

impl RemoteConfig {
    /// Create a new remote configuration
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set change feed polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reads the configuration from process environment.
    ///
    /// Returns `None` when the URL or the key is absent or blank.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RemoteConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = first_present(&lookup, &URL_KEYS)?;
        let key = first_present(&lookup, &KEY_KEYS)?;
        Some(Self::new(&url, &key))
    }

    /// Base URL of the table REST endpoint
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    /// Base URL of the auth endpoint
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.url)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err("url must start with http:// or https://".to_string());
        }

        if self.anon_key.trim().is_empty() {
            return Err("anon_key cannot be empty".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }

        Ok(())
    }
}

fn first_present<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Configuration of the whole content site
#[derive(Debug, Clone, Default)]
pub struct SiteConfig {
    /// Remote store; `None` runs every store on defaults only
    pub remote: Option<RemoteConfig>,

    /// Directory of the local mirror cache; `None` keeps it in memory
    pub mirror_dir: Option<PathBuf>,
}

impl SiteConfig {
    pub fn new(remote: Option<RemoteConfig>) -> Self {
        Self {
            remote,
            mirror_dir: None,
        }
    }

    /// Set mirror cache directory
    pub fn mirror_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mirror_dir = Some(dir.into());
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mirror_dir = lookup(MIRROR_DIR_KEY)
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Self {
            remote: RemoteConfig::from_lookup(&lookup),
            mirror_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_pattern() {
        let config = RemoteConfig::new("https://demo.supabase.co/", "anon")
            .poll_interval(Duration::from_millis(250))
            .request_timeout(Duration::from_secs(3));

        assert_eq!(config.url, "https://demo.supabase.co");
        assert_eq!(config.rest_url(), "https://demo.supabase.co/rest/v1");
        assert_eq!(config.auth_url(), "https://demo.supabase.co/auth/v1");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_key_means_unconfigured() {
        let lookup = env(&[("SUPABASE_URL", "https://demo.supabase.co")]);
        assert!(RemoteConfig::from_lookup(lookup).is_none());

        let blank = env(&[("SUPABASE_URL", "https://demo.supabase.co"), ("SUPABASE_ANON_KEY", "  ")]);
        assert!(RemoteConfig::from_lookup(blank).is_none());
    }

    #[test]
    fn test_vite_prefixed_names_are_accepted() {
        let lookup = env(&[
            ("VITE_SUPABASE_URL", "https://demo.supabase.co"),
            ("VITE_SUPABASE_ANON_KEY", "anon"),
        ]);
        let config = RemoteConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.anon_key, "anon");
    }

    #[test]
    fn test_site_config_reads_mirror_dir() {
        let lookup = env(&[("DIGIMAGANG_MIRROR_DIR", "/tmp/mirror")]);
        let config = SiteConfig::from_lookup(lookup);
        assert!(config.remote.is_none());
        assert_eq!(config.mirror_dir, Some(PathBuf::from("/tmp/mirror")));
    }

    #[test]
    fn test_validate() {
        assert!(RemoteConfig::new("https://demo.supabase.co", "anon").validate().is_ok());
        assert!(RemoteConfig::new("demo.supabase.co", "anon").validate().is_err());
        assert!(
            RemoteConfig::new("https://demo.supabase.co", "anon")
                .poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
