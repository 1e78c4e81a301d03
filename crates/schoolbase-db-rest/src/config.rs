use std::fmt;
use std::time::Duration;

use url::Url;

/// Default path of the REST gateway below the project URL.
pub const DEFAULT_REST_PATH: &str = "/rest/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid store URL \"{url}\": {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Store URL must use http or https, got \"{0}\"")]
    UnsupportedScheme(String),

    #[error("Service key is empty")]
    EmptyServiceKey,
}

/// Opaque privileged credential for the store. Debug and Display never print it.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ConfigError::EmptyServiceKey);
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short preview for display: first and last few characters.
    pub fn preview(&self) -> String {
        let key = &self.0;
        if key.len() > 20 && key.is_ascii() {
            format!("{}...{}", &key[..8], &key[key.len() - 8..])
        } else {
            "********".to_string()
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceKey(<redacted>)")
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Connection settings for one store.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: Url,
    pub service_key: ServiceKey,
    pub rest_path: String,
    /// Schema sent as `Accept-Profile`/`Content-Profile`; `None` means the
    /// gateway default.
    pub schema: Option<String>,
    /// Per-request timeout; `None` leaves the HTTP client default (no limit).
    pub timeout: Option<Duration>,
}

impl RestConfig {
    pub fn new(base_url: &str, service_key: ServiceKey) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url.trim()).map_err(|source| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        Ok(Self {
            base_url: parsed,
            service_key,
            rest_path: DEFAULT_REST_PATH.to_string(),
            schema: None,
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_rest_path(mut self, path: impl Into<String>) -> Self {
        self.rest_path = path.into();
        self
    }

    /// `{base}{rest_path}/{segment}` with no duplicate slashes.
    pub fn endpoint(&self, segment: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        match self.rest_path.trim_matches('/') {
            "" => format!("{base}/{segment}"),
            path => format!("{base}/{path}/{segment}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ServiceKey {
        ServiceKey::new("service-role-key").unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let cfg = RestConfig::new("https://abc.example.co/", key()).unwrap();
        assert_eq!(cfg.endpoint("profiles"), "https://abc.example.co/rest/v1/profiles");
        assert_eq!(cfg.endpoint("rpc/start_trial"), "https://abc.example.co/rest/v1/rpc/start_trial");

        let cfg = cfg.with_rest_path("/");
        assert_eq!(cfg.endpoint("profiles"), "https://abc.example.co/profiles");
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            RestConfig::new("not a url", key()),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RestConfig::new("ftp://abc.example.co", key()),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_service_key_is_redacted() {
        let key = ServiceKey::new("eyJhbGciOiJIUzI1NiJ9.payload.signature").unwrap();
        assert_eq!(format!("{key:?}"), "ServiceKey(<redacted>)");
        assert_eq!(key.to_string(), "<redacted>");
        assert_eq!(key.preview(), "eyJhbGci...ignature");
        assert!(matches!(ServiceKey::new("  "), Err(ConfigError::EmptyServiceKey)));
    }
}
