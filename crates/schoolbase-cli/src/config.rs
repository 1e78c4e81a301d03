use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub url: Option<String>,
    pub format: Option<String>,
    /// Database schema exposed by the gateway, when not the default one.
    pub schema: Option<String>,
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

/// Directory holding `config.toml` and the per-profile credential files.
#[derive(Debug, Clone)]
pub struct Home {
    dir: PathBuf,
}

impl Home {
    /// `$SCHOOLBASE_HOME`, else `~/.schoolbase`.
    pub fn locate() -> Result<Self> {
        let dir = match std::env::var_os("SCHOOLBASE_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .context("Cannot determine home directory")?
                .join(".schoolbase"),
        };
        Ok(Self::at(dir))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn ensure_dir(&self) -> Result<&Path> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        Ok(&self.dir)
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn load_all(&self) -> Result<ConfigFile> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(ConfigFile::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn load_profile(&self, profile: &str) -> Result<ProfileConfig> {
        Ok(self.load_all()?.remove(profile).unwrap_or_default())
    }

    pub fn save_profile(&self, profile: &str, config: &ProfileConfig) -> Result<()> {
        let mut all = self.load_all()?;
        all.insert(profile.to_string(), config.clone());
        let content = toml::to_string_pretty(&all)?;
        self.ensure_dir()?;
        fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Store URL for `profile`.
    pub fn resolve_url(&self, cli_url: Option<&str>, profile: &str) -> Result<String> {
        // 1. --url flag / SCHOOLBASE_URL env
        if let Some(url) = cli_url {
            return Ok(url.to_string());
        }
        // 2. config.toml profile
        if let Some(url) = self.load_profile(profile)?.url {
            return Ok(url);
        }
        // 3. Stored credentials for this profile
        if let Ok(Some(creds)) = auth::load_credentials(self, profile) {
            return Ok(creds.url);
        }
        anyhow::bail!(
            "No store URL configured for profile \"{profile}\". Use --url, set SCHOOLBASE_URL, or run: schoolbase config set url <url>"
        )
    }
}

/// Applies `key = value` to a profile config.
pub fn set_key(config: &mut ProfileConfig, key: &str, value: &str) -> Result<()> {
    let value = Some(value.to_string());
    match key {
        "url" => config.url = value,
        "format" => config.format = value,
        "schema" => config.schema = value,
        other => anyhow::bail!("Unknown config key: {other}. Valid keys: url, format, schema"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_empty() {
        let dir = TempDir::new().unwrap();
        let home = Home::at(dir.path().join("nested"));
        assert!(home.load_all().unwrap().is_empty());
        assert_eq!(home.load_profile("default").unwrap(), ProfileConfig::default());
    }

    #[test]
    fn test_profiles_round_trip_through_toml() {
        let dir = TempDir::new().unwrap();
        let home = Home::at(dir.path());
        let mut staging = ProfileConfig::default();
        set_key(&mut staging, "url", "https://staging.example.co").unwrap();
        set_key(&mut staging, "format", "json").unwrap();
        home.save_profile("staging", &staging).unwrap();
        home.save_profile("default", &ProfileConfig::default()).unwrap();

        let all = home.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["staging"].url.as_deref(), Some("https://staging.example.co"));
        assert_eq!(all["staging"].format.as_deref(), Some("json"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut config = ProfileConfig::default();
        let err = set_key(&mut config, "server", "x").unwrap_err();
        assert!(err.to_string().contains("Valid keys"));
    }

    #[test]
    fn test_resolve_url_order() {
        let dir = TempDir::new().unwrap();
        let home = Home::at(dir.path());
        assert!(home.resolve_url(None, "default").is_err());

        auth::save_credentials(
            &home,
            "default",
            &auth::StoredCredentials {
                url: "https://from-credentials.example.co".into(),
                service_key: "k".repeat(40),
            },
        )
        .unwrap();
        assert_eq!(
            home.resolve_url(None, "default").unwrap(),
            "https://from-credentials.example.co"
        );

        let mut cfg = ProfileConfig::default();
        set_key(&mut cfg, "url", "https://from-config.example.co").unwrap();
        home.save_profile("default", &cfg).unwrap();
        assert_eq!(
            home.resolve_url(None, "default").unwrap(),
            "https://from-config.example.co"
        );
        assert_eq!(
            home.resolve_url(Some("https://flag.example.co"), "default").unwrap(),
            "https://flag.example.co"
        );
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[default\nurl = 1").unwrap();
        let err = Home::at(dir.path()).load_all().unwrap_err();
        assert!(format!("{err:#}").contains("Invalid config file"));
    }
}
