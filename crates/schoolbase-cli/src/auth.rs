use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use schoolbase_db_rest::ServiceKey;
use serde::{Deserialize, Serialize};

use crate::config::Home;

/// Service key saved by `schoolbase login`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub url: String,
    pub service_key: String,
}

fn creds_path(home: &Home, profile: &str) -> PathBuf {
    home.dir().join(format!("credentials.{profile}.json"))
}

pub fn load_credentials(home: &Home, profile: &str) -> Result<Option<StoredCredentials>> {
    let path = creds_path(home, profile);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let creds = serde_json::from_str(&content)
        .with_context(|| format!("Invalid credentials file {}", path.display()))?;
    Ok(Some(creds))
}

/// Writes the credentials file, readable only by the owner on unix.
pub fn save_credentials(home: &Home, profile: &str, creds: &StoredCredentials) -> Result<()> {
    home.ensure_dir()?;
    let path = creds_path(home, profile);
    let content = serde_json::to_string_pretty(creds)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        if path.exists() {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn remove_credentials(home: &Home, profile: &str) -> Result<bool> {
    let path = creds_path(home, profile);
    if path.exists() {
        fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Service key from the flag/environment, else from the profile's credentials.
pub fn resolve_service_key(home: &Home, cli_key: Option<&str>, profile: &str) -> Result<ServiceKey> {
    if let Some(key) = cli_key {
        return ServiceKey::new(key).context("Invalid --service-key / SCHOOLBASE_SERVICE_KEY");
    }
    match load_credentials(home, profile)? {
        Some(creds) => ServiceKey::new(creds.service_key)
            .with_context(|| format!("Stored credentials for profile \"{profile}\" are invalid")),
        None => anyhow::bail!(
            "No service key for profile \"{profile}\". Set SCHOOLBASE_SERVICE_KEY or run: schoolbase login"
        ),
    }
}
