use anyhow::{Context, Result};
use schoolbase_db_rest::{RestConfig, RestStore};

use crate::auth;
use crate::config::Home;

/// Builds a store client for `profile`. One client per run; nothing is pooled.
pub fn connect(
    home: &Home,
    cli_url: Option<&str>,
    cli_key: Option<&str>,
    profile: &str,
) -> Result<RestStore> {
    let url = home.resolve_url(cli_url, profile)?;
    let key = auth::resolve_service_key(home, cli_key, profile)?;
    let mut config = RestConfig::new(&url, key)
        .with_context(|| format!("Invalid store configuration for profile \"{profile}\""))?;
    if let Some(schema) = home.load_profile(profile)?.schema {
        config = config.with_schema(schema);
    }
    tracing::debug!(profile, url = %config.base_url, "connecting");
    RestStore::new(config).context("Failed to build HTTP client")
}
