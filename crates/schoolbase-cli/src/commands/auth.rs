use std::io::{self, Read};

use anyhow::{Context, Result};
use colored::Colorize;
use schoolbase_db_rest::ServiceKey;

use crate::auth::{self, StoredCredentials};
use crate::cli::LoginArgs;
use crate::config::Home;
use crate::output::{print_error, print_success};

pub fn login(
    home: &Home,
    url: &str,
    cli_key: Option<&str>,
    args: &LoginArgs,
    profile: &str,
) -> Result<()> {
    let key = if args.stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read service key from stdin")?;
        buf
    } else {
        cli_key
            .context("--service-key (or SCHOOLBASE_SERVICE_KEY, or --stdin) is required")?
            .to_string()
    };
    let key = ServiceKey::new(key)?;

    let creds = StoredCredentials {
        url: url.to_string(),
        service_key: key.expose().to_string(),
    };
    auth::save_credentials(home, profile, &creds)?;
    print_success(&format!(
        "Saved service key {} for {}",
        key.preview(),
        url.cyan()
    ));
    Ok(())
}

pub fn logout(home: &Home, profile: &str) -> Result<()> {
    if auth::remove_credentials(home, profile)? {
        print_success("Logged out (credentials removed)");
    } else {
        println!("No credentials found for profile \"{profile}\"");
    }
    Ok(())
}

pub fn whoami(home: &Home, cli_url: Option<&str>, cli_key: Option<&str>, profile: &str) -> Result<()> {
    println!("{}: {}", "Profile".cyan(), profile);
    match home.resolve_url(cli_url, profile) {
        Ok(url) => println!("{}: {}", "Store".cyan(), url.cyan()),
        Err(_) => println!("{}: (not set)", "Store".cyan()),
    }
    match auth::resolve_service_key(home, cli_key, profile) {
        Ok(key) => {
            let source = if cli_key.is_some() {
                "flag/environment"
            } else {
                "credentials file"
            };
            println!("{}: {} ({source})", "Service key".cyan(), key.preview());
        }
        Err(_) => print_error(&format!("No service key (profile: \"{profile}\")")),
    }
    Ok(())
}
