mod auth;
mod cli;
mod client;
mod commands;
mod config;
mod logging;
mod output;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use schoolbase_reconcile::{ReconcileError, RunFailure, RunMode};
use schoolbase_storage::TabularStore;

use cli::{Cli, Commands, ConfigCommands, OutputFormat, ProcedureCommands};
use config::Home;
use output::print_error;

/// Exit status for failures that are not a reconciliation error.
const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    logging::load_dotenv();
    let cli = Cli::parse();
    logging::init(&cli.log_level());

    if let Err(e) = run(cli).await {
        // Run failures already printed their report; the summary goes to stderr.
        print_error(&format!("{e:#}"));
        std::process::exit(exit_code(&e));
    }
}

/// Maps an error to the process exit status by its reconciliation kind.
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<RunFailure>()
                .map(|f| f.error.exit_code())
                .or_else(|| cause.downcast_ref::<ReconcileError>().map(ReconcileError::exit_code))
        })
        .unwrap_or(EXIT_FAILURE)
}

fn resolve_format(cli: &Cli, home: &Home) -> Result<OutputFormat> {
    if let Some(format) = cli.format {
        return Ok(format);
    }
    match home.load_profile(&cli.profile)?.format {
        Some(name) => OutputFormat::from_str(&name, true)
            .map_err(|e| anyhow::anyhow!("Invalid format \"{name}\" in config: {e}")),
        None => Ok(OutputFormat::default()),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let home = Home::locate()?;
    dispatch(&cli, &home).await
}

/// Only commands that print through a format read it from the profile, so a
/// broken `config.toml` leaves `logout` and `procedures sql` usable.
async fn dispatch(cli: &Cli, home: &Home) -> Result<()> {
    let profile = cli.profile.as_str();
    let url = cli.url.as_deref();
    let key = cli.service_key.as_deref();
    let format = || resolve_format(cli, home);
    let mode = if cli.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };

    match &cli.command {
        Commands::Login(args) => {
            let url = home.resolve_url(url, profile)?;
            commands::auth::login(home, &url, key, args, profile)?;
        }
        Commands::Logout => {
            commands::auth::logout(home, profile)?;
        }
        Commands::Whoami => {
            commands::auth::whoami(home, url, key, profile)?;
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => {
                let cfg = home.load_profile(profile)?;
                println!("{}: {}", "Profile".cyan(), profile);
                println!("{}: {}", "Home".cyan(), home.dir().display());
                println!("{}: {}", "URL".cyan(), cfg.url.as_deref().unwrap_or("(not set)"));
                println!(
                    "{}: {}",
                    "Format".cyan(),
                    cfg.format.as_deref().unwrap_or("human")
                );
                println!(
                    "{}: {}",
                    "Schema".cyan(),
                    cfg.schema.as_deref().unwrap_or("(default)")
                );
            }
            ConfigCommands::Set(set_args) => {
                let mut cfg = home.load_profile(profile)?;
                config::set_key(&mut cfg, &set_args.key, &set_args.value)?;
                home.save_profile(profile, &cfg)?;
                output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
            }
        },
        Commands::Procedures(args) => match args.command {
            ProcedureCommands::List => commands::procedures::list(format()?)?,
            ProcedureCommands::Sql => commands::procedures::sql()?,
        },
        Commands::Show(args) => {
            let store = client::connect(home, url, key, profile)?;
            commands::reconcile::show(&store, args, format()?).await?;
        }
        Commands::Patch(args) => {
            let store = client::connect(home, url, key, profile)?;
            commands::reconcile::patch(&store, args, mode, format()?).await?;
        }
        Commands::StartTrial(args) => {
            let store = client::connect(home, url, key, profile)?;
            commands::reconcile::start_trial(&store, args, mode, format()?).await?;
        }
        Commands::SetTier(args) => {
            let store = client::connect(home, url, key, profile)?;
            commands::reconcile::set_tier(&store, args, mode, format()?).await?;
        }
        Commands::BackfillName(args) => {
            let store = client::connect(home, url, key, profile)?;
            // Origin store settings come from its own profile only.
            let source = match &args.source_profile {
                Some(source_profile) => Some(client::connect(home, None, None, source_profile)?),
                None => None,
            };
            let source = source.as_ref().map(|s| s as &dyn TabularStore);
            commands::reconcile::backfill_name(&store, source, args, mode, format()?).await?;
        }
        Commands::Dedupe(args) => {
            let store = client::connect(home, url, key, profile)?;
            commands::reconcile::dedupe(&store, args, mode, format()?).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolbase_reconcile::RunReport;

    #[test]
    fn test_exit_code_follows_error_kind() {
        let err = anyhow::Error::from(ReconcileError::not_found("profiles", "id=eq.u1"));
        assert_eq!(exit_code(&err), 3);

        let err = anyhow::Error::from(ReconcileError::validation("bad"))
            .context("while planning");
        assert_eq!(exit_code(&err), 6);

        let failure = RunFailure {
            task: "dedupe".into(),
            report: Box::new(RunReport::new("dedupe", "students", "id=eq.s1")),
            error: ReconcileError::ambiguous("students", "email=eq.x", 2),
        };
        assert_eq!(exit_code(&anyhow::Error::from(failure)), 4);

        assert_eq!(exit_code(&anyhow::anyhow!("no config")), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_broken_config_only_blocks_commands_that_read_it() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[default\nurl = 1").unwrap();
        let home = Home::at(dir.path());

        for args in [
            ["schoolbase", "procedures", "sql"].as_slice(),
            ["schoolbase", "logout"].as_slice(),
            ["schoolbase", "--format", "json", "procedures", "list"].as_slice(),
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            dispatch(&cli, &home).await.unwrap();
        }

        let cli = Cli::try_parse_from(["schoolbase", "procedures", "list"]).unwrap();
        let err = dispatch(&cli, &home).await.unwrap_err();
        assert!(format!("{err:#}").contains("Invalid config file"), "{err:#}");
    }
}
