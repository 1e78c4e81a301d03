use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use schoolbase_core::PlanTier;
use schoolbase_reconcile::Target;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "schoolbase")]
#[command(about = "Schoolbase admin CLI: one-shot, verified repairs of store records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store project URL (overrides config and SCHOOLBASE_URL env var)
    #[arg(short, long, global = true, env = "SCHOOLBASE_URL")]
    pub url: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "SCHOOLBASE_PROFILE", default_value = "default")]
    pub profile: String,

    /// Privileged service key (overrides stored credentials)
    #[arg(long, global = true, env = "SCHOOLBASE_SERVICE_KEY", hide_env_values = true)]
    pub service_key: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Fetch and plan, but write nothing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log filter, e.g. "debug" or "schoolbase_reconcile=trace" (RUST_LOG wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn log_level(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Status lines and pretty JSON
    #[default]
    Human,
    /// One JSON document
    Json,
    /// Line-oriented key=value
    Kv,
    /// Field/value table
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a service key for the profile
    Login(LoginArgs),
    /// Remove stored credentials
    Logout,
    /// Show which store and key the profile uses
    Whoami,
    /// Manage CLI configuration
    Config(ConfigArgs),
    /// Inspect the remote procedures this tool calls
    Procedures(ProceduresArgs),
    /// Print one record
    Show(ShowArgs),
    /// Set literal column values on one record
    Patch(PatchArgs),
    /// Start a paid trial on one profile
    StartTrial(StartTrialArgs),
    /// Move one profile to a subscription tier
    SetTier(SetTierArgs),
    /// Split a full name into first_name and last_name
    BackfillName(BackfillNameArgs),
    /// Delete known duplicates of a canonical record
    Dedupe(DedupeArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Read the service key from stdin instead of --service-key
    #[arg(long)]
    pub stdin: bool,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (url, format, schema)
    pub key: String,
    /// Value
    pub value: String,
}

#[derive(clap::Args)]
pub struct ProceduresArgs {
    #[command(subcommand)]
    pub command: ProcedureCommands,
}

#[derive(Subcommand)]
pub enum ProcedureCommands {
    /// List procedure names and arguments
    List,
    /// Print the SQL that installs every procedure
    Sql,
}

/// Exactly one of --id or --email.
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Record id
    #[arg(long)]
    pub id: Option<String>,
    /// Record email
    #[arg(long)]
    pub email: Option<String>,
}

impl TargetArgs {
    pub fn target(&self) -> anyhow::Result<Target> {
        match (&self.id, &self.email) {
            (Some(id), _) => Ok(Target::Id(id.clone())),
            (None, Some(email)) => Ok(Target::Email(email.clone())),
            (None, None) => anyhow::bail!("one of --id or --email is required"),
        }
    }
}

#[derive(clap::Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Table to read
    #[arg(long, default_value = "profiles")]
    pub table: String,
}

#[derive(clap::Args)]
pub struct PatchArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Table holding the record
    #[arg(long, default_value = "profiles")]
    pub table: String,
    /// Column assignment, e.g. --set last_name=Doe --set is_trial=false
    #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
    pub assignments: Vec<String>,
}

#[derive(clap::Args)]
pub struct StartTrialArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Tier the trial grants
    #[arg(long, default_value = "premium")]
    pub tier: PlanTier,
    /// Trial length in days
    #[arg(long, default_value_t = 7)]
    pub days: i64,
}

#[derive(clap::Args)]
pub struct SetTierArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// New subscription tier
    #[arg(long)]
    pub tier: PlanTier,
    /// Activation reason stored on the assignment
    #[arg(long)]
    pub reason: String,
    /// RFC 3339 expiry of the assignment
    #[arg(long, value_parser = parse_timestamp)]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(clap::Args)]
pub struct BackfillNameArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Table holding the record (profiles or students)
    #[arg(long, default_value = "profiles")]
    pub table: String,
    /// Full name to split
    #[arg(long, group = "source")]
    pub name: Option<String>,
    /// Column of the record holding the full name
    #[arg(long, group = "source")]
    pub from_column: Option<String>,
    /// Registration id in the source store
    #[arg(long, group = "source", requires = "source_profile")]
    pub from_registration: Option<String>,
    /// Profile of the origin store holding registrations
    #[arg(long)]
    pub source_profile: Option<String>,
    /// Replace names that are already set
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(clap::Args)]
pub struct DedupeArgs {
    /// Table holding the records
    #[arg(long)]
    pub table: String,
    /// Id of the record to keep
    #[arg(long)]
    pub keep: String,
    /// Ids of the duplicates to delete
    #[arg(required = true)]
    pub ids: Vec<String>,
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_target_group_requires_one() {
        assert!(Cli::try_parse_from(["schoolbase", "show"]).is_err());
        assert!(
            Cli::try_parse_from(["schoolbase", "show", "--id", "u1", "--email", "a@b.c"]).is_err()
        );
        let cli = Cli::try_parse_from(["schoolbase", "show", "--email", "a@b.c"]).unwrap();
        let Commands::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.target.target().unwrap(), Target::Email("a@b.c".into()));
    }

    #[test]
    fn test_start_trial_defaults() {
        let cli = Cli::try_parse_from(["schoolbase", "start-trial", "--id", "u1"]).unwrap();
        let Commands::StartTrial(args) = cli.command else {
            panic!("expected start-trial");
        };
        assert_eq!(args.tier, PlanTier::Premium);
        assert_eq!(args.days, 7);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "schoolbase",
            "set-tier",
            "--email",
            "jane@example.com",
            "--tier",
            "parent-plus",
            "--reason",
            "contract",
            "--expires-at",
            "2027-01-01T00:00:00Z",
            "--dry-run",
            "-vv",
            "--format",
            "kv",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.log_level(), "debug");
        assert_eq!(cli.format, Some(OutputFormat::Kv));
        let Commands::SetTier(args) = cli.command else {
            panic!("expected set-tier");
        };
        assert_eq!(args.tier, PlanTier::ParentPlus);
        assert!(args.expires_at.is_some());
    }

    #[test]
    fn test_backfill_sources_are_exclusive() {
        assert!(
            Cli::try_parse_from([
                "schoolbase",
                "backfill-name",
                "--id",
                "u1",
                "--name",
                "Jane Doe",
                "--from-column",
                "full_name",
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "schoolbase",
                "backfill-name",
                "--id",
                "u1",
                "--from-registration",
                "42",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_dedupe_requires_ids() {
        assert!(
            Cli::try_parse_from(["schoolbase", "dedupe", "--table", "students", "--keep", "s1"])
                .is_err()
        );
    }
}
