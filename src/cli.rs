use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ccwm")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a Catalyst Center controller to a desired-state document", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile the controller against an invocation file
    Apply(RunArgs),

    /// Show what apply would change, without changing anything
    Plan(RunArgs),

    /// Check an invocation file against the resource schemas (no API calls)
    Validate {
        /// Invocation file (.json or .toml)
        file: PathBuf,

        /// Desired state, overriding the file
        #[arg(long, value_enum)]
        state: Option<StateArg>,
    },

    /// List resource kinds, or describe one
    Kinds {
        /// Kind to describe
        kind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Invocation file (.json or .toml)
    pub file: PathBuf,

    /// Desired state, overriding the file
    #[arg(long, value_enum)]
    pub state: Option<StateArg>,

    /// Re-read changed objects after applying and compare again
    #[arg(long)]
    pub verify: bool,

    /// Task deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds between task polls
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Controller connection overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Controller host
    #[arg(long, env = "DNAC_HOST")]
    pub host: Option<String>,

    /// Controller HTTPS port
    #[arg(long, env = "DNAC_PORT")]
    pub port: Option<u16>,

    /// Login user
    #[arg(long, env = "DNAC_USERNAME")]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "DNAC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Verify the controller's TLS certificate
    #[arg(long, env = "DNAC_VERIFY", conflicts_with = "insecure")]
    pub verify_tls: Option<bool>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    Merged,
    Deleted,
    Replaced,
}

impl From<StateArg> for declarative::State {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Merged => Self::Merged,
            StateArg::Deleted => Self::Deleted,
            StateArg::Replaced => Self::Replaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_overrides() {
        let cli = Cli::try_parse_from([
            "ccwm", "-vv", "apply", "site.toml", "--state", "replaced", "--verify", "--timeout",
            "60", "--insecure", "--host", "10.0.0.1", "-y",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.file, PathBuf::from("site.toml"));
        assert_eq!(args.state, Some(StateArg::Replaced));
        assert!(args.verify && args.yes && args.connection.insecure);
        assert_eq!(args.timeout, Some(60));
        assert_eq!(args.connection.host.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_insecure_conflicts_with_verify_tls() {
        let result = Cli::try_parse_from([
            "ccwm", "plan", "x.json", "--insecure", "--verify-tls", "true",
        ]);
        assert!(result.is_err());
    }
}
