//! CLI command definitions and handlers

mod analyze;
mod init;
mod kb;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > crate::config::MAX_WORKERS {
        Err(format!("workers cannot exceed {}", crate::config::MAX_WORKERS))
    } else {
        Ok(n)
    }
}

/// asymptote - asymptotic complexity of pseudocode procedures
#[derive(Parser, Debug)]
#[command(name = "asymptote")]
#[command(
    version,
    about = "Infer O, Ω and Θ bounds for procedures written in Pascal-like pseudocode",
    long_about = "asymptote composes loop, conditional and recurrence rules to bound \
the running time of every procedure in a pseudocode program. Structures the rules \
cannot classify are sent to an LLM oracle, and every verdict is remembered in a \
local knowledge base so it is never derived twice.",
    after_help = "\
Examples:
  asymptote analyze sort.psc                Analyze one file
  asymptote analyze algos/ --format json    JSON output for scripting
  asymptote analyze algos/ --no-oracle      Formal rules only, no network
  asymptote analyze sort.psc --trace        Show how each bound was derived
  asymptote kb stats                        Knowledge base summary
  asymptote init                            Write an example asymptote.toml"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of files analyzed in parallel (1-64, default from config)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Knowledge base location (default from config)
    #[arg(long, global = true, env = "ASYMPTOTE_KB_PATH")]
    pub kb: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze pseudocode files or directories
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output format: text or json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Write the report to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Never contact the oracle; unclassifiable structures stay unknown
        #[arg(long)]
        no_oracle: bool,

        /// Print the derivation trace under each verdict
        #[arg(long)]
        trace: bool,

        /// Exit with code 1 when any verdict is unknown (CI mode)
        #[arg(long)]
        fail_on_unknown: bool,
    },

    /// Inspect or clear the knowledge base
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Write an example asymptote.toml into a directory
    Init {
        /// Target directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Overwrite an existing asymptote.toml
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum KbAction {
    /// Record counts by provenance
    Stats,

    /// List stored verdicts
    List {
        /// Show at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete every stored verdict
    Clear,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            paths,
            format,
            output,
            no_oracle,
            trace,
            fail_on_unknown,
        } => analyze::run(analyze::AnalyzeArgs {
            paths,
            format: format.parse()?,
            output,
            no_oracle,
            trace,
            fail_on_unknown,
            workers: cli.workers,
            kb: cli.kb,
        }),
        Commands::Kb { action } => kb::run(action, cli.kb),
        Commands::Init { dir, force } => init::run(&dir, force),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("8"), Ok(8));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("lots").is_err());
    }

    #[test]
    fn test_analyze_arguments() {
        let cli = Cli::try_parse_from([
            "asymptote",
            "analyze",
            "a.psc",
            "dir",
            "--format",
            "json",
            "--no-oracle",
            "--workers",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(2));
        assert_eq!(cli.log_level, "warn");
        match cli.command {
            Commands::Analyze { paths, format, no_oracle, trace, .. } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(format, "json");
                assert!(no_oracle);
                assert!(!trace);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kb_subcommands() {
        let cli = Cli::try_parse_from(["asymptote", "kb", "list", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Kb { action: KbAction::List { limit: Some(5) } }));
        assert!(Cli::try_parse_from(["asymptote", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["asymptote", "analyze", "x", "--format", "sarif"]).is_err());
    }
}
