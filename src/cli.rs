use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::ingest::{ImportOptions, IntegrityMode};
use crate::parser::IntegerPolicy;

#[derive(Parser, Debug)]
#[command(name = "dsv-to-sqlite")]
#[command(version, about = "Load delimited text files into SQLite and run reports over them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import all sources of a manifest and print its reports
    Run {
        /// Manifest JSON file
        manifest: PathBuf,

        /// SQLite database path (in-memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Delete the database file before importing
        #[arg(long)]
        fresh: bool,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Import all sources of a manifest into a database file
    Import {
        /// Manifest JSON file
        manifest: PathBuf,

        /// SQLite database path
        #[arg(long)]
        db: PathBuf,

        /// Delete the database file before importing
        #[arg(long)]
        fresh: bool,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Validate a manifest and list its entities in load order
    Check {
        /// Manifest JSON file
        manifest: PathBuf,
    },
}

/// Flags overriding the manifest import options
#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// Reject rows whose foreign keys have no parent record
    #[arg(long)]
    pub strict_integrity: bool,

    /// Skip rows with malformed integers instead of storing 0
    #[arg(long)]
    pub reject_malformed_integers: bool,
}

impl PolicyArgs {
    pub fn apply(&self, mut options: ImportOptions) -> ImportOptions {
        if self.strict_integrity {
            options.integrity = IntegrityMode::Strict;
        }
        if self.reject_malformed_integers {
            options.integer_policy = IntegerPolicy::Reject;
        }
        options
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "dsv-to-sqlite",
            "run",
            "jobs.json",
            "--db",
            "out.db",
            "--strict-integrity",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                manifest,
                db,
                fresh,
                policy,
            } => {
                assert_eq!(manifest, PathBuf::from("jobs.json"));
                assert_eq!(db, Some(PathBuf::from("out.db")));
                assert!(!fresh);
                let options = policy.apply(ImportOptions::default());
                assert_eq!(options.integrity, IntegrityMode::Strict);
                assert_eq!(options.integer_policy, IntegerPolicy::Zero);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_import_requires_db() {
        assert!(Cli::try_parse_from(["dsv-to-sqlite", "import", "jobs.json"]).is_err());
    }

    #[test]
    fn test_flags_keep_manifest_options() {
        let manifest_options = ImportOptions {
            integer_policy: IntegerPolicy::Reject,
            integrity: IntegrityMode::Permissive,
        };
        let options = PolicyArgs::default().apply(manifest_options);
        assert_eq!(options, manifest_options);
    }
}
