//! Thin CLI front-end (SPEC_FULL.md §4.10): argument grammar and exit-code
//! mapping over the core extraction library. This module parses flags and
//! builds an [`ExtractConfig`](crate::extract::ExtractConfig); it never
//! reads a single archive byte itself — that stays in [`crate::tar`] and
//! [`crate::container`].

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::extract::{ExtractConfig, ExtractOptions};
use crate::security::{SecurityPolicy, SymlinkPolicy};

/// Passed as the archive path to read the archive from stdin instead of a
/// file, mirroring the common `-` convention.
pub const STDIN_SENTINEL: &str = "-";

#[derive(Parser, Debug)]
#[command(name = "tarx", version, about = "Safety-gated tar/gzip/zlib archive extractor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract an archive into a destination directory.
    #[command(alias = "x")]
    Extract(ExtractArgs),
    /// List the entries of an archive without writing anything to disk.
    #[command(alias = "l", alias = "ls")]
    List(ListArgs),
    /// Validate an archive's integrity without writing anything to disk.
    #[command(alias = "t")]
    Test(TestArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Archive path, or "-" to read from stdin.
    pub archive: PathBuf,
    /// Destination directory; created if missing.
    pub destination: PathBuf,

    /// Replace existing destination files instead of failing.
    #[arg(long)]
    pub overwrite: bool,
    /// Apply the header's permission bits to materialised files.
    #[arg(long)]
    pub preserve_permissions: bool,
    /// Skip applying the header's modification time.
    #[arg(long)]
    pub no_preserve_timestamps: bool,
    /// Collect per-entry failures as warnings and keep going.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Allow entry paths that are absolute (leading `/` or drive letter).
    #[arg(long)]
    pub allow_absolute_paths: bool,
    /// Allow `..` components that would otherwise escape the destination root.
    #[arg(long)]
    pub allow_path_traversal: bool,
    /// How to treat symlink/hardlink entries.
    #[arg(long, value_enum, default_value_t = SymlinkPolicyArg::Disallow)]
    pub symlink_policy: SymlinkPolicyArg,
    /// Allow a symlink/hardlink target to resolve outside the destination root.
    #[arg(long)]
    pub allow_symlink_escape: bool,
    /// Allow an absolute symlink/hardlink target.
    #[arg(long)]
    pub allow_absolute_symlink: bool,

    /// Reject any single entry declaring a size above this many bytes.
    #[arg(long)]
    pub max_single_file_size: Option<u64>,
    /// Abort once total extracted bytes exceed this many bytes.
    #[arg(long)]
    pub max_total_size: Option<u64>,
    /// Abort once the written/compressed ratio exceeds this threshold.
    #[arg(long)]
    pub max_ratio: Option<f64>,
    /// Cap the decompressor's total plaintext output for framed archives.
    #[arg(long)]
    pub max_decompressed_size: Option<u64>,

    /// Increase log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Archive path, or "-" to read from stdin.
    pub archive: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct TestArgs {
    /// Archive path, or "-" to read from stdin.
    pub archive: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkPolicyArg {
    #[default]
    Disallow,
    AllowInsideRoot,
    AllowAny,
}

impl From<SymlinkPolicyArg> for SymlinkPolicy {
    fn from(value: SymlinkPolicyArg) -> Self {
        match value {
            SymlinkPolicyArg::Disallow => SymlinkPolicy::Disallow,
            SymlinkPolicyArg::AllowInsideRoot => SymlinkPolicy::AllowInsideRoot,
            SymlinkPolicyArg::AllowAny => SymlinkPolicy::AllowAny,
        }
    }
}

impl ExtractArgs {
    /// Builds an [`ExtractConfig`] from the parsed flags, applying defaults
    /// from [`SecurityPolicy::default`]/[`ExtractConfig::default`] for any
    /// ceiling the caller left unset.
    pub fn build_config(&self) -> ExtractConfig {
        let mut policy = SecurityPolicy {
            allow_absolute_paths: self.allow_absolute_paths,
            allow_path_traversal: self.allow_path_traversal,
            symlink_policy: self.symlink_policy.into(),
            allow_symlink_escape: self.allow_symlink_escape,
            allow_absolute_symlink: self.allow_absolute_symlink,
            ..SecurityPolicy::default()
        };
        if let Some(v) = self.max_single_file_size {
            policy.max_single_file_size = v;
        }
        if let Some(v) = self.max_total_size {
            policy.max_total_extracted_size = v;
        }
        if let Some(v) = self.max_ratio {
            policy.max_compression_ratio = v;
        }

        let options = ExtractOptions {
            overwrite: self.overwrite,
            preserve_permissions: self.preserve_permissions,
            preserve_timestamps: !self.no_preserve_timestamps,
            continue_on_error: self.continue_on_error,
        };

        let mut builder = ExtractConfig::builder().security_policy(policy).options(options);
        if let Some(v) = self.max_decompressed_size {
            builder = builder.max_decompressed_size(v);
        }
        builder.build()
    }
}

/// Maps a completed [`ExtractionResult`](crate::extract::ExtractionResult)
/// to the §6 exit-code contract. An `Ok` result can still carry a non-zero
/// code: `continue_on_error` turns per-entry failures into warnings rather
/// than a propagated [`ExtractError`](crate::error::ExtractError), so the
/// CLI still needs to report that something failed.
pub fn exit_code_for_result(result: &crate::extract::ExtractionResult) -> i32 {
    if result.aborted || result.failed > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_subcommand_parses_positional_args() {
        let cli = Cli::parse_from(["tarx", "extract", "a.tar", "out/"]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.archive, PathBuf::from("a.tar"));
                assert_eq!(args.destination, PathBuf::from("out/"));
                assert!(!args.overwrite);
            }
            other => panic!("expected Extract, got {other:?}"),
        }
    }

    #[test]
    fn extract_alias_x_is_accepted() {
        let cli = Cli::parse_from(["tarx", "x", "a.tar", "out/"]);
        assert!(matches!(cli.command, Command::Extract(_)));
    }

    #[test]
    fn list_aliases_are_accepted() {
        assert!(matches!(Cli::parse_from(["tarx", "list", "a.tar"]).command, Command::List(_)));
        assert!(matches!(Cli::parse_from(["tarx", "l", "a.tar"]).command, Command::List(_)));
        assert!(matches!(Cli::parse_from(["tarx", "ls", "a.tar"]).command, Command::List(_)));
    }

    #[test]
    fn test_alias_t_is_accepted() {
        assert!(matches!(Cli::parse_from(["tarx", "t", "a.tar"]).command, Command::Test(_)));
    }

    #[test]
    fn build_config_applies_overrides() {
        let cli = Cli::parse_from([
            "tarx",
            "extract",
            "a.tar",
            "out/",
            "--allow-absolute-paths",
            "--symlink-policy",
            "allow-any",
            "--max-total-size",
            "1000",
        ]);
        let Command::Extract(args) = cli.command else { panic!("expected Extract") };
        let config = args.build_config();
        assert!(config.security_policy.allow_absolute_paths);
        assert_eq!(config.security_policy.symlink_policy, SymlinkPolicy::AllowAny);
        assert_eq!(config.security_policy.max_total_extracted_size, 1000);
    }

    #[test]
    fn exit_code_reflects_failures_and_aborts() {
        let mut result = crate::extract::ExtractionResult::default();
        assert_eq!(exit_code_for_result(&result), 0);
        result.failed = 1;
        assert_eq!(exit_code_for_result(&result), 1);
        result.failed = 0;
        result.aborted = true;
        assert_eq!(exit_code_for_result(&result), 1);
    }
}
