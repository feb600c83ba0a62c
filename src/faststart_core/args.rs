use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

use crate::faststart_core::dispatcher::MigrationConfig;
use crate::faststart_core::processor::ModeFlags;
use crate::faststart_core::tools::ExternalTools;

const OPERATOR_NOTES: &str = "\
If the process dies while a same-location store is in flight, the remote \
parent may be left with a `__`-prefixed origin and possibly its uploaded \
replacement. Reconcile that folder manually before the next run.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Drive,
    Local,
}

#[derive(Debug, Parser)]
#[command(
    name = "faststart",
    version,
    about = "Migrate a video library to progressive-streaming MP4",
    after_help = OPERATOR_NOTES
)]
#[command(group(
    ArgGroup::new("mode").args(["remux_only", "transcode_only", "cache_only"])
))]
pub struct CliArgs {
    /// Directory holding the migration cache and log file.
    #[arg(long, value_name = "PATH")]
    pub data_path: PathBuf,

    /// Parent directory for the scratch root; defaults to the system temp dir.
    #[arg(long, value_name = "PATH")]
    pub tmp_path: Option<PathBuf>,

    /// Number of jobs to run in parallel.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Where candidate files come from.
    #[arg(long, value_enum, default_value = "drive")]
    pub source: BackendKind,

    /// Where finished artifacts go.
    #[arg(long, value_enum, default_value = "drive")]
    pub sink: BackendKind,

    /// Output directory for the local sink.
    #[arg(long, value_name = "PATH", required_if_eq("sink", "local"))]
    pub output: Option<PathBuf>,

    /// Only remux items that already carry native codecs.
    #[arg(long)]
    pub remux_only: bool,

    /// Only transcode items that need a codec change.
    #[arg(long)]
    pub transcode_only: bool,

    /// Only record probe verdicts; never transcode or store.
    #[arg(long)]
    pub cache_only: bool,

    /// Roots to walk for candidate videos.
    #[arg(value_name = "ROOT_PATH", required = true)]
    pub root_path: Vec<PathBuf>,
}

impl CliArgs {
    pub fn into_config(self) -> MigrationConfig {
        let roots = match self.source {
            // Local roots are pinned down before the walk; a missing root
            // stays as given and walks to nothing.
            BackendKind::Local => self
                .root_path
                .iter()
                .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
                .collect(),
            BackendKind::Drive => self.root_path,
        };
        MigrationConfig {
            data_path: self.data_path,
            roots,
            jobs: self.jobs.max(1),
            source: self.source,
            sink: self.sink,
            output_path: self.output,
            tmp_path: self.tmp_path,
            modes: ModeFlags {
                remux_only: self.remux_only,
                transcode_only: self.transcode_only,
                cache_only: self.cache_only,
            },
            tools: ExternalTools::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(args)
    }

    #[test]
    fn minimal_invocation_uses_drive_defaults() {
        let args = parse(&["faststart", "--data-path", "/tmp/data", "/videos"])
            .expect("minimal args parse");
        assert_eq!(args.jobs, 1);
        assert_eq!(args.source, BackendKind::Drive);
        assert_eq!(args.sink, BackendKind::Drive);
        assert!(args.output.is_none());
        assert!(!args.remux_only && !args.transcode_only && !args.cache_only);
        assert_eq!(args.root_path.len(), 1);
    }

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        let err = parse(&[
            "faststart",
            "--data-path",
            "/tmp/data",
            "--remux-only",
            "--cache-only",
            "/videos",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn local_sink_requires_an_output_directory() {
        let err = parse(&[
            "faststart",
            "--data-path",
            "/tmp/data",
            "--sink",
            "local",
            "/videos",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        parse(&[
            "faststart",
            "--data-path",
            "/tmp/data",
            "--sink",
            "local",
            "--output",
            "/tmp/out",
            "/videos",
        ])
        .expect("local sink with output parses");
    }

    #[test]
    fn at_least_one_root_is_required() {
        let err = parse(&["faststart", "--data-path", "/tmp/data"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn short_jobs_flag_is_accepted() {
        let args = parse(&["faststart", "--data-path", "/tmp/data", "-j", "4", "/videos"])
            .expect("jobs flag parses");
        assert_eq!(args.jobs, 4);
    }

    #[test]
    fn zero_jobs_is_clamped_to_one() {
        let args = parse(&["faststart", "--data-path", "/tmp/data", "-j", "0", "/videos"])
            .expect("jobs flag parses");
        let config = args.into_config();
        assert_eq!(config.jobs, 1);
    }
}
