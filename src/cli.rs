use clap::Parser;
use std::path::PathBuf;

use crate::pdf::{CompressionLevel, ExecutionMode, PageFailurePolicy};
use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "pdfshrink")]
#[command(
    author,
    version,
    about = "Shrink PDFs by re-rendering every page as a JPEG image"
)]
pub struct Args {
    /// Input PDF file path
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output PDF file path (defaults to <name>_compressed_<N>%smaller.pdf next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compression level: low, medium, high or extreme
    #[arg(short, long)]
    pub level: Option<String>,

    /// Cap the render scale for a quicker run
    #[arg(long)]
    pub fast: bool,

    /// Run on the current thread instead of a background worker
    #[arg(long)]
    pub inline: bool,

    /// Fail the whole run when a single page cannot be rendered
    #[arg(long)]
    pub abort_on_page_error: bool,

    /// Print page count, settings and expected output size, then exit
    #[arg(long)]
    pub estimate: bool,

    /// Emit progress/done/error messages as JSON lines on stdout
    #[arg(long)]
    pub json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Settings from the config file with command line flags on top
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(level) = &self.level {
            settings.level = level.parse().unwrap_or_else(|e| {
                let fallback = CompressionLevel::default();
                log::warn!("{e}, using {fallback}");
                fallback
            });
        }
        if self.fast {
            settings.fast_mode = true;
        }
        if self.inline {
            settings.execution = ExecutionMode::Inline;
        }
        if self.abort_on_page_error {
            settings.page_failure = PageFailurePolicy::Abort;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::try_parse_from([
            "pdfshrink",
            "scan.pdf",
            "-l",
            "extreme",
            "--fast",
            "--inline",
            "--abort-on-page-error",
        ])
        .unwrap();
        let settings = args.apply(Settings::default());
        assert_eq!(settings.level, CompressionLevel::Extreme);
        assert!(settings.fast_mode);
        assert_eq!(settings.execution, ExecutionMode::Inline);
        assert_eq!(settings.page_failure, PageFailurePolicy::Abort);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let args = Args::try_parse_from(["pdfshrink", "scan.pdf"]).unwrap();
        let from_file = Settings {
            level: CompressionLevel::Low,
            fast_mode: true,
            ..Settings::default()
        };
        assert_eq!(args.apply(from_file.clone()), from_file);
    }

    #[test]
    fn unknown_level_is_medium() {
        let args = Args::try_parse_from(["pdfshrink", "scan.pdf", "--level", "max"]).unwrap();
        let settings = args.apply(Settings {
            level: CompressionLevel::High,
            ..Settings::default()
        });
        assert_eq!(settings.level, CompressionLevel::Medium);
    }

    #[test]
    fn verbosity_maps_to_log_level() {
        let args = Args::try_parse_from(["pdfshrink", "a.pdf", "-vv"]).unwrap();
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["pdfshrink"]).is_err());
    }
}
