use clap::Parser;
use std::path::PathBuf;

// Build version with renderer info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Render: external ffmpeg process\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Video thumbnail generator
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Video files or directories (directories are scanned one level deep)
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Simultaneous ffmpeg renders (default from settings: 3)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Thumbnail width in pixels
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<u32>,

    /// Kill an ffmpeg attempt after this many milliseconds (0 = never)
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// ffmpeg executable (default: $VTHUMB_FFMPEG, bundled binaries/, then PATH)
    #[arg(long = "ffmpeg", value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Directory for rendered JPEGs
    #[arg(long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Print file paths instead of inline data URIs
    #[arg(long = "file-refs")]
    pub file_refs: bool,

    /// Print results as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Delete rendered thumbnails from the output directory before starting
    #[arg(long = "clear-cache")]
    pub clear_cache: bool,

    /// Write the effective settings back to vthumb.json
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable logging to file (default: vthumb.log in the data directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut crate::settings::ThumbSettings) {
        if let Some(jobs) = self.jobs {
            settings.max_concurrent = jobs.max(1);
        }
        if let Some(width) = self.width {
            settings.thumb_width = width;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.render_timeout_ms = timeout_ms;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(out_dir) = &self.out_dir {
            settings.out_dir = Some(out_dir.clone());
        }
        if self.file_refs {
            settings.inline_data_uri = false;
        }
    }
}
