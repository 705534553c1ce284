//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use mediafetch_core::DEFAULT_TEMPLATE;
use mediafetch_core::config::HttpOptions;
use mediafetch_core::config::units::NumOrText;

/// Download media files over HTTP(S) with resume and retry.
///
/// Mediafetch streams each URL into a `.part` file, resumes interrupted
/// transfers, corrects file extensions from magic bytes, and retries
/// transient failures with a linear backoff.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory downloaded files are written to
    #[arg(short = 'd', long, default_value = ".")]
    pub directory: PathBuf,

    /// Filename template; {filename} and {extension} come from the URL
    #[arg(short = 'o', long = "filename", default_value = DEFAULT_TEMPLATE)]
    pub template: String,

    /// Configuration file (default: $XDG_CONFIG_HOME/mediafetch/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum retries per file; negative for unlimited
    #[arg(long, allow_negative_numbers = true)]
    pub retries: Option<i64>,

    /// Maximum download rate, e.g. 500k or 1M-2M
    #[arg(long)]
    pub rate: Option<String>,

    /// Bytes read per chunk, e.g. 64k
    #[arg(long)]
    pub chunk_size: Option<String>,

    /// Skip files smaller than this size
    #[arg(long)]
    pub filesize_min: Option<String>,

    /// Skip files larger than this size
    #[arg(long)]
    pub filesize_max: Option<String>,

    /// Connect and read timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Seconds to wait after a 429 response, e.g. 60 or 30-90
    #[arg(long = "sleep-429")]
    pub sleep_429: Option<String>,

    /// Extra request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Write directly to the final file instead of a .part file
    #[arg(long)]
    pub no_part: bool,

    /// Do not set file modification times from Last-Modified
    #[arg(long)]
    pub no_mtime: bool,

    /// Do not display download progress
    #[arg(long)]
    pub no_progress: bool,

    /// Do not verify TLS certificates
    #[arg(long)]
    pub no_check_certificate: bool,
}

impl Args {
    /// Applies command line overrides on top of the file configuration.
    pub fn apply_overrides(&self, options: &mut HttpOptions) {
        if let Some(retries) = self.retries {
            options.retries = Some(retries);
        }
        if let Some(rate) = &self.rate {
            options.rate = Some(NumOrText::Text(rate.clone()));
        }
        if let Some(chunk_size) = &self.chunk_size {
            options.chunk_size = Some(NumOrText::Text(chunk_size.clone()));
        }
        if let Some(min) = &self.filesize_min {
            options.filesize_min = Some(NumOrText::Text(min.clone()));
        }
        if let Some(max) = &self.filesize_max {
            options.filesize_max = Some(NumOrText::Text(max.clone()));
        }
        if let Some(timeout) = self.timeout {
            options.timeout = Some(timeout);
        }
        if let Some(sleep) = &self.sleep_429 {
            options.sleep_429 = Some(NumOrText::Text(sleep.clone()));
        }
        if !self.headers.is_empty() {
            let headers = options.headers.get_or_insert_with(Default::default);
            headers.extend(self.headers.iter().cloned());
        }
        if self.no_part {
            options.part = Some(false);
        }
        if self.no_mtime {
            options.mtime = Some(false);
        }
        if self.no_progress {
            options.progress = Some(None);
        }
        if self.no_check_certificate {
            options.verify = Some(false);
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
