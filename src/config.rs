use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Download files once and remember where they came from.
///
/// URLs already in the history, or whose file name is already in it, are
/// skipped unless --force is given.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URLs to download. Read from stdin, one per line, when omitted.
    pub urls: Vec<String>,

    /// Directory downloads are written to.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Path of the JSON history file.
    #[arg(long = "history")]
    pub history_file: Option<PathBuf>,

    /// Download even if the URL or file name is already in the history.
    #[arg(short, long)]
    pub force: bool,

    /// Print the download history and exit.
    #[arg(long)]
    pub list: bool,

    /// Serve the web UI on this address (e.g. `:8080` or `127.0.0.1:8080`).
    #[arg(long = "web", value_name = "ADDR")]
    pub web_addr: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub history_file: PathBuf,
    pub log_level: String,
    pub web_addr: Option<String>,
}

impl Settings {
    pub fn new(args: &Args) -> Result<Self, ConfigError> {
        let path_arg = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());

        let builder = Config::builder()
            // Default settings
            .set_default("output_dir", ".")?
            .set_default("history_file", ".download_history.json")?
            .set_default("log_level", "info")?
            // Config file (optional)
            .add_source(File::with_name("grabber").required(false))
            // Environment variables (e.g. GRABBER_OUTPUT_DIR=/srv/downloads)
            .add_source(Environment::with_prefix("GRABBER"))
            // Command line wins
            .set_override_option("output_dir", path_arg(&args.output_dir))?
            .set_override_option("history_file", path_arg(&args.history_file))?
            .set_override_option("web_addr", args.web_addr.clone())?;

        builder.build()?.try_deserialize()
    }

    /// Address for the web server, if it was asked for. A bare `:port` binds all interfaces.
    pub fn bind_addr(&self) -> Option<String> {
        let addr = self.web_addr.as_deref()?.trim();
        if addr.is_empty() {
            None
        } else if addr.starts_with(':') {
            Some(format!("0.0.0.0{}", addr))
        } else {
            Some(addr.to_string())
        }
    }
}
