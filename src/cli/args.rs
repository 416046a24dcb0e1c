//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

/// Editing and preview backend for a static site.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Site source directory to serve
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub site_dir: PathBuf,

    /// Port for the JSON-RPC WebSocket endpoint
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long)]
    pub interface: Option<IpAddr>,

    /// Serve the generated output over HTTP on this port
    #[arg(long)]
    pub preview_port: Option<u16>,

    /// Config file path (default: <SITE_DIR>/sitedesk.toml)
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Print debug output
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,
}
