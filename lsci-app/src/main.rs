mod app;
mod backends;
mod config;
mod sink;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use app::{App, RunOptions};
use config::AppConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

fn main() -> Result<()> {
    init_tracing();

    let mut options = RunOptions::default();
    let mut config_path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--unattended" => options.unattended = true,
            "--resume" => options.resume = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            path => config_path = Some(PathBuf::from(path)),
        }
    }

    let config = match config_path {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };
    App::new(config, options).run()
}
