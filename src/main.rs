mod app;
mod config;
mod db;
mod desktop_entry;
mod engine;
mod icon;
mod launcher;
mod model;
mod notifier;
mod runner;
mod ui;
mod watcher;

use anyhow::{bail, Context};
use clap::Parser;
use config::Config;
use db::AppsDb;
use env_logger::Env;
use log::{info, warn, LevelFilter};
use std::env;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "POKI_LOGGER";

#[derive(Debug, Parser)]
#[command(name = "poki-launcher", about = "Poki App Launcher", version)]
struct Opt {
    /// Print the apps database as JSON and exit
    #[arg(long)]
    dump_db: bool,

    /// Start without showing the launcher window, or exit if it is already running
    #[arg(long)]
    no_show: bool,
}

/// Level used when `POKI_LOGGER` is unset.
fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Sets up logging before the config is read. Without `POKI_LOGGER` the
/// logger accepts debug records and the global level gates them until the
/// config says otherwise.
fn init_logging() {
    env_logger::Builder::from_env(Env::new().filter_or(LOG_ENV, "debug")).init();
    if env::var_os(LOG_ENV).is_none() {
        log::set_max_level(default_level(false));
    }
    glib::log_set_default_handler(glib::rust_log_handler);
}

fn apply_config_logging(config: &Config) {
    if env::var_os(LOG_ENV).is_none() {
        log::set_max_level(default_level(config.debug.enable_logging));
    }
}

fn dump_db() -> anyhow::Result<()> {
    let path = Config::db_path();
    if !path.exists() {
        bail!("Database file {} doesn't exist", path.display());
    }
    let db = AppsDb::load(&path)?;
    println!("{}", db.dump().context("Failed to encode the apps database")?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging();
    let config = Config::load();
    apply_config_logging(&config);

    if opt.dump_db {
        return dump_db();
    }

    if notifier::is_running() {
        if opt.no_show {
            info!("Poki Launcher is already running");
            return Ok(());
        }
        match notifier::notify() {
            Ok(()) => return Ok(()),
            Err(e) => warn!("{}, starting a new instance", e),
        }
    }

    let app_path = env::args()
        .next()
        .unwrap_or_else(|| String::from("poki-launcher"));
    std::process::exit(app::run(&app_path, config, !opt.no_show));
}
