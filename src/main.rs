#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
// vspeed: keyboard playback control, hosted in an SDL2 + mpv window.
// Hold → for fast playback, tap it to seek; settings and the origin
// allow-list live in vspeed.db.
// Usage: vspeed [FILES|DIRS...] | vspeed <subcommand>

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

mod cli;
mod fswatch;
mod mpv;
mod overlay;
mod page;
mod player;
mod quad;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::error;

use vspeed::db::Db;
use vspeed::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "vspeed", about = "Hold-to-speed-up video player", version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Page origin to present the files under (selects the site profile)
    #[arg(long)]
    origin: Option<String>,

    /// Video files or directories to open
    #[arg(trailing_var_arg = true)]
    paths: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show one setting, or all of them
    Get { name: Option<String> },
    /// Change a setting
    Set { name: String, value: String },
    /// Restore every setting to its default
    Reset,
    /// Enable the controller on an origin
    Allow { origin: String },
    /// Remove an origin from the allow-list
    Deny { origin: String },
    /// List enabled origins
    Sites,
    /// Replay a JSON scenario and print its trace
    Replay { file: PathBuf },
}

fn init_logger() {
    let mut builder = env_logger::Builder::new();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder
            .filter_level(log::LevelFilter::Warn)
            .filter_module("vspeed", log::LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

fn main() {
    init_logger();
    let args = Cli::parse();

    // Replay runs against an in-memory store and never touches the database.
    if let Some(Commands::Replay { file }) = &args.command {
        std::process::exit(cli::replay(file));
    }

    let mut db = match Db::open_default() {
        Ok(db) => db,
        Err(e) => {
            error!("vspeed.db: {}", e);
            std::process::exit(1);
        }
    };

    // ── CLI subcommands (non-GUI, exit after) ───────────────────────────
    if let Some(cmd) = args.command {
        let code = match cmd {
            Commands::Get { name } => cli::get(&db, name.as_deref()),
            Commands::Set { name, value } => cli::set(&mut db, &name, &value),
            Commands::Reset => cli::reset(&mut db),
            Commands::Allow { origin } => cli::allow(&db, &origin),
            Commands::Deny { origin } => cli::deny(&db, &origin),
            Commands::Sites => cli::sites(&db),
            Commands::Replay { .. } => 0,
        };
        std::process::exit(code);
    }

    // ── GUI mode ─────────────────────────────────────────────────────────
    if args.paths.is_empty() {
        error!("nothing to play: pass video files or directories");
        std::process::exit(2);
    }
    let settings = Settings::load(&db);
    let allow = match db.allow_list() {
        Ok(a) => a,
        Err(e) => {
            error!("vspeed.db: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = player::run(&args.paths, args.origin.as_deref(), settings, allow) {
        error!("{}", e);
        std::process::exit(1);
    }
}
