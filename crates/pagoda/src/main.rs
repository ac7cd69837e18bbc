use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;

use pagoda::bundler::Bundler;
use pagoda::config::Config;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory containing app.json
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Directory to write bundles to
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Minify script and style output
    #[arg(short, long)]
    minify: bool,

    /// Keep every top-level statement instead of tree shaking
    #[arg(long)]
    no_tree_shaking: bool,

    /// Framework runtime files to copy next to the bundles
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let log_level = match cli.verbose {
        0 => "warn",  // Default: warnings and errors only
        1 => "info",  // -v: informational messages
        2 => "debug", // -vv: debug messages
        _ => "trace", // -vvv or more: trace messages
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    debug!(
        "Verbosity level: {} (log level: {})",
        cli.verbose, log_level
    );
    info!("Starting pagoda bundler");

    let project_hint = cli.project.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load(cli.config.as_deref(), &project_hint)?;

    // CLI flags override every other source
    if let Some(project) = cli.project {
        config.project = project;
    }
    if let Some(out_dir) = cli.out_dir {
        config.out_dir = out_dir;
    }
    if let Some(runtime_dir) = cli.runtime_dir {
        config.runtime_dir = Some(runtime_dir);
    }
    if cli.minify {
        config.minify = true;
    }
    if cli.no_tree_shaking {
        config.tree_shaking = false;
    }

    debug!("Configuration: {:?}", config);

    let report = Bundler::new(config).bundle()?;
    info!(
        "Bundled {} pages; entry at {:?}",
        report.context.manifest.len(),
        report.entry
    );

    Ok(())
}
