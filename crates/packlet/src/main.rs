use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;

use packlet::bundler::Bundler;
use packlet::config::{Config, ConfigOverrides};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entry module, relative to the project root
    #[arg(short, long)]
    entry: Option<PathBuf>,

    /// Project root that module ids are relative to (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Directory the bundle is written to
    #[arg(long, conflicts_with = "stdout")]
    output_path: Option<PathBuf>,

    /// File name of the bundle inside the output directory
    #[arg(long, conflicts_with = "stdout")]
    filename: Option<String>,

    /// Lower newer syntax to this target, e.g. es2015 or chrome80
    #[arg(long)]
    target: Option<String>,

    /// Print the bundle to stdout instead of writing it
    #[arg(long)]
    stdout: bool,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    debug!(
        "Verbosity level: {} (log level: {})",
        cli.verbose, log_level
    );
    info!("Starting packlet");

    let config = Config::load(cli.config.as_deref())?;
    let config = ConfigOverrides {
        entry: cli.entry,
        root: cli.root,
        output_path: cli.output_path,
        output_filename: cli.filename,
        extensions: None,
        target: cli.target,
    }
    .apply_to(config);
    config.validate()?;

    debug!("Configuration: {:?}", config);

    let bundler = Bundler::new(config);

    if cli.stdout {
        let bundled_code = bundler.bundle_to_string()?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bundled_code.as_bytes())?;
        stdout.flush()?;
        info!("Bundle output to stdout");
    } else {
        let output_path = bundler.bundle()?;
        info!("Bundle created successfully at {}", output_path.display());
    }

    Ok(())
}
