//! Point d'entrée CLI pour geoexport

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use geoexport::logging::{init_logging, LogFormat};

mod cli;

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Exporter des jeux de données vectoriels (JSON sur stdin) vers des fichiers GDAL
#[derive(Parser)]
#[command(name = "geoexport")]
#[command(author, version)]
#[command(about = "Export vector datasets described on stdin to GDAL vector files")]
#[command(long_about = "Reads one JSON job description (datasets of WKT features), reprojects and writes each dataset with a GDAL driver, and prints one JSON result line per dataset on stdout.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Format des logs (stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Pipe)]
    log_format: LogFormat,

    #[command(flatten)]
    export: cli::ExportArgs,
}

fn main() -> ExitCode {
    // Charger .env avant tout
    load_env();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version ne sont pas des erreurs
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.verbose, cli.quiet, cli.log_format);

    match cli::run(&cli.export) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
