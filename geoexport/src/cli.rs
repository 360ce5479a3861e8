//! Arguments et exécution de la commande d'export
//!
//! Ordre d'initialisation : moteur, schéma, CRS par défaut, puis lecture de
//! l'entrée. Toute erreur avant la boucle d'export est fatale.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use exportjob::{ExportPayload, JobError};
use geoexport::config::Schema;
use geoexport::engine::{Engine, ENGINE_ROOT_ENV};
use geoexport::export::crs::DEFAULT_CRS;
use geoexport::export::Exporter;
use geoexport::report::ResultStream;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// GDAL/PROJ installation root (contains share/gdal and share/proj)
    #[arg(env = ENGINE_ROOT_ENV)]
    pub engine_root: Option<PathBuf>,

    /// Schema preset name (default) or path to a JSON schema
    #[arg(long, default_value = "default")]
    pub schema: String,

    /// CRS used when a dataset or the job gives none (or an invalid one)
    #[arg(long, default_value = DEFAULT_CRS)]
    pub default_crs: String,

    /// Read the job description from a file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Save the run summary as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Exécute l'export complet
pub fn run(args: &ExportArgs) -> Result<()> {
    let engine = Engine::bootstrap(args.engine_root.as_deref())
        .context("Engine initialization failed")?;

    let schema = Schema::from_spec(&args.schema)
        .with_context(|| format!("Invalid schema configuration '{}'", args.schema))?;
    info!(
        schema = %args.schema,
        fields = schema.len(),
        root = %engine.root().display(),
        "Schema loaded"
    );

    let mut exporter = Exporter::with_gdal(schema, &args.default_crs)
        .with_context(|| format!("Cannot resolve default CRS '{}'", args.default_crs))?;

    let payload = match read_payload(args.input.as_deref()) {
        Ok(payload) => payload,
        Err(e) if e.is_empty_input() => {
            warn!("Job description is empty, nothing to export");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to decode job description"),
    };

    let mut results = ResultStream::new(io::stdout().lock());
    let summary = exporter
        .run(payload, &mut results)
        .context("Result channel closed")?;

    if let Some(path) = &args.report {
        match summary.save_to_file(path) {
            Ok(()) => info!(path = %path.display(), "Report saved"),
            Err(e) => warn!(path = %path.display(), "Failed to save report: {:#}", e),
        }
    }

    Ok(())
}

/// Lit la tâche depuis un fichier ou stdin
fn read_payload(input: Option<&Path>) -> Result<ExportPayload, JobError> {
    match input {
        Some(path) => {
            info!(path = %path.display(), "Reading job description");
            exportjob::decode(BufReader::new(File::open(path)?))
        }
        None => exportjob::decode(io::stdin().lock()),
    }
}
