//! # exportjob
//!
//! Modèle de la description de tâche envoyée à l'exporteur : une liste de jeux
//! de données, chacun composé de features (attributs + géométrie WKT).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use exportjob::decode;
//!
//! let payload = decode(std::io::stdin().lock())?;
//! for dataset in &payload.datasets {
//!     println!("{}: {} features", dataset.layer_name, dataset.features.len());
//! }
//! ```

pub mod error;
pub mod types;

pub use error::JobError;
pub use types::{Dataset, ExportPayload, Feature, Properties};

use std::io::Read;

/// Lit le canal d'entrée en entier puis décode la tâche.
///
/// # Errors
///
/// `JobError::Empty` si l'entrée ne contient que des blancs, `JobError::Malformed`
/// si le document n'a pas la forme attendue (tous les champs sont requis).
pub fn decode<R: Read>(mut reader: R) -> Result<ExportPayload, JobError> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    decode_slice(&buffer)
}

/// Décode une tâche depuis des octets JSON
pub fn decode_slice(bytes: &[u8]) -> Result<ExportPayload, JobError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(JobError::Empty);
    }

    let payload: ExportPayload = serde_json::from_slice(bytes)?;

    tracing::debug!(
        datasets = payload.datasets.len(),
        features = payload.feature_count(),
        driver = %payload.driver,
        "Job document decoded"
    );

    Ok(payload)
}

/// Décode une tâche depuis une chaîne JSON
pub fn decode_str(text: &str) -> Result<ExportPayload, JobError> {
    decode_slice(text.as_bytes())
}
