//! # geoexport
//!
//! Export par lots de jeux de données vectoriels vers des fichiers GDAL.
//!
//! ## Features
//!
//! - Schéma de sortie fixe et versionné (preset embarqué ou fichier JSON)
//! - Cache des CRS et des transformations PROJ pour toute la session
//! - Isolation des erreurs par feature et par jeu de données
//! - Un résultat JSON par jeu de données, émis au fil de l'eau
//!
//! ## Usage CLI
//!
//! ```bash
//! # Racine GDAL/PROJ en argument, tâche sur stdin
//! geoexport /opt/gdal < job.json
//!
//! # Racine depuis l'environnement, tâche depuis un fichier
//! GEOEXPORT_ENGINE_ROOT=/opt/gdal geoexport --input job.json --log-format pipe
//! ```

pub mod config;
pub mod engine;
pub mod export;
pub mod logging;
pub mod report;

pub use config::Schema;
pub use export::Exporter;
pub use report::{ExportRecord, ExportStatus, ExportSummary};
