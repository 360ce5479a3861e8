//! Initialisation du moteur géométrique (GDAL/PROJ)
//!
//! La racine d'installation contient les données de GDAL (`share/gdal`) et de
//! PROJ (`share/proj`). Elle doit exister avant toute lecture de l'entrée.

use std::path::{Path, PathBuf};

use gdal::errors::GdalError;
use gdal::DriverManager;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Variable d'environnement de la racine du moteur
pub const ENGINE_ROOT_ENV: &str = "GEOEXPORT_ENGINE_ROOT";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine installation root is required (argument or {} variable)", ENGINE_ROOT_ENV)]
    MissingRoot,

    #[error("Engine installation root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to configure GDAL option {key}: {source}")]
    Config { key: &'static str, source: GdalError },
}

/// Répertoires de données trouvés sous la racine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    pub gdal: Option<PathBuf>,
    pub proj: Option<PathBuf>,
}

impl DataDirs {
    pub fn locate(root: &Path) -> Self {
        let existing = |dir: PathBuf| dir.is_dir().then_some(dir);
        Self {
            gdal: existing(root.join("share").join("gdal")),
            proj: existing(root.join("share").join("proj")),
        }
    }
}

/// Moteur initialisé
#[derive(Debug)]
pub struct Engine {
    root: PathBuf,
}

impl Engine {
    /// Vérifie la racine, configure les répertoires de données et enregistre
    /// les drivers GDAL.
    pub fn bootstrap(root: Option<&Path>) -> Result<Self, EngineError> {
        let root = validate_root(root)?;
        let data = DataDirs::locate(&root);

        match &data.gdal {
            Some(dir) => {
                let value = dir.to_string_lossy();
                gdal::config::set_config_option("GDAL_DATA", &value).map_err(|source| {
                    EngineError::Config {
                        key: "GDAL_DATA",
                        source,
                    }
                })?;
                std::env::set_var("GDAL_DATA", dir);
            }
            None => warn!(root = %root.display(), "No share/gdal directory, using GDAL defaults"),
        }

        match &data.proj {
            Some(dir) => {
                std::env::set_var("PROJ_DATA", dir);
                // Anciennes versions de PROJ
                std::env::set_var("PROJ_LIB", dir);
            }
            None => warn!(root = %root.display(), "No share/proj directory, using PROJ defaults"),
        }

        DriverManager::register_all();
        debug!(drivers = DriverManager::count(), "GDAL drivers registered");

        info!(
            root = %root.display(),
            gdal = %gdal::version::version_info("RELEASE_NAME"),
            "Engine ready"
        );

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Valide la racine d'installation
pub fn validate_root(root: Option<&Path>) -> Result<PathBuf, EngineError> {
    let root = root
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(EngineError::MissingRoot)?;

    if !root.is_dir() {
        return Err(EngineError::NotADirectory(root.to_path_buf()));
    }
    Ok(root.to_path_buf())
}
