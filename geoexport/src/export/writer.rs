//! Écriture d'un jeu de données dans un fichier vectoriel
//!
//! `WriteOptions::prepare` dérive la cible et le mode d'écriture d'un jeu de
//! données. L'écriture passe par `LayerStore`, implémenté par `GdalStore` en
//! production et par un store mémoire dans les tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};

use exportjob::{Dataset, ExportPayload};

use super::crs::Crs;
use super::driver::OutputDriver;
use super::feature::ExportFeature;
use crate::config::Schema;

/// Encodage des attributs en sortie
pub const OUTPUT_ENCODING: &str = "UTF-8";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to create writer for '{target}': {reason}")]
    Open { target: String, reason: String },

    #[error("Failed to add features to layer '{layer}': {reason}")]
    Add { layer: String, reason: String },
}

/// Comportement quand la cible existe déjà
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingFileAction {
    /// Le fichier est (re)créé
    CreateOrOverwriteFile,
    /// Le fichier conteneur est conservé, seule la couche est remplacée
    CreateOrOverwriteLayer,
    /// La couche existe déjà : les features y sont ajoutées
    AppendToLayer,
}

/// Paramètres de sortie communs à toute la tâche
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub output_dir: PathBuf,
    pub driver: OutputDriver,
    pub overwrite: bool,
}

impl OutputTarget {
    pub fn from_payload(payload: &ExportPayload) -> Self {
        Self {
            output_dir: PathBuf::from(&payload.output_dir),
            driver: OutputDriver::from_name(&payload.driver),
            overwrite: payload.overwrite,
        }
    }
}

/// Options d'écriture d'un jeu de données
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub driver: OutputDriver,
    /// Fichier ouvert ou créé par le writer
    pub target_path: PathBuf,
    /// Chemin lisible pour les logs
    pub display_path: String,
    /// Nom de la couche dans le fichier
    pub layer_name: String,
    pub action: ExistingFileAction,
    pub encoding: String,
    /// Options de création de couche (`CLE=VALEUR`)
    pub layer_options: Vec<String>,
}

impl WriteOptions {
    /// Dérive les options d'écriture d'un jeu de données
    pub fn prepare(dataset: &Dataset, target: &OutputTarget) -> Self {
        let driver = target.driver.clone();
        let requested = dataset.layer_name.as_str();

        let (target_path, display_path, layer_name) = if driver.is_container() {
            let path = target.output_dir.clone();
            let display = format!("{}|layername={}", path.display(), requested);
            (path, display, requested.to_string())
        } else {
            let path = target.output_dir.join(requested);
            let display = path.display().to_string();
            (path, display, single_file_layer_name(requested, &driver))
        };

        let action = if target_path.exists() && target.overwrite && driver.is_container() {
            ExistingFileAction::CreateOrOverwriteLayer
        } else {
            ExistingFileAction::CreateOrOverwriteFile
        };

        let mut layer_options = Vec::new();
        if driver.supports_spatial_index() {
            layer_options.push("SPATIAL_INDEX=YES".to_string());
        }
        if driver.supports_encoding_option() {
            layer_options.push(format!("ENCODING={}", OUTPUT_ENCODING));
        }

        Self {
            driver,
            target_path,
            display_path,
            layer_name,
            action,
            encoding: OUTPUT_ENCODING.to_string(),
            layer_options,
        }
    }
}

/// Couches écrites pendant l'export en cours.
///
/// Les jeux de données d'une même tâche qui partagent une couche (cas du
/// `merge`) s'y ajoutent au lieu de la recréer, et un conteneur créé par la
/// tâche n'est jamais supprimé par un jeu de données suivant.
#[derive(Debug, Default)]
pub struct WrittenLayers {
    layers: HashSet<(PathBuf, String)>,
}

impl WrittenLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajuste l'action d'écriture selon ce que la tâche a déjà produit
    pub fn resolve(&self, options: &mut WriteOptions) {
        let key = (options.target_path.clone(), options.layer_name.clone());

        if self.layers.contains(&key) {
            options.action = ExistingFileAction::AppendToLayer;
        } else if options.driver.is_container()
            && self.layers.iter().any(|(path, _)| *path == options.target_path)
        {
            options.action = ExistingFileAction::CreateOrOverwriteLayer;
        }
    }

    pub fn record(&mut self, options: &WriteOptions) {
        self.layers
            .insert((options.target_path.clone(), options.layer_name.clone()));
    }
}

/// Nom de couche d'un fichier mono-couche : nom sans l'extension du driver
fn single_file_layer_name(name: &str, driver: &OutputDriver) -> String {
    let path = Path::new(name);
    let matches_driver = match (path.extension(), driver.extension()) {
        (Some(ext), Some(expected)) => ext.to_string_lossy().eq_ignore_ascii_case(expected),
        _ => false,
    };

    match path.file_stem() {
        Some(stem) if matches_driver => stem.to_string_lossy().into_owned(),
        _ => name.to_string(),
    }
}

/// Demande d'ouverture d'une couche de sortie
pub struct LayerRequest<'a> {
    pub options: &'a WriteOptions,
    pub schema: &'a Schema,
    pub crs: &'a Crs,
}

/// Fabrique de couches de sortie
pub trait LayerStore {
    /// Ouvre (ou crée) la couche décrite par la requête.
    ///
    /// La couche existe et porte le schéma complet dès le retour, même si
    /// aucune feature n'est ensuite ajoutée.
    fn open_layer<'a>(&'a self, request: &LayerRequest<'_>)
        -> Result<Box<dyn LayerSink + 'a>, WriteError>;
}

/// Couche ouverte ; fermée (et vidée sur disque) au drop
pub trait LayerSink {
    /// Ajoute toutes les features en une fois, retourne le nombre écrit
    fn add_features(&mut self, features: &[ExportFeature]) -> Result<usize, WriteError>;
}

/// Écrit les features d'un jeu de données via un `LayerStore`
pub struct DatasetWriter<'s, S: LayerStore + ?Sized> {
    store: &'s S,
    schema: &'s Schema,
}

impl<'s, S: LayerStore + ?Sized> DatasetWriter<'s, S> {
    pub fn new(store: &'s S, schema: &'s Schema) -> Self {
        Self { store, schema }
    }

    /// Écrit les features dans le CRS cible.
    ///
    /// Le writer est relâché avant le retour, en cas de succès comme d'échec.
    /// Zéro feature produit quand même une couche vide valide.
    pub fn write(
        &self,
        options: &WriteOptions,
        features: &[ExportFeature],
        crs: &Crs,
    ) -> Result<usize, WriteError> {
        let request = LayerRequest {
            options,
            schema: self.schema,
            crs,
        };

        debug!(
            output = %options.display_path,
            driver = %options.driver,
            action = ?options.action,
            encoding = %options.encoding,
            "Opening output layer"
        );

        let mut sink = self.store.open_layer(&request).map_err(|e| {
            error!(output = %options.display_path, "Failed to create writer: {}", e);
            e
        })?;

        let written = if features.is_empty() {
            0
        } else {
            match sink.add_features(features) {
                Ok(count) => count,
                Err(e) => {
                    error!(layer = %options.layer_name, "Failed to add features: {}", e);
                    drop(sink);
                    return Err(e);
                }
            }
        };
        drop(sink);

        info!(
            count = written,
            output = %options.display_path,
            "Features written"
        );
        Ok(written)
    }
}
