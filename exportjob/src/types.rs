//! Types de données pour le crate exportjob

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Table d'attributs d'une feature (clés libres, valeurs JSON arbitraires)
pub type Properties = Map<String, Value>;

/// Une feature à exporter : attributs + géométrie WKT
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Feature {
    /// Attributs fournis par l'appelant, non validés
    pub properties: Properties,

    /// Géométrie en Well-Known Text (peut être vide)
    pub wkt: String,
}

impl Feature {
    /// Vrai si une géométrie a été fournie
    pub fn has_geometry(&self) -> bool {
        !self.wkt.trim().is_empty()
    }
}

/// Un jeu de données : une couche de sortie
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    /// Features dans l'ordre d'entrée
    pub features: Vec<Feature>,

    /// Hash du fichier source, utilisé pour corréler les résultats
    pub hash: String,

    /// Nom de la couche (ou du fichier) de sortie
    pub layer_name: String,

    /// Identifiant du système de coordonnées source (ex: "EPSG:4490")
    pub source_crs: String,

    /// Chemin du fichier source
    pub source_path: String,

    /// Nombre de features annoncé (indicatif)
    pub total_features: u64,
}

impl Dataset {
    /// Vrai si le nombre annoncé diffère du nombre réel de features
    pub fn declared_count_mismatch(&self) -> bool {
        self.total_features != self.features.len() as u64
    }
}

/// Description complète d'une tâche d'export
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportPayload {
    /// Jeux de données, traités dans l'ordre
    pub datasets: Vec<Dataset>,

    /// Nom du driver de sortie (GPKG, ESRI Shapefile, ...)
    pub driver: String,

    /// Drapeau de fusion transmis par l'appelant
    pub merge: bool,

    /// Répertoire (ou conteneur) de sortie
    pub output_dir: String,

    /// Écraser les cibles existantes
    pub overwrite: bool,

    /// Système de coordonnées cible
    pub target_crs: String,
}

impl ExportPayload {
    /// Nombre total de features, tous jeux confondus
    pub fn feature_count(&self) -> usize {
        self.datasets.iter().map(|d| d.features.len()).sum()
    }
}
