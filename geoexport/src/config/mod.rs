//! Registre du schéma de sortie
//!
//! Le schéma (ordre des colonnes, types, alias, clés sources) est une
//! configuration JSON versionnée, chargée et validée une seule fois au
//! démarrage. Un preset est embarqué dans le binaire.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use exportjob::Properties;

/// Version du format de configuration supportée
pub const SCHEMA_VERSION: u32 = 1;

/// Erreurs de chargement ou de validation du schéma
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse schema JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown schema preset: {0}. Use: default")]
    UnknownPreset(String),

    #[error("Unsupported schema version {found}, expected {}", SCHEMA_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("Schema defines no field")]
    NoFields,

    #[error("Field #{0} has an empty name")]
    EmptyFieldName(usize),

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Path field '{0}' is not defined in the schema")]
    MissingPathField(String),

    #[error("Path field '{0}' must be of type text")]
    PathFieldNotText(String),

    #[error("Field '{0}' has no candidate source key")]
    NoSources(String),
}

/// Type sémantique d'un champ de sortie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Double,
    Text,
}

/// Type de géométrie déclaré pour les couches de sortie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    LineString,
    #[default]
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    Unknown,
}

/// Définition d'un champ de sortie
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldDefinition {
    /// Nom de la colonne en sortie (unique)
    pub name: String,

    /// Type sémantique
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Alias d'affichage
    #[serde(default)]
    pub alias: String,

    /// Commentaire descriptif
    #[serde(default)]
    pub comment: String,

    /// Largeur (texte) ou nombre total de chiffres (numérique)
    #[serde(default)]
    pub length: Option<u32>,

    /// Nombre de décimales
    #[serde(default)]
    pub precision: Option<u32>,

    /// Clés candidates dans la table d'attributs, la première présente gagne
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Schéma de sortie validé
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schema {
    version: u32,

    #[serde(default)]
    geometry_type: GeometryKind,

    /// Champ réservé, rempli avec le chemin du fichier source
    path_field: String,

    fields: Vec<FieldDefinition>,
}

impl Schema {
    /// Charge un schéma depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&content)
    }

    /// Charge un schéma depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self, SchemaError> {
        match preset {
            "default" => Self::from_json(include_str!("presets/default.json")),
            _ => Err(SchemaError::UnknownPreset(preset.to_string())),
        }
    }

    /// Nom de preset ou chemin vers un fichier JSON
    pub fn from_spec(spec: &str) -> Result<Self, SchemaError> {
        let path = Path::new(spec);
        if path.is_file() {
            Self::load(path)
        } else {
            Self::from_preset(spec)
        }
    }

    /// Parse puis valide un schéma JSON
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.version != SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: self.version,
            });
        }
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields);
        }

        // Les formats vectoriels comparent les colonnes sans la casse
        let mut seen = HashSet::new();
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName(i));
            }
            if !seen.insert(field.name.to_uppercase()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        let path_field = self
            .field(&self.path_field)
            .ok_or_else(|| SchemaError::MissingPathField(self.path_field.clone()))?;
        if path_field.kind != FieldKind::Text {
            return Err(SchemaError::PathFieldNotText(self.path_field.clone()));
        }

        if let Some(field) = self
            .fields
            .iter()
            .find(|f| !self.is_path_field(f) && f.sources.is_empty())
        {
            return Err(SchemaError::NoSources(field.name.clone()));
        }

        Ok(())
    }

    /// Champs dans l'ordre de sortie
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Récupère la définition d'un champ
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position d'un champ dans l'ordre de sortie
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn geometry_type(&self) -> GeometryKind {
        self.geometry_type
    }

    pub fn path_field(&self) -> &str {
        &self.path_field
    }

    /// Vrai pour le champ réservé au chemin source
    pub fn is_path_field(&self, field: &FieldDefinition) -> bool {
        field.name == self.path_field
    }

    /// Valeur source d'un champ : première clé candidate présente.
    ///
    /// Retourne `None` si aucune clé n'est présente, et toujours `None` pour le
    /// champ réservé (rempli depuis le jeu de données, pas depuis les attributs).
    pub fn lookup<'p>(&self, field: &FieldDefinition, properties: &'p Properties) -> Option<&'p Value> {
        if self.is_path_field(field) {
            return None;
        }
        field
            .sources
            .iter()
            .find_map(|key| properties.get(key.as_str()))
    }
}
