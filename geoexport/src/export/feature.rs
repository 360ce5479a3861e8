//! Construction des features de sortie
//!
//! Une feature d'entrée (attributs libres + WKT) devient une `ExportFeature` :
//! attributs typés dans l'ordre du schéma, géométrie parsée et reprojetée.
//! Un échec n'affecte que la feature concernée.

use geo::{Geometry, HasDimensions};
use geozero::wkt::Wkt;
use geozero::ToGeo;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use exportjob::{Feature, Properties};

use super::reproject::{ReprojectError, Reprojector};
use crate::config::{FieldDefinition, FieldKind, Schema};

/// Valeur d'attribut typée selon le schéma
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i32),
    Double(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convertit une valeur JSON vers le type du champ
    pub fn coerce(field: &FieldDefinition, value: &Value) -> Result<Self, FeatureError> {
        let converted = match (field.kind, value) {
            (_, Value::Null) => Some(Self::Null),
            (FieldKind::Integer | FieldKind::Double, Value::String(s)) if s.trim().is_empty() => {
                Some(Self::Null)
            }

            (FieldKind::Integer, Value::Number(n)) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .or_else(|| n.as_f64().and_then(integral))
                .map(Self::Integer),
            (FieldKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(integral)
                .map(Self::Integer),

            (FieldKind::Double, Value::Number(n)) => n.as_f64().map(Self::Double),
            (FieldKind::Double, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Double),

            (FieldKind::Text, Value::String(s)) => Some(Self::Text(s.clone())),
            // Nombres, booléens, tableaux et objets : forme JSON compacte
            (FieldKind::Text, other) => Some(Self::Text(other.to_string())),

            _ => None,
        };

        converted.ok_or_else(|| FeatureError::Attribute {
            field: field.name.clone(),
            kind: field.kind,
            value: value.to_string(),
        })
    }
}

/// Entier exact dans les bornes d'un champ `OFTInteger`
fn integral(value: f64) -> Option<i32> {
    let in_range = value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX);
    (value.fract() == 0.0 && in_range).then_some(value as i32)
}

/// Feature prête à être écrite
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFeature {
    /// Une valeur par champ du schéma, dans l'ordre du schéma
    pub attributes: Vec<AttributeValue>,

    /// Géométrie dans le CRS cible, absente si vide ou illisible
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Field {field}: cannot convert {value} to {kind:?}")]
    Attribute {
        field: String,
        kind: FieldKind,
        value: String,
    },

    #[error("Reprojection failed: {0}")]
    Reproject(#[from] ReprojectError),
}

/// Échec de construction d'une feature, avec ses attributs pour le diagnostic
#[derive(Debug, Error)]
#[error("Feature #{index}: {reason}")]
pub struct FeatureBuildFailure {
    pub index: usize,
    pub properties: Properties,
    #[source]
    pub reason: FeatureError,
}

impl FeatureBuildFailure {
    /// Attributs d'origine sérialisés en JSON (pour les logs)
    pub fn properties_json(&self) -> String {
        serde_json::to_string(&self.properties).unwrap_or_default()
    }
}

/// Contexte du jeu de données en cours
#[derive(Debug, Clone, Copy)]
pub struct DatasetContext<'a> {
    pub source_path: &'a str,
    pub layer_name: &'a str,
}

/// Construit les features de sortie selon le schéma
pub struct FeatureBuilder<'s> {
    schema: &'s Schema,
}

impl<'s> FeatureBuilder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Construit une feature ; la feature d'entrée est consommée.
    pub fn build(
        &self,
        index: usize,
        feature: Feature,
        transform: Option<&Reprojector>,
        context: &DatasetContext<'_>,
    ) -> Result<ExportFeature, FeatureBuildFailure> {
        match self.try_build(index, &feature, transform, context) {
            Ok(built) => Ok(built),
            Err(reason) => Err(FeatureBuildFailure {
                index,
                properties: feature.properties,
                reason,
            }),
        }
    }

    fn try_build(
        &self,
        index: usize,
        feature: &Feature,
        transform: Option<&Reprojector>,
        context: &DatasetContext<'_>,
    ) -> Result<ExportFeature, FeatureError> {
        let attributes = self.extract_attributes(&feature.properties, context)?;

        let mut geometry = if feature.has_geometry() {
            parse_geometry(index, &feature.wkt, context)
        } else {
            None
        };
        if let (Some(geom), Some(transform)) = (geometry.as_mut(), transform) {
            transform.transform_in_place(geom)?;
        }

        Ok(ExportFeature {
            attributes,
            geometry,
        })
    }

    /// Attributs dans l'ordre du schéma ; clé absente -> `Null`
    pub fn extract_attributes(
        &self,
        properties: &Properties,
        context: &DatasetContext<'_>,
    ) -> Result<Vec<AttributeValue>, FeatureError> {
        self.schema
            .fields()
            .iter()
            .map(|field| {
                if self.schema.is_path_field(field) {
                    return Ok(AttributeValue::Text(context.source_path.to_string()));
                }
                match self.schema.lookup(field, properties) {
                    Some(value) => AttributeValue::coerce(field, value),
                    None => Ok(AttributeValue::Null),
                }
            })
            .collect()
    }
}

/// Parse le WKT ; illisible ou `EMPTY` -> pas de géométrie
fn parse_geometry(index: usize, wkt: &str, context: &DatasetContext<'_>) -> Option<Geometry> {
    match Wkt(wkt.trim()).to_geo() {
        Ok(geom) if geom.is_empty() => {
            debug!(index, layer = context.layer_name, "Empty geometry, feature kept without geometry");
            None
        }
        Ok(geom) => Some(geom),
        Err(e) => {
            warn!(
                index,
                layer = context.layer_name,
                "Unparseable WKT, feature kept without geometry: {}",
                e
            );
            None
        }
    }
}
