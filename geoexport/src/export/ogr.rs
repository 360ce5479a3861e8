//! Implémentation GDAL/OGR du `LayerStore`

use gdal::errors::GdalError;
use gdal::vector::{
    FieldDefn, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType, ToGdal,
};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use tracing::debug;

use super::feature::{AttributeValue, ExportFeature};
use super::writer::{ExistingFileAction, LayerRequest, LayerSink, LayerStore, WriteError, WriteOptions};
use crate::config::{FieldDefinition, FieldKind, GeometryKind};

/// Store écrivant des fichiers vectoriels via les drivers GDAL
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalStore;

impl GdalStore {
    pub fn new() -> Self {
        Self
    }
}

impl LayerStore for GdalStore {
    fn open_layer<'a>(
        &'a self,
        request: &LayerRequest<'_>,
    ) -> Result<Box<dyn LayerSink + 'a>, WriteError> {
        let open_error = |reason: String| WriteError::Open {
            target: request.options.display_path.clone(),
            reason,
        };

        if let Some(parent) = request.options.target_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
            }
        }

        let sink = GdalSink::open(request).map_err(|e| open_error(e.to_string()))?;
        Ok(Box::new(sink))
    }
}

/// Couche GDAL ouverte ; le dataset est fermé au drop
struct GdalSink {
    dataset: Dataset,
    layer_name: String,
    transactional: bool,
}

impl GdalSink {
    fn open(request: &LayerRequest<'_>) -> Result<Self, GdalError> {
        let options = request.options;
        let mut dataset = open_dataset(options)?;

        if options.action == ExistingFileAction::AppendToLayer {
            let layer_name = dataset.layer_by_name(&options.layer_name)?.name();
            debug!(layer = %layer_name, "Appending to existing output layer");
            return Ok(Self {
                dataset,
                layer_name,
                transactional: options.driver.uses_transaction(),
            });
        }

        let mut creation_options: Vec<&str> =
            options.layer_options.iter().map(String::as_str).collect();
        if options.action == ExistingFileAction::CreateOrOverwriteLayer {
            creation_options.push("OVERWRITE=YES");
        }

        // Le driver peut ajuster le nom (ex: shapefile)
        let layer_name = {
            let layer = dataset.create_layer(LayerOptions {
                name: &options.layer_name,
                srs: Some(request.crs.spatial_ref()),
                ty: geometry_type(request.schema.geometry_type()),
                options: Some(creation_options.as_slice()),
            })?;

            for field in request.schema.fields() {
                field_defn(field)?.add_to_layer(&layer)?;
            }
            layer.name()
        };

        debug!(
            layer = %layer_name,
            fields = request.schema.len(),
            "Output layer created"
        );

        Ok(Self {
            dataset,
            layer_name,
            transactional: options.driver.uses_transaction(),
        })
    }
}

impl LayerSink for GdalSink {
    fn add_features(&mut self, features: &[ExportFeature]) -> Result<usize, WriteError> {
        let layer_name = self.layer_name.clone();
        let to_write_error = |e: GdalError| WriteError::Add {
            layer: layer_name.clone(),
            reason: e.to_string(),
        };

        if self.transactional {
            // Rollback automatique si la transaction est abandonnée
            let txn = self.dataset.start_transaction().map_err(to_write_error)?;
            let written = write_features(&txn, &self.layer_name, features).map_err(to_write_error)?;
            txn.commit().map_err(to_write_error)?;
            Ok(written)
        } else {
            write_features(&self.dataset, &self.layer_name, features).map_err(to_write_error)
        }
    }
}

/// Ouvre ou crée le fichier de sortie selon l'action demandée
fn open_dataset(options: &WriteOptions) -> Result<Dataset, GdalError> {
    let path = options.target_path.as_path();

    match options.action {
        ExistingFileAction::CreateOrOverwriteLayer | ExistingFileAction::AppendToLayer => {
            Dataset::open_ex(
                path,
                DatasetOptions {
                    open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_VECTOR,
                    ..Default::default()
                },
            )
        }
        ExistingFileAction::CreateOrOverwriteFile => {
            let driver = DriverManager::get_driver_by_name(options.driver.gdal_name())?;
            if path.exists() {
                debug!(path = %path.display(), "Replacing existing output file");
                driver.delete(path)?;
            }
            driver.create_vector_only(path)
        }
    }
}

fn write_features(
    dataset: &Dataset,
    layer_name: &str,
    features: &[ExportFeature],
) -> Result<usize, GdalError> {
    let layer = dataset.layer_by_name(layer_name)?;

    for export in features {
        let mut feature = gdal::vector::Feature::new(layer.defn())?;

        // Attributs dans l'ordre du schéma = ordre des champs de la couche
        for (idx, value) in export.attributes.iter().enumerate() {
            match value {
                AttributeValue::Null => feature.set_field_null(idx)?,
                AttributeValue::Integer(v) => feature.set_field_integer(idx, *v)?,
                AttributeValue::Double(v) => feature.set_field_double(idx, *v)?,
                AttributeValue::Text(v) => feature.set_field_string(idx, v)?,
            }
        }

        if let Some(geometry) = &export.geometry {
            feature.set_geometry(geometry.to_gdal()?)?;
        }

        feature.create(&layer)?;
    }

    Ok(features.len())
}

fn field_defn(field: &FieldDefinition) -> Result<FieldDefn, GdalError> {
    let kind = match field.kind {
        FieldKind::Integer => OGRFieldType::OFTInteger,
        FieldKind::Double => OGRFieldType::OFTReal,
        FieldKind::Text => OGRFieldType::OFTString,
    };

    let defn = FieldDefn::new(&field.name, kind)?;
    if let Some(length) = field.length {
        defn.set_width(length as i32);
    }
    if let Some(precision) = field.precision {
        defn.set_precision(precision as i32);
    }
    Ok(defn)
}

fn geometry_type(kind: GeometryKind) -> OGRwkbGeometryType::Type {
    match kind {
        GeometryKind::Point => OGRwkbGeometryType::wkbPoint,
        GeometryKind::LineString => OGRwkbGeometryType::wkbLineString,
        GeometryKind::Polygon => OGRwkbGeometryType::wkbPolygon,
        GeometryKind::MultiPoint => OGRwkbGeometryType::wkbMultiPoint,
        GeometryKind::MultiLineString => OGRwkbGeometryType::wkbMultiLineString,
        GeometryKind::MultiPolygon => OGRwkbGeometryType::wkbMultiPolygon,
        GeometryKind::Unknown => OGRwkbGeometryType::wkbUnknown,
    }
}
