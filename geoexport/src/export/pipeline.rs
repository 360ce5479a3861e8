//! Orchestration d'un export
//!
//! Pour chaque jeu de données, dans l'ordre d'entrée :
//! CRS source -> transformation -> features -> écriture -> enregistrement.
//! Un jeu de données en échec (y compris un panic dans les bindings) produit
//! un enregistrement `failed` et la boucle continue.

use std::any::Any;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use exportjob::{Dataset, ExportPayload};

use super::crs::{Crs, CrsError, CrsResolver};
use super::feature::{DatasetContext, FeatureBuilder};
use super::ogr::GdalStore;
use super::reproject::{ReprojectError, TransformCache};
use super::writer::{
    DatasetWriter, LayerStore, OutputTarget, WriteError, WriteOptions, WrittenLayers,
};
use crate::config::Schema;
use crate::report::{ExportRecord, ExportSummary, ResultStream};

/// Erreur d'un jeu de données (le reste de l'export continue)
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Cannot build coordinate transform: {0}")]
    Transform(#[from] ReprojectError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Bilan d'un jeu de données écrit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub written: usize,
    pub dropped: usize,
}

/// Exporteur : possède le schéma, le store et les caches d'une session
pub struct Exporter<S: LayerStore = GdalStore> {
    schema: Schema,
    store: S,
    crs: CrsResolver,
    transforms: TransformCache,
}

impl Exporter<GdalStore> {
    /// Exporteur écrivant via GDAL
    pub fn with_gdal(schema: Schema, default_crs: &str) -> Result<Self, CrsError> {
        Self::new(schema, GdalStore::new(), default_crs)
    }
}

impl<S: LayerStore> Exporter<S> {
    /// # Errors
    /// Échoue si le CRS par défaut ne peut pas être résolu.
    pub fn new(schema: Schema, store: S, default_crs: &str) -> Result<Self, CrsError> {
        Ok(Self {
            schema,
            store,
            crs: CrsResolver::new(default_crs)?,
            transforms: TransformCache::new(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn crs_resolver(&self) -> &CrsResolver {
        &self.crs
    }

    pub fn transforms(&self) -> &TransformCache {
        &self.transforms
    }

    /// Exporte tous les jeux de données de la tâche.
    ///
    /// Un enregistrement est émis (et vidé) par jeu de données, dans l'ordre.
    ///
    /// # Errors
    /// Seule une erreur d'écriture sur le canal de résultats interrompt la boucle.
    pub fn run<W: Write>(
        &mut self,
        payload: ExportPayload,
        results: &mut ResultStream<W>,
    ) -> io::Result<ExportSummary> {
        let started = Instant::now();
        let target = OutputTarget::from_payload(&payload);
        let target_crs = self.crs.resolve(&payload.target_crs);

        if payload.merge {
            info!("Merge requested: datasets sharing a layer name are appended to it");
        }

        info!(
            datasets = payload.datasets.len(),
            driver = %target.driver,
            output = %target.output_dir.display(),
            target_crs = %target_crs.identity(),
            overwrite = target.overwrite,
            "Starting export"
        );

        let mut summary = ExportSummary::new();
        let mut written = WrittenLayers::new();

        for dataset in payload.datasets {
            let hash = dataset.hash.clone();
            let dataset_started = Instant::now();

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.export_dataset(dataset, &target, &target_crs, &mut written)
            }));
            let elapsed_ms = dataset_started.elapsed().as_millis() as u64;

            let record = match outcome {
                Ok(Ok(stats)) => {
                    summary.record_processed(stats.written, stats.dropped);
                    ExportRecord::processed(hash)
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    error!(hash = %hash, elapsed_ms, "Dataset export failed: {}", message);
                    summary.record_failed(&hash, &message);
                    ExportRecord::failed(hash, message)
                }
                Err(panic) => {
                    let message = format!("Unexpected failure: {}", panic_message(panic.as_ref()));
                    error!(hash = %hash, elapsed_ms, "Dataset export aborted: {}", message);
                    summary.record_failed(&hash, &message);
                    ExportRecord::failed(hash, message)
                }
            };

            results.emit(&record)?;
        }

        summary.set_duration(started.elapsed());
        summary.log();
        Ok(summary)
    }

    /// Exporte un jeu de données ; ses features sont libérées au retour.
    fn export_dataset(
        &mut self,
        mut dataset: Dataset,
        target: &OutputTarget,
        target_crs: &Crs,
        layers: &mut WrittenLayers,
    ) -> Result<DatasetStats, DatasetError> {
        let started = Instant::now();

        if dataset.declared_count_mismatch() {
            warn!(
                hash = %dataset.hash,
                declared = dataset.total_features,
                actual = dataset.features.len(),
                "Declared feature count differs from the features received"
            );
        }

        let source_crs = self.crs.resolve(&dataset.source_crs);
        let transform = self.transforms.transform_for(&source_crs, target_crs)?;

        let features = std::mem::take(&mut dataset.features);
        let total = features.len();
        let context = DatasetContext {
            source_path: &dataset.source_path,
            layer_name: &dataset.layer_name,
        };

        let builder = FeatureBuilder::new(&self.schema);
        let mut built = Vec::with_capacity(total);
        for (index, feature) in features.into_iter().enumerate() {
            match builder.build(index, feature, transform.as_deref(), &context) {
                Ok(feature) => built.push(feature),
                Err(failure) => {
                    error!(
                        hash = %dataset.hash,
                        index = failure.index,
                        properties = %failure.properties_json(),
                        "Feature dropped: {}",
                        failure.reason
                    );
                }
            }
        }
        let dropped = total - built.len();

        let mut options = WriteOptions::prepare(&dataset, target);
        layers.resolve(&mut options);
        let writer = DatasetWriter::new(&self.store, &self.schema);
        let written = writer.write(&options, &built, target_crs)?;
        layers.record(&options);

        info!(
            hash = %dataset.hash,
            source = %dataset.source_path,
            features = total,
            written,
            dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset exported"
        );

        Ok(DatasetStats { written, dropped })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with unknown payload".to_string()
    }
}
