//! Flux de résultats et rapport d'export
//!
//! Chaque jeu de données produit exactement un enregistrement JSON sur une
//! ligne, vidé immédiatement pour que l'appelant suive la progression.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Statut d'un jeu de données
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Processed,
    Failed,
}

/// Enregistrement émis pour un jeu de données
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub hash: String,
    pub status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportRecord {
    pub fn processed(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: ExportStatus::Processed,
            error: None,
        }
    }

    pub fn failed(hash: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: ExportStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Canal de sortie des résultats (JSON lines)
pub struct ResultStream<W: Write> {
    out: W,
    emitted: usize,
}

impl<W: Write> ResultStream<W> {
    pub fn new(out: W) -> Self {
        Self { out, emitted: 0 }
    }

    /// Écrit un enregistrement et vide le canal
    ///
    /// # Errors
    /// Une erreur ici signifie que l'appelant ne reçoit plus les résultats.
    pub fn emit(&mut self, record: &ExportRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.emitted += 1;
        Ok(())
    }

    /// Nombre d'enregistrements émis
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Échec d'un jeu de données
#[derive(Debug, Clone, Serialize)]
pub struct DatasetFailure {
    pub hash: String,
    pub message: String,
}

/// Rapport complet d'un export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Durée de l'export
    pub duration_secs: f64,

    /// Jeux de données écrits
    pub datasets_processed: usize,
    /// Jeux de données en échec
    pub datasets_failed: usize,
    /// Features écrites
    pub features_written: usize,
    /// Features abandonnées (attributs ou reprojection)
    pub features_dropped: usize,

    pub failures: Vec<DatasetFailure>,
}

impl ExportSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un jeu de données écrit
    pub fn record_processed(&mut self, written: usize, dropped: usize) {
        self.datasets_processed += 1;
        self.features_written += written;
        self.features_dropped += dropped;
    }

    /// Enregistre un jeu de données en échec
    pub fn record_failed(&mut self, hash: &str, message: &str) {
        self.datasets_failed += 1;
        self.failures.push(DatasetFailure {
            hash: hash.to_string(),
            message: message.to_string(),
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    pub fn total_datasets(&self) -> usize {
        self.datasets_processed + self.datasets_failed
    }

    /// Vrai si des jeux de données étaient présents mais qu'aucun n'a abouti
    pub fn nothing_processed(&self) -> bool {
        self.total_datasets() > 0 && self.datasets_processed == 0
    }

    /// Journalise le rapport (jamais sur stdout, réservé aux résultats)
    pub fn log(&self) {
        info!(
            duration_secs = format!("{:.2}", self.duration_secs),
            "Export finished: {}",
            self.summary()
        );

        for failure in self.failures.iter().take(20) {
            warn!(hash = %failure.hash, "Dataset failed: {}", failure.message);
        }
        if self.failures.len() > 20 {
            warn!("... and {} more failed datasets", self.failures.len() - 20);
        }

        if self.nothing_processed() {
            warn!(
                datasets = self.total_datasets(),
                "No dataset was exported successfully"
            );
        }
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} processed, {} failed, {} features written, {} dropped",
            self.datasets_processed,
            self.datasets_failed,
            self.features_written,
            self.features_dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let ok = serde_json::to_string(&ExportRecord::processed("a1")).unwrap();
        assert_eq!(ok, r#"{"hash":"a1","status":"processed"}"#);

        let ko = serde_json::to_string(&ExportRecord::failed("b2", "writer refused")).unwrap();
        assert_eq!(ko, r#"{"hash":"b2","status":"failed","error":"writer refused"}"#);
    }

    #[test]
    fn test_stream_one_line_per_record() {
        let mut stream = ResultStream::new(Vec::new());
        stream.emit(&ExportRecord::processed("a")).unwrap();
        stream.emit(&ExportRecord::failed("b", "boom")).unwrap();
        assert_eq!(stream.emitted(), 2);

        let out = String::from_utf8(stream.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""hash":"a""#));
        assert!(lines[1].contains(r#""status":"failed""#));
        assert!(out.ends_with('\n'));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_reports_broken_channel() {
        let mut stream = ResultStream::new(BrokenPipe);
        assert!(stream.emit(&ExportRecord::processed("a")).is_err());
        assert_eq!(stream.emitted(), 0);
    }

    #[test]
    fn test_summary_counters() {
        let mut summary = ExportSummary::new();
        summary.record_processed(10, 2);
        summary.record_failed("x", "no writer");
        summary.set_duration(Duration::from_millis(1500));

        assert_eq!(summary.total_datasets(), 2);
        assert_eq!(summary.features_written, 10);
        assert_eq!(summary.features_dropped, 2);
        assert_eq!(summary.failures[0].hash, "x");
        assert!((summary.duration_secs - 1.5).abs() < f64::EPSILON);
        assert!(!summary.nothing_processed());
        assert_eq!(
            summary.summary(),
            "1 processed, 1 failed, 10 features written, 2 dropped"
        );
    }

    #[test]
    fn test_nothing_processed() {
        let mut summary = ExportSummary::new();
        assert!(!summary.nothing_processed());

        summary.record_failed("x", "boom");
        assert!(summary.nothing_processed());
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut summary = ExportSummary::new();
        summary.record_processed(1, 0);
        summary.save_to_file(&path).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["datasets_processed"], 1);
    }

    #[test]
    fn test_log_reports_summary() {
        let mut summary = ExportSummary::new();
        summary.record_processed(3, 1);
        summary.record_failed("b2", "writer refused");

        let ((), logs) = crate::logging::capture::logs_of(|| summary.log());

        assert!(logs.contains("INFO - Export finished: 1 processed, 1 failed, 3 features written, 1 dropped"));
        assert!(logs.contains("WARNING - Dataset failed: writer refused"));
    }
}
