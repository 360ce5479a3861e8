//! Types d'erreurs pour le crate exportjob

use thiserror::Error;

/// Erreurs pouvant survenir lors du décodage d'une description de tâche
#[derive(Debug, Error)]
pub enum JobError {
    /// Erreur d'I/O lors de la lecture du canal d'entrée
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document qui n'a pas la forme attendue (JSON invalide, champ manquant, type incorrect)
    #[error("Malformed job document at line {line}, column {column}: {reason}")]
    Malformed {
        line: usize,
        column: usize,
        reason: String,
    },

    /// Document vide
    #[error("Empty job document")]
    Empty,
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return Self::Io(err.into());
        }
        Self::Malformed {
            line: err.line(),
            column: err.column(),
            reason: err.to_string(),
        }
    }
}

impl JobError {
    /// Vrai si l'entrée ne contenait rien à traiter
    pub fn is_empty_input(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
