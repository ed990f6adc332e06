use uuid::Uuid;

use crate::store::StoreError;

/// Failures of an attainment computation. Absent evidence is not an error; it
/// yields a zero result.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("store failure: {0}")]
    StoreFailure(#[from] StoreError),
    #[error("attainment worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl CalcError {
    pub fn course_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "course",
            id,
        }
    }

    pub fn outcome_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "program outcome",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CalcError::NotFound { .. })
    }
}
