use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AssessmentRef, CoPoEdge, CourseCalibration, CourseSummary, MappedQuestion, MarkRow,
    OutcomeRef, ProgramOutcomeRecord, ProgramSummary, StudentScope,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only view of the OBE tables the attainment calculator depends on.
///
/// List results must come back in a stable order; the calculator sums floats
/// in the order rows arrive.
#[async_trait]
pub trait AttainmentStore: Send + Sync {
    /// Questions of any assessment of `course_id` that map to `co_id`.
    async fn questions_mapped_to_co(
        &self,
        course_id: Uuid,
        co_id: Uuid,
    ) -> Result<Vec<MappedQuestion>, StoreError>;

    async fn marks_for_student(
        &self,
        student_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError>;

    /// Batched form of [`AttainmentStore::marks_for_student`] for a whole population.
    async fn marks_for_students(
        &self,
        student_ids: &[Uuid],
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError>;

    async fn course_calibration(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseCalibration>, StoreError>;

    async fn students_in_scope(&self, scope: StudentScope) -> Result<Vec<Uuid>, StoreError>;

    async fn co_po_mappings(&self, po_id: Uuid) -> Result<Vec<CoPoEdge>, StoreError>;

    async fn program_outcome(
        &self,
        po_id: Uuid,
    ) -> Result<Option<ProgramOutcomeRecord>, StoreError>;

    /// Assessments of a course with their questions, limited to one section
    /// when `section_id` is given.
    async fn course_assessments(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<AssessmentRef>, StoreError>;

    async fn course_outcomes(&self, course_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError>;

    async fn program_outcomes(&self, program_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError>;

    async fn course_summary(&self, course_id: Uuid) -> Result<Option<CourseSummary>, StoreError>;

    async fn program_summary(
        &self,
        program_id: Uuid,
    ) -> Result<Option<ProgramSummary>, StoreError>;
}
