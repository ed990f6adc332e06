use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::attainment::AttainmentCalculator;
use crate::models::{
    AssessmentRef, CoPoEdge, CourseCalibration, CourseSummary, MappedQuestion, MarkRow, OutcomeRef,
    ProgramOutcomeRecord, ProgramSummary, StudentScope,
};
use crate::snapshot::{
    AssessmentRow, BatchRow, CoPoRow, CourseOutcomeRow, CourseRow, MarkScoreRow, ProgramOutcomeRow,
    ProgramRow, QuestionCoRow, QuestionRow, Snapshot, SnapshotStore, StudentRow,
};
use crate::store::{AttainmentStore, StoreError};

/// One program, one batch with sections A and B, and a course calibrated at
/// target 60 with levels 40/60/80.
pub(super) struct Fixture {
    pub snapshot: Snapshot,
    pub program_id: Uuid,
    pub batch_id: Uuid,
    pub section_a: Uuid,
    pub section_b: Uuid,
    pub course_id: Uuid,
    assessments: Vec<(Uuid, Uuid)>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut fixture = Self {
            snapshot: Snapshot::default(),
            program_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            section_a: Uuid::new_v4(),
            section_b: Uuid::new_v4(),
            course_id: Uuid::nil(),
            assessments: Vec::new(),
        };

        fixture.snapshot.programs.push(ProgramRow {
            id: fixture.program_id,
            code: "BE_ECE".to_string(),
            name: "Bachelor of Engineering in Electronics and Communication".to_string(),
        });
        fixture.snapshot.batches.push(BatchRow {
            id: fixture.batch_id,
            program_id: fixture.program_id,
            name: "2025-2029".to_string(),
        });
        fixture.course_id = fixture.add_course(fixture.program_id, "EC101");
        fixture
    }

    pub fn add_course(&mut self, program_id: Uuid, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.courses.push(CourseRow {
            id,
            program_id,
            batch_id: self.batch_id,
            code: code.to_string(),
            name: format!("Course {code}"),
            target: 60.0,
            level1: 40.0,
            level2: 60.0,
            level3: 80.0,
        });
        id
    }

    pub fn set_target(&mut self, course_id: Uuid, target: f64) {
        if let Some(course) = self
            .snapshot
            .courses
            .iter_mut()
            .find(|course| course.id == course_id)
        {
            course.target = target;
        }
    }

    pub fn add_program(&mut self, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.programs.push(ProgramRow {
            id,
            code: code.to_string(),
            name: format!("Program {code}"),
        });
        id
    }

    pub fn add_student(&mut self, roll_no: &str, section_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.students.push(StudentRow {
            id,
            roll_no: roll_no.to_string(),
            batch_id: self.batch_id,
            section_id: Some(section_id),
        });
        id
    }

    pub fn add_outcome(&mut self, course_id: Uuid, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.course_outcomes.push(CourseOutcomeRow {
            id,
            course_id,
            code: code.to_string(),
            description: format!("Outcome {code}"),
        });
        id
    }

    fn assessment_for(&mut self, course_id: Uuid) -> Uuid {
        if let Some((_, id)) = self
            .assessments
            .iter()
            .find(|(course, _)| *course == course_id)
        {
            return *id;
        }
        let section = self.section_a;
        let id = self.add_assessment(course_id, section, "Mid term");
        self.assessments.push((course_id, id));
        id
    }

    pub fn add_assessment(&mut self, course_id: Uuid, section_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.assessments.push(AssessmentRow {
            id,
            course_id,
            section_id,
            name: name.to_string(),
        });
        id
    }

    pub fn add_question(&mut self, course_id: Uuid, max_marks: f64, outcomes: &[Uuid]) -> Uuid {
        let assessment_id = self.assessment_for(course_id);
        self.add_question_to(assessment_id, max_marks, outcomes)
    }

    pub fn add_question_to(
        &mut self,
        assessment_id: Uuid,
        max_marks: f64,
        outcomes: &[Uuid],
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.questions.push(QuestionRow {
            id,
            assessment_id,
            max_marks,
        });
        for &co_id in outcomes {
            self.snapshot.question_co_mappings.push(QuestionCoRow {
                question_id: id,
                co_id,
            });
        }
        id
    }

    pub fn score(&mut self, student_id: Uuid, question_id: Uuid, marks: f64) {
        self.snapshot.marks.push(MarkScoreRow {
            student_id,
            question_id,
            marks,
        });
    }

    pub fn add_program_outcome(
        &mut self,
        program_id: Uuid,
        code: &str,
        indirect_attainment: Option<f64>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.snapshot.program_outcomes.push(ProgramOutcomeRow {
            id,
            program_id,
            code: code.to_string(),
            description: format!("Program outcome {code}"),
            indirect_attainment,
        });
        id
    }

    pub fn map_co_po(&mut self, co_id: Uuid, po_id: Uuid, level: i32) {
        self.snapshot.co_po_mappings.push(CoPoRow {
            co_id,
            po_id,
            level,
        });
    }

    /// Three students at 75%, 55% and 90% on a single 100-mark question for
    /// `co_id`: two of three meet target 60, which is level 2.
    pub fn level_two_outcome(&mut self, course_id: Uuid, code: &str) -> Uuid {
        let co_id = self.add_outcome(course_id, code);
        let question = self.add_question(course_id, 100.0, &[co_id]);
        for (roll_no, marks) in [("R1", 75.0), ("R2", 55.0), ("R3", 90.0)] {
            let student = self.student_by_roll(roll_no);
            self.score(student, question, marks);
        }
        co_id
    }

    /// Every student at 100% on a fresh question for a new outcome: level 3.
    pub fn level_three_outcome(&mut self, course_id: Uuid, code: &str) -> Uuid {
        let co_id = self.add_outcome(course_id, code);
        let question = self.add_question(course_id, 10.0, &[co_id]);
        let students: Vec<Uuid> = self.snapshot.students.iter().map(|s| s.id).collect();
        for student in students {
            self.score(student, question, 10.0);
        }
        co_id
    }

    pub fn three_students(&mut self) -> [Uuid; 3] {
        [
            self.add_student("R1", self.section_a),
            self.add_student("R2", self.section_a),
            self.add_student("R3", self.section_b),
        ]
    }

    fn student_by_roll(&mut self, roll_no: &str) -> Uuid {
        if let Some(student) = self
            .snapshot
            .students
            .iter()
            .find(|student| student.roll_no == roll_no)
        {
            return student.id;
        }
        let section = self.section_a;
        self.add_student(roll_no, section)
    }

    pub fn calculator(&self) -> AttainmentCalculator<SnapshotStore> {
        AttainmentCalculator::new(Arc::new(SnapshotStore::new(self.snapshot.clone())))
    }

    pub fn failing_calculator(&self) -> AttainmentCalculator<FailingMarksStore> {
        AttainmentCalculator::new(Arc::new(FailingMarksStore {
            inner: SnapshotStore::new(self.snapshot.clone()),
        }))
    }
}

pub(super) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// Serves everything from a snapshot except mark rows, which fail as if the
/// connection pool timed out.
pub(super) struct FailingMarksStore {
    inner: SnapshotStore,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl AttainmentStore for FailingMarksStore {
    async fn questions_mapped_to_co(
        &self,
        course_id: Uuid,
        co_id: Uuid,
    ) -> Result<Vec<MappedQuestion>, StoreError> {
        self.inner.questions_mapped_to_co(course_id, co_id).await
    }

    async fn marks_for_student(
        &self,
        _student_id: Uuid,
        _question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        Err(unavailable())
    }

    async fn marks_for_students(
        &self,
        _student_ids: &[Uuid],
        _question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        Err(unavailable())
    }

    async fn course_calibration(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseCalibration>, StoreError> {
        self.inner.course_calibration(course_id).await
    }

    async fn students_in_scope(&self, scope: StudentScope) -> Result<Vec<Uuid>, StoreError> {
        self.inner.students_in_scope(scope).await
    }

    async fn co_po_mappings(&self, po_id: Uuid) -> Result<Vec<CoPoEdge>, StoreError> {
        self.inner.co_po_mappings(po_id).await
    }

    async fn program_outcome(
        &self,
        po_id: Uuid,
    ) -> Result<Option<ProgramOutcomeRecord>, StoreError> {
        self.inner.program_outcome(po_id).await
    }

    async fn course_assessments(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<AssessmentRef>, StoreError> {
        self.inner.course_assessments(course_id, section_id).await
    }

    async fn course_outcomes(&self, course_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        self.inner.course_outcomes(course_id).await
    }

    async fn program_outcomes(&self, program_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        self.inner.program_outcomes(program_id).await
    }

    async fn course_summary(&self, course_id: Uuid) -> Result<Option<CourseSummary>, StoreError> {
        self.inner.course_summary(course_id).await
    }

    async fn program_summary(
        &self,
        program_id: Uuid,
    ) -> Result<Option<ProgramSummary>, StoreError> {
        self.inner.program_summary(program_id).await
    }
}
