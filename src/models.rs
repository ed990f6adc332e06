use serde::Serialize;
use uuid::Uuid;

/// A question that evidences a course outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedQuestion {
    pub question_id: Uuid,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkRow {
    pub student_id: Uuid,
    pub question_id: Uuid,
    pub marks: f64,
}

/// Target and level thresholds a course is graded against, all percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseCalibration {
    pub course_id: Uuid,
    pub batch_id: Uuid,
    pub target: f64,
    pub level1: f64,
    pub level2: f64,
    pub level3: f64,
}

impl CourseCalibration {
    pub fn is_consistent(&self) -> bool {
        let in_range = |value: f64| (0.0..=100.0).contains(&value);
        in_range(self.target)
            && in_range(self.level1)
            && in_range(self.level3)
            && self.level1 <= self.level2
            && self.level2 <= self.level3
    }
}

/// Student population boundary for course-level aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentScope {
    Section(Uuid),
    Batch(Uuid),
}

impl StudentScope {
    pub fn label(&self) -> String {
        match self {
            StudentScope::Section(id) => format!("section {id}"),
            StudentScope::Batch(_) => "batch".to_string(),
        }
    }
}

/// A CO-PO edge joined with the course and program that own the CO.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoPoEdge {
    pub co_id: Uuid,
    pub course_id: Uuid,
    pub program_id: Uuid,
    pub weight: i32,
}

/// An assessment and the questions it is marked on.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRef {
    pub id: Uuid,
    pub name: String,
    pub questions: Vec<MappedQuestion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramOutcomeRecord {
    pub program_id: Uuid,
    pub indirect_attainment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRef {
    pub id: Uuid,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSummary {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub code: String,
    pub name: String,
    pub program_name: String,
    pub batch_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// Discrete cohort attainment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum AttainmentLevel {
    None = 0,
    Low = 1,
    Moderate = 2,
    High = 3,
}

impl AttainmentLevel {
    pub const ALL: [AttainmentLevel; 4] = [
        AttainmentLevel::None,
        AttainmentLevel::Low,
        AttainmentLevel::Moderate,
        AttainmentLevel::High,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl From<AttainmentLevel> for u8 {
    fn from(level: AttainmentLevel) -> Self {
        level.value()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCoAttainment {
    pub co_id: Uuid,
    pub attainment_level: AttainmentLevel,
    pub percentage_meeting_target: f64,
    pub students_meeting_target: usize,
    pub total_students: usize,
}

impl CourseCoAttainment {
    pub fn empty(co_id: Uuid) -> Self {
        Self {
            co_id,
            attainment_level: AttainmentLevel::None,
            percentage_meeting_target: 0.0,
            students_meeting_target: 0,
            total_students: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoAttainment {
    pub po_id: Uuid,
    pub direct_attainment: f64,
    pub indirect_attainment: f64,
    pub overall_attainment: f64,
}

/// Marks summary for one assessment over a student population.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentStat {
    pub assessment_id: Uuid,
    pub name: String,
    pub max_score: f64,
    /// Mean total over students with at least one mark on the assessment.
    pub average_score: f64,
    pub students_scored: usize,
    pub student_count: usize,
}

/// Percentages applied to direct and indirect attainment. Not required to sum to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub direct: f64,
    pub indirect: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            direct: 70.0,
            indirect: 30.0,
        }
    }
}

/// Outcome metadata merged with its computed attainment, for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeAttainment<T> {
    pub code: String,
    pub description: String,
    #[serde(flatten)]
    pub attainment: T,
}
