use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AssessmentRef, CoPoEdge, CourseCalibration, CourseSummary, MappedQuestion, MarkRow, OutcomeRef,
    ProgramOutcomeRecord, ProgramSummary, StudentScope,
};
use crate::store::{AttainmentStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRow {
    pub id: Uuid,
    pub program_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRow {
    pub id: Uuid,
    pub roll_no: String,
    pub batch_id: Uuid,
    #[serde(default)]
    pub section_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRow {
    pub id: Uuid,
    pub program_id: Uuid,
    pub batch_id: Uuid,
    pub code: String,
    pub name: String,
    pub target: f64,
    pub level1: f64,
    pub level2: f64,
    pub level3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOutcomeRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramOutcomeRow {
    pub id: Uuid,
    pub program_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub indirect_attainment: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub section_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCoRow {
    pub question_id: Uuid,
    pub co_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkScoreRow {
    pub student_id: Uuid,
    pub question_id: Uuid,
    pub marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoPoRow {
    pub co_id: Uuid,
    pub po_id: Uuid,
    pub level: i32,
}

/// Serialized form of every table the calculator reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub programs: Vec<ProgramRow>,
    pub batches: Vec<BatchRow>,
    pub students: Vec<StudentRow>,
    pub courses: Vec<CourseRow>,
    pub course_outcomes: Vec<CourseOutcomeRow>,
    pub program_outcomes: Vec<ProgramOutcomeRow>,
    pub assessments: Vec<AssessmentRow>,
    pub questions: Vec<QuestionRow>,
    pub question_co_mappings: Vec<QuestionCoRow>,
    pub marks: Vec<MarkScoreRow>,
    pub co_po_mappings: Vec<CoPoRow>,
}

type Index = HashMap<Uuid, Vec<usize>>;

fn index_by<T>(rows: &[T], key: impl Fn(&T) -> Uuid) -> Index {
    let mut index: Index = HashMap::new();
    for (position, row) in rows.iter().enumerate() {
        index.entry(key(row)).or_default().push(position);
    }
    index
}

fn unique_by<T>(rows: &[T], key: impl Fn(&T) -> Uuid) -> HashMap<Uuid, usize> {
    rows.iter()
        .enumerate()
        .map(|(position, row)| (key(row), position))
        .collect()
}

/// In-memory store over a [`Snapshot`], indexed by primary and foreign keys.
pub struct SnapshotStore {
    data: Snapshot,
    programs: HashMap<Uuid, usize>,
    batches: HashMap<Uuid, usize>,
    courses: HashMap<Uuid, usize>,
    course_outcomes: HashMap<Uuid, usize>,
    program_outcomes: HashMap<Uuid, usize>,
    assessments: HashMap<Uuid, usize>,
    students_by_section: Index,
    students_by_batch: Index,
    outcomes_by_course: Index,
    outcomes_by_program: Index,
    assessments_by_course: Index,
    questions_by_assessment: Index,
    questions_by_co: Index,
    marks_by_student: Index,
    co_po_by_po: Index,
}

impl SnapshotStore {
    pub fn new(data: Snapshot) -> Self {
        let questions = unique_by(&data.questions, |row| row.id);

        let mut questions_by_co: Index = HashMap::new();
        for mapping in &data.question_co_mappings {
            if let Some(&position) = questions.get(&mapping.question_id) {
                questions_by_co.entry(mapping.co_id).or_default().push(position);
            }
        }

        let mut students_by_section: Index = HashMap::new();
        for (position, student) in data.students.iter().enumerate() {
            if let Some(section_id) = student.section_id {
                students_by_section.entry(section_id).or_default().push(position);
            }
        }

        Self {
            programs: unique_by(&data.programs, |row| row.id),
            batches: unique_by(&data.batches, |row| row.id),
            courses: unique_by(&data.courses, |row| row.id),
            course_outcomes: unique_by(&data.course_outcomes, |row| row.id),
            program_outcomes: unique_by(&data.program_outcomes, |row| row.id),
            assessments: unique_by(&data.assessments, |row| row.id),
            students_by_section,
            students_by_batch: index_by(&data.students, |row| row.batch_id),
            outcomes_by_course: index_by(&data.course_outcomes, |row| row.course_id),
            outcomes_by_program: index_by(&data.program_outcomes, |row| row.program_id),
            assessments_by_course: index_by(&data.assessments, |row| row.course_id),
            questions_by_assessment: index_by(&data.questions, |row| row.assessment_id),
            questions_by_co,
            marks_by_student: index_by(&data.marks, |row| row.student_id),
            co_po_by_po: index_by(&data.co_po_mappings, |row| row.po_id),
            data,
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let data: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("invalid snapshot {}", path.display()))?;
        Ok(Self::new(data))
    }

    fn course(&self, id: Uuid) -> Option<&CourseRow> {
        self.courses.get(&id).map(|&position| &self.data.courses[position])
    }

    fn question_course(&self, question: &QuestionRow) -> Option<Uuid> {
        self.assessments
            .get(&question.assessment_id)
            .map(|&position| self.data.assessments[position].course_id)
    }

    fn marks_matching(&self, student_id: Uuid, wanted: &HashSet<Uuid>) -> Vec<MarkRow> {
        let mut rows: Vec<MarkRow> = self
            .marks_by_student
            .get(&student_id)
            .into_iter()
            .flatten()
            .map(|&position| &self.data.marks[position])
            .filter(|mark| wanted.contains(&mark.question_id))
            .map(|mark| MarkRow {
                student_id: mark.student_id,
                question_id: mark.question_id,
                marks: mark.marks,
            })
            .collect();
        rows.sort_by_key(|row| row.question_id);
        rows
    }

    fn outcome_refs<'a>(
        rows: impl Iterator<Item = (Uuid, &'a str, &'a str)>,
    ) -> Vec<OutcomeRef> {
        let mut refs: Vec<OutcomeRef> = rows
            .map(|(id, code, description)| OutcomeRef {
                id,
                code: code.to_string(),
                description: description.to_string(),
            })
            .collect();
        refs.sort_by(|a, b| a.code.cmp(&b.code).then(a.id.cmp(&b.id)));
        refs
    }
}

#[async_trait]
impl AttainmentStore for SnapshotStore {
    async fn questions_mapped_to_co(
        &self,
        course_id: Uuid,
        co_id: Uuid,
    ) -> Result<Vec<MappedQuestion>, StoreError> {
        let mut questions: Vec<MappedQuestion> = self
            .questions_by_co
            .get(&co_id)
            .into_iter()
            .flatten()
            .map(|&position| &self.data.questions[position])
            .filter(|question| self.question_course(question) == Some(course_id))
            .map(|question| MappedQuestion {
                question_id: question.id,
                max_marks: question.max_marks,
            })
            .collect();
        questions.sort_by_key(|question| question.question_id);
        questions.dedup_by_key(|question| question.question_id);
        Ok(questions)
    }

    async fn marks_for_student(
        &self,
        student_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        let wanted: HashSet<Uuid> = question_ids.iter().copied().collect();
        Ok(self.marks_matching(student_id, &wanted))
    }

    async fn marks_for_students(
        &self,
        student_ids: &[Uuid],
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        let wanted: HashSet<Uuid> = question_ids.iter().copied().collect();
        let mut students = student_ids.to_vec();
        students.sort();
        students.dedup();
        Ok(students
            .into_iter()
            .flat_map(|student_id| self.marks_matching(student_id, &wanted))
            .collect())
    }

    async fn course_calibration(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseCalibration>, StoreError> {
        Ok(self.course(course_id).map(|course| CourseCalibration {
            course_id: course.id,
            batch_id: course.batch_id,
            target: course.target,
            level1: course.level1,
            level2: course.level2,
            level3: course.level3,
        }))
    }

    async fn students_in_scope(&self, scope: StudentScope) -> Result<Vec<Uuid>, StoreError> {
        let positions = match scope {
            StudentScope::Section(id) => self.students_by_section.get(&id),
            StudentScope::Batch(id) => self.students_by_batch.get(&id),
        };
        let mut students: Vec<&StudentRow> = positions
            .into_iter()
            .flatten()
            .map(|&position| &self.data.students[position])
            .collect();
        students.sort_by(|a, b| a.roll_no.cmp(&b.roll_no).then(a.id.cmp(&b.id)));
        Ok(students.into_iter().map(|student| student.id).collect())
    }

    async fn co_po_mappings(&self, po_id: Uuid) -> Result<Vec<CoPoEdge>, StoreError> {
        let mut edges = Vec::new();
        for &position in self.co_po_by_po.get(&po_id).into_iter().flatten() {
            let mapping = &self.data.co_po_mappings[position];
            let Some(outcome) = self
                .course_outcomes
                .get(&mapping.co_id)
                .map(|&position| &self.data.course_outcomes[position])
            else {
                continue;
            };
            let Some(course) = self.course(outcome.course_id) else {
                continue;
            };
            edges.push((
                course.code.as_str(),
                outcome.code.as_str(),
                CoPoEdge {
                    co_id: outcome.id,
                    course_id: course.id,
                    program_id: course.program_id,
                    weight: mapping.level,
                },
            ));
        }
        edges.sort_by(|a, b| (a.0, a.1, a.2.co_id).cmp(&(b.0, b.1, b.2.co_id)));
        Ok(edges.into_iter().map(|(_, _, edge)| edge).collect())
    }

    async fn program_outcome(
        &self,
        po_id: Uuid,
    ) -> Result<Option<ProgramOutcomeRecord>, StoreError> {
        Ok(self.program_outcomes.get(&po_id).map(|&position| {
            let row = &self.data.program_outcomes[position];
            ProgramOutcomeRecord {
                program_id: row.program_id,
                indirect_attainment: row.indirect_attainment,
            }
        }))
    }

    async fn course_assessments(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<AssessmentRef>, StoreError> {
        let mut assessments: Vec<&AssessmentRow> = self
            .assessments_by_course
            .get(&course_id)
            .into_iter()
            .flatten()
            .map(|&position| &self.data.assessments[position])
            .filter(|row| section_id.map_or(true, |section| row.section_id == section))
            .collect();
        assessments.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(assessments
            .into_iter()
            .map(|assessment| {
                let mut questions: Vec<MappedQuestion> = self
                    .questions_by_assessment
                    .get(&assessment.id)
                    .into_iter()
                    .flatten()
                    .map(|&position| &self.data.questions[position])
                    .map(|question| MappedQuestion {
                        question_id: question.id,
                        max_marks: question.max_marks,
                    })
                    .collect();
                questions.sort_by_key(|question| question.question_id);
                AssessmentRef {
                    id: assessment.id,
                    name: assessment.name.clone(),
                    questions,
                }
            })
            .collect())
    }

    async fn course_outcomes(&self, course_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        Ok(Self::outcome_refs(
            self.outcomes_by_course
                .get(&course_id)
                .into_iter()
                .flatten()
                .map(|&position| &self.data.course_outcomes[position])
                .map(|row| (row.id, row.code.as_str(), row.description.as_str())),
        ))
    }

    async fn program_outcomes(&self, program_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        Ok(Self::outcome_refs(
            self.outcomes_by_program
                .get(&program_id)
                .into_iter()
                .flatten()
                .map(|&position| &self.data.program_outcomes[position])
                .map(|row| (row.id, row.code.as_str(), row.description.as_str())),
        ))
    }

    async fn course_summary(&self, course_id: Uuid) -> Result<Option<CourseSummary>, StoreError> {
        Ok(self.course(course_id).map(|course| {
            let program_name = self
                .programs
                .get(&course.program_id)
                .map(|&position| self.data.programs[position].name.clone())
                .unwrap_or_default();
            let batch_name = self
                .batches
                .get(&course.batch_id)
                .map(|&position| self.data.batches[position].name.clone())
                .unwrap_or_default();
            CourseSummary {
                id: course.id,
                batch_id: course.batch_id,
                code: course.code.clone(),
                name: course.name.clone(),
                program_name,
                batch_name,
            }
        }))
    }

    async fn program_summary(
        &self,
        program_id: Uuid,
    ) -> Result<Option<ProgramSummary>, StoreError> {
        Ok(self.programs.get(&program_id).map(|&position| {
            let row = &self.data.programs[position];
            ProgramSummary {
                id: row.id,
                code: row.code.clone(),
                name: row.name.clone(),
            }
        }))
    }
}
