use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use super::student::percentage_from_marks;
use super::AttainmentCalculator;
use crate::error::CalcError;
use crate::models::{
    AttainmentLevel, CourseCalibration, CourseCoAttainment, MarkRow, StudentScope,
};
use crate::store::AttainmentStore;

/// Maps the share of students meeting target onto a level. Thresholds are
/// inclusive and checked from the top, so a tie lands on the higher level.
pub fn classify_level(
    percentage_meeting_target: f64,
    calibration: &CourseCalibration,
) -> AttainmentLevel {
    if percentage_meeting_target >= calibration.level3 {
        AttainmentLevel::High
    } else if percentage_meeting_target >= calibration.level2 {
        AttainmentLevel::Moderate
    } else if percentage_meeting_target >= calibration.level1 {
        AttainmentLevel::Low
    } else {
        AttainmentLevel::None
    }
}

impl<S: AttainmentStore + 'static> AttainmentCalculator<S> {
    /// Tier 2: cohort attainment level for one course outcome, over the whole
    /// batch or a single section.
    pub async fn course_co_attainment(
        &self,
        co_id: Uuid,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<CourseCoAttainment, CalcError> {
        let calibration = self.calibration(course_id).await?;
        let students = self.population(&calibration, section_id).await?;
        self.attainment_for_population(co_id, &calibration, &students)
            .await
    }

    /// Tier 2 for every outcome of a course, ordered by outcome code.
    pub async fn course_co_attainments(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<CourseCoAttainment>, CalcError> {
        let calibration = self.calibration(course_id).await?;
        let students = self.population(&calibration, section_id).await?;
        let outcomes = self.store.course_outcomes(course_id).await?;

        let mut attainments = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            attainments.push(
                self.attainment_for_population(outcome.id, &calibration, &students)
                    .await?,
            );
        }
        Ok(attainments)
    }

    pub(super) async fn calibration(
        &self,
        course_id: Uuid,
    ) -> Result<CourseCalibration, CalcError> {
        let calibration = self
            .store
            .course_calibration(course_id)
            .await?
            .ok_or_else(|| CalcError::course_not_found(course_id))?;

        if !calibration.is_consistent() {
            warn!(
                %course_id,
                target = calibration.target,
                level1 = calibration.level1,
                level2 = calibration.level2,
                level3 = calibration.level3,
                "course calibration out of order or range"
            );
        }
        Ok(calibration)
    }

    pub(super) async fn population(
        &self,
        calibration: &CourseCalibration,
        section_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, CalcError> {
        let scope = match section_id {
            Some(id) => StudentScope::Section(id),
            None => StudentScope::Batch(calibration.batch_id),
        };
        Ok(self.store.students_in_scope(scope).await?)
    }

    async fn attainment_for_population(
        &self,
        co_id: Uuid,
        calibration: &CourseCalibration,
        students: &[Uuid],
    ) -> Result<CourseCoAttainment, CalcError> {
        if students.is_empty() {
            debug!(%co_id, course_id = %calibration.course_id, "no students in scope");
            return Ok(CourseCoAttainment::empty(co_id));
        }

        let questions = self
            .store
            .questions_mapped_to_co(calibration.course_id, co_id)
            .await?;

        let mut marks_by_student: HashMap<Uuid, Vec<MarkRow>> = HashMap::new();
        if !questions.is_empty() {
            let question_ids: Vec<Uuid> = questions.iter().map(|q| q.question_id).collect();
            for mark in self
                .store
                .marks_for_students(students, &question_ids)
                .await?
            {
                marks_by_student.entry(mark.student_id).or_default().push(mark);
            }
        }

        let students_meeting_target = students
            .iter()
            .map(|student_id| {
                let marks = marks_by_student
                    .get(student_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                percentage_from_marks(&questions, marks)
            })
            .filter(|&percentage| percentage >= calibration.target)
            .count();

        let total_students = students.len();
        let percentage_meeting_target =
            students_meeting_target as f64 / total_students as f64 * 100.0;
        let attainment_level = classify_level(percentage_meeting_target, calibration);

        debug!(
            %co_id,
            course_id = %calibration.course_id,
            students_meeting_target,
            total_students,
            level = attainment_level.value(),
            "course outcome attainment"
        );

        Ok(CourseCoAttainment {
            co_id,
            attainment_level,
            percentage_meeting_target,
            students_meeting_target,
            total_students,
        })
    }
}
