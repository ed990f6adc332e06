use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::AttainmentCalculator;
use crate::error::CalcError;
use crate::models::{AssessmentRef, AssessmentStat, MarkRow};
use crate::store::AttainmentStore;

fn summarise(
    assessment: &AssessmentRef,
    marks: &[&MarkRow],
    student_count: usize,
) -> AssessmentStat {
    let mut totals: HashMap<Uuid, f64> = HashMap::new();
    for mark in marks {
        *totals.entry(mark.student_id).or_default() += mark.marks;
    }

    let students_scored = totals.len();
    let average_score = if students_scored == 0 {
        0.0
    } else {
        let mut sums: Vec<(Uuid, f64)> = totals.into_iter().collect();
        sums.sort_by_key(|(student_id, _)| *student_id);
        sums.iter().map(|(_, total)| total).sum::<f64>() / students_scored as f64
    };

    AssessmentStat {
        assessment_id: assessment.id,
        name: assessment.name.clone(),
        max_score: assessment.questions.iter().map(|q| q.max_marks).sum(),
        average_score,
        students_scored,
        student_count,
    }
}

impl<S: AttainmentStore + 'static> AttainmentCalculator<S> {
    /// Average total, maximum and head counts for each assessment of a course.
    /// With a section, only that section's assessments and students count.
    pub async fn assessment_stats(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<AssessmentStat>, CalcError> {
        let calibration = self.calibration(course_id).await?;
        let students = self.population(&calibration, section_id).await?;
        let assessments = self
            .store
            .course_assessments(course_id, section_id)
            .await?;

        let mut owner: HashMap<Uuid, usize> = HashMap::new();
        for (position, assessment) in assessments.iter().enumerate() {
            for question in &assessment.questions {
                owner.insert(question.question_id, position);
            }
        }

        let mut marks: Vec<MarkRow> = Vec::new();
        if !students.is_empty() && !owner.is_empty() {
            let question_ids: Vec<Uuid> = assessments
                .iter()
                .flat_map(|assessment| assessment.questions.iter().map(|q| q.question_id))
                .collect();
            marks = self
                .store
                .marks_for_students(&students, &question_ids)
                .await?;
        }

        let mut by_assessment: Vec<Vec<&MarkRow>> = vec![Vec::new(); assessments.len()];
        for mark in &marks {
            if let Some(&position) = owner.get(&mark.question_id) {
                by_assessment[position].push(mark);
            }
        }

        debug!(
            %course_id,
            assessments = assessments.len(),
            students = students.len(),
            "assessment comparison"
        );

        Ok(assessments
            .iter()
            .zip(&by_assessment)
            .map(|(assessment, marks)| summarise(assessment, marks, students.len()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MappedQuestion;

    fn mid_term() -> AssessmentRef {
        AssessmentRef {
            id: Uuid::new_v4(),
            name: "Mid term".to_string(),
            questions: vec![
                MappedQuestion {
                    question_id: Uuid::new_v4(),
                    max_marks: 10.0,
                },
                MappedQuestion {
                    question_id: Uuid::new_v4(),
                    max_marks: 20.0,
                },
            ],
        }
    }

    #[test]
    fn averages_totals_of_students_with_marks() {
        let assessment = mid_term();
        let (q1, q2) = (
            assessment.questions[0].question_id,
            assessment.questions[1].question_id,
        );
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = [
            MarkRow {
                student_id: s1,
                question_id: q1,
                marks: 8.0,
            },
            MarkRow {
                student_id: s1,
                question_id: q2,
                marks: 16.0,
            },
            MarkRow {
                student_id: s2,
                question_id: q1,
                marks: 6.0,
            },
        ];
        let marks: Vec<&MarkRow> = rows.iter().collect();

        let stat = summarise(&assessment, &marks, 3);
        assert_eq!(stat.max_score, 30.0);
        assert_eq!(stat.students_scored, 2);
        assert_eq!(stat.student_count, 3);
        assert!((stat.average_score - 15.0).abs() < 1e-9);
    }

    #[test]
    fn unmarked_assessment_averages_zero() {
        let stat = summarise(&mid_term(), &[], 4);
        assert_eq!(stat.average_score, 0.0);
        assert_eq!(stat.students_scored, 0);
        assert_eq!(stat.student_count, 4);
    }
}
