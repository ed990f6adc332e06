use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use super::AttainmentCalculator;
use crate::error::CalcError;
use crate::models::{MappedQuestion, MarkRow};
use crate::store::AttainmentStore;

/// Percentage of available marks a student obtained on the given questions.
///
/// Only questions the student has a mark row for contribute their maximum to
/// the denominator; unscored questions are left out entirely rather than
/// counted as zero.
pub(crate) fn percentage_from_marks(questions: &[MappedQuestion], marks: &[MarkRow]) -> f64 {
    if questions.is_empty() || marks.is_empty() {
        return 0.0;
    }

    let max_by_question: HashMap<Uuid, f64> = questions
        .iter()
        .map(|question| (question.question_id, question.max_marks))
        .collect();

    let mut obtained = 0.0;
    let mut scored: HashSet<Uuid> = HashSet::new();
    for mark in marks {
        if !max_by_question.contains_key(&mark.question_id) {
            continue;
        }
        obtained += mark.marks;
        scored.insert(mark.question_id);
    }

    let available: f64 = questions
        .iter()
        .filter(|question| scored.contains(&question.question_id))
        .map(|question| question.max_marks)
        .sum();

    if available <= 0.0 {
        return 0.0;
    }

    obtained / available * 100.0
}

impl<S: AttainmentStore + 'static> AttainmentCalculator<S> {
    /// Tier 1: a student's attainment of one course outcome, as a percentage.
    pub async fn student_co_attainment(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        co_id: Uuid,
    ) -> Result<f64, CalcError> {
        let questions = self.store.questions_mapped_to_co(course_id, co_id).await?;
        if questions.is_empty() {
            debug!(%course_id, %co_id, "no questions mapped to outcome");
            return Ok(0.0);
        }

        let question_ids: Vec<Uuid> = questions.iter().map(|q| q.question_id).collect();
        let marks = self
            .store
            .marks_for_student(student_id, &question_ids)
            .await?;

        let percentage = percentage_from_marks(&questions, &marks);
        debug!(%student_id, %co_id, percentage, "student outcome attainment");
        Ok(percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(max_marks: f64) -> MappedQuestion {
        MappedQuestion {
            question_id: Uuid::new_v4(),
            max_marks,
        }
    }

    fn mark(question: &MappedQuestion, marks: f64) -> MarkRow {
        MarkRow {
            student_id: Uuid::nil(),
            question_id: question.question_id,
            marks,
        }
    }

    #[test]
    fn unscored_questions_leave_the_denominator() {
        let questions = vec![question(10.0), question(10.0), question(10.0)];
        let marks = vec![mark(&questions[0], 8.0), mark(&questions[2], 9.0)];

        let percentage = percentage_from_marks(&questions, &marks);
        assert!((percentage - 85.0).abs() < 1e-9);
    }

    #[test]
    fn single_attempt_reflects_only_that_question() {
        let questions = vec![question(5.0), question(10.0), question(20.0)];
        let marks = vec![mark(&questions[1], 4.0)];

        assert!((percentage_from_marks(&questions, &marks) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn no_marks_is_zero() {
        let questions = vec![question(10.0)];
        assert_eq!(percentage_from_marks(&questions, &[]), 0.0);
        assert_eq!(percentage_from_marks(&[], &[]), 0.0);
    }

    #[test]
    fn zero_max_marks_is_zero() {
        let questions = vec![question(0.0)];
        let marks = vec![mark(&questions[0], 0.0)];
        assert_eq!(percentage_from_marks(&questions, &marks), 0.0);
    }

    #[test]
    fn marks_for_unmapped_questions_are_ignored() {
        let questions = vec![question(10.0)];
        let stray = question(50.0);
        let marks = vec![mark(&questions[0], 5.0), mark(&stray, 50.0)];
        assert!((percentage_from_marks(&questions, &marks) - 50.0).abs() < 1e-9);
    }
}
