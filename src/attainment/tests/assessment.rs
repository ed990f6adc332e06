use uuid::Uuid;

use super::common::{assert_close, Fixture};
use crate::error::CalcError;

/// Mid term in section A (10 + 20 marks) and a quiz in section B (10 marks).
fn two_sections() -> Fixture {
    let mut fixture = Fixture::new();
    let [r1, r2, r3] = fixture.three_students();
    let course = fixture.course_id;
    let (section_a, section_b) = (fixture.section_a, fixture.section_b);

    let mid_term = fixture.add_assessment(course, section_a, "Mid term");
    let q1 = fixture.add_question_to(mid_term, 10.0, &[]);
    let q2 = fixture.add_question_to(mid_term, 20.0, &[]);
    let quiz = fixture.add_assessment(course, section_b, "Quiz 1");
    let q3 = fixture.add_question_to(quiz, 10.0, &[]);

    fixture.score(r1, q1, 8.0);
    fixture.score(r1, q2, 16.0);
    fixture.score(r2, q1, 6.0);
    fixture.score(r3, q3, 7.0);
    fixture
}

#[tokio::test]
async fn batch_scope_compares_every_assessment() {
    let fixture = two_sections();

    let stats = fixture
        .calculator()
        .assessment_stats(fixture.course_id, None)
        .await
        .expect("assessment stats");

    let names: Vec<&str> = stats.iter().map(|stat| stat.name.as_str()).collect();
    assert_eq!(names, vec!["Mid term", "Quiz 1"]);

    assert_eq!(stats[0].max_score, 30.0);
    assert_close(stats[0].average_score, 15.0);
    assert_eq!(stats[0].students_scored, 2);
    assert_eq!(stats[0].student_count, 3);

    assert_eq!(stats[1].max_score, 10.0);
    assert_close(stats[1].average_score, 7.0);
    assert_eq!(stats[1].students_scored, 1);
}

#[tokio::test]
async fn section_scope_keeps_its_own_assessments_and_students() {
    let fixture = two_sections();

    let stats = fixture
        .calculator()
        .assessment_stats(fixture.course_id, Some(fixture.section_a))
        .await
        .expect("assessment stats");

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].name, "Mid term");
    assert_eq!(stats[0].student_count, 2);
    assert_close(stats[0].average_score, 15.0);
}

#[tokio::test]
async fn course_without_assessments_has_no_stats() {
    let mut fixture = Fixture::new();
    fixture.three_students();

    let stats = fixture
        .calculator()
        .assessment_stats(fixture.course_id, None)
        .await
        .expect("assessment stats");
    assert!(stats.is_empty());
}

#[tokio::test]
async fn unknown_course_is_not_found() {
    let fixture = Fixture::new();

    let err = fixture
        .calculator()
        .assessment_stats(Uuid::new_v4(), None)
        .await
        .expect_err("missing course");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn mark_read_failure_is_reported() {
    let fixture = two_sections();

    let err = fixture
        .failing_calculator()
        .assessment_stats(fixture.course_id, None)
        .await
        .expect_err("store failure");
    assert!(matches!(err, CalcError::StoreFailure(_)));
}
