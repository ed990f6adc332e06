use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AssessmentStat, AttainmentLevel, BlendWeights, CourseCoAttainment, CourseSummary,
    OutcomeAttainment, OutcomeRef, PoAttainment, ProgramSummary,
};

/// Pairs each outcome with its attainment, keeping the outcome order. Outcomes
/// without a computed attainment are dropped.
pub fn merge_outcomes<T>(
    outcomes: &[OutcomeRef],
    attainments: Vec<T>,
    id_of: impl Fn(&T) -> Uuid,
) -> Vec<OutcomeAttainment<T>> {
    let mut by_id: HashMap<Uuid, T> = attainments
        .into_iter()
        .map(|attainment| (id_of(&attainment), attainment))
        .collect();

    outcomes
        .iter()
        .filter_map(|outcome| {
            by_id.remove(&outcome.id).map(|attainment| OutcomeAttainment {
                code: outcome.code.clone(),
                description: outcome.description.clone(),
                attainment,
            })
        })
        .collect()
}

/// Number of course outcomes at each attainment level, indexed by level.
pub fn level_distribution(attainments: &[CourseCoAttainment]) -> [usize; 4] {
    let mut counts = [0usize; 4];
    for attainment in attainments {
        counts[attainment.attainment_level.value() as usize] += 1;
    }
    counts
}

fn write_course_header(
    output: &mut String,
    title: &str,
    course: &CourseSummary,
    scope: &str,
    generated_at: DateTime<Utc>,
) {
    let _ = writeln!(output, "# {}", title);
    let _ = writeln!(output, "{} ({})", course.name, course.code);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Program: {}", course.program_name);
    let _ = writeln!(output, "- Batch: {}", course.batch_name);
    let _ = writeln!(output, "- Scope: {}", scope);
    let _ = writeln!(output, "- Generated at: {}", generated_at.to_rfc3339());
    let _ = writeln!(output);
}

pub fn build_course_report(
    course: &CourseSummary,
    scope: &str,
    rows: &[OutcomeAttainment<CourseCoAttainment>],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    write_course_header(
        &mut output,
        "Course Outcome Attainment Report",
        course,
        scope,
        generated_at,
    );
    let _ = writeln!(output, "## Outcomes");

    if rows.is_empty() {
        let _ = writeln!(output, "No course outcomes defined for this course.");
        return output;
    }

    let _ = writeln!(
        output,
        "| CO | Description | Level | % Meeting Target | Meeting | Students |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for row in rows {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} | {} | {} |",
            row.code,
            row.description,
            row.attainment.attainment_level.value(),
            row.attainment.percentage_meeting_target,
            row.attainment.students_meeting_target,
            row.attainment.total_students
        );
    }

    let attainments: Vec<CourseCoAttainment> =
        rows.iter().map(|row| row.attainment.clone()).collect();
    let counts = level_distribution(&attainments);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Level Distribution");
    for level in AttainmentLevel::ALL.iter().rev() {
        let _ = writeln!(
            output,
            "- Level {}: {} outcomes",
            level.value(),
            counts[level.value() as usize]
        );
    }

    output
}

pub fn build_assessment_report(
    course: &CourseSummary,
    scope: &str,
    stats: &[AssessmentStat],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    write_course_header(
        &mut output,
        "Assessment Comparison Report",
        course,
        scope,
        generated_at,
    );
    let _ = writeln!(output, "## Assessments");

    if stats.is_empty() {
        let _ = writeln!(output, "No assessments recorded for this scope.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Assessment | Max Score | Average Score | Average % | Scored | Students |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for stat in stats {
        let percent = if stat.max_score > 0.0 {
            stat.average_score / stat.max_score * 100.0
        } else {
            0.0
        };
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} | {:.2} | {} | {} |",
            stat.name,
            stat.max_score,
            stat.average_score,
            percent,
            stat.students_scored,
            stat.student_count
        );
    }

    output
}

pub fn build_program_report(
    program: &ProgramSummary,
    weights: BlendWeights,
    rows: &[OutcomeAttainment<PoAttainment>],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Program Outcome Attainment Report");
    let _ = writeln!(output, "{} ({})", program.name, program.code);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "- Blend: {:.0}% direct, {:.0}% indirect",
        weights.direct, weights.indirect
    );
    let _ = writeln!(output, "- Generated at: {}", generated_at.to_rfc3339());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcomes");

    if rows.is_empty() {
        let _ = writeln!(output, "No program outcomes defined for this program.");
        return output;
    }

    let _ = writeln!(output, "| PO | Description | Direct | Indirect | Overall |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for row in rows {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2} | {:.2} | {:.2} |",
            row.code,
            row.description,
            row.attainment.direct_attainment,
            row.attainment.indirect_attainment,
            row.attainment.overall_attainment
        );
    }

    let mean = rows
        .iter()
        .map(|row| row.attainment.overall_attainment)
        .sum::<f64>()
        / rows.len() as f64;
    let _ = writeln!(output);
    let _ = writeln!(output, "Mean overall attainment: {:.2}", mean);

    output
}
