use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::models::{
    AssessmentRef, CoPoEdge, CourseCalibration, CourseSummary, MappedQuestion, MarkRow, OutcomeRef,
    ProgramOutcomeRecord, ProgramSummary, StudentScope,
};
use crate::store::{AttainmentStore, StoreError};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed implementation of [`AttainmentStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn mark_row(row: &PgRow) -> Result<MarkRow, sqlx::Error> {
    Ok(MarkRow {
        student_id: row.try_get("student_id")?,
        question_id: row.try_get("question_id")?,
        marks: row.try_get("marks")?,
    })
}

fn outcome_ref(row: &PgRow) -> Result<OutcomeRef, sqlx::Error> {
    Ok(OutcomeRef {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl AttainmentStore for PgStore {
    async fn questions_mapped_to_co(
        &self,
        course_id: Uuid,
        co_id: Uuid,
    ) -> Result<Vec<MappedQuestion>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT q.id, q.max_marks
            FROM obe.assessment_questions q
            JOIN obe.assessments a ON a.id = q.assessment_id
            JOIN obe.question_co_mappings m ON m.question_id = q.id
            WHERE a.course_id = $1 AND m.co_id = $2
            ORDER BY q.id
            "#,
        )
        .bind(course_id)
        .bind(co_id)
        .fetch_all(&self.pool)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(MappedQuestion {
                question_id: row.try_get("id")?,
                max_marks: row.try_get("max_marks")?,
            });
        }
        Ok(questions)
    }

    async fn marks_for_student(
        &self,
        student_id: Uuid,
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, question_id, marks
            FROM obe.mark_scores
            WHERE student_id = $1 AND question_id = ANY($2)
            ORDER BY question_id
            "#,
        )
        .bind(student_id)
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(mark_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn marks_for_students(
        &self,
        student_ids: &[Uuid],
        question_ids: &[Uuid],
    ) -> Result<Vec<MarkRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, question_id, marks
            FROM obe.mark_scores
            WHERE student_id = ANY($1) AND question_id = ANY($2)
            ORDER BY student_id, question_id
            "#,
        )
        .bind(student_ids)
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(mark_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn course_calibration(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseCalibration>, StoreError> {
        let row = sqlx::query(
            "SELECT id, batch_id, target, level1, level2, level3 FROM obe.courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CourseCalibration {
            course_id: row.try_get("id")?,
            batch_id: row.try_get("batch_id")?,
            target: row.try_get("target")?,
            level1: row.try_get("level1")?,
            level2: row.try_get("level2")?,
            level3: row.try_get("level3")?,
        }))
    }

    async fn students_in_scope(&self, scope: StudentScope) -> Result<Vec<Uuid>, StoreError> {
        let (query, id) = match scope {
            StudentScope::Section(id) => (
                "SELECT id FROM obe.students WHERE section_id = $1 ORDER BY roll_no, id",
                id,
            ),
            StudentScope::Batch(id) => (
                "SELECT id FROM obe.students WHERE batch_id = $1 ORDER BY roll_no, id",
                id,
            ),
        };

        let rows = sqlx::query(query).bind(id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn co_po_mappings(&self, po_id: Uuid) -> Result<Vec<CoPoEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT m.co_id, co.course_id, c.program_id, m.level
            FROM obe.co_po_mappings m
            JOIN obe.course_outcomes co ON co.id = m.co_id
            JOIN obe.courses c ON c.id = co.course_id
            WHERE m.po_id = $1
            ORDER BY c.code, co.code, m.co_id
            "#,
        )
        .bind(po_id)
        .fetch_all(&self.pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push(CoPoEdge {
                co_id: row.try_get("co_id")?,
                course_id: row.try_get("course_id")?,
                program_id: row.try_get("program_id")?,
                weight: row.try_get("level")?,
            });
        }
        Ok(edges)
    }

    async fn program_outcome(
        &self,
        po_id: Uuid,
    ) -> Result<Option<ProgramOutcomeRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT program_id, indirect_attainment FROM obe.program_outcomes WHERE id = $1",
        )
        .bind(po_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ProgramOutcomeRecord {
            program_id: row.try_get("program_id")?,
            indirect_attainment: row.try_get("indirect_attainment")?,
        }))
    }

    async fn course_assessments(
        &self,
        course_id: Uuid,
        section_id: Option<Uuid>,
    ) -> Result<Vec<AssessmentRef>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.name, q.id AS question_id, q.max_marks
            FROM obe.assessments a
            LEFT JOIN obe.assessment_questions q ON q.assessment_id = a.id
            WHERE a.course_id = $1 AND ($2::uuid IS NULL OR a.section_id = $2)
            ORDER BY a.name, a.id, q.id
            "#,
        )
        .bind(course_id)
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;

        let mut assessments: Vec<AssessmentRef> = Vec::new();
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            if assessments.last().map(|last| last.id) != Some(id) {
                assessments.push(AssessmentRef {
                    id,
                    name: row.try_get("name")?,
                    questions: Vec::new(),
                });
            }
            let question_id: Option<Uuid> = row.try_get("question_id")?;
            let max_marks: Option<f64> = row.try_get("max_marks")?;
            if let (Some(question_id), Some(max_marks), Some(assessment)) =
                (question_id, max_marks, assessments.last_mut())
            {
                assessment.questions.push(MappedQuestion {
                    question_id,
                    max_marks,
                });
            }
        }
        Ok(assessments)
    }

    async fn course_outcomes(&self, course_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, code, description FROM obe.course_outcomes \
             WHERE course_id = $1 ORDER BY code, id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(outcome_ref)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn program_outcomes(&self, program_id: Uuid) -> Result<Vec<OutcomeRef>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, code, description FROM obe.program_outcomes \
             WHERE program_id = $1 ORDER BY code, id",
        )
        .bind(program_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(outcome_ref)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn course_summary(&self, course_id: Uuid) -> Result<Option<CourseSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.batch_id, c.code, c.name, p.name AS program_name, b.name AS batch_name
            FROM obe.courses c
            JOIN obe.programs p ON p.id = c.program_id
            JOIN obe.batches b ON b.id = c.batch_id
            WHERE c.id = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CourseSummary {
            id: row.try_get("id")?,
            batch_id: row.try_get("batch_id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            program_name: row.try_get("program_name")?,
            batch_name: row.try_get("batch_name")?,
        }))
    }

    async fn program_summary(
        &self,
        program_id: Uuid,
    ) -> Result<Option<ProgramSummary>, StoreError> {
        let row = sqlx::query("SELECT id, code, name FROM obe.programs WHERE id = $1")
            .bind(program_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ProgramSummary {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
        }))
    }
}

/// Marks per student for questions 1-4 of their section's mid term; `None` is
/// a question the student was not scored on.
const SEED_STUDENTS: [(&str, &str, usize, [Option<f64>; 4]); 6] = [
    ("ECE25001", "Aarav Sharma", 0, [Some(8.0), Some(9.0), Some(16.0), Some(7.0)]),
    ("ECE25002", "Diya Menon", 0, [Some(5.0), None, Some(11.0), Some(4.0)]),
    ("ECE25003", "Kabir Rao", 0, [Some(9.0), Some(6.0), None, Some(9.0)]),
    ("ECE25004", "Ishita Nair", 1, [Some(4.0), Some(5.0), Some(9.0), None]),
    ("ECE25005", "Rohan Iyer", 1, [Some(10.0), Some(8.0), Some(18.0), Some(8.0)]),
    ("ECE25006", "Meera Pillai", 1, [None, Some(7.0), Some(13.0), Some(6.0)]),
];

/// Question number, max marks, and the course outcome codes it evidences.
const SEED_QUESTIONS: [(i32, f64, &[&str]); 4] = [
    (1, 10.0, &["CO1"]),
    (2, 10.0, &["CO1", "CO2"]),
    (3, 20.0, &["CO2"]),
    (4, 10.0, &["CO3"]),
];

async fn upsert_id(
    tx: &mut Transaction<'_, Postgres>,
    query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
) -> anyhow::Result<Uuid> {
    Ok(query.fetch_one(&mut **tx).await?.try_get("id")?)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let program_id = upsert_id(
        &mut tx,
        sqlx::query(
            r#"
            INSERT INTO obe.programs (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind("BE_ECE")
        .bind("Bachelor of Engineering in Electronics and Communication"),
    )
    .await?;

    let batch_id = upsert_id(
        &mut tx,
        sqlx::query(
            r#"
            INSERT INTO obe.batches (id, program_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (program_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(program_id)
        .bind("2025-2029"),
    )
    .await?;

    let mut section_ids = Vec::new();
    for name in ["A", "B"] {
        let id = upsert_id(
            &mut tx,
            sqlx::query(
                r#"
                INSERT INTO obe.sections (id, batch_id, name)
                VALUES ($1, $2, $3)
                ON CONFLICT (batch_id, name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(batch_id)
            .bind(name),
        )
        .await?;
        section_ids.push(id);
    }

    let course_id = upsert_id(
        &mut tx,
        sqlx::query(
            r#"
            INSERT INTO obe.courses
            (id, program_id, batch_id, code, name, target, level1, level2, level3)
            VALUES ($1, $2, $3, $4, $5, 60, 40, 60, 80)
            ON CONFLICT (batch_id, code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(program_id)
        .bind(batch_id)
        .bind("EC101")
        .bind("Network Analysis"),
    )
    .await?;

    let course_outcomes = [
        ("CO1", "Apply Kirchhoff's laws to analyse DC networks"),
        ("CO2", "Analyse transient response of RL and RC circuits"),
        ("CO3", "Apply network theorems to two-port networks"),
    ];
    let mut co_ids = std::collections::HashMap::new();
    for (code, description) in course_outcomes {
        let id = upsert_id(
            &mut tx,
            sqlx::query(
                r#"
                INSERT INTO obe.course_outcomes (id, course_id, code, description)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (course_id, code) DO UPDATE SET description = EXCLUDED.description
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(course_id)
            .bind(code)
            .bind(description),
        )
        .await?;
        co_ids.insert(code, id);
    }

    let program_outcomes = [
        ("PO1", "Engineering knowledge", Some(2.6)),
        ("PO2", "Problem analysis", None),
        ("PO3", "Design and development of solutions", Some(2.2)),
    ];
    let mut po_ids = std::collections::HashMap::new();
    for (code, description, indirect) in program_outcomes {
        let id = upsert_id(
            &mut tx,
            sqlx::query(
                r#"
                INSERT INTO obe.program_outcomes
                (id, program_id, code, description, indirect_attainment)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (program_id, code) DO UPDATE
                SET description = EXCLUDED.description,
                    indirect_attainment = EXCLUDED.indirect_attainment
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(program_id)
            .bind(code)
            .bind(description)
            .bind(indirect),
        )
        .await?;
        po_ids.insert(code, id);
    }

    let co_po = [
        ("CO1", "PO1", 3),
        ("CO2", "PO1", 2),
        ("CO2", "PO2", 3),
        ("CO3", "PO2", 1),
        ("CO3", "PO3", 2),
    ];
    for (co, po, level) in co_po {
        sqlx::query(
            r#"
            INSERT INTO obe.co_po_mappings (co_id, po_id, level)
            VALUES ($1, $2, $3)
            ON CONFLICT (co_id, po_id) DO UPDATE SET level = EXCLUDED.level
            "#,
        )
        .bind(co_ids[co])
        .bind(po_ids[po])
        .bind(level)
        .execute(&mut *tx)
        .await?;
    }

    // One mid term per section, with identical question papers.
    let mut questions_by_section = Vec::new();
    for &section_id in &section_ids {
        let assessment_id = upsert_id(
            &mut tx,
            sqlx::query(
                r#"
                INSERT INTO obe.assessments (id, course_id, section_id, name)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (course_id, section_id, name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(course_id)
            .bind(section_id)
            .bind("Mid Term"),
        )
        .await?;

        let mut question_ids = Vec::new();
        for (question_no, max_marks, outcomes) in SEED_QUESTIONS {
            let question_id = upsert_id(
                &mut tx,
                sqlx::query(
                    r#"
                    INSERT INTO obe.assessment_questions (id, assessment_id, question_no, max_marks)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (assessment_id, question_no) DO UPDATE
                    SET max_marks = EXCLUDED.max_marks
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(assessment_id)
                .bind(question_no)
                .bind(max_marks),
            )
            .await?;

            for code in outcomes {
                sqlx::query(
                    r#"
                    INSERT INTO obe.question_co_mappings (question_id, co_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(question_id)
                .bind(co_ids[code])
                .execute(&mut *tx)
                .await?;
            }
            question_ids.push(question_id);
        }
        questions_by_section.push(question_ids);
    }

    for (roll_no, full_name, section, marks) in SEED_STUDENTS {
        let student_id = upsert_id(
            &mut tx,
            sqlx::query(
                r#"
                INSERT INTO obe.students (id, roll_no, full_name, batch_id, section_id)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (roll_no) DO UPDATE
                SET full_name = EXCLUDED.full_name, section_id = EXCLUDED.section_id
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(roll_no)
            .bind(full_name)
            .bind(batch_id)
            .bind(section_ids[section]),
        )
        .await?;

        for (question_id, value) in questions_by_section[section].iter().zip(marks) {
            let Some(value) = value else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO obe.mark_scores (student_id, question_id, marks)
                VALUES ($1, $2, $3)
                ON CONFLICT (student_id, question_id) DO UPDATE SET marks = EXCLUDED.marks
                "#,
            )
            .bind(student_id)
            .bind(*question_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(%program_id, %course_id, "seeded demo program");
    Ok(())
}

/// Upserts mark rows from a CSV with `roll_no,question_id,marks` columns. The
/// whole file is applied in one transaction.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        roll_no: String,
        question_id: Uuid,
        marks: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;

        let student_id: Uuid = sqlx::query("SELECT id FROM obe.students WHERE roll_no = $1")
            .bind(&row.roll_no)
            .fetch_optional(&mut *tx)
            .await?
            .with_context(|| format!("unknown roll number {}", row.roll_no))?
            .try_get("id")?;

        let max_marks: f64 =
            sqlx::query("SELECT max_marks FROM obe.assessment_questions WHERE id = $1")
                .bind(row.question_id)
                .fetch_optional(&mut *tx)
                .await?
                .with_context(|| format!("unknown question {}", row.question_id))?
                .try_get("max_marks")?;

        if !(0.0..=max_marks).contains(&row.marks) {
            anyhow::bail!(
                "marks {} for {} on question {} outside 0..={}",
                row.marks,
                row.roll_no,
                row.question_id,
                max_marks
            );
        }

        let result = sqlx::query(
            r#"
            INSERT INTO obe.mark_scores (student_id, question_id, marks)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, question_id) DO UPDATE SET marks = EXCLUDED.marks
            "#,
        )
        .bind(student_id)
        .bind(row.question_id)
        .bind(row.marks)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}
