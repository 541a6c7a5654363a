use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    ActivityKind, ActivityMetadata, ActivityRecord, ContentItem, LearningPath, MasterySummary,
    PathwayHistoryEntry, PathwayType, PerformanceSnapshot, Trigger,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn find_student_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM adaptive_pathways.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("id")))
}

/// All activity for one learner, newest first. The recency rules in
/// performance and mastery computations rely on this ordering.
pub async fn fetch_activities(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<ActivityRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, kind, score, metadata, topic_name, unit_name, module_name, \
         lesson_id, course_id, quiz_id, completed, points_earned, created_at \
         FROM adaptive_pathways.activities \
         WHERE student_id = $1 \
         ORDER BY created_at DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut activities = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: ActivityKind = row.get::<String, _>("kind").parse()?;
        let metadata = row
            .get::<Option<Json<ActivityMetadata>>, _>("metadata")
            .map(|json| json.0)
            .unwrap_or_default();

        activities.push(ActivityRecord {
            student_id: row.get("student_id"),
            kind,
            score: row.get("score"),
            metadata,
            topic_name: row.get("topic_name"),
            unit_name: row.get("unit_name"),
            module_name: row.get("module_name"),
            lesson_id: row.get("lesson_id"),
            course_id: row.get("course_id"),
            quiz_id: row.get("quiz_id"),
            completed: row.get("completed"),
            points_earned: row.get("points_earned"),
            created_at: row.get("created_at"),
        });
    }

    Ok(activities)
}

/// Approved or published structured content reachable through the learner's
/// module enrollments.
pub async fn fetch_enrolled_content(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<ContentItem>> {
    let rows = sqlx::query(
        "SELECT c.module_name, c.title, c.topic, c.concepts, c.lesson_id, c.course_id \
         FROM adaptive_pathways.contents c \
         JOIN adaptive_pathways.module_enrollments e ON e.module_name = c.module_name \
         WHERE e.student_id = $1 AND c.status IN ('approved', 'published')",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let concepts = row
            .get::<Option<Json<Vec<String>>>, _>("concepts")
            .map(|json| json.0)
            .unwrap_or_default();

        items.push(ContentItem {
            module_name: row.get("module_name"),
            title: row.get("title"),
            metadata: ActivityMetadata {
                concepts,
                concept: None,
                topic: row.get("topic"),
            },
            lesson_id: row.get("lesson_id"),
            course_id: row.get("course_id"),
        });
    }

    Ok(items)
}

fn path_from_row(row: &PgRow) -> anyhow::Result<LearningPath> {
    let pathway_type: PathwayType = row.get::<String, _>("pathway_type").parse()?;
    let trigger: Trigger = row.get::<String, _>("trigger_kind").parse()?;
    let previous_pathway = row
        .get::<Option<String>, _>("previous_pathway")
        .map(|value| value.parse::<PathwayType>())
        .transpose()?;

    Ok(LearningPath {
        id: row.get("id"),
        student_id: row.get("student_id"),
        pathway_type,
        average_score: row.get("average_score"),
        task_completion_rate: row.get("task_completion_rate"),
        recommended_tags: row.get::<Json<Vec<String>>, _>("recommended_tags").0,
        performance_metrics: row.get::<Json<PerformanceSnapshot>, _>("performance_metrics").0,
        calculated_at: row.get("calculated_at"),
        trigger,
        previous_pathway,
        pathway_history: row.get::<Json<Vec<PathwayHistoryEntry>>, _>("pathway_history").0,
        is_active: row.get("is_active"),
    })
}

pub async fn load_active_path(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<LearningPath>> {
    let row = sqlx::query(
        "SELECT id, student_id, pathway_type, average_score, task_completion_rate, \
         recommended_tags, performance_metrics, calculated_at, trigger_kind, \
         previous_pathway, pathway_history, is_active \
         FROM adaptive_pathways.learning_paths \
         WHERE student_id = $1 AND is_active",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(path_from_row).transpose()
}

pub async fn fetch_path_history(
    pool: &PgPool,
    student_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<LearningPath>> {
    let rows = sqlx::query(
        "SELECT id, student_id, pathway_type, average_score, task_completion_rate, \
         recommended_tags, performance_metrics, calculated_at, trigger_kind, \
         previous_pathway, pathway_history, is_active \
         FROM adaptive_pathways.learning_paths \
         WHERE student_id = $1 \
         ORDER BY calculated_at DESC \
         LIMIT $2",
    )
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(path_from_row).collect()
}

/// Retires the prior active row and inserts the new one in a single
/// transaction, so two concurrent evaluations cannot both end up active.
/// The partial unique index on (student_id) WHERE is_active backs this up
/// at the store level.
pub async fn store_evaluation(pool: &PgPool, path: &LearningPath) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE adaptive_pathways.learning_paths \
         SET is_active = FALSE \
         WHERE student_id = $1 AND is_active",
    )
    .bind(path.student_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO adaptive_pathways.learning_paths \
         (id, student_id, pathway_type, average_score, task_completion_rate, \
          recommended_tags, performance_metrics, calculated_at, trigger_kind, \
          previous_pathway, pathway_history, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(path.id)
    .bind(path.student_id)
    .bind(path.pathway_type.as_str())
    .bind(path.average_score)
    .bind(path.task_completion_rate)
    .bind(Json(&path.recommended_tags))
    .bind(Json(&path.performance_metrics))
    .bind(path.calculated_at)
    .bind(path.trigger.as_str())
    .bind(path.previous_pathway.map(|p| p.as_str()))
    .bind(Json(&path.pathway_history))
    .bind(path.is_active)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Full overwrite of the learner's mastery summary. Returns the effective
/// created_at, which survives from the first insert across later upserts.
pub async fn upsert_mastery(
    pool: &PgPool,
    summary: &MasterySummary,
) -> anyhow::Result<DateTime<Utc>> {
    let row = sqlx::query(
        "INSERT INTO adaptive_pathways.mastery_summaries \
         (student_id, concepts, total_concepts, level_counts, average_mastery, \
          last_updated, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (student_id) DO UPDATE SET \
             concepts = EXCLUDED.concepts, \
             total_concepts = EXCLUDED.total_concepts, \
             level_counts = EXCLUDED.level_counts, \
             average_mastery = EXCLUDED.average_mastery, \
             last_updated = EXCLUDED.last_updated \
         RETURNING created_at",
    )
    .bind(summary.student_id)
    .bind(Json(&summary.concepts))
    .bind(summary.total_concepts as i32)
    .bind(Json(&summary.level_counts))
    .bind(summary.average_mastery)
    .bind(summary.last_updated)
    .bind(summary.created_at)
    .fetch_one(pool)
    .await?;

    Ok(row.get("created_at"))
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            "avery.lee@example.edu",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            "jules.moreno@example.edu",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            "kiara.patel@example.edu",
        ),
    ];

    for (id, name, email) in &students {
        sqlx::query(
            "INSERT INTO adaptive_pathways.students (id, full_name, email) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();

    // (source_key, email, kind, score, concepts, quiz_id, completed, days_ago)
    let quizzes = vec![
        ("seed-q-001", "avery.lee@example.edu", 42.0, "fractions", "Q1", 12),
        ("seed-q-002", "avery.lee@example.edu", 48.0, "fractions", "Q2", 5),
        ("seed-q-003", "avery.lee@example.edu", 51.0, "decimals", "Q3", 2),
        ("seed-q-004", "jules.moreno@example.edu", 68.0, "cell biology", "Q4", 9),
        ("seed-q-005", "jules.moreno@example.edu", 72.0, "genetics", "Q5", 3),
        ("seed-q-006", "kiara.patel@example.edu", 88.0, "mechanics", "Q6", 8),
        ("seed-q-007", "kiara.patel@example.edu", 93.0, "thermodynamics", "Q7", 1),
    ];

    for (source_key, email, score, concept, quiz_id, days_ago) in quizzes {
        let student_id = find_student_by_email(pool, email)
            .await?
            .with_context(|| format!("seed student missing: {email}"))?;
        let metadata = ActivityMetadata {
            concepts: vec![concept.to_string()],
            concept: None,
            topic: None,
        };

        sqlx::query(
            "INSERT INTO adaptive_pathways.activities \
             (id, student_id, kind, score, metadata, quiz_id, completed, created_at, source_key) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8) \
             ON CONFLICT (source_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(ActivityKind::QuizCompletion.as_str())
        .bind(score)
        .bind(Json(&metadata))
        .bind(quiz_id)
        .bind(now - Duration::days(days_ago))
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let tasks = vec![
        ("seed-t-001", "avery.lee@example.edu", ActivityKind::LessonCompletion, "fractions", true, 11),
        ("seed-t-002", "avery.lee@example.edu", ActivityKind::AssignmentSubmission, "fractions", false, 7),
        ("seed-t-003", "jules.moreno@example.edu", ActivityKind::LessonCompletion, "cell biology", true, 6),
        ("seed-t-004", "kiara.patel@example.edu", ActivityKind::LessonCompletion, "mechanics", true, 4),
        ("seed-t-005", "kiara.patel@example.edu", ActivityKind::AssignmentSubmission, "mechanics", true, 2),
    ];

    for (source_key, email, kind, concept, completed, days_ago) in tasks {
        let student_id = find_student_by_email(pool, email)
            .await?
            .with_context(|| format!("seed student missing: {email}"))?;
        let metadata = ActivityMetadata {
            concepts: vec![concept.to_string()],
            concept: None,
            topic: None,
        };

        sqlx::query(
            "INSERT INTO adaptive_pathways.activities \
             (id, student_id, kind, metadata, completed, created_at, source_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (source_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(kind.as_str())
        .bind(Json(&metadata))
        .bind(completed)
        .bind(now - Duration::days(days_ago))
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let enrollments = vec![
        ("avery.lee@example.edu", "arithmetic"),
        ("jules.moreno@example.edu", "life sciences"),
        ("kiara.patel@example.edu", "physics"),
    ];

    for (email, module_name) in enrollments {
        let student_id = find_student_by_email(pool, email)
            .await?
            .with_context(|| format!("seed student missing: {email}"))?;

        sqlx::query(
            "INSERT INTO adaptive_pathways.module_enrollments (id, student_id, module_name) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (student_id, module_name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(module_name)
        .execute(pool)
        .await?;
    }

    let contents = vec![
        (
            Uuid::parse_str("7be4f7ce-97ad-4bb5-9f17-1f6ff5d9a001")?,
            "arithmetic",
            "Fractions refresher",
            Some("fractions"),
            "approved",
        ),
        (
            Uuid::parse_str("7be4f7ce-97ad-4bb5-9f17-1f6ff5d9a002")?,
            "life sciences",
            "Genetics primer",
            Some("genetics"),
            "published",
        ),
        (
            Uuid::parse_str("7be4f7ce-97ad-4bb5-9f17-1f6ff5d9a003")?,
            "physics",
            "Draft kinematics notes",
            Some("kinematics"),
            "draft",
        ),
    ];

    for (id, module_name, title, topic, status) in contents {
        sqlx::query(
            "INSERT INTO adaptive_pathways.contents \
             (id, module_name, title, topic, concepts, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(module_name)
        .bind(title)
        .bind(topic)
        .bind(Json(Vec::<String>::new()))
        .bind(status)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        kind: String,
        score: Option<f64>,
        concepts: Option<String>,
        topic: Option<String>,
        topic_name: Option<String>,
        unit_name: Option<String>,
        module_name: Option<String>,
        lesson_id: Option<String>,
        course_id: Option<String>,
        quiz_id: Option<String>,
        completed: Option<bool>,
        points_earned: Option<f64>,
        created_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    fn non_blank(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let kind: ActivityKind = row.kind.parse()?;

        let student_id: Uuid = sqlx::query(
            "INSERT INTO adaptive_pathways.students (id, full_name, email) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .fetch_one(pool)
        .await?
        .get("id");

        let metadata = ActivityMetadata {
            concepts: non_blank(row.concepts)
                .map(|raw| {
                    raw.split(';')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            concept: None,
            topic: non_blank(row.topic),
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            "INSERT INTO adaptive_pathways.activities \
             (id, student_id, kind, score, metadata, topic_name, unit_name, module_name, \
              lesson_id, course_id, quiz_id, completed, points_earned, created_at, source_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (source_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(kind.as_str())
        .bind(row.score)
        .bind(Json(&metadata))
        .bind(non_blank(row.topic_name))
        .bind(non_blank(row.unit_name))
        .bind(non_blank(row.module_name))
        .bind(non_blank(row.lesson_id))
        .bind(non_blank(row.course_id))
        .bind(non_blank(row.quiz_id))
        .bind(row.completed.unwrap_or(false))
        .bind(row.points_earned)
        .bind(row.created_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
