use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::classifier;
use crate::db;
use crate::mastery;
use crate::models::{
    ConceptMasteryRecord, EvaluationOutcome, LearningPath, MasterySummary, PathwayHistoryEntry,
    PathwayType, Trigger,
};
use crate::performance;

/// Carries the prior row's history forward, appending one entry iff the
/// pathway changed. Returns the merged history and the prior pathway type.
fn merge_history(
    previous: Option<&LearningPath>,
    proposed: PathwayType,
    reason: &str,
    now: DateTime<Utc>,
) -> (Vec<PathwayHistoryEntry>, Option<PathwayType>) {
    match previous {
        None => (Vec::new(), None),
        Some(prior) => {
            let mut history = prior.pathway_history.clone();
            if prior.pathway_type != proposed {
                history.push(PathwayHistoryEntry {
                    from: prior.pathway_type,
                    to: proposed,
                    reason: reason.to_string(),
                    changed_at: now,
                });
            }
            (history, Some(prior.pathway_type))
        }
    }
}

/// Runs one full evaluation: snapshot, classification, tag generation,
/// retirement of the prior active pathway, and persistence of the new one.
/// Every call inserts a row; the result is an audit log of evaluations, not
/// just of changes.
pub async fn evaluate(
    pool: &PgPool,
    student_id: Uuid,
    trigger: Trigger,
) -> anyhow::Result<EvaluationOutcome> {
    let now = Utc::now();
    let activities = db::fetch_activities(pool, student_id).await?;
    let snapshot = performance::build_snapshot(&activities, now);
    let determination = classifier::classify(&snapshot);
    let tags = classifier::content_tags(determination.pathway_type);

    let previous = db::load_active_path(pool, student_id).await?;

    if let Some(prior) = &previous {
        let check = classifier::validate_transition(prior.pathway_type, determination.pathway_type);
        if !check.is_valid {
            // Advisory only: recorded for audit, never blocks persistence.
            tracing::warn!(
                student_id = %student_id,
                reason = %check.reason,
                "pathway transition failed adjacency check"
            );
        }
    }

    let (history, previous_pathway) = merge_history(
        previous.as_ref(),
        determination.pathway_type,
        &determination.reasoning,
        now,
    );

    let path = LearningPath {
        id: Uuid::new_v4(),
        student_id,
        pathway_type: determination.pathway_type,
        average_score: snapshot.average_score,
        task_completion_rate: snapshot.task_completion_rate,
        recommended_tags: tags,
        performance_metrics: snapshot.clone(),
        calculated_at: now,
        trigger,
        previous_pathway,
        pathway_history: history,
        is_active: true,
    };

    db::store_evaluation(pool, &path).await?;

    let recommendations = classifier::recommendations(determination.pathway_type, &snapshot);

    Ok(EvaluationOutcome {
        path,
        recommendations,
        generated_at: now,
    })
}

pub async fn get_current_pathway(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<LearningPath>> {
    db::load_active_path(pool, student_id).await
}

pub async fn get_pathway_history(
    pool: &PgPool,
    student_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<LearningPath>> {
    db::fetch_path_history(pool, student_id, limit).await
}

/// Recomputes the mastery profile in full and overwrites the stored summary.
/// Read failures degrade to an empty profile instead of propagating, unlike
/// the pathway pipeline; callers cannot distinguish "no concepts" from
/// "read failed" here.
pub async fn get_concept_mastery(pool: &PgPool, student_id: Uuid) -> MasterySummary {
    let now = Utc::now();

    let (activities, content) = match tokio::try_join!(
        db::fetch_activities(pool, student_id),
        db::fetch_enrolled_content(pool, student_id),
    ) {
        Ok(fetched) => fetched,
        Err(error) => {
            tracing::warn!(
                student_id = %student_id,
                %error,
                "mastery aggregation degraded to empty result"
            );
            return mastery::empty_summary(student_id, now);
        }
    };

    let mut summary = mastery::aggregate(student_id, &activities, &content, now);

    match db::upsert_mastery(pool, &summary).await {
        Ok(created_at) => summary.created_at = created_at,
        Err(error) => {
            tracing::warn!(
                student_id = %student_id,
                %error,
                "mastery summary could not be persisted"
            );
        }
    }

    summary
}

/// Case-insensitive exact match against the recomputed profile.
pub async fn get_concept_mastery_by_name(
    pool: &PgPool,
    student_id: Uuid,
    concept_name: &str,
) -> Option<ConceptMasteryRecord> {
    let summary = get_concept_mastery(pool, student_id).await;
    summary
        .concepts
        .into_iter()
        .find(|record| record.concept_name.eq_ignore_ascii_case(concept_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceSnapshot;

    fn path(pathway_type: PathwayType, history: Vec<PathwayHistoryEntry>) -> LearningPath {
        LearningPath {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            pathway_type,
            average_score: 55.0,
            task_completion_rate: 0.8,
            recommended_tags: Vec::new(),
            performance_metrics: PerformanceSnapshot {
                average_score: 55.0,
                task_completion_rate: 0.8,
                total_quizzes: 3,
                total_tasks: 5,
                completed_tasks: 4,
                recent_attempts: 1,
                recent_scores: vec![55.0],
                last_quiz_date: Some(Utc::now()),
            },
            calculated_at: Utc::now(),
            trigger: Trigger::Manual,
            previous_pathway: None,
            pathway_history: history,
            is_active: true,
        }
    }

    #[test]
    fn first_evaluation_has_no_history() {
        let (history, previous) = merge_history(None, PathwayType::Balanced, "first", Utc::now());
        assert!(history.is_empty());
        assert!(previous.is_none());
    }

    #[test]
    fn pathway_change_appends_exactly_one_entry() {
        let prior = path(PathwayType::Balanced, Vec::new());
        let now = Utc::now();
        let (history, previous) = merge_history(Some(&prior), PathwayType::Basic, "dropped", now);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, PathwayType::Balanced);
        assert_eq!(history[0].to, PathwayType::Basic);
        assert_eq!(history[0].reason, "dropped");
        assert_eq!(history[0].changed_at, now);
        assert_eq!(previous, Some(PathwayType::Balanced));
    }

    #[test]
    fn unchanged_pathway_appends_nothing_but_keeps_history() {
        let existing = PathwayHistoryEntry {
            from: PathwayType::Basic,
            to: PathwayType::Balanced,
            reason: "earlier change".to_string(),
            changed_at: Utc::now(),
        };
        let prior = path(PathwayType::Balanced, vec![existing]);
        let (history, previous) =
            merge_history(Some(&prior), PathwayType::Balanced, "steady", Utc::now());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "earlier change");
        assert_eq!(previous, Some(PathwayType::Balanced));
    }
}
