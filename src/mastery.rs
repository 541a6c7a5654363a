use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::concepts;
use crate::models::{
    ActivityKind, ActivityRecord, ConceptMasteryRecord, ContentItem, MasteryLevel,
    MasteryLevelCounts, MasterySummary, SourceKind,
};
use crate::performance::round2;

/// Engagement alone is capped below the proficient threshold.
const ENGAGEMENT_CAP: f64 = 50.0;
const ENGAGEMENT_STEP: f64 = 10.0;
const RECENT_SCORE_CAP: usize = 5;

#[derive(Debug, Default)]
struct ConceptAccum {
    scores: Vec<f64>,
    recent_scores: Vec<f64>,
    total_attempts: usize,
    engagement_count: usize,
    last_attempt: Option<DateTime<Utc>>,
    sources: Vec<SourceKind>,
}

impl ConceptAccum {
    fn add_source(&mut self, source: SourceKind) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }
}

/// Accumulates per-concept stats in encounter order so the final descending
/// sort keeps tie order stable.
#[derive(Debug, Default)]
struct ConceptTable {
    order: Vec<String>,
    accums: HashMap<String, ConceptAccum>,
}

impl ConceptTable {
    fn entry(&mut self, concept: &str) -> &mut ConceptAccum {
        if !self.accums.contains_key(concept) {
            self.order.push(concept.to_string());
        }
        self.accums.entry(concept.to_string()).or_default()
    }
}

pub fn mastery_level(percentage: f64) -> MasteryLevel {
    if percentage >= 90.0 {
        MasteryLevel::Mastered
    } else if percentage >= 75.0 {
        MasteryLevel::Proficient
    } else if percentage >= 60.0 {
        MasteryLevel::Developing
    } else if percentage >= 40.0 {
        MasteryLevel::Beginner
    } else {
        MasteryLevel::NeedsImprovement
    }
}

/// Builds the ranked mastery profile from a learner's full activity set plus
/// the structured content reachable through module enrollment. Activities are
/// expected newest-first. Quiz scores are the primary signal; engagement-only
/// concepts get a capped estimate; content availability contributes a source
/// tag without counting as engagement.
pub fn aggregate(
    student_id: Uuid,
    activities: &[ActivityRecord],
    content: &[ContentItem],
    now: DateTime<Utc>,
) -> MasterySummary {
    let mut table = ConceptTable::default();

    for activity in activities {
        let source_kind: SourceKind = activity.kind.into();
        let labels = concepts::extract_concepts(&activity.concept_source());

        match activity.kind {
            ActivityKind::QuizCompletion => {
                for label in &labels {
                    let accum = table.entry(label);
                    accum.total_attempts += 1;
                    if accum.last_attempt.map_or(true, |t| activity.created_at > t) {
                        accum.last_attempt = Some(activity.created_at);
                    }
                    if let Some(score) = activity.score {
                        accum.scores.push(score);
                        if accum.recent_scores.len() < RECENT_SCORE_CAP {
                            accum.recent_scores.push(score);
                        }
                    }
                    accum.add_source(source_kind);
                }
            }
            ActivityKind::LessonCompletion | ActivityKind::AssignmentSubmission => {
                for label in &labels {
                    let accum = table.entry(label);
                    accum.engagement_count += 1;
                    accum.add_source(source_kind);
                }
            }
        }
    }

    for item in content {
        for label in concepts::extract_concepts(&item.concept_source()) {
            // Availability is not engagement; only the source tag is recorded.
            table.entry(&label).add_source(SourceKind::Content);
        }
    }

    let mut records: Vec<ConceptMasteryRecord> = Vec::with_capacity(table.order.len());
    for concept_name in &table.order {
        let accum = &table.accums[concept_name];
        let mastery_percentage = if !accum.scores.is_empty() {
            round2(accum.scores.iter().sum::<f64>() / accum.scores.len() as f64)
        } else if accum.engagement_count > 0 {
            ENGAGEMENT_CAP.min(accum.engagement_count as f64 * ENGAGEMENT_STEP)
        } else {
            0.0
        };

        records.push(ConceptMasteryRecord {
            concept_name: concept_name.clone(),
            mastery_percentage,
            mastery_level: mastery_level(mastery_percentage),
            total_attempts: accum.total_attempts,
            engagement_count: accum.engagement_count,
            last_attempt: accum.last_attempt,
            recent_scores: accum.recent_scores.clone(),
            sources: accum.sources.clone(),
        });
    }

    records.sort_by(|a, b| {
        b.mastery_percentage
            .partial_cmp(&a.mastery_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    summarize(student_id, records, now)
}

/// Empty profile, used both for learners with no history and as the degraded
/// result when an upstream read fails.
pub fn empty_summary(student_id: Uuid, now: DateTime<Utc>) -> MasterySummary {
    summarize(student_id, Vec::new(), now)
}

fn summarize(
    student_id: Uuid,
    records: Vec<ConceptMasteryRecord>,
    now: DateTime<Utc>,
) -> MasterySummary {
    let mut level_counts = MasteryLevelCounts::default();
    for record in &records {
        match record.mastery_level {
            MasteryLevel::NeedsImprovement => level_counts.needs_improvement += 1,
            MasteryLevel::Beginner => level_counts.beginner += 1,
            MasteryLevel::Developing => level_counts.developing += 1,
            MasteryLevel::Proficient => level_counts.proficient += 1,
            MasteryLevel::Mastered => level_counts.mastered += 1,
        }
    }

    let average_mastery = if records.is_empty() {
        0.0
    } else {
        round2(
            records.iter().map(|r| r.mastery_percentage).sum::<f64>() / records.len() as f64,
        )
    };

    MasterySummary {
        student_id,
        total_concepts: records.len(),
        concepts: records,
        level_counts,
        average_mastery,
        last_updated: now,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityMetadata;
    use chrono::Duration;

    fn activity(
        kind: ActivityKind,
        score: Option<f64>,
        concepts: &[&str],
        days_ago: i64,
    ) -> ActivityRecord {
        ActivityRecord {
            student_id: Uuid::new_v4(),
            kind,
            score,
            metadata: ActivityMetadata {
                concepts: concepts.iter().map(|c| c.to_string()).collect(),
                concept: None,
                topic: None,
            },
            topic_name: None,
            unit_name: None,
            module_name: None,
            lesson_id: None,
            course_id: None,
            quiz_id: Some("q1".to_string()),
            completed: true,
            points_earned: None,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(mastery_level(89.99), MasteryLevel::Proficient);
        assert_eq!(mastery_level(90.0), MasteryLevel::Mastered);
        assert_eq!(mastery_level(39.99), MasteryLevel::NeedsImprovement);
        assert_eq!(mastery_level(40.0), MasteryLevel::Beginner);
        assert_eq!(mastery_level(60.0), MasteryLevel::Developing);
        assert_eq!(mastery_level(75.0), MasteryLevel::Proficient);
    }

    #[test]
    fn quiz_scores_are_the_primary_signal() {
        let activities = vec![
            activity(ActivityKind::QuizCompletion, Some(80.0), &["fractions"], 1),
            activity(ActivityKind::QuizCompletion, Some(90.0), &["fractions"], 2),
            // Engagement on the same concept must not move the mean.
            activity(ActivityKind::LessonCompletion, None, &["fractions"], 3),
        ];
        let summary = aggregate(Uuid::new_v4(), &activities, &[], Utc::now());
        assert_eq!(summary.total_concepts, 1);
        let record = &summary.concepts[0];
        assert_eq!(record.mastery_percentage, 85.0);
        assert_eq!(record.total_attempts, 2);
        assert_eq!(record.engagement_count, 1);
        assert_eq!(record.sources, vec![SourceKind::Quiz, SourceKind::Lesson]);
    }

    #[test]
    fn engagement_only_estimate_is_capped_at_fifty() {
        let activities: Vec<ActivityRecord> = (0..10)
            .map(|i| activity(ActivityKind::LessonCompletion, None, &["reading"], i))
            .collect();
        let summary = aggregate(Uuid::new_v4(), &activities, &[], Utc::now());
        let record = &summary.concepts[0];
        assert_eq!(record.mastery_percentage, 50.0);
        // 50 sits in the [40, 60) band.
        assert_eq!(record.mastery_level, MasteryLevel::Beginner);
    }

    #[test]
    fn three_engagements_score_thirty() {
        let activities: Vec<ActivityRecord> = (0..3)
            .map(|i| activity(ActivityKind::AssignmentSubmission, None, &["writing"], i))
            .collect();
        let summary = aggregate(Uuid::new_v4(), &activities, &[], Utc::now());
        let record = &summary.concepts[0];
        assert_eq!(record.mastery_percentage, 30.0);
        assert_eq!(record.mastery_level, MasteryLevel::NeedsImprovement);
    }

    #[test]
    fn content_tags_source_without_counting_engagement() {
        let content = vec![ContentItem {
            module_name: "algebra".to_string(),
            title: "Linear equations".to_string(),
            metadata: ActivityMetadata {
                concepts: vec!["equations".to_string()],
                concept: None,
                topic: None,
            },
            lesson_id: None,
            course_id: None,
        }];
        let summary = aggregate(Uuid::new_v4(), &[], &content, Utc::now());
        // Module name and explicit concept both surface.
        assert_eq!(summary.total_concepts, 2);
        for record in &summary.concepts {
            assert_eq!(record.engagement_count, 0);
            assert_eq!(record.mastery_percentage, 0.0);
            assert_eq!(record.sources, vec![SourceKind::Content]);
        }
    }

    #[test]
    fn ranking_descends_and_ties_keep_encounter_order() {
        let activities = vec![
            activity(ActivityKind::QuizCompletion, Some(70.0), &["first"], 1),
            activity(ActivityKind::QuizCompletion, Some(70.0), &["second"], 2),
            activity(ActivityKind::QuizCompletion, Some(95.0), &["third"], 3),
        ];
        let summary = aggregate(Uuid::new_v4(), &activities, &[], Utc::now());
        let names: Vec<&str> = summary.concepts.iter().map(|r| r.concept_name.as_str()).collect();
        assert_eq!(names, vec!["third", "first", "second"]);
    }

    #[test]
    fn summary_counts_and_average() {
        let activities = vec![
            activity(ActivityKind::QuizCompletion, Some(95.0), &["a"], 1),
            activity(ActivityKind::QuizCompletion, Some(65.0), &["b"], 2),
            activity(ActivityKind::QuizCompletion, Some(20.0), &["c"], 3),
        ];
        let summary = aggregate(Uuid::new_v4(), &activities, &[], Utc::now());
        assert_eq!(summary.total_concepts, 3);
        assert_eq!(summary.level_counts.mastered, 1);
        assert_eq!(summary.level_counts.developing, 1);
        assert_eq!(summary.level_counts.needs_improvement, 1);
        assert_eq!(summary.average_mastery, 60.0);
    }

    #[test]
    fn no_history_yields_empty_summary() {
        let summary = aggregate(Uuid::new_v4(), &[], &[], Utc::now());
        assert_eq!(summary.total_concepts, 0);
        assert_eq!(summary.average_mastery, 0.0);
        assert!(summary.concepts.is_empty());
    }
}
