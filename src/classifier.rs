use std::fmt::Write;

use crate::models::{
    Confidence, DecisionFactors, PathwayDetermination, PathwayType, PerformanceSnapshot,
    Priority, Recommendation, TransitionCheck,
};

/// Classifies a performance snapshot into a pathway. Pure decision table:
/// an insufficient-data early return, score bands, two mutually exclusive
/// secondary adjustments, and a staleness note that only touches confidence.
pub fn classify(snapshot: &PerformanceSnapshot) -> PathwayDetermination {
    if snapshot.total_quizzes < 1 {
        return PathwayDetermination {
            pathway_type: PathwayType::Balanced,
            reasoning: "Insufficient data: no quiz attempts on record; defaulting to the balanced pathway.".to_string(),
            confidence: Confidence::Low,
            factors: DecisionFactors {
                primary: "insufficient_data".to_string(),
                secondary: None,
            },
        };
    }

    let average = snapshot.average_score;
    let (mut pathway_type, band, primary) = if average < 50.0 {
        (PathwayType::Basic, "below 50", "score_band_basic")
    } else if average < 75.0 {
        (PathwayType::Balanced, "50 to below 75", "score_band_balanced")
    } else {
        (PathwayType::Acceleration, "75 and above", "score_band_acceleration")
    };

    let mut confidence = Confidence::High;
    let mut secondary = None;
    let mut reasoning = format!(
        "Average score {:.2} falls in the {} band, indicating the {} pathway.",
        average,
        band,
        pathway_type.as_str()
    );

    if snapshot.task_completion_rate < 0.5
        && average < 60.0
        && pathway_type != PathwayType::Basic
    {
        pathway_type = PathwayType::Basic;
        confidence = Confidence::Medium;
        secondary = Some("low_engagement_downgrade".to_string());
        let _ = write!(
            reasoning,
            " Task completion rate {:.2} is below 0.5 with a borderline score; moved down to the basic pathway.",
            snapshot.task_completion_rate
        );
    } else if snapshot.task_completion_rate < 0.7
        && average >= 75.0
        && pathway_type == PathwayType::Acceleration
    {
        pathway_type = PathwayType::Balanced;
        confidence = Confidence::Medium;
        secondary = Some("completion_caps_acceleration".to_string());
        let _ = write!(
            reasoning,
            " Task completion rate {:.2} is below 0.7; acceleration capped to the balanced pathway.",
            snapshot.task_completion_rate
        );
    }

    if snapshot.recent_attempts == 0 && snapshot.total_quizzes > 0 {
        confidence = Confidence::Medium;
        reasoning.push_str(" No quiz attempts in the recent window; scores may be stale.");
    }

    PathwayDetermination {
        pathway_type,
        reasoning,
        confidence,
        factors: DecisionFactors {
            primary: primary.to_string(),
            secondary,
        },
    }
}

/// Fixed content-tag set per pathway.
pub fn content_tags(pathway: PathwayType) -> Vec<String> {
    let tags: &[&str] = match pathway {
        PathwayType::Basic => &["foundational", "guided_practice", "step_by_step", "remedial"],
        PathwayType::Balanced => &["core_curriculum", "standard_practice", "mixed_difficulty"],
        PathwayType::Acceleration => &["advanced", "enrichment", "challenge", "independent_study"],
    };
    tags.iter().map(|t| t.to_string()).collect()
}

/// Ordered recommendation list for a pathway and snapshot.
pub fn recommendations(
    pathway: PathwayType,
    snapshot: &PerformanceSnapshot,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    match pathway {
        PathwayType::Basic => {
            out.push(Recommendation {
                kind: "content".to_string(),
                priority: Priority::High,
                title: "Review foundational concepts".to_string(),
                description: "Work through foundational material to close gaps before moving on.".to_string(),
                tags: vec!["foundational".to_string(), "remedial".to_string()],
            });
            if snapshot.task_completion_rate < 0.5 {
                out.push(Recommendation {
                    kind: "exercise".to_string(),
                    priority: Priority::High,
                    title: "Increase practice activity".to_string(),
                    description: format!(
                        "Task completion is at {:.0}%; finishing assigned lessons and assignments builds the record needed to advance.",
                        snapshot.task_completion_rate * 100.0
                    ),
                    tags: vec!["guided_practice".to_string()],
                });
            }
        }
        PathwayType::Balanced => {
            out.push(Recommendation {
                kind: "content".to_string(),
                priority: Priority::Medium,
                title: "Continue standard progression".to_string(),
                description: "Keep working through the core curriculum at the current pace.".to_string(),
                tags: vec!["core_curriculum".to_string()],
            });
            if snapshot.average_score >= 65.0 && snapshot.average_score < 75.0 {
                out.push(Recommendation {
                    kind: "content".to_string(),
                    priority: Priority::Low,
                    title: "Explore advanced material".to_string(),
                    description: "Scores are approaching the acceleration band; sampling harder material can confirm readiness.".to_string(),
                    tags: vec!["advanced".to_string(), "enrichment".to_string()],
                });
            }
        }
        PathwayType::Acceleration => {
            out.push(Recommendation {
                kind: "content".to_string(),
                priority: Priority::High,
                title: "Advance to enriched content".to_string(),
                description: "Strong scores support moving into advanced and enrichment material.".to_string(),
                tags: vec!["advanced".to_string(), "enrichment".to_string()],
            });
            out.push(Recommendation {
                kind: "assessment".to_string(),
                priority: Priority::Medium,
                title: "Attempt a challenge assessment".to_string(),
                description: "A challenge assessment validates mastery at the accelerated level.".to_string(),
                tags: vec!["challenge".to_string()],
            });
        }
    }

    out
}

/// Advisory adjacency check over the basic → balanced → acceleration ladder.
/// The result is logged by the orchestrator, never enforced.
pub fn validate_transition(previous: PathwayType, proposed: PathwayType) -> TransitionCheck {
    let distance = (previous.ladder_index() - proposed.ladder_index()).abs();
    if distance <= 1 {
        TransitionCheck {
            is_valid: true,
            reason: format!(
                "transition {} -> {} is adjacent",
                previous.as_str(),
                proposed.as_str()
            ),
        }
    } else {
        TransitionCheck {
            is_valid: false,
            reason: format!(
                "transition {} -> {} skips a pathway level",
                previous.as_str(),
                proposed.as_str()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(average_score: f64, completion: f64, quizzes: usize) -> PerformanceSnapshot {
        PerformanceSnapshot {
            average_score,
            task_completion_rate: completion,
            total_quizzes: quizzes,
            total_tasks: 10,
            completed_tasks: (completion * 10.0) as usize,
            recent_attempts: 2,
            recent_scores: vec![average_score],
            last_quiz_date: Some(chrono::Utc::now()),
        }
    }

    #[test]
    fn no_quizzes_always_means_balanced_low() {
        for completion in [0.0, 0.4, 1.0] {
            let det = classify(&snapshot(99.0, completion, 0));
            assert_eq!(det.pathway_type, PathwayType::Balanced);
            assert_eq!(det.confidence, Confidence::Low);
            assert_eq!(det.factors.primary, "insufficient_data");
        }
    }

    #[test]
    fn score_band_boundaries() {
        assert_eq!(classify(&snapshot(49.0, 0.9, 5)).pathway_type, PathwayType::Basic);
        assert_eq!(classify(&snapshot(50.0, 0.9, 5)).pathway_type, PathwayType::Balanced);
        assert_eq!(classify(&snapshot(74.0, 0.9, 5)).pathway_type, PathwayType::Balanced);
        assert_eq!(classify(&snapshot(75.0, 0.9, 5)).pathway_type, PathwayType::Acceleration);
    }

    #[test]
    fn low_engagement_downgrades_borderline_balanced() {
        let det = classify(&snapshot(55.0, 0.3, 5));
        assert_eq!(det.pathway_type, PathwayType::Basic);
        assert_eq!(det.confidence, Confidence::Medium);
        assert_eq!(
            det.factors.secondary.as_deref(),
            Some("low_engagement_downgrade")
        );
    }

    #[test]
    fn low_completion_caps_acceleration() {
        let det = classify(&snapshot(80.0, 0.4, 5));
        assert_eq!(det.pathway_type, PathwayType::Balanced);
        assert_eq!(det.confidence, Confidence::Medium);
        assert_eq!(
            det.factors.secondary.as_deref(),
            Some("completion_caps_acceleration")
        );
    }

    #[test]
    fn adequate_completion_leaves_acceleration_alone() {
        let det = classify(&snapshot(80.0, 0.75, 5));
        assert_eq!(det.pathway_type, PathwayType::Acceleration);
        assert_eq!(det.confidence, Confidence::High);
        assert!(det.factors.secondary.is_none());
    }

    #[test]
    fn staleness_drops_confidence_but_not_pathway() {
        let mut snap = snapshot(80.0, 0.9, 5);
        snap.recent_attempts = 0;
        let det = classify(&snap);
        assert_eq!(det.pathway_type, PathwayType::Acceleration);
        assert_eq!(det.confidence, Confidence::Medium);
        assert!(det.reasoning.contains("stale"));
    }

    #[test]
    fn low_average_with_good_completion_stays_high_confidence() {
        // Quizzes [40, 45, 50] average 45; completion 0.8 trips no secondary rule.
        let det = classify(&snapshot(45.0, 0.8, 3));
        assert_eq!(det.pathway_type, PathwayType::Basic);
        assert_eq!(det.confidence, Confidence::High);
        assert!(det.factors.secondary.is_none());
    }

    #[test]
    fn transition_adjacency() {
        assert!(!validate_transition(PathwayType::Basic, PathwayType::Acceleration).is_valid);
        assert!(validate_transition(PathwayType::Basic, PathwayType::Balanced).is_valid);
        assert!(validate_transition(PathwayType::Balanced, PathwayType::Balanced).is_valid);
        assert!(!validate_transition(PathwayType::Acceleration, PathwayType::Basic).is_valid);
    }

    #[test]
    fn basic_recommendations_add_practice_push_under_half_completion() {
        let recs = recommendations(PathwayType::Basic, &snapshot(45.0, 0.3, 3));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[1].kind, "exercise");

        let recs = recommendations(PathwayType::Basic, &snapshot(45.0, 0.8, 3));
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn balanced_recommendations_offer_advanced_near_the_boundary() {
        let recs = recommendations(PathwayType::Balanced, &snapshot(70.0, 0.8, 3));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].priority, Priority::Low);

        let recs = recommendations(PathwayType::Balanced, &snapshot(60.0, 0.8, 3));
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn acceleration_recommendations_are_fixed() {
        let recs = recommendations(PathwayType::Acceleration, &snapshot(85.0, 0.9, 3));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[1].kind, "assessment");
    }

    #[test]
    fn tags_are_distinct_per_pathway() {
        assert!(content_tags(PathwayType::Basic).contains(&"foundational".to_string()));
        assert!(content_tags(PathwayType::Balanced).contains(&"core_curriculum".to_string()));
        assert!(content_tags(PathwayType::Acceleration).contains(&"advanced".to_string()));
    }
}
