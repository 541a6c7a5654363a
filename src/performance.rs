use chrono::{DateTime, Duration, Utc};

use crate::models::{ActivityKind, ActivityRecord, PerformanceSnapshot};

/// At most this many of the newest quiz scores feed the average.
const AVERAGE_SCORE_WINDOW: usize = 50;
/// Trailing window for the recent-attempt count, in days.
pub const RECENT_ATTEMPT_DAYS: i64 = 7;
/// How many of the newest scores ride along on the snapshot.
const RECENT_SCORE_CAP: usize = 5;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn quiz_scores_newest_first(activities: &[ActivityRecord]) -> impl Iterator<Item = f64> + '_ {
    activities
        .iter()
        .filter(|a| a.kind == ActivityKind::QuizCompletion)
        .filter_map(|a| a.score)
}

/// Mean of the most recent quiz scores, 2-decimal rounding, 0 when none.
/// Expects activities ordered newest-first.
pub fn average_score(activities: &[ActivityRecord]) -> f64 {
    let scores: Vec<f64> = quiz_scores_newest_first(activities)
        .take(AVERAGE_SCORE_WINDOW)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    round2(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn is_task(activity: &ActivityRecord) -> bool {
    matches!(
        activity.kind,
        ActivityKind::LessonCompletion | ActivityKind::AssignmentSubmission
    )
}

fn is_completed(activity: &ActivityRecord) -> bool {
    activity.completed || activity.points_earned.map_or(false, |points| points > 0.0)
}

/// Completed / total over lesson-completion and assignment-submission
/// records; "completed" is an explicit flag or any positive points earned.
pub fn task_completion_rate(activities: &[ActivityRecord]) -> f64 {
    let total = activities.iter().filter(|a| is_task(a)).count();
    if total == 0 {
        return 0.0;
    }
    let completed = activities
        .iter()
        .filter(|a| is_task(a) && is_completed(a))
        .count();
    round2(completed as f64 / total as f64)
}

/// Quiz completions within the trailing day window.
pub fn recent_attempts(activities: &[ActivityRecord], now: DateTime<Utc>, window_days: i64) -> usize {
    let cutoff = now - Duration::days(window_days.max(1));
    activities
        .iter()
        .filter(|a| a.kind == ActivityKind::QuizCompletion && a.created_at >= cutoff)
        .count()
}

/// Assembles the full snapshot. Each field is computed independently over the
/// same immutable slice; activities must be ordered newest-first.
pub fn build_snapshot(activities: &[ActivityRecord], now: DateTime<Utc>) -> PerformanceSnapshot {
    let total_quizzes = activities
        .iter()
        .filter(|a| a.kind == ActivityKind::QuizCompletion)
        .count();
    let total_tasks = activities.iter().filter(|a| is_task(a)).count();
    let completed_tasks = activities
        .iter()
        .filter(|a| is_task(a) && is_completed(a))
        .count();
    let recent_scores: Vec<f64> = quiz_scores_newest_first(activities)
        .take(RECENT_SCORE_CAP)
        .collect();
    let last_quiz_date = activities
        .iter()
        .filter(|a| a.kind == ActivityKind::QuizCompletion)
        .map(|a| a.created_at)
        .max();

    PerformanceSnapshot {
        average_score: average_score(activities),
        task_completion_rate: task_completion_rate(activities),
        total_quizzes,
        total_tasks,
        completed_tasks,
        recent_attempts: recent_attempts(activities, now, RECENT_ATTEMPT_DAYS),
        recent_scores,
        last_quiz_date,
    }
}
