use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a logged learner event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    QuizCompletion,
    LessonCompletion,
    AssignmentSubmission,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::QuizCompletion => "quiz_completion",
            ActivityKind::LessonCompletion => "lesson_completion",
            ActivityKind::AssignmentSubmission => "assignment_submission",
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "quiz_completion" => Ok(ActivityKind::QuizCompletion),
            "lesson_completion" => Ok(ActivityKind::LessonCompletion),
            "assignment_submission" => Ok(ActivityKind::AssignmentSubmission),
            other => bail!("unknown activity kind: {other}"),
        }
    }
}

/// Which pipeline a record entered concept extraction through. Structured
/// content is not an activity kind but still contributes concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Quiz,
    Lesson,
    Assignment,
    Content,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Quiz => "quiz",
            SourceKind::Lesson => "lesson",
            SourceKind::Assignment => "assignment",
            SourceKind::Content => "content",
        }
    }
}

impl From<ActivityKind> for SourceKind {
    fn from(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::QuizCompletion => SourceKind::Quiz,
            ActivityKind::LessonCompletion => SourceKind::Lesson,
            ActivityKind::AssignmentSubmission => SourceKind::Assignment,
        }
    }
}

/// Normalized activity metadata. Fetch fills absent fields with empty/None so
/// extraction never probes raw JSON shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityMetadata {
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// One logged learner event. Immutable once logged; read-only to this engine.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub student_id: Uuid,
    pub kind: ActivityKind,
    pub score: Option<f64>,
    pub metadata: ActivityMetadata,
    pub topic_name: Option<String>,
    pub unit_name: Option<String>,
    pub module_name: Option<String>,
    pub lesson_id: Option<String>,
    pub course_id: Option<String>,
    pub quiz_id: Option<String>,
    pub completed: bool,
    pub points_earned: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Approved structured content a learner reaches via module enrollment.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub module_name: String,
    pub title: String,
    pub metadata: ActivityMetadata,
    pub lesson_id: Option<String>,
    pub course_id: Option<String>,
}

/// Derived performance snapshot. Computed fresh on every evaluation and never
/// cached; a copy rides along on each LearningPath row for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub average_score: f64,
    pub task_completion_rate: f64,
    pub total_quizzes: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub recent_attempts: usize,
    pub recent_scores: Vec<f64>,
    pub last_quiz_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathwayType {
    Basic,
    Balanced,
    Acceleration,
}

impl PathwayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathwayType::Basic => "basic",
            PathwayType::Balanced => "balanced",
            PathwayType::Acceleration => "acceleration",
        }
    }

    /// Position on the basic → balanced → acceleration ladder.
    pub fn ladder_index(&self) -> i32 {
        match self {
            PathwayType::Basic => 0,
            PathwayType::Balanced => 1,
            PathwayType::Acceleration => 2,
        }
    }
}

impl std::str::FromStr for PathwayType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "basic" => Ok(PathwayType::Basic),
            "balanced" => Ok(PathwayType::Balanced),
            "acceleration" => Ok(PathwayType::Acceleration),
            other => bail!("unknown pathway type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Why an evaluation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Trigger {
    QuizCompletion,
    TaskMilestone,
    Manual,
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::QuizCompletion => "quiz_completion",
            Trigger::TaskMilestone => "task_milestone",
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Trigger {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "quiz_completion" => Ok(Trigger::QuizCompletion),
            "task_milestone" => Ok(Trigger::TaskMilestone),
            "manual" => Ok(Trigger::Manual),
            "scheduled" => Ok(Trigger::Scheduled),
            other => bail!("unknown trigger: {other}"),
        }
    }
}

/// Machine-readable rule tags recorded alongside the prose reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFactors {
    pub primary: String,
    pub secondary: Option<String>,
}

/// Ephemeral output of classification.
#[derive(Debug, Clone)]
pub struct PathwayDetermination {
    pub pathway_type: PathwayType,
    pub reasoning: String,
    pub confidence: Confidence,
    pub factors: DecisionFactors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayHistoryEntry {
    pub from: PathwayType,
    pub to: PathwayType,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

/// One persisted evaluation event. Rows are never deleted; only `is_active`
/// mutates on prior rows.
#[derive(Debug, Clone)]
pub struct LearningPath {
    pub id: Uuid,
    pub student_id: Uuid,
    pub pathway_type: PathwayType,
    pub average_score: f64,
    pub task_completion_rate: f64,
    pub recommended_tags: Vec<String>,
    pub performance_metrics: PerformanceSnapshot,
    pub calculated_at: DateTime<Utc>,
    pub trigger: Trigger,
    pub previous_pathway: Option<PathwayType>,
    pub pathway_history: Vec<PathwayHistoryEntry>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    NeedsImprovement,
    Beginner,
    Developing,
    Proficient,
    Mastered,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryLevel::NeedsImprovement => "needs_improvement",
            MasteryLevel::Beginner => "beginner",
            MasteryLevel::Developing => "developing",
            MasteryLevel::Proficient => "proficient",
            MasteryLevel::Mastered => "mastered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMasteryRecord {
    pub concept_name: String,
    pub mastery_percentage: f64,
    pub mastery_level: MasteryLevel,
    pub total_attempts: usize,
    pub engagement_count: usize,
    pub last_attempt: Option<DateTime<Utc>>,
    pub recent_scores: Vec<f64>,
    pub sources: Vec<SourceKind>,
}

/// Per-level record counts, recomputed from the ranked list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasteryLevelCounts {
    pub needs_improvement: usize,
    pub beginner: usize,
    pub developing: usize,
    pub proficient: usize,
    pub mastered: usize,
}

/// Learner-wide mastery profile. One row per student, overwritten in full on
/// every mastery query; created_at survives the upsert.
#[derive(Debug, Clone)]
pub struct MasterySummary {
    pub student_id: Uuid,
    pub concepts: Vec<ConceptMasteryRecord>,
    pub total_concepts: usize,
    pub level_counts: MasteryLevelCounts,
    pub average_mastery: f64,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Result of the advisory transition check. Never blocks persistence.
#[derive(Debug, Clone)]
pub struct TransitionCheck {
    pub is_valid: bool,
    pub reason: String,
}

/// What `evaluate` hands back to the caller.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub path: LearningPath,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}
