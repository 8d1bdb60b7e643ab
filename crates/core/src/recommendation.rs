//! Recommendation candidates and the enums that classify them.
//!
//! A [`RecommendationCandidate`] is fully formed but not yet persisted or
//! policy-checked. Rules and the Tier 2 selection stage produce them; the
//! policy enforcer filters them; the caller persists the survivors.

use serde::{Deserialize, Serialize};

/// Four-level ordinal used for escalation and prioritization.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_high_or_critical(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    /// Move up `steps` levels, saturating at `Critical`.
    pub fn raised(self, steps: u8) -> Self {
        let level = (self.level() + steps).min(3);
        Self::from_level(level)
    }

    /// Position on the ladder mapped onto `[0, 1]`.
    pub fn weight(self) -> f64 {
        f64::from(self.level()) / 3.0
    }

    fn level(self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    fn from_level(level: u8) -> Self {
        match level {
            0 => Severity::Low,
            1 => Severity::Medium,
            2 => Severity::High,
            _ => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What the user is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a new entity (usually a task).
    Create,
    /// Work on the target today.
    ExecuteToday,
    /// Push the target to a later day.
    Defer,
    /// Move the target's due date.
    Reschedule,
    /// Shrink a habit to a smaller scaling mode.
    ScaleBack,
    /// Complete a check-in.
    CheckIn,
    /// Record a metric observation.
    LogObservation,
    /// Think about the target; no entity changes.
    Reflect,
    /// Read or learn something; no entity changes.
    Learn,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::ExecuteToday => "execute_today",
            Self::Defer => "defer",
            Self::Reschedule => "reschedule",
            Self::ScaleBack => "scale_back",
            Self::CheckIn => "check_in",
            Self::LogObservation => "log_observation",
            Self::Reflect => "reflect",
            Self::Learn => "learn",
        }
    }

    /// Reflect and learn never touch domain entities.
    pub fn is_passive(self) -> bool {
        matches!(self, Self::Reflect | Self::Learn)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of entity a recommendation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Task,
    Habit,
    Goal,
    Project,
    Experiment,
    CheckIn,
    Metric,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Habit => "habit",
            Self::Goal => "goal",
            Self::Project => "project",
            Self::Experiment => "experiment",
            Self::CheckIn => "check_in",
            Self::Metric => "metric",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad category of a recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    #[default]
    Nudge,
    Adjustment,
    Warning,
    Insight,
}

/// The situation a recommendation responds to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationContext {
    #[default]
    DailyPlanning,
    DeadlineRisk,
    HabitCoaching,
    CheckIn,
    MetricTracking,
    Routine,
    EnergyManagement,
}

/// A fully formed, not yet persisted recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCandidate {
    #[serde(rename = "type")]
    pub recommendation_type: RecommendationType,

    pub context: RecommendationContext,

    pub target_kind: TargetKind,

    /// None when the action has no concrete entity yet (e.g. a new check-in).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_title: Option<String>,

    pub action_kind: ActionKind,

    pub title: String,

    pub rationale: String,

    /// Confidence in `[0, 1]`.
    pub score: f64,

    /// Opaque structured data interpreted by the action dispatcher.
    #[serde(default)]
    pub action_payload: serde_json::Value,

    #[serde(default)]
    pub action_summary: String,

    #[serde(default)]
    pub contributing_signal_ids: Vec<String>,

    /// Rule that produced this candidate, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_rule: Option<String>,
}

impl RecommendationCandidate {
    /// Start a candidate with neutral defaults.
    pub fn new(action_kind: ActionKind, target_kind: TargetKind, title: impl Into<String>) -> Self {
        Self {
            recommendation_type: RecommendationType::default(),
            context: RecommendationContext::default(),
            target_kind,
            target_entity_id: None,
            target_entity_title: None,
            action_kind,
            title: title.into(),
            rationale: String::new(),
            score: 0.5,
            action_payload: serde_json::Value::Null,
            action_summary: String::new(),
            contributing_signal_ids: Vec::new(),
            source_rule: None,
        }
    }

    pub fn with_type(mut self, recommendation_type: RecommendationType) -> Self {
        self.recommendation_type = recommendation_type;
        self
    }

    pub fn with_context(mut self, context: RecommendationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_target(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.target_entity_id = Some(id.into());
        self.target_entity_title = Some(title.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Set the score, clamped to `[0, 1]`.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = clamp_score(score);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.action_payload = payload;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.action_summary = summary.into();
        self
    }

    pub fn with_signals(mut self, signal_ids: Vec<String>) -> Self {
        self.contributing_signal_ids = signal_ids;
        self
    }

    pub fn from_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.source_rule = Some(rule_id.into());
        self
    }

    /// Grouping key used for deduplication.
    pub fn target_key(&self) -> (TargetKind, Option<&str>) {
        (self.target_kind, self.target_entity_id.as_deref())
    }
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
