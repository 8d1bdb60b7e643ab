//! Prompts and response schemas for the two Tier 2 stages.

use serde_json::{Value, json};
use stride_core::{
    ContextBundle, PipelineContext, RecommendationCandidate, SituationalAssessment, StateSnapshot,
};

pub const ASSESSMENT_SYSTEM: &str = "You are a planning coach reviewing one person's goals, habits and \
tasks. Describe their current situation: what matters most right now, what is at risk, and what \
openings exist. Be concrete and brief. Respond only with JSON matching the schema.";

pub const SELECTION_SYSTEM: &str = "You choose which of the numbered candidate recommendations to show \
the user. Select only candidates that help given the assessment, rank them starting at 1, and write \
a short personal rationale for each. Refer to candidates only by their index. Respond only with JSON \
matching the schema.";

/// Schema for the situational assessment stage.
pub fn assessment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "key_concerns": { "type": "array", "items": { "type": "string" } },
            "opportunities": { "type": "array", "items": { "type": "string" } },
            "user_state": { "type": "string" },
            "urgency": { "type": "string", "enum": ["low", "medium", "high"] }
        },
        "required": ["summary", "key_concerns", "opportunities", "user_state", "urgency"],
        "additionalProperties": false
    })
}

/// Schema for the candidate selection stage.
pub fn selection_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "minimum": 0 },
                        "rank": { "type": "integer", "minimum": 1 },
                        "rationale": { "type": "string" },
                        "action_summary": { "type": "string" }
                    },
                    "required": ["index", "rank", "rationale", "action_summary"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["selections"],
        "additionalProperties": false
    })
}

/// A compact JSON view of the open parts of the snapshot.
fn state_summary(state: &StateSnapshot) -> Value {
    let goals: Vec<Value> = state
        .goals
        .iter()
        .filter(|g| g.status.is_open())
        .map(|g| json!({ "id": g.id, "title": g.title, "priority": g.priority, "progress": g.progress }))
        .collect();
    let habits: Vec<Value> = state
        .habits
        .iter()
        .filter(|h| h.status.is_open())
        .map(|h| {
            json!({
                "id": h.id,
                "title": h.title,
                "mode": h.scaling_mode.as_str(),
                "adherence_7d": h.adherence_7d(),
                "streak": h.current_streak,
            })
        })
        .collect();
    let tasks: Vec<Value> = state
        .tasks
        .iter()
        .filter(|t| t.status.is_open())
        .map(|t| {
            json!({
                "id": t.id,
                "title": t.title,
                "priority": t.priority,
                "due": t.due,
                "scheduled_for": t.scheduled_for,
                "progress": t.progress,
            })
        })
        .collect();

    json!({
        "date": state.local_date,
        "energy_today": state.energy_today(),
        "check_in_streak": state.check_in_streak,
        "daily_capacity_minutes": state.daily_capacity_minutes,
        "goals": goals,
        "habits": habits,
        "tasks": tasks,
    })
}

pub fn assessment_prompt(
    state: &StateSnapshot,
    context: &PipelineContext,
    retrieved: &ContextBundle,
) -> String {
    let mut prompt = format!(
        "Current state:\n{}\n\nRules that fired: {}\n",
        state_summary(state),
        if context.triggered_rule_ids.is_empty() {
            "none".to_string()
        } else {
            context.triggered_rule_ids.join(", ")
        }
    );
    if let Some(tier1) = &context.tier1_context {
        prompt.push_str("\nRelated history:\n");
        prompt.push_str(tier1);
        prompt.push('\n');
    }
    if !retrieved.is_empty() {
        prompt.push_str("\nSupporting context:\n");
        prompt.push_str(&retrieved.render());
        prompt.push('\n');
    }
    prompt
}

pub fn selection_prompt(
    assessment: &SituationalAssessment,
    candidates: &[RecommendationCandidate],
    retrieved: &ContextBundle,
) -> String {
    let listed: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| {
            json!({
                "index": index,
                "action": c.action_kind.as_str(),
                "target": c.target_kind.as_str(),
                "target_title": c.target_entity_title,
                "title": c.title,
                "rationale": c.rationale,
                "score": c.score,
            })
        })
        .collect();

    let mut prompt = format!(
        "Assessment:\n{}\n\nCandidates:\n{}\n",
        json!(assessment),
        Value::Array(listed)
    );
    if !retrieved.is_empty() {
        prompt.push_str("\nSupporting context:\n");
        prompt.push_str(&retrieved.render());
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::{ActionKind, TargetKind};

    #[test]
    fn schemas_require_every_property() {
        for schema in [assessment_schema(), selection_schema()] {
            let props = schema["properties"].as_object().unwrap().len();
            let required = schema["required"].as_array().unwrap().len();
            assert_eq!(props, required);
            assert_eq!(schema["additionalProperties"], false);
        }
    }

    #[test]
    fn selection_prompt_indexes_candidates() {
        let candidates = vec![
            RecommendationCandidate::new(ActionKind::Defer, TargetKind::Task, "Push the gym"),
            RecommendationCandidate::new(ActionKind::CheckIn, TargetKind::CheckIn, "Check in"),
        ];
        let prompt = selection_prompt(
            &SituationalAssessment::default(),
            &candidates,
            &ContextBundle::default(),
        );
        assert!(prompt.contains("\"index\":0"));
        assert!(prompt.contains("\"index\":1"));
        assert!(!prompt.contains("Supporting context"));
    }

    #[test]
    fn assessment_prompt_carries_tier1_context() {
        let state = StateSnapshot::empty("u1", chrono::Utc::now());
        let mut ctx = PipelineContext::new("u1", "b1");
        ctx.triggered_rule_ids = vec!["habit_adherence".into()];
        ctx.tier1_context = Some("- [journal] tired all week".into());

        let prompt = assessment_prompt(&state, &ctx, &ContextBundle::default());
        assert!(prompt.contains("habit_adherence"));
        assert!(prompt.contains("tired all week"));
    }
}
