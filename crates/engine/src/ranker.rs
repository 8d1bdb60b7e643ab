//! Deduplication and ordering for the early-exit paths.

use std::collections::HashMap;
use stride_core::{RecommendationCandidate, StateSnapshot, TargetKind};

/// Keep the best candidate per `(target_kind, target_entity_id)`, order by
/// score and truncate to `max_results`.
///
/// Equal scores fall back to the priority of the goal the target serves
/// (higher priority first, unlinked last), then to the target key, so the
/// output is reproducible for identical input.
pub fn rank(
    candidates: Vec<RecommendationCandidate>,
    state: &StateSnapshot,
    max_results: usize,
) -> Vec<RecommendationCandidate> {
    let mut best: Vec<RecommendationCandidate> = Vec::with_capacity(candidates.len());
    let mut groups: HashMap<(TargetKind, Option<String>), usize> = HashMap::new();

    for candidate in candidates {
        let key = (candidate.target_kind, candidate.target_entity_id.clone());
        match groups.get(&key) {
            Some(&slot) => {
                if candidate.score > best[slot].score {
                    best[slot] = candidate;
                }
            }
            None => {
                groups.insert(key, best.len());
                best.push(candidate);
            }
        }
    }

    best.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| goal_priority(a, state).cmp(&goal_priority(b, state)))
            .then_with(|| a.target_kind.as_str().cmp(b.target_kind.as_str()))
            .then_with(|| a.target_entity_id.cmp(&b.target_entity_id))
    });
    best.truncate(max_results);
    best
}

/// Priority of the goal behind a candidate's target; unlinked sorts last.
fn goal_priority(candidate: &RecommendationCandidate, state: &StateSnapshot) -> u8 {
    candidate
        .target_entity_id
        .as_deref()
        .and_then(|id| state.goal_priority_for(candidate.target_kind, id))
        .unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stride_core::{ActionKind, EntityStatus, Goal, Task};

    fn rec(kind: TargetKind, id: &str, score: f64) -> RecommendationCandidate {
        RecommendationCandidate::new(ActionKind::ExecuteToday, kind, format!("{kind} {id}"))
            .with_target(id, id)
            .with_score(score)
    }

    fn state() -> StateSnapshot {
        StateSnapshot::empty("u1", Utc::now())
    }

    #[test]
    fn keeps_best_per_target() {
        let ranked = rank(
            vec![
                rec(TargetKind::Task, "t1", 0.4),
                rec(TargetKind::Task, "t1", 0.9),
                rec(TargetKind::Habit, "t1", 0.5),
                rec(TargetKind::Task, "t1", 0.6),
            ],
            &state(),
            10,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].target_kind, TargetKind::Task);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[1].target_kind, TargetKind::Habit);
    }

    #[test]
    fn truncates_to_max_results() {
        let input: Vec<_> = (0..8)
            .map(|i| rec(TargetKind::Task, &format!("t{i}"), f64::from(i) / 10.0))
            .collect();
        let ranked = rank(input, &state(), 3);
        assert_eq!(ranked.len(), 3);
        let scores: Vec<f64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.7, 0.6, 0.5]);
    }

    #[test]
    fn equal_scores_prefer_high_priority_goal() {
        let mut state = state();
        state.goals.push(Goal {
            id: "g1".into(),
            title: "Ship the book".into(),
            status: EntityStatus::Active,
            priority: 1,
            target_date: None,
            progress: 0.2,
        });
        let mut linked: Task = serde_json::from_value(serde_json::json!({
            "id": "t9",
            "title": "Write chapter",
        }))
        .unwrap();
        linked.goal_id = Some("g1".into());
        state.tasks.push(linked);

        let ranked = rank(
            vec![rec(TargetKind::Task, "t1", 0.5), rec(TargetKind::Task, "t9", 0.5)],
            &state,
            5,
        );
        assert_eq!(ranked[0].target_entity_id.as_deref(), Some("t9"));
    }

    #[test]
    fn untargeted_candidates_share_a_group() {
        let mut a = RecommendationCandidate::new(ActionKind::CheckIn, TargetKind::CheckIn, "a").with_score(0.3);
        a.target_entity_id = None;
        let b = RecommendationCandidate::new(ActionKind::CheckIn, TargetKind::CheckIn, "b").with_score(0.8);
        let ranked = rank(vec![a, b], &state(), 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].title, "b");
    }

    #[test]
    fn output_is_deterministic() {
        let input = vec![
            rec(TargetKind::Task, "b", 0.5),
            rec(TargetKind::Task, "a", 0.5),
            rec(TargetKind::Habit, "c", 0.5),
        ];
        let first = rank(input.clone(), &state(), 5);
        let reversed: Vec<_> = input.into_iter().rev().collect();
        let second = rank(reversed, &state(), 5);
        assert_eq!(first, second);
        assert_eq!(first[0].target_entity_id.as_deref(), Some("c"));
    }
}
