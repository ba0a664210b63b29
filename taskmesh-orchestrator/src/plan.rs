//! Plan parsing (spec §4.8 "Plan"): a strict JSON schema with a
//! single-subtask fallback, per the Open Question in spec §9 (the
//! source's parser is known-incomplete).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The inbound request that seeds planning: the top-level task a caller
/// wants executed.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub name: String,
    pub description: String,
    pub task_type: String,
    pub input: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub assigned_to: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub input: Json,
}

fn default_priority() -> i32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanResponse {
    subtasks: Vec<SubtaskSpec>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub subtasks: Vec<SubtaskSpec>,
    /// True when the strict parse/validation failed and the single-step
    /// fallback plan was used instead.
    pub fell_back: bool,
}

impl Plan {
    fn single_step(request: &PlanRequest) -> Self {
        Self {
            subtasks: vec![SubtaskSpec {
                name: request.name.clone(),
                description: request.description.clone(),
                assigned_to: request.task_type.clone(),
                dependencies: Vec::new(),
                priority: default_priority(),
                input: request.input.clone(),
            }],
            fell_back: true,
        }
    }
}

/// Parses a reasoning service's raw text response into a [`Plan`].
///
/// Validates that every dependency name refers to another subtask in
/// the same plan, every `assigned_to` is a known capability, and every
/// priority is in `[1, 10]`. Any parse or validation failure falls back
/// to a single-subtask plan equal to `request` (spec §4.8).
pub fn parse_plan_response(raw: &str, known_capabilities: &HashSet<String>, request: &PlanRequest) -> Plan {
    let Ok(response) = serde_json::from_str::<PlanResponse>(raw) else {
        return Plan::single_step(request);
    };
    if response.subtasks.is_empty() {
        return Plan::single_step(request);
    }

    let names: HashSet<&str> = response.subtasks.iter().map(|s| s.name.as_str()).collect();
    if names.len() != response.subtasks.len() {
        return Plan::single_step(request);
    }

    let valid = response.subtasks.iter().all(|s| {
        s.dependencies.iter().all(|dep| names.contains(dep.as_str()))
            && known_capabilities.contains(&s.assigned_to)
            && (1..=10).contains(&s.priority)
    });

    if !valid {
        return Plan::single_step(request);
    }

    Plan {
        subtasks: response.subtasks,
        fell_back: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capabilities() -> HashSet<String> {
        ["research", "data_analysis", "content_creation"].iter().map(|s| s.to_string()).collect()
    }

    fn request() -> PlanRequest {
        PlanRequest {
            name: "Simple".to_string(),
            description: String::new(),
            task_type: "code_generation".to_string(),
            input: json!("x"),
        }
    }

    #[test]
    fn valid_plan_parses_and_does_not_fall_back() {
        let raw = r#"{"subtasks":[{"name":"A","assigned_to":"research","dependencies":[],"priority":5,"input":"x"}]}"#;
        let plan = parse_plan_response(raw, &capabilities(), &request());
        assert!(!plan.fell_back);
        assert_eq!(plan.subtasks.len(), 1);
    }

    #[test]
    fn unparsable_response_falls_back_to_single_step() {
        let plan = parse_plan_response("not json", &capabilities(), &request());
        assert!(plan.fell_back);
        assert_eq!(plan.subtasks[0].name, "Simple");
    }

    #[test]
    fn dependency_on_unknown_name_falls_back() {
        let raw = r#"{"subtasks":[{"name":"A","assigned_to":"research","dependencies":["missing"],"priority":5}]}"#;
        let plan = parse_plan_response(raw, &capabilities(), &request());
        assert!(plan.fell_back);
    }

    #[test]
    fn unknown_capability_falls_back() {
        let raw = r#"{"subtasks":[{"name":"A","assigned_to":"not_a_capability","dependencies":[],"priority":5}]}"#;
        let plan = parse_plan_response(raw, &capabilities(), &request());
        assert!(plan.fell_back);
    }

    #[test]
    fn out_of_range_priority_falls_back() {
        let raw = r#"{"subtasks":[{"name":"A","assigned_to":"research","dependencies":[],"priority":11}]}"#;
        let plan = parse_plan_response(raw, &capabilities(), &request());
        assert!(plan.fell_back);
    }
}
