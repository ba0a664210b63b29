//! Normalizes the three content encodings a worker must accept for a
//! task message (spec §4.4 / "Content payload shape variance"): the
//! native `Task` shape, a reference shape (`{"task": <Task>}`), and a
//! string-keyed mapping produced by a JSON round-trip through a
//! loosely-typed caller (numeric fields arriving as strings, `type`
//! aliased as `task_type`).

use serde_json::Value as Json;

use taskmesh_shared::model::{Task, TaskPriority};

/// Attempt all three shapes in turn, returning the first that decodes.
pub fn normalize_task_content(content: &Json) -> Result<Task, String> {
    if let Ok(task) = serde_json::from_value::<Task>(content.clone()) {
        return Ok(task);
    }

    if let Some(inner) = content.get("task") {
        if let Ok(task) = serde_json::from_value::<Task>(inner.clone()) {
            return Ok(task);
        }
    }

    if let Json::Object(_) = content {
        let coerced = coerce_string_keyed_mapping(content.clone());
        if let Ok(task) = serde_json::from_value::<Task>(coerced) {
            return Ok(task);
        }
    }

    Err(format!("content did not match any known task shape: {content}"))
}

/// Repairs the common mismatches seen in a plain string-keyed map: the
/// Rust field name `task_type` used in place of the wire name `type`,
/// and `priority` arriving as a numeric band (1-10, or a numeric string)
/// rather than the enum's own serialized variant name.
fn coerce_string_keyed_mapping(mut value: Json) -> Json {
    let Json::Object(map) = &mut value else {
        return value;
    };

    if !map.contains_key("type") {
        if let Some(t) = map.remove("task_type") {
            map.insert("type".to_string(), t);
        }
    }

    let numeric_priority = match map.get("priority") {
        Some(Json::Number(n)) => n.as_i64(),
        Some(Json::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    };
    if let Some(band) = numeric_priority.and_then(|n| TaskPriority::try_from_i32(n as i32)) {
        map.insert("priority".to_string(), serde_json::to_value(band).expect("enum serializes"));
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_shape_round_trips() {
        let task = Task::new("t", "code_generation", "creator", json!({}));
        let content = serde_json::to_value(&task).unwrap();
        let decoded = normalize_task_content(&content).unwrap();
        assert_eq!(decoded.id, task.id);
    }

    #[test]
    fn reference_shape_unwraps_task_key() {
        let task = Task::new("t", "code_generation", "creator", json!({}));
        let content = json!({ "task": task });
        let decoded = normalize_task_content(&content).unwrap();
        assert_eq!(decoded.id, task.id);
    }

    #[test]
    fn malformed_content_is_rejected() {
        let content = json!({ "nonsense": true });
        assert!(normalize_task_content(&content).is_err());
    }

    #[test]
    fn string_keyed_mapping_coerces_type_alias_and_numeric_priority() {
        let task = Task::new("t", "research", "creator", json!({}));
        let mut content = serde_json::to_value(&task).unwrap();
        let map = content.as_object_mut().unwrap();
        let task_type = map.remove("type").unwrap();
        map.insert("task_type".to_string(), task_type);
        map.insert("priority".to_string(), json!("8"));

        let decoded = normalize_task_content(&content).unwrap();
        assert_eq!(decoded.priority, TaskPriority::High);
    }
}
