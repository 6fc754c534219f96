//! Repeated-failure detection.
//!
//! Outcomes are keyed by the tool name plus a canonical rendering of its
//! arguments. Two consecutive identical failures earn a nudge; three or
//! more earn a stop instruction.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailLevel {
    Nudge,
    Stop,
}

impl GuardrailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardrailIntervention {
    pub tool: String,
    pub level: GuardrailLevel,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Guardrail {
    consecutive_failures: HashMap<String, usize>,
}

impl Guardrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tool outcome; returns an intervention when a failure streak
    /// crosses a threshold.
    pub fn note(
        &mut self,
        tool: &str,
        arguments: Option<&Value>,
        succeeded: bool,
    ) -> Option<GuardrailIntervention> {
        let key = outcome_key(tool, arguments);
        if succeeded {
            self.consecutive_failures.remove(&key);
            return None;
        }

        let count = self.consecutive_failures.entry(key).or_insert(0);
        *count += 1;
        match *count {
            2 => Some(GuardrailIntervention {
                tool: tool.to_string(),
                level: GuardrailLevel::Nudge,
                message: format!(
                    "[guardrail] `{tool}` has now failed twice with the same arguments. \
                     Change the arguments or try a different approach."
                ),
            }),
            n if n >= 3 => Some(GuardrailIntervention {
                tool: tool.to_string(),
                level: GuardrailLevel::Stop,
                message: format!(
                    "[guardrail] `{tool}` has failed {n} times with the same arguments. \
                     Stop calling it with this argument combination."
                ),
            }),
            _ => None,
        }
    }
}

/// Stable key: the tool name plus the arguments re-serialised with sorted
/// object keys at every level.
fn outcome_key(tool: &str, arguments: Option<&Value>) -> String {
    match arguments {
        Some(value) => format!("{tool}:{}", canonical_json(value)),
        None => format!("{tool}:<invalid>"),
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_json(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn second_failure_nudges_third_stops() {
        let mut guardrail = Guardrail::new();
        let args = json!({"path": "src/x.txt", "old_string": "a", "new_string": "b"});

        assert!(guardrail.note("edit_file", Some(&args), false).is_none());
        let nudge = guardrail.note("edit_file", Some(&args), false).unwrap();
        assert_eq!(nudge.level, GuardrailLevel::Nudge);
        let stop = guardrail.note("edit_file", Some(&args), false).unwrap();
        assert_eq!(stop.level, GuardrailLevel::Stop);
        let still_stop = guardrail.note("edit_file", Some(&args), false).unwrap();
        assert_eq!(still_stop.level, GuardrailLevel::Stop);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut guardrail = Guardrail::new();
        let args = json!({"path": "a"});
        guardrail.note("read_file", Some(&args), false);
        guardrail.note("read_file", Some(&args), true);
        assert!(guardrail.note("read_file", Some(&args), false).is_none());
    }

    #[test]
    fn different_arguments_track_separately() {
        let mut guardrail = Guardrail::new();
        guardrail.note("grep", Some(&json!({"pattern": "a", "path": "."})), false);
        assert!(guardrail
            .note("grep", Some(&json!({"pattern": "b", "path": "."})), false)
            .is_none());
    }

    #[test]
    fn key_ignores_object_key_order() {
        let a = json!({"x": 1, "y": 2});
        let b = serde_json::from_str::<Value>(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(outcome_key("t", Some(&a)), outcome_key("t", Some(&b)));
    }
}
