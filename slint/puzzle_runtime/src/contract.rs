use crate::environment::HostEnvironment;
use crate::message::{FailureOptions, SuccessOptions};
use serde_json::{Map, Value};

/// Properties handed to a puzzle on every render.
///
/// Every field is `None` until the host environment has been resolved; a
/// puzzle must read `None` as "not known yet", never as "known empty".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PuzzleProps {
    pub preview: Option<bool>,
    pub start_fresh: Option<bool>,
    pub config: Option<Value>,
    pub data: Option<Value>,
}

impl PuzzleProps {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn from_environment(env: &HostEnvironment) -> Self {
        Self {
            preview: Some(env.preview()),
            start_fresh: Some(start_fresh(env.preview(), env.data())),
            config: Some(env.config().clone()),
            data: Some(env.data().clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.preview.is_some()
    }
}

/// Callbacks a puzzle may invoke. None of them can fail from the puzzle's side.
pub trait PuzzleCallbacks {
    /// Partial config change; merged onto the session config before it is sent.
    fn on_config(&self, partial: Value);
    /// Complete snapshot of puzzle state, sent as-is.
    fn on_progress(&self, data: Value);
    fn on_failure(&self, options: FailureOptions);
    fn on_success(&self, options: SuccessOptions);
}

pub trait Puzzle {
    fn render(&mut self, props: &PuzzleProps, callbacks: &dyn PuzzleCallbacks);
}

/// Preview sessions and sessions without saved data start from scratch.
pub fn start_fresh(preview: bool, data: &Value) -> bool {
    preview || is_empty_data(data)
}

pub fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Shallow merge of `partial` onto `base`; keys in `partial` win.
///
/// A non-object `base` counts as `{}`. A non-object `partial` leaves `base`
/// as it is.
pub fn merge_config(base: &Value, partial: &Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    match partial {
        Value::Object(updates) => {
            for (key, value) in updates {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => tracing::warn!("ignoring non-object config update: {other}"),
    }

    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_fresh_truth_table() {
        assert!(start_fresh(true, &json!({"foo": 1})));
        assert!(start_fresh(true, &Value::Null));
        assert!(start_fresh(false, &Value::Null));
        assert!(start_fresh(false, &json!({})));
        assert!(start_fresh(false, &json!([])));
        assert!(start_fresh(false, &json!("")));
        assert!(!start_fresh(false, &json!({"foo": 1})));
        assert!(!start_fresh(false, &json!(0)));
        assert!(!start_fresh(false, &json!(false)));
    }

    #[test]
    fn merge_overrides_and_keeps_base() {
        let base = json!({"a": 1, "b": 2});
        let merged = merge_config(&base, &json!({"b": 3}));

        assert_eq!(merged, json!({"a": 1, "b": 3}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_is_shallow() {
        let merged = merge_config(
            &json!({"board": {"w": 9, "h": 9}}),
            &json!({"board": {"w": 5}}),
        );
        assert_eq!(merged, json!({"board": {"w": 5}}));
    }

    #[test]
    fn merge_tolerates_non_object_inputs() {
        assert_eq!(merge_config(&Value::Null, &json!({"x": 1})), json!({"x": 1}));
        assert_eq!(merge_config(&json!({"x": 1}), &Value::Null), json!({"x": 1}));
        assert_eq!(merge_config(&json!({"x": 1}), &json!(7)), json!({"x": 1}));
    }

    #[test]
    fn pending_props_carry_nothing() {
        let props = PuzzleProps::pending();
        assert!(!props.is_ready());
        assert_eq!(props.start_fresh, None);
        assert_eq!(props.config, None);
    }

    #[test]
    fn props_from_environment_derive_start_fresh() {
        let env = HostEnvironment::from_value(json!({
            "preview": false,
            "config": {"difficulty": "easy"},
            "data": {"foo": 1},
        }));
        let props = PuzzleProps::from_environment(&env);

        assert!(props.is_ready());
        assert_eq!(props.preview, Some(false));
        assert_eq!(props.start_fresh, Some(false));
        assert_eq!(props.config, Some(json!({"difficulty": "easy"})));
        assert_eq!(props.data, Some(json!({"foo": 1})));
    }
}
