//! 审计日志变更集计算
//!
//! UPDATE diff 只比较更新 payload 中出现的字段与操作前快照，无需 schema
//! 反射。值比较使用递归深度相等，浮点数使用容差比较避免序列化精度问题。

use serde_json::{Map, Value, json};

use super::redact::redacted;

/// 浮点数比较容差 (用于处理序列化/反序列化精度损失)
const FLOAT_EPSILON: f64 = 1e-9;

/// 存储引擎自动维护的字段，永远不进入变更集
const IGNORED_FIELDS: &[&str] = &["id", "created_at", "updated_at", "tenant_id"];

fn is_ignored(field: &str) -> bool {
    IGNORED_FIELDS.contains(&field)
}

/// 递归比较两个 JSON 值是否相等（浮点数使用容差比较）
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(fa), Some(fb)) => (fa - fb).abs() < FLOAT_EPSILON,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(va, vb)| values_equal(va, vb))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, va)| b.get(key).is_some_and(|vb| values_equal(va, vb)))
        }
        _ => false,
    }
}

fn strip_ignored(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.retain(|field, _| !is_ignored(field));
            Value::Object(map)
        }
        other => other,
    }
}

/// CREATE 变更集：`{"after": <脱敏后的快照>}`
pub fn create_changes(after: &Value) -> Value {
    json!({ "after": redacted(strip_ignored(after.clone())) })
}

/// DELETE 变更集：`{"before": <脱敏后的操作前状态>}`
pub fn delete_changes(before: &Value) -> Value {
    json!({ "before": redacted(strip_ignored(before.clone())) })
}

/// UPDATE 字段级 diff
///
/// 对 payload 中出现的每个字段，比较旧值（`before` 快照）与新值（优先取
/// `after` 即操作后状态，否则取 payload 本身）。未变更和忽略列表中的字段
/// 被省略；脱敏在 diff 之后应用，敏感字段的"发生了变更"仍被记录。
///
/// 返回 `None` 表示空 diff（不产生审计条目）。
pub fn update_changes(before: &Value, payload: &Value, after: Option<&Value>) -> Option<Value> {
    let empty = Map::new();
    let before_obj = before.as_object().unwrap_or(&empty);
    let payload_obj = payload.as_object()?;

    let mut changes = Map::new();
    for (field, payload_value) in payload_obj {
        if is_ignored(field) {
            continue;
        }
        let new_value = after
            .and_then(|row| row.get(field))
            .unwrap_or(payload_value);
        let old_value = before_obj.get(field).cloned().unwrap_or(Value::Null);
        if !values_equal(&old_value, new_value) {
            changes.insert(
                field.clone(),
                json!({ "old": old_value, "new": new_value.clone() }),
            );
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(redacted(Value::Object(changes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::redact::REDACTION_MARKER;

    #[test]
    fn unchanged_fields_are_omitted() {
        let before = json!({"title": "Vase", "status": "open"});
        let payload = json!({"title": "Amphora", "status": "open"});
        let diff = update_changes(&before, &payload, None).unwrap();
        assert_eq!(diff["title"]["old"], "Vase");
        assert_eq!(diff["title"]["new"], "Amphora");
        assert!(diff.get("status").is_none());
    }

    #[test]
    fn identical_payload_yields_no_diff() {
        let state = json!({"title": "Vase", "price": 10.0});
        assert!(update_changes(&state, &state, None).is_none());
    }

    #[test]
    fn float_noise_is_not_a_change() {
        let before = json!({"price": 10.0});
        let payload = json!({"price": 10.000000000001});
        assert!(update_changes(&before, &payload, None).is_none());
    }

    #[test]
    fn ignored_fields_never_appear() {
        let before = json!({"title": "Vase", "updated_at": 1, "tenant_id": "t1"});
        let payload = json!({"title": "Vase", "updated_at": 2, "tenant_id": "t2", "id": "x"});
        assert!(update_changes(&before, &payload, None).is_none());
    }

    #[test]
    fn field_absent_before_diffs_from_null() {
        let before = json!({"title": "Vase"});
        let payload = json!({"reserve_price": 100});
        let diff = update_changes(&before, &payload, None).unwrap();
        assert_eq!(diff["reserve_price"]["old"], Value::Null);
        assert_eq!(diff["reserve_price"]["new"], 100);
    }

    #[test]
    fn post_state_wins_over_payload_when_available() {
        let before = json!({"status": "open"});
        let payload = json!({"status": "closing"});
        let after = json!({"status": "closed"});
        let diff = update_changes(&before, &payload, Some(&after)).unwrap();
        assert_eq!(diff["status"]["new"], "closed");
    }

    #[test]
    fn nested_value_change_is_detected() {
        let before = json!({"shipping": {"method": "post", "days": 3}});
        let payload = json!({"shipping": {"method": "courier", "days": 3}});
        let diff = update_changes(&before, &payload, None).unwrap();
        assert_eq!(diff["shipping"]["old"]["method"], "post");
        assert_eq!(diff["shipping"]["new"]["method"], "courier");
    }

    #[test]
    fn sensitive_field_change_is_recorded_but_hidden() {
        let before = json!({"password": "old-secret"});
        let payload = json!({"password": "new-secret"});
        let diff = update_changes(&before, &payload, None).unwrap();
        assert_eq!(diff["password"], REDACTION_MARKER);
    }

    #[test]
    fn create_snapshot_strips_ignored_and_redacts() {
        let row = json!({"id": "user:1", "name": "Ana", "password": "x", "tenant_id": "t1"});
        let changes = create_changes(&row);
        assert_eq!(changes["after"]["name"], "Ana");
        assert_eq!(changes["after"]["password"], REDACTION_MARKER);
        assert!(changes["after"].get("id").is_none());
        assert!(changes["after"].get("tenant_id").is_none());
    }

    #[test]
    fn delete_snapshot_wraps_prior_state() {
        let row = json!({"id": "lot:1", "title": "Vase"});
        let changes = delete_changes(&row);
        assert_eq!(changes["before"]["title"], "Vase");
    }
}
