//! Context access for guards and hooks.
//!
//! The engine never owns or copies the governed entity. It only needs to read
//! fields by dotted path (`order.customer.verified`, `items.0.sku`), so any type
//! implementing [`Context`] can be driven by a machine. Shared JSON contexts
//! that hooks are allowed to mutate are wrapped in a `parking_lot` lock.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

/// Read access to the entity a machine governs.
pub trait Context: Send + Sync + 'static {
    /// Resolves a dotted field path. Returns `None` if any segment is missing.
    fn field(&self, path: &str) -> Option<Value>;
}

impl Context for Value {
    fn field(&self, path: &str) -> Option<Value> {
        lookup(self, path).cloned()
    }
}

impl Context for RwLock<Value> {
    fn field(&self, path: &str) -> Option<Value> {
        lookup(&self.read(), path).cloned()
    }
}

impl Context for Mutex<Value> {
    fn field(&self, path: &str) -> Option<Value> {
        lookup(&self.lock(), path).cloned()
    }
}

/// Walks `path` through nested objects and arrays.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;

    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_field() {
        let ctx = json!({"data": "valid"});
        assert_eq!(ctx.field("data"), Some(json!("valid")));
    }

    #[test]
    fn test_nested_field() {
        let ctx = json!({"user": {"role": "admin"}});
        assert_eq!(ctx.field("user.role"), Some(json!("admin")));
    }

    #[test]
    fn test_missing_segment_is_absent() {
        let ctx = json!({"user": {}});
        assert_eq!(ctx.field("user.role"), None);
        assert_eq!(ctx.field("account.owner.name"), None);
    }

    #[test]
    fn test_traversal_through_scalar_is_absent() {
        let ctx = json!({"user": "bob"});
        assert_eq!(ctx.field("user.role"), None);
    }

    #[test]
    fn test_null_is_present() {
        let ctx = json!({"value": null});
        assert_eq!(ctx.field("value"), Some(Value::Null));
    }

    #[test]
    fn test_array_index() {
        let ctx = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
        assert_eq!(ctx.field("items.1.sku"), Some(json!("b")));
        assert_eq!(ctx.field("items.2.sku"), None);
        assert_eq!(ctx.field("items.x"), None);
    }

    #[test]
    fn test_locked_contexts() {
        let ctx = RwLock::new(json!({"a": {"b": 1}}));
        assert_eq!(ctx.field("a.b"), Some(json!(1)));

        ctx.write()["a"]["b"] = json!(2);
        assert_eq!(ctx.field("a.b"), Some(json!(2)));

        let ctx = Mutex::new(json!({"flag": true}));
        assert_eq!(ctx.field("flag"), Some(json!(true)));
    }
}
