//! Guard compilation and evaluation.
//!
//! A guard is a predicate over the instance context that must hold for a
//! transition to commit. Hand-authored definitions build guards from closures;
//! schema-driven definitions compile declarative [`ConditionConfig`]s:
//!
//! ```json
//! {"field": "order.total", "operator": "gte", "value": 100}
//! ```
//!
//! Supported operators:
//!
//! - `eq` / `neq` - loose (coercing) equality / inequality
//! - `gt`, `gte`, `lt`, `lte` - ordinal comparison; two strings compare
//!   lexicographically, anything else numerically
//! - `contains` - membership if the field is an array, substring of the
//!   stringified forms otherwise
//!
//! Any other operator name compiles to a guard that always fails and logs a
//! warning, so a misconfigured schema blocks rather than silently permits.

use crate::context::Context;
use crate::schema::ConditionConfig;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type PredicateFn<C> = dyn Fn(Arc<C>) -> BoxFuture<'static, bool> + Send + Sync;

/// A compiled guard.
pub struct Guard<C> {
    label: String,
    predicate: Arc<PredicateFn<C>>,
}

impl<C: Context> Guard<C> {
    /// Creates a guard from a synchronous predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self {
            label: "guard".to_string(),
            predicate: Arc::new(move |ctx: Arc<C>| future::ready(predicate(ctx.as_ref())).boxed()),
        }
    }

    /// Creates a guard from an asynchronous predicate.
    pub fn from_async<F, Fut>(predicate: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            label: "guard".to_string(),
            predicate: Arc::new(move |ctx: Arc<C>| predicate(ctx).boxed()),
        }
    }

    /// Attaches a human-readable label used in logs.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluates the guard.
    pub async fn check(&self, ctx: &Arc<C>) -> bool {
        (self.predicate)(Arc::clone(ctx)).await
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("label", &self.label).finish()
    }
}

/// Comparison operator of a [`ConditionConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    /// Unrecognized operator name, kept so the schema still loads.
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::Unknown(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "contains" => Operator::Contains,
            _ => Operator::Unknown(s),
        }
    }
}

impl From<&str> for Operator {
    fn from(s: &str) -> Self {
        Operator::from(s.to_string())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConditionConfig {
    /// Evaluates the condition against an already-resolved field value.
    /// `None` means the field was absent.
    pub fn evaluate(&self, actual: Option<&Value>) -> bool {
        match &self.operator {
            Operator::Eq => loose_eq(actual, &self.value),
            Operator::Neq => !loose_eq(actual, &self.value),
            Operator::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => contains(actual, &self.value),
            Operator::Unknown(op) => {
                tracing::warn!(operator = %op, field = %self.field, "unknown condition operator");
                false
            }
        }
    }
}

/// Compiles declarative conditions into guards.
pub struct ConditionCompiler;

impl ConditionCompiler {
    /// Compiles one condition.
    pub fn compile<C: Context>(config: &ConditionConfig) -> Guard<C> {
        let label = format!("{} {} {}", config.field, config.operator, config.value);
        let config = config.clone();
        Guard::new(move |ctx: &C| config.evaluate(ctx.field(&config.field).as_ref())).named(label)
    }

    /// Compiles a list of conditions, preserving order.
    pub fn compile_all<C: Context>(configs: &[ConditionConfig]) -> Vec<Guard<C>> {
        configs.iter().map(Self::compile::<C>).collect()
    }
}

fn loose_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        // Absent and null are loosely equal to each other and nothing else.
        None => expected.is_null(),
        Some(actual) => loose_eq_values(actual, expected),
    }
}

fn loose_eq_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => a == b,
        (Value::Bool(x), other) => loose_eq_values(&Value::from(u8::from(*x)), other),
        (other, Value::Bool(y)) => loose_eq_values(other, &Value::from(u8::from(*y))),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (to_number(a), to_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_)) => {
            loose_eq_values(&Value::String(stringify(Some(a))), b)
        }
        (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            loose_eq_values(a, &Value::String(stringify(Some(b))))
        }
        _ => false,
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let a = to_primitive(actual?);
    let b = to_primitive(expected);

    if let (Value::String(x), Value::String(y)) = (a.as_ref(), b.as_ref()) {
        return Some(x.as_str().cmp(y.as_str()));
    }

    to_number(&a)?.partial_cmp(&to_number(&b)?)
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) => items.iter().any(|item| strict_eq(item, expected)),
        _ => stringify(actual).contains(&stringify(Some(expected))),
    }
}

fn to_primitive(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::Array(_) | Value::Object(_) => Cow::Owned(Value::String(stringify(Some(value)))),
        _ => Cow::Borrowed(value),
    }
}

/// Numeric coercion. `None` stands for NaN.
fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().ok()?
            }
        }
        Value::Array(_) | Value::Object(_) => return to_number(&to_primitive(value)),
    };

    if n.is_nan() {
        None
    } else {
        Some(n)
    }
}

/// String coercion. `None` (absent) renders as `undefined`.
fn stringify(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: &str, value: Value) -> ConditionConfig {
        ConditionConfig {
            field: field.to_string(),
            operator: Operator::from(operator),
            value,
        }
    }

    async fn check(config: ConditionConfig, ctx: Value) -> bool {
        let guard: Guard<Value> = ConditionCompiler::compile(&config);
        guard.check(&Arc::new(ctx)).await
    }

    #[tokio::test]
    async fn test_equality() {
        assert!(check(cond("data", "eq", json!("valid")), json!({"data": "valid"})).await);
        assert!(!check(cond("data", "eq", json!("valid")), json!({"data": "invalid"})).await);
        assert!(check(cond("data", "neq", json!("valid")), json!({"data": "invalid"})).await);
    }

    #[tokio::test]
    async fn test_nested_field() {
        let c = cond("user.role", "eq", json!("admin"));
        assert!(check(c.clone(), json!({"user": {"role": "admin"}})).await);
        assert!(!check(c, json!({"user": {}})).await);
    }

    #[test]
    fn test_loose_equality_coercion() {
        assert!(cond("v", "eq", json!("5")).evaluate(Some(&json!(5))));
        assert!(cond("v", "eq", json!(1)).evaluate(Some(&json!(true))));
        assert!(cond("v", "eq", json!(0)).evaluate(Some(&json!(""))));
        assert!(cond("v", "eq", json!("1,2")).evaluate(Some(&json!([1, 2]))));
        assert!(cond("v", "eq", json!(5.0)).evaluate(Some(&json!(5))));
        assert!(!cond("v", "eq", json!("abc")).evaluate(Some(&json!(0))));
        assert!(!cond("v", "eq", json!(0)).evaluate(Some(&Value::Null)));
    }

    #[test]
    fn test_absent_equals_null_only() {
        assert!(cond("v", "eq", Value::Null).evaluate(None));
        assert!(cond("v", "eq", Value::Null).evaluate(Some(&Value::Null)));
        assert!(!cond("v", "eq", json!(0)).evaluate(None));
        assert!(!cond("v", "eq", json!("undefined")).evaluate(None));
        assert!(cond("v", "neq", json!("x")).evaluate(None));
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(cond("n", "gt", json!(100)).evaluate(Some(&json!(150))));
        assert!(!cond("n", "gt", json!(100)).evaluate(Some(&json!(100))));
        assert!(cond("n", "gte", json!(100)).evaluate(Some(&json!(100))));
        assert!(cond("n", "lt", json!(10)).evaluate(Some(&json!(-3.5))));
        assert!(cond("n", "lte", json!(10)).evaluate(Some(&json!(10))));
        assert!(!cond("n", "lte", json!(10)).evaluate(Some(&json!(11))));
    }

    #[test]
    fn test_numeric_string_comparison() {
        assert!(cond("n", "gt", json!(5)).evaluate(Some(&json!("10"))));
        assert!(!cond("n", "gt", json!(5)).evaluate(Some(&json!("abc"))));
    }

    #[test]
    fn test_string_ordering_is_lexicographic() {
        assert!(cond("s", "lt", json!("b")).evaluate(Some(&json!("a"))));
        // "10" < "9" as strings
        assert!(cond("s", "lt", json!("9")).evaluate(Some(&json!("10"))));
    }

    #[test]
    fn test_comparison_with_absent_is_false() {
        for op in ["gt", "gte", "lt", "lte"] {
            assert!(!cond("n", op, json!(0)).evaluate(None), "operator {op}");
        }
    }

    #[test]
    fn test_null_compares_as_zero() {
        assert!(cond("n", "gte", json!(0)).evaluate(Some(&Value::Null)));
        assert!(!cond("n", "gt", json!(0)).evaluate(Some(&Value::Null)));
    }

    #[test]
    fn test_contains_array_membership() {
        let c = cond("tags", "contains", json!("urgent"));
        assert!(c.evaluate(Some(&json!(["low", "urgent"]))));
        assert!(!c.evaluate(Some(&json!(["low"]))));

        // Membership is strict: no string/number coercion.
        let c = cond("ids", "contains", json!("1"));
        assert!(!c.evaluate(Some(&json!([1, 2]))));
        let c = cond("ids", "contains", json!(1));
        assert!(c.evaluate(Some(&json!([1.0, 2]))));
    }

    #[test]
    fn test_contains_substring() {
        let c = cond("title", "contains", json!("draft"));
        assert!(c.evaluate(Some(&json!("my draft post"))));
        assert!(!c.evaluate(Some(&json!("final"))));

        assert!(cond("n", "contains", json!(23)).evaluate(Some(&json!(1234))));
        assert!(cond("n", "contains", json!("def")).evaluate(None));
        assert!(cond("n", "contains", json!("ul")).evaluate(Some(&Value::Null)));
    }

    #[test]
    fn test_unknown_operator_fails_closed() {
        let c = cond("data", "matches", json!("valid"));
        assert_eq!(c.operator, Operator::Unknown("matches".to_string()));
        assert!(!c.evaluate(Some(&json!("valid"))));
    }

    #[test]
    fn test_operator_serde() {
        let op: Operator = serde_json::from_value(json!("gte")).unwrap();
        assert_eq!(op, Operator::Gte);
        let op: Operator = serde_json::from_value(json!("between")).unwrap();
        assert_eq!(op, Operator::Unknown("between".to_string()));
        assert_eq!(serde_json::to_value(&op).unwrap(), json!("between"));
    }

    #[tokio::test]
    async fn test_closure_guards() {
        let ctx = Arc::new(json!({"value": 10}));

        let sync_guard = Guard::new(|ctx: &Value| ctx["value"].as_i64().unwrap_or(0) > 0);
        assert!(sync_guard.check(&ctx).await);

        let async_guard = Guard::from_async(|ctx: Arc<Value>| async move {
            tokio::task::yield_now().await;
            ctx["value"] == json!(11)
        })
        .named("value is eleven");
        assert!(!async_guard.check(&ctx).await);
        assert_eq!(async_guard.label(), "value is eleven");
    }

    #[test]
    fn test_compiled_label() {
        let guard: Guard<Value> = ConditionCompiler::compile(&cond("data", "eq", json!("valid")));
        assert_eq!(guard.label(), "data eq \"valid\"");
    }
}
