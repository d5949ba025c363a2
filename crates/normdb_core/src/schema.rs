//! Lightweight record schemas.
//!
//! A [`Schema`] declares field kinds, required fields, and defaults.
//! Validation collects every violated constraint rather than stopping
//! at the first, so callers can surface all problems in one error.

use normdb_value::Value;

/// The kind of value a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean.
    Bool,
    /// Number.
    Number,
    /// Text.
    Text,
    /// Array of anything.
    Array,
    /// Nested object.
    Map,
    /// Any value.
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Bool => matches!(value, Value::Bool(_)),
            FieldKind::Number => matches!(value, Value::Number(_)),
            FieldKind::Text => matches!(value, Value::Text(_)),
            FieldKind::Array => matches!(value, Value::Array(_)),
            FieldKind::Map => matches!(value, Value::Map(_)),
            FieldKind::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Bool => "boolean",
            FieldKind::Number => "number",
            FieldKind::Text => "text",
            FieldKind::Array => "array",
            FieldKind::Map => "object",
            FieldKind::Any => "any",
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Text(_) => "text",
        Value::Array(_) => "array",
        Value::Map(_) => "object",
    }
}

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// What the schema expected at the path.
    pub expected: String,
    /// What was actually there.
    pub actual: String,
    /// Dotted path to the offending field.
    pub path: String,
}

/// One field declaration.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Dotted field path.
    pub path: String,
    /// Accepted kind.
    pub kind: FieldKind,
    /// Whether the field must be present and non-nullish.
    pub required: bool,
    /// Value written when the field is absent.
    pub default: Option<Value>,
}

impl FieldDef {
    /// An optional field of the given kind.
    pub fn new(path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            kind,
            required: false,
            default: None,
        }
    }

    /// Marks the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets a default written by [`Schema::apply_defaults`].
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A record schema: an ordered list of field declarations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    /// An empty schema that accepts anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field declaration.
    #[must_use]
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// The declared fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Checks a property map, returning every violation found.
    #[must_use]
    pub fn check(&self, props: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        for def in &self.fields {
            let value = props.get_path(&def.path).cloned().unwrap_or(Value::Undefined);
            if value.is_nullish() {
                if def.required {
                    violations.push(Violation {
                        expected: def.kind.name().into(),
                        actual: kind_of(&value).into(),
                        path: def.path.clone(),
                    });
                }
                continue;
            }
            if !def.kind.accepts(&value) {
                violations.push(Violation {
                    expected: def.kind.name().into(),
                    actual: kind_of(&value).into(),
                    path: def.path.clone(),
                });
            }
        }
        violations
    }

    /// Writes declared defaults into absent fields.
    pub fn apply_defaults(&self, props: &mut Value) {
        for def in &self.fields {
            let Some(default) = &def.default else { continue };
            if props.get_path(&def.path).is_none() {
                props.set(&def.path, default.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .field(FieldDef::new("name", FieldKind::Text).required())
            .field(FieldDef::new("age", FieldKind::Number))
            .field(FieldDef::new("role", FieldKind::Text).default_value("member"))
    }

    #[test]
    fn valid_props_pass() {
        let violations = schema().check(&Value::from(
            serde_json::json!({"name": "Ada", "age": 36}),
        ));
        assert!(violations.is_empty());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let violations = schema().check(&Value::from(serde_json::json!({"age": 36})));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "name");
        assert_eq!(violations[0].actual, "undefined");
    }

    #[test]
    fn wrong_kind_is_reported_with_both_kinds() {
        let violations = schema().check(&Value::from(
            serde_json::json!({"name": "Ada", "age": "36"}),
        ));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].expected, "number");
        assert_eq!(violations[0].actual, "text");
    }

    #[test]
    fn all_violations_are_collected() {
        let violations = schema().check(&Value::from(serde_json::json!({"age": false})));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn optional_absent_field_is_fine() {
        let violations = schema().check(&Value::from(serde_json::json!({"name": "Ada"})));
        assert!(violations.is_empty());
    }

    #[test]
    fn defaults_fill_absent_fields_only() {
        let mut props = Value::from(serde_json::json!({"name": "Ada"}));
        schema().apply_defaults(&mut props);
        assert_eq!(props.get("role"), Some(&Value::Text("member".into())));

        let mut props = Value::from(serde_json::json!({"name": "Ada", "role": "admin"}));
        schema().apply_defaults(&mut props);
        assert_eq!(props.get("role"), Some(&Value::Text("admin".into())));
    }
}
