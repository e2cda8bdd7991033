use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde_json::{Map, Value};

/// Arguments that passed validation, with defaults applied.
///
/// Accessors assume the contract already checked types, so a mismatch here
/// is reported as a handler error rather than a validation issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Map<String, Value>,
}

impl BoundArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn required_str(&self, name: &str) -> anyhow::Result<&str> {
        self.str(name)
            .ok_or_else(|| anyhow!("argument '{name}' is missing"))
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    /// Boolean argument, `false` when absent.
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// String array argument, empty when absent.
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parses a string argument, e.g. an enum field, into `T`.
    pub fn parsed<T>(&self, name: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.str(name)
            .map(|s| s.parse::<T>().with_context(|| format!("argument '{name}'")))
            .transpose()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use serde_json::json;

    fn bound(value: Value) -> BoundArguments {
        match value {
            Value::Object(map) => BoundArguments::new(map),
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn typed_accessors() {
        let args = bound(json!({
            "url": "https://example.com",
            "limit": 3,
            "extract_links": true,
            "urls": ["a", "b"],
            "output_format": "markdown"
        }));

        assert_eq!(args.required_str("url").unwrap(), "https://example.com");
        assert_eq!(args.i64("limit"), Some(3));
        assert!(args.flag("extract_links"));
        assert!(!args.flag("absent"));
        assert_eq!(args.strings("urls"), ["a", "b"]);
        assert!(args.strings("absent").is_empty());
        assert_eq!(
            args.parsed::<OutputFormat>("output_format").unwrap(),
            Some(OutputFormat::Markdown)
        );
        assert_eq!(args.parsed::<OutputFormat>("absent").unwrap(), None);
        assert!(args.required_str("absent").is_err());
    }
}
