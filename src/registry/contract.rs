//! Tool input contracts.

use serde_json::{Map, Value, json};

/// Declared type of an argument field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Array whose every element has the given type.
    Array(Box<FieldType>),
    /// String restricted to a fixed value set.
    Enum(Vec<&'static str>),
}

impl FieldType {
    pub fn array_of(item: FieldType) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn one_of(values: &[&'static str]) -> Self {
        Self::Enum(values.to_vec())
    }

    /// Type name used in validation messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
        }
    }

    fn schema(&self) -> Map<String, Value> {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.label()));
        match self {
            Self::Array(item) => {
                schema.insert("items".into(), Value::Object(item.schema()));
            }
            Self::Enum(values) => {
                schema.insert("enum".into(), json!(values));
            }
            _ => {}
        }
        schema
    }
}

/// One declared argument field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldType,
    pub required: bool,
    /// Applied by the validator when an optional field is absent.
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: FieldType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = self.kind.schema();
        schema.insert("description".into(), json!(self.description));
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// Name, description and accepted fields of a tool.
///
/// Contracts are built once at start-up and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContract {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl ToolContract {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON-Schema object describing the accepted arguments.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `tools/list` entry.
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_properties_and_required_fields() {
        let contract = ToolContract::new("scrape_url", "Fetch one page")
            .field(FieldSpec::required("url", FieldType::String, "Target URL"))
            .field(
                FieldSpec::optional(
                    "output_format",
                    FieldType::one_of(&["json", "xml"]),
                    "Result encoding",
                )
                .default_value(json!("json")),
            )
            .field(FieldSpec::optional(
                "urls",
                FieldType::array_of(FieldType::String),
                "More targets",
            ));

        assert_eq!(
            contract.describe(),
            json!({
                "name": "scrape_url",
                "description": "Fetch one page",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Target URL"},
                        "output_format": {
                            "type": "string",
                            "enum": ["json", "xml"],
                            "description": "Result encoding",
                            "default": "json"
                        },
                        "urls": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "More targets"
                        }
                    },
                    "required": ["url"]
                }
            })
        );
    }
}
