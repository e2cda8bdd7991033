//! Tool contract registry and argument validation.
//!
//! The registry is filled once at start-up and is read-only afterwards; it
//! keeps contracts in registration order so `tools/list` is stable.

mod arguments;
mod contract;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{FieldIssue, IssueKind, RegistryError, ValidationError};

pub use arguments::BoundArguments;
pub use contract::{FieldSpec, FieldType, ToolContract};

/// Ordered table of tool contracts.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    contracts: Vec<ToolContract>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contract; names must be unique.
    pub fn register(&mut self, contract: ToolContract) -> Result<(), RegistryError> {
        if self.index.contains_key(&contract.name) {
            return Err(RegistryError::DuplicateTool {
                name: contract.name,
            });
        }
        self.index.insert(contract.name.clone(), self.contracts.len());
        self.contracts.push(contract);
        Ok(())
    }

    /// Contracts in registration order.
    pub fn list(&self) -> &[ToolContract] {
        &self.contracts
    }

    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.index.get(name).map(|&i| &self.contracts[i])
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Checks `arguments` against the named tool's contract.
    ///
    /// Every problem is collected before returning, so one error lists all
    /// offending fields. Absent optional fields receive their declared
    /// default; `null` counts as absent.
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<BoundArguments, ValidationError> {
        let contract = self.get(tool).ok_or_else(|| ValidationError::UnknownTool {
            name: tool.to_string(),
        })?;

        let Value::Object(supplied) = arguments else {
            return Err(ValidationError::Invalid {
                tool: tool.to_string(),
                issues: vec![FieldIssue {
                    field: "arguments".into(),
                    kind: IssueKind::NotAnObject,
                }],
            });
        };

        let mut issues = Vec::new();
        let mut bound = Map::new();

        for field in &contract.fields {
            match supplied.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        issues.push(FieldIssue {
                            field: field.name.to_string(),
                            kind: IssueKind::Missing,
                        });
                    } else if let Some(default) = &field.default {
                        bound.insert(field.name.to_string(), default.clone());
                    }
                }
                Some(value) => {
                    let before = issues.len();
                    check_type(field.name, &field.kind, value, &mut issues);
                    if issues.len() == before {
                        bound.insert(field.name.to_string(), value.clone());
                    }
                }
            }
        }

        for key in supplied.keys() {
            if contract.field_spec(key).is_none() {
                issues.push(FieldIssue {
                    field: key.clone(),
                    kind: IssueKind::Unexpected,
                });
            }
        }

        if issues.is_empty() {
            Ok(BoundArguments::new(bound))
        } else {
            Err(ValidationError::Invalid {
                tool: tool.to_string(),
                issues,
            })
        }
    }
}

fn check_type(path: &str, kind: &FieldType, value: &Value, issues: &mut Vec<FieldIssue>) {
    let matches = match kind {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Array(item) => {
            if let Value::Array(items) = value {
                for (i, element) in items.iter().enumerate() {
                    check_type(&format!("{path}[{i}]"), item, element, issues);
                }
                true
            } else {
                false
            }
        }
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => true,
            Some(s) => {
                issues.push(FieldIssue {
                    field: path.to_string(),
                    kind: IssueKind::NotAllowed {
                        value: s.to_string(),
                        allowed: allowed.iter().map(ToString::to_string).collect(),
                    },
                });
                true
            }
            None => false,
        },
    };

    if !matches {
        issues.push(FieldIssue {
            field: path.to_string(),
            kind: IssueKind::WrongType {
                expected: kind.label().to_string(),
                found: json_type(value).to_string(),
            },
        });
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
