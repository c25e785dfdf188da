//! Raw text token -> typed value conversion

use serde::Deserialize;

use super::record::Value;
use crate::error::{Error, Result};
use crate::schema::{Attribute, AttributeType};

/// What to do with an integer token that is not a whole number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerPolicy {
    /// Substitute 0 and log a warning
    #[default]
    Zero,
    /// Fail with `MalformedInteger`, which skips the row
    Reject,
}

/// Result of coercing one field
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Value,
    /// True when the integer fallback replaced a malformed token
    pub defaulted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Coercer {
    integer_policy: IntegerPolicy,
}

impl Coercer {
    pub fn new(integer_policy: IntegerPolicy) -> Self {
        Self { integer_policy }
    }

    /// Coerce a token for an attribute. Empty numeric tokens become null
    /// when the attribute is nullable.
    pub fn coerce_attribute(&self, token: &str, attr: &Attribute) -> Result<Coerced> {
        let trimmed = token.trim();
        if trimmed.is_empty() && attr.nullable && attr.attr_type != AttributeType::Text {
            return Ok(Coerced {
                value: Value::Null,
                defaulted: false,
            });
        }

        match attr.attr_type {
            AttributeType::Integer => self.integer(trimmed, &attr.name),
            AttributeType::Decimal => Ok(Coerced {
                value: decimal(trimmed, &attr.name)?,
                defaulted: false,
            }),
            AttributeType::Text => Ok(Coerced {
                value: Value::Text(trimmed.to_string()),
                defaulted: false,
            }),
        }
    }

    /// Coerce a token to `target` without nullability information
    pub fn coerce(&self, token: &str, target: AttributeType, column: &str) -> Result<Value> {
        self.coerce_attribute(token, &Attribute::required(column, target))
            .map(|c| c.value)
    }

    fn integer(&self, token: &str, column: &str) -> Result<Coerced> {
        match token.parse::<i64>() {
            Ok(i) => Ok(Coerced {
                value: Value::Integer(i),
                defaulted: false,
            }),
            Err(_) => match self.integer_policy {
                IntegerPolicy::Zero => {
                    tracing::warn!(column, token, "malformed integer, using 0");
                    Ok(Coerced {
                        value: Value::Integer(0),
                        defaulted: true,
                    })
                }
                IntegerPolicy::Reject => Err(Error::MalformedInteger {
                    column: column.to_string(),
                    token: token.to_string(),
                }),
            },
        }
    }
}

/// Accepts both `.` and `,` as the decimal separator
fn decimal(token: &str, column: &str) -> Result<Value> {
    let normalized = token.replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Value::Decimal(f)),
        _ => Err(Error::MalformedDecimal {
            column: column.to_string(),
            token: token.to_string(),
        }),
    }
}

/// Coerce with the default (zero-fallback) integer policy
pub fn coerce(token: &str, target: AttributeType, column: &str) -> Result<Value> {
    Coercer::default().coerce(token, target, column)
}
