use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload type an application accepts and a model consumes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Ints,
    Floats,
    Doubles,
    Bytes,
    Strings,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Ints => "ints",
            InputType::Floats => "floats",
            InputType::Doubles => "doubles",
            InputType::Bytes => "bytes",
            InputType::Strings => "strings",
        }
    }

    /// Check that a query's `input` field has the shape this type declares.
    ///
    /// Numeric types take a JSON array; `strings` takes a single JSON string.
    pub fn validate(&self, input: &Value) -> Result<(), String> {
        if *self == InputType::Strings {
            return match input {
                Value::String(_) => Ok(()),
                other => Err(format!("expected a string, got {}", json_kind(other))),
            };
        }

        let Value::Array(items) = input else {
            return Err(format!(
                "expected an array of {}, got {}",
                self.as_str(),
                json_kind(input)
            ));
        };
        if items.is_empty() {
            return Err("input array is empty".to_string());
        }

        for (i, item) in items.iter().enumerate() {
            let ok = match self {
                InputType::Floats | InputType::Doubles => item.is_number(),
                InputType::Ints => item.is_i64() || item.is_u64(),
                InputType::Bytes => item.as_u64().map(|b| b <= 255).unwrap_or(false),
                InputType::Strings => false,
            };
            if !ok {
                return Err(format!(
                    "element {i} is not a valid {} value: {item}",
                    self.as_str()
                ));
            }
        }
        Ok(())
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ints" => Ok(InputType::Ints),
            "floats" => Ok(InputType::Floats),
            "doubles" => Ok(InputType::Doubles),
            "bytes" => Ok(InputType::Bytes),
            "strings" => Ok(InputType::Strings),
            other => Err(format!(
                "unknown input type '{}', available: ints, floats, doubles, bytes, strings",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doubles_accept_numeric_array() {
        assert!(InputType::Doubles.validate(&json!([0.1, 2, -3.5])).is_ok());
        assert!(InputType::Doubles.validate(&json!([])).is_err());
        assert!(InputType::Doubles.validate(&json!("0.1")).is_err());
        assert!(InputType::Doubles.validate(&json!([0.1, "x"])).is_err());
    }

    #[test]
    fn test_ints_reject_fractions() {
        assert!(InputType::Ints.validate(&json!([1, 2, 3])).is_ok());
        assert!(InputType::Ints.validate(&json!([1, 2.5])).is_err());
    }

    #[test]
    fn test_bytes_range() {
        assert!(InputType::Bytes.validate(&json!([0, 255])).is_ok());
        assert!(InputType::Bytes.validate(&json!([256])).is_err());
        assert!(InputType::Bytes.validate(&json!([-1])).is_err());
    }

    #[test]
    fn test_strings_take_single_string() {
        assert!(InputType::Strings.validate(&json!("hello")).is_ok());
        assert!(InputType::Strings.validate(&json!(["hello"])).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Doubles".parse::<InputType>(), Ok(InputType::Doubles));
        assert!("tensor".parse::<InputType>().is_err());
    }
}
