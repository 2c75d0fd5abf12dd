//! Arithmetic tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{RelayError, Result};

use super::{Tool, ToolContext};

pub struct MultiplyTool;

fn int_arg(args: &Value, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| RelayError::Tool(format!("Missing or non-integer '{}' parameter", key)))
}

#[async_trait]
impl Tool for MultiplyTool {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Tool for multiply two integers together."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "first_int": { "type": "integer" },
                "second_int": { "type": "integer" }
            },
            "required": ["first_int", "second_int"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let first = int_arg(&args, "first_int")?;
        let second = int_arg(&args, "second_int")?;
        debug!("Multiplying {} * {}", first, second);
        first
            .checked_mul(second)
            .map(|product| product.to_string())
            .ok_or_else(|| RelayError::Tool("Multiplication overflowed".to_string()))
    }
}
