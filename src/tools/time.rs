//! Current time in an IANA timezone.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use chrono_tz::{OffsetComponents, Tz};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{RelayError, Result};

use super::{Tool, ToolContext};

const DEFAULT_TIMEZONE: &str = "Etc/Greenwich";

/// What `get_current_time` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeResult {
    pub timezone: String,
    /// RFC 3339 with the zone's UTC offset
    pub datetime: String,
    pub day_of_week: String,
    pub is_dst: bool,
}

/// Resolve `now` in `timezone_name`.
pub fn time_in_zone(timezone_name: &str, now: DateTime<Utc>) -> Result<TimeResult> {
    let tz: Tz = timezone_name
        .parse()
        .map_err(|_| RelayError::Tool(format!("Invalid timezone: {}", timezone_name)))?;
    let local = now.with_timezone(&tz);

    Ok(TimeResult {
        timezone: timezone_name.to_string(),
        datetime: local.to_rfc3339_opts(SecondsFormat::Secs, false),
        day_of_week: local.format("%A").to_string(),
        is_dst: local.offset().dst_offset() != TimeDelta::zero(),
    })
}

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time in a specific timezone. Use an IANA timezone name such as \
         'Europe/Madrid' or 'America/New_York'; use 'Etc/Greenwich' when the user gives none."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone_name": {
                    "type": "string",
                    "description": "IANA timezone name"
                }
            },
            "required": ["timezone_name"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let timezone = args
            .get("timezone_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE);

        let result = time_in_zone(timezone, Utc::now())?;
        Ok(serde_json::to_string(&result)?)
    }
}
