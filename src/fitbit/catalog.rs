//! Fitbit endpoint catalog
//!
//! Every read-only Fitbit resource exposed as an MCP tool. Paths are
//! templates relative to `{api_base}/{version}/user/-/`; `{name}`
//! placeholders are filled from tool arguments after validation.

use chrono::NaiveDate;
use serde_json::{Map, Value, json};

use crate::protocol::{Tool, ToolAnnotations};
use crate::{Error, Result};

/// Fitbit Web API version segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// `/1/`
    V1,
    /// `/1.2/` (sleep)
    V1_2,
}

impl ApiVersion {
    /// Path segment for this version
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V1_2 => "1.2",
        }
    }
}

/// A date argument accepted by an endpoint
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Argument name, also the placeholder in the path template
    pub name: &'static str,
    /// Shown to the model in the input schema
    pub description: &'static str,
    /// Value used when the argument is omitted; `None` makes it required
    pub default: Option<&'static str>,
}

/// One Fitbit resource endpoint
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// MCP tool name
    pub tool: &'static str,
    /// Tool description
    pub description: &'static str,
    /// API version segment
    pub version: ApiVersion,
    /// Path template, may carry a fixed query string
    pub path: &'static str,
    /// Arguments substituted into the template
    pub params: &'static [ParamSpec],
}

const DATE: &[ParamSpec] = &[ParamSpec {
    name: "date",
    description: "Date (YYYY-MM-DD) or \"today\"",
    default: Some("today"),
}];

const DATE_RANGE: &[ParamSpec] = &[
    ParamSpec {
        name: "startDate",
        description: "Start date (YYYY-MM-DD)",
        default: None,
    },
    ParamSpec {
        name: "endDate",
        description: "End date (YYYY-MM-DD)",
        default: None,
    },
];

const NONE: &[ParamSpec] = &[];

const fn endpoint(
    tool: &'static str,
    description: &'static str,
    version: ApiVersion,
    path: &'static str,
    params: &'static [ParamSpec],
) -> Endpoint {
    Endpoint {
        tool,
        description,
        version,
        path,
        params,
    }
}

/// All Fitbit endpoints served as tools
pub const CATALOG: &[Endpoint] = &[
    endpoint("get_sleep", "Sleep logs for a day", ApiVersion::V1_2, "sleep/date/{date}.json", DATE),
    endpoint(
        "get_sleep_range",
        "Sleep logs for a date range (at most 100 days)",
        ApiVersion::V1_2,
        "sleep/date/{startDate}/{endDate}.json",
        DATE_RANGE,
    ),
    endpoint(
        "get_heart_rate",
        "Heart rate zones and resting heart rate for a day",
        ApiVersion::V1,
        "activities/heart/date/{date}/1d.json",
        DATE,
    ),
    endpoint("get_hrv", "Heart rate variability for a day", ApiVersion::V1, "hrv/date/{date}.json", DATE),
    endpoint(
        "get_activity",
        "Daily activity summary (steps, calories, distance, active minutes)",
        ApiVersion::V1,
        "activities/date/{date}.json",
        DATE,
    ),
    endpoint("get_activity_goals", "Daily activity goals", ApiVersion::V1, "activities/goals/daily.json", NONE),
    endpoint("get_lifetime_stats", "Lifetime activity totals and bests", ApiVersion::V1, "activities.json", NONE),
    endpoint(
        "get_activity_logs",
        "Recorded exercises after a date",
        ApiVersion::V1,
        "activities/list.json?afterDate={date}&sort=asc&limit=20&offset=0",
        DATE,
    ),
    endpoint("get_weight", "Weight logs for a day", ApiVersion::V1, "body/log/weight/date/{date}.json", DATE),
    endpoint("get_body_fat", "Body fat logs for a day", ApiVersion::V1, "body/log/fat/date/{date}.json", DATE),
    endpoint("get_body_goals", "Weight goal", ApiVersion::V1, "body/log/weight/goal.json", NONE),
    endpoint("get_body_summary", "Body measurements for a day", ApiVersion::V1, "body/date/{date}.json", DATE),
    endpoint("get_spo2", "Blood oxygen saturation (SpO2) for a day", ApiVersion::V1, "spo2/date/{date}.json", DATE),
    endpoint("get_breathing_rate", "Breathing rate during sleep for a day", ApiVersion::V1, "br/date/{date}.json", DATE),
    endpoint(
        "get_skin_temperature",
        "Skin temperature variation for a day",
        ApiVersion::V1,
        "temp/skin/date/{date}.json",
        DATE,
    ),
    endpoint("get_food_log", "Food log for a day", ApiVersion::V1, "foods/log/date/{date}.json", DATE),
    endpoint("get_water_log", "Water log for a day", ApiVersion::V1, "foods/log/water/date/{date}.json", DATE),
    endpoint("get_food_goals", "Calorie and food plan goals", ApiVersion::V1, "foods/log/goal.json", NONE),
    endpoint("get_profile", "User profile", ApiVersion::V1, "profile.json", NONE),
    endpoint("get_devices", "Paired devices, battery and last sync time", ApiVersion::V1, "devices.json", NONE),
    endpoint("get_badges", "Earned badges", ApiVersion::V1, "badges.json", NONE),
    endpoint("get_menstrual_cycles", "Menstrual cycle events", ApiVersion::V1, "cycles-tracking/events.json", NONE),
    endpoint(
        "get_cardio_fitness",
        "Cardio fitness score (VO2 max) for a day",
        ApiVersion::V1,
        "cardioscore/date/{date}.json",
        DATE,
    ),
];

/// Look up a catalog endpoint by tool name
#[must_use]
pub fn find(tool: &str) -> Option<&'static Endpoint> {
    CATALOG.iter().find(|e| e.tool == tool)
}

impl Endpoint {
    /// JSON Schema for this endpoint's arguments
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.params {
            let mut prop = json!({
                "type": "string",
                "description": param.description,
            });
            match param.default {
                Some(default) => prop["default"] = json!(default),
                None => required.push(param.name),
            }
            properties.insert(param.name.to_string(), prop);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// MCP tool definition for this endpoint
    #[must_use]
    pub fn tool(&self) -> Tool {
        Tool {
            name: self.tool.to_string(),
            title: None,
            description: Some(self.description.to_string()),
            input_schema: self.input_schema(),
            annotations: Some(ToolAnnotations::read_only_remote()),
        }
    }

    /// Fill the path template from tool arguments
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParams` when an argument is missing, not a
    /// string, or not a valid date.
    pub fn render_path(&self, args: &Value) -> Result<String> {
        let args = match args {
            Value::Null => None,
            Value::Object(map) => Some(map),
            _ => return Err(Error::InvalidParams("arguments must be an object".to_string())),
        };

        let mut path = self.path.to_string();
        for param in self.params {
            let value = match args.and_then(|a| a.get(param.name)) {
                None | Some(Value::Null) => param.default.ok_or_else(|| {
                    Error::InvalidParams(format!("missing required argument '{}'", param.name))
                })?,
                Some(Value::String(s)) => s.as_str(),
                Some(_) => {
                    return Err(Error::InvalidParams(format!("argument '{}' must be a string", param.name)));
                }
            };
            validate_date(param.name, value)?;
            path = path.replace(&format!("{{{}}}", param.name), value);
        }
        Ok(path)
    }
}

/// Accept `today` or a calendar date written as `YYYY-MM-DD`
fn validate_date(name: &str, value: &str) -> Result<()> {
    if value == "today" {
        return Ok(());
    }
    // NaiveDate also parses unpadded forms like 2024-1-5; Fitbit does not.
    if value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Ok(());
    }
    Err(Error::InvalidParams(format!(
        "argument '{name}' must be \"today\" or YYYY-MM-DD, got '{value}'"
    )))
}
