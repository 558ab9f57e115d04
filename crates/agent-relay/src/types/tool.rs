//! Tool catalog and tool call payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool offered by a provider. The input schema is passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Parameters of `tools/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One page of a `tools/list` reply, decoded leniently: entries that do not
/// decode are reported back to the caller instead of failing the page.
#[derive(Debug, Clone, Default)]
pub struct ToolPage {
    pub tools: Vec<ToolDescriptor>,
    pub next_cursor: Option<String>,
    pub skipped: Vec<String>,
}

impl ToolPage {
    pub fn from_result(result: &Value) -> Self {
        let mut page = ToolPage {
            next_cursor: result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..Default::default()
        };

        let Some(entries) = result.get("tools").and_then(Value::as_array) else {
            return page;
        };

        for entry in entries {
            match serde_json::from_value::<ToolDescriptor>(entry.clone()) {
                Ok(tool) => page.tools.push(tool),
                Err(e) => page.skipped.push(e.to_string()),
            }
        }
        page
    }
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Result of a tool call as seen by callers of the client.
///
/// Application failures reported by a provider land here with
/// `success == false`; they are never raised as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Interpret a `tools/call` result. A result flagged `isError` is an
    /// application failure whose message is the joined text content.
    pub fn from_result(result: Value) -> Self {
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !is_error {
            return Self::ok(result);
        }

        let message = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "tool reported an error".to_string());

        Self {
            success: false,
            result: Some(result),
            error: Some(message),
        }
    }
}
