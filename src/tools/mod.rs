//! Tool collection: named automation tools invoked with a JSON parameter object
//!
//! The HTTP layer only ever calls `computer`, but tools are looked up by name so
//! the collection can carry more of them.

pub mod computer;
pub mod screenshot;
pub mod xdotool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use computer::{ComputerSettings, ComputerTool};

// === Results & Errors ===

/// Outcome of a single tool call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub base64_image: Option<String>,
    pub system: Option<String>,
}

impl ToolResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn image(base64_image: String) -> Self {
        Self {
            base64_image: Some(base64_image),
            ..Self::default()
        }
    }

    /// True only for a present, non-empty error
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("action is required")]
    MissingAction,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Action {0} is disabled")]
    Disabled(String),

    #[error("Coordinates {0}, {1} are out of bounds")]
    OutOfBounds(i64, i64),

    #[error("Failed to run {program}: {reason}")]
    Command { program: String, reason: String },

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to take screenshot: {0}")]
    Screenshot(String),

    /// Argument-level validation message, reported verbatim
    #[error("{0}")]
    Validation(String),
}

// === Tool Trait ===

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// API definition advertised for this tool
    fn to_params(&self) -> Value;

    async fn call(&self, input: Value) -> Result<ToolResult, ToolError>;
}

// === Versions ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolVersion {
    #[serde(rename = "computer_use_20241022")]
    Computer20241022,
    #[default]
    #[serde(rename = "computer_use_20250124")]
    Computer20250124,
}

impl ToolVersion {
    /// `type` value of the computer tool in this group
    pub fn computer_api_type(self) -> &'static str {
        match self {
            Self::Computer20241022 => "computer_20241022",
            Self::Computer20250124 => "computer_20250124",
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computer20241022 => write!(f, "computer_use_20241022"),
            Self::Computer20250124 => write!(f, "computer_use_20250124"),
        }
    }
}

/// Build the tool collection for a version group
pub fn tool_group(version: ToolVersion, settings: ComputerSettings) -> ToolCollection {
    ToolCollection::new(vec![Box::new(ComputerTool::new(version, settings))])
}

// === Collection ===

pub struct ToolCollection {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl fmt::Debug for ToolCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolCollection").field("tools", &names).finish()
    }
}

impl ToolCollection {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        let tools = tools.into_iter().map(|t| (t.name(), t)).collect();
        Self { tools }
    }

    pub fn to_params(&self) -> Vec<Value> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names.iter().map(|n| self.tools[n].to_params()).collect()
    }

    /// Run a tool by name. Failures come back as error results, never as `Err`.
    pub async fn run(&self, name: &str, input: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!("Unknown tool requested: {}", name);
            return ToolResult::failure(format!("Tool {} is invalid", name));
        };

        match tool.call(input).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "Tool call failed");
                ToolResult::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Echoes `action` back as output; `fail` as the action raises a ToolError
    pub struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "computer"
        }

        fn to_params(&self) -> Value {
            serde_json::json!({ "name": "computer", "type": "echo" })
        }

        async fn call(&self, input: Value) -> Result<ToolResult, ToolError> {
            match input.get("action").and_then(Value::as_str) {
                Some("fail") => Err(ToolError::Validation("echo failure".to_string())),
                Some("image") => Ok(ToolResult::image("aW1n".to_string())),
                Some(action) => Ok(ToolResult {
                    output: Some(action.to_string()),
                    error: Some(String::new()),
                    ..ToolResult::default()
                }),
                None => Err(ToolError::MissingAction),
            }
        }
    }

    pub fn echo_collection() -> ToolCollection {
        ToolCollection::new(vec![Box::new(EchoTool)])
    }
}
