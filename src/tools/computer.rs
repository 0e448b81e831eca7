//! The `computer` tool: mouse, keyboard, scroll and screenshot actions
//!
//! A call is planned first (validation, coordinate scaling, xdotool command
//! construction) and then executed. Planning is pure, so argument handling is
//! testable without an X server.

use super::screenshot;
use super::xdotool::{parse_mouse_location, CommandOutput, Xdotool, XdotoolCommand};
use super::{Tool, ToolError, ToolResult, ToolVersion};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub const TYPING_GROUP_SIZE: usize = 50;
const MAX_DURATION_SECS: f64 = 100.0;
const CLICK_DELAY_MS: u32 = 10;

/// Resolutions screenshots and API coordinates are scaled to: XGA, WXGA, FWXGA
const MAX_SCALING_TARGETS: [(u32, u32); 3] = [(1024, 768), (1280, 800), (1366, 768)];

// === Parameter Types ===

/// One computer action as received from a client
///
/// Loosely typed on purpose: shape errors in `coordinate`, `scroll_amount`
/// and `duration` are reported by the tool with action-specific messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputerAction {
    pub action: Option<String>,
    pub text: Option<String>,
    pub coordinate: Option<Value>,
    pub scroll_direction: Option<String>,
    pub scroll_amount: Option<Value>,
    pub duration: Option<Value>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    TripleClick,
    Screenshot,
    CursorPosition,
    LeftMouseDown,
    LeftMouseUp,
    Scroll,
    HoldKey,
    Wait,
}

impl Action {
    pub const ALL: [Action; 16] = [
        Action::Key,
        Action::Type,
        Action::MouseMove,
        Action::LeftClick,
        Action::LeftClickDrag,
        Action::RightClick,
        Action::MiddleClick,
        Action::DoubleClick,
        Action::TripleClick,
        Action::Screenshot,
        Action::CursorPosition,
        Action::LeftMouseDown,
        Action::LeftMouseUp,
        Action::Scroll,
        Action::HoldKey,
        Action::Wait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Key => "key",
            Action::Type => "type",
            Action::MouseMove => "mouse_move",
            Action::LeftClick => "left_click",
            Action::LeftClickDrag => "left_click_drag",
            Action::RightClick => "right_click",
            Action::MiddleClick => "middle_click",
            Action::DoubleClick => "double_click",
            Action::TripleClick => "triple_click",
            Action::Screenshot => "screenshot",
            Action::CursorPosition => "cursor_position",
            Action::LeftMouseDown => "left_mouse_down",
            Action::LeftMouseUp => "left_mouse_up",
            Action::Scroll => "scroll",
            Action::HoldKey => "hold_key",
            Action::Wait => "wait",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }

    pub fn is_supported(self, version: ToolVersion) -> bool {
        match version {
            ToolVersion::Computer20250124 => true,
            ToolVersion::Computer20241022 => !matches!(
                self,
                Action::TripleClick
                    | Action::LeftMouseDown
                    | Action::LeftMouseUp
                    | Action::Scroll
                    | Action::HoldKey
                    | Action::Wait
            ),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Get list of all action names
pub fn all_action_names() -> Vec<&'static str> {
    Action::ALL.iter().map(|a| a.as_str()).collect()
}

// === Coordinate Scaling ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingSource {
    /// Coordinates sent by the client, in scaled space
    Api,
    /// Coordinates reported by the screen
    Computer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaler {
    width: u32,
    height: u32,
    target: Option<(u32, u32)>,
}

impl Scaler {
    pub fn new(width: u32, height: u32, enabled: bool) -> Self {
        let target = if enabled && width > 0 && height > 0 {
            let ratio = width as f64 / height as f64;
            MAX_SCALING_TARGETS
                .iter()
                .find(|(w, h)| (*w as f64 / *h as f64 - ratio).abs() < 0.02)
                .copied()
                .filter(|(w, _)| *w < width)
        } else {
            None
        };

        Self { width, height, target }
    }

    /// Size screenshots are resized to, if scaling applies
    pub fn target(&self) -> Option<(u32, u32)> {
        self.target
    }

    pub fn scale(&self, source: ScalingSource, x: i64, y: i64) -> Result<(i64, i64), ToolError> {
        let Some((tw, th)) = self.target else {
            return Ok((x, y));
        };

        let x_factor = tw as f64 / self.width as f64;
        let y_factor = th as f64 / self.height as f64;

        match source {
            ScalingSource::Api => {
                if x > self.width as i64 || y > self.height as i64 {
                    return Err(ToolError::OutOfBounds(x, y));
                }
                Ok((
                    (x as f64 / x_factor).round_ties_even() as i64,
                    (y as f64 / y_factor).round_ties_even() as i64,
                ))
            }
            ScalingSource::Computer => Ok((
                (x as f64 * x_factor).round_ties_even() as i64,
                (y as f64 * y_factor).round_ties_even() as i64,
            )),
        }
    }
}

// === Tool ===

#[derive(Debug, Clone)]
pub struct ComputerSettings {
    pub display_num: Option<u32>,
    /// Screen (width, height); `None` disables scaling and bounds checks
    pub geometry: Option<(u32, u32)>,
    pub scaling: bool,
    pub screenshot_delay: Duration,
    pub disabled: Vec<String>,
}

impl Default for ComputerSettings {
    fn default() -> Self {
        Self {
            display_num: None,
            geometry: None,
            scaling: true,
            screenshot_delay: Duration::from_secs(2),
            disabled: Vec::new(),
        }
    }
}

/// What a validated action will do
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// Run a command, then screenshot after the settle delay
    Shell(XdotoolCommand),
    /// Type text in chunks, then screenshot
    Type(Vec<String>),
    CursorPosition,
    Screenshot,
    /// Sleep, then screenshot
    Wait(Duration),
}

#[derive(Debug)]
pub struct ComputerTool {
    version: ToolVersion,
    xdotool: Xdotool,
    scaler: Option<Scaler>,
    screenshot_delay: Duration,
    disabled: HashSet<Action>,
}

impl ComputerTool {
    pub fn new(version: ToolVersion, settings: ComputerSettings) -> Self {
        let mut disabled = HashSet::new();
        for name in &settings.disabled {
            match Action::from_name(name) {
                Some(action) => {
                    disabled.insert(action);
                    tracing::info!("Disabled action: {}", name);
                }
                None => tracing::warn!("Config disables unknown action: {}", name),
            }
        }

        Self {
            version,
            xdotool: Xdotool::new(settings.display_num),
            scaler: settings
                .geometry
                .map(|(w, h)| Scaler::new(w, h, settings.scaling)),
            screenshot_delay: settings.screenshot_delay,
            disabled,
        }
    }

    fn scale(&self, source: ScalingSource, x: i64, y: i64) -> Result<(i64, i64), ToolError> {
        match &self.scaler {
            Some(scaler) => scaler.scale(source, x, y),
            None => Ok((x, y)),
        }
    }

    fn validate_coordinate(&self, coordinate: &Value) -> Result<(i64, i64), ToolError> {
        let items = coordinate
            .as_array()
            .filter(|items| items.len() == 2)
            .ok_or_else(|| {
                ToolError::Validation(format!("{} must be a tuple of length 2", coordinate))
            })?;

        let non_negative = |v: &Value| v.as_i64().filter(|n| *n >= 0);
        let (Some(x), Some(y)) = (non_negative(&items[0]), non_negative(&items[1])) else {
            return Err(ToolError::Validation(format!(
                "{} must be a tuple of non-negative ints",
                coordinate
            )));
        };

        self.scale(ScalingSource::Api, x, y)
    }

    fn plan(&self, input: &ComputerAction) -> Result<Step, ToolError> {
        let name = input.action.as_deref().ok_or(ToolError::MissingAction)?;
        let action = Action::from_name(name)
            .filter(|a| a.is_supported(self.version))
            .ok_or_else(|| ToolError::InvalidAction(name.to_string()))?;

        if self.disabled.contains(&action) {
            return Err(ToolError::Disabled(action.to_string()));
        }

        let extended = self.version == ToolVersion::Computer20250124;

        match action {
            Action::MouseMove | Action::LeftClickDrag => {
                let coordinate = input.coordinate.as_ref().ok_or_else(|| {
                    ToolError::Validation(format!("coordinate is required for {}", action))
                })?;
                reject_text(input, action)?;
                let (x, y) = self.validate_coordinate(coordinate)?;

                let command = if action == Action::MouseMove {
                    XdotoolCommand::new().mousemove(x, y)
                } else {
                    XdotoolCommand::new().mousedown(1).mousemove(x, y).mouseup(1)
                };
                Ok(Step::Shell(command))
            }

            Action::Key | Action::Type => {
                let text = input.text.as_deref().ok_or_else(|| {
                    ToolError::Validation(format!("text is required for {}", action))
                })?;
                reject_coordinate(input, action)?;

                if action == Action::Key {
                    Ok(Step::Shell(XdotoolCommand::new().key(text)))
                } else {
                    Ok(Step::Type(chunks(text, TYPING_GROUP_SIZE)))
                }
            }

            Action::Screenshot | Action::CursorPosition => {
                reject_text(input, action)?;
                reject_coordinate(input, action)?;

                if action == Action::Screenshot {
                    Ok(Step::Screenshot)
                } else {
                    Ok(Step::CursorPosition)
                }
            }

            Action::LeftMouseDown | Action::LeftMouseUp => {
                reject_coordinate(input, action)?;

                let command = if action == Action::LeftMouseDown {
                    XdotoolCommand::new().mousedown(1)
                } else {
                    XdotoolCommand::new().mouseup(1)
                };
                Ok(Step::Shell(command))
            }

            Action::Scroll => {
                let button = match input.scroll_direction.as_deref() {
                    Some("up") => 4,
                    Some("down") => 5,
                    Some("left") => 6,
                    Some("right") => 7,
                    other => {
                        return Err(ToolError::Validation(format!(
                            "scroll_direction must be 'up', 'down', 'left', or 'right' (got {})",
                            other.unwrap_or("none")
                        )))
                    }
                };
                let amount = input
                    .scroll_amount
                    .as_ref()
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        ToolError::Validation(format!(
                            "scroll_amount must be a non-negative int (got {})",
                            input.scroll_amount.as_ref().unwrap_or(&Value::Null)
                        ))
                    })?;

                let mut command = XdotoolCommand::new();
                if let Some(coordinate) = &input.coordinate {
                    let (x, y) = self.validate_coordinate(coordinate)?;
                    command = command.mousemove(x, y);
                }
                let modifier = input.text.as_deref().filter(|t| !t.is_empty());
                if let Some(keys) = modifier {
                    command = command.keydown(keys);
                }
                command = command.click_repeat(button, amount, None);
                if let Some(keys) = modifier {
                    command = command.keyup(keys);
                }
                Ok(Step::Shell(command))
            }

            Action::HoldKey | Action::Wait => {
                let seconds = parse_duration(input.duration.as_ref())?;

                if action == Action::Wait {
                    return Ok(Step::Wait(Duration::from_secs_f64(seconds)));
                }

                let text = input.text.as_deref().ok_or_else(|| {
                    ToolError::Validation(format!("text is required for {}", action))
                })?;
                Ok(Step::Shell(
                    XdotoolCommand::new().keydown(text).sleep(seconds).keyup(text),
                ))
            }

            Action::LeftClick
            | Action::RightClick
            | Action::MiddleClick
            | Action::DoubleClick
            | Action::TripleClick => {
                reject_text(input, action)?;
                if !extended {
                    reject_coordinate(input, action)?;
                }

                let mut command = XdotoolCommand::new();
                if let Some(coordinate) = &input.coordinate {
                    let (x, y) = self.validate_coordinate(coordinate)?;
                    command = command.mousemove(x, y);
                }
                let modifier = input
                    .key
                    .as_deref()
                    .filter(|k| extended && !k.is_empty());
                if let Some(keys) = modifier {
                    command = command.keydown(keys);
                }
                command = match action {
                    Action::RightClick => command.click(3),
                    Action::MiddleClick => command.click(2),
                    Action::DoubleClick => command.click_repeat(1, 2, Some(CLICK_DELAY_MS)),
                    Action::TripleClick => command.click_repeat(1, 3, Some(CLICK_DELAY_MS)),
                    _ => command.click(1),
                };
                if let Some(keys) = modifier {
                    command = command.keyup(keys);
                }
                Ok(Step::Shell(command))
            }
        }
    }

    async fn execute(&self, step: Step) -> Result<ToolResult, ToolError> {
        match step {
            Step::Shell(command) => {
                let out = self.xdotool.run(&command).await?;
                tokio::time::sleep(self.screenshot_delay).await;
                Ok(ToolResult {
                    output: Some(out.stdout),
                    error: Some(out.stderr),
                    base64_image: Some(self.screenshot().await?),
                    system: None,
                })
            }

            Step::Type(chunks) => {
                let commands: Vec<_> = chunks
                    .iter()
                    .map(|chunk| XdotoolCommand::new().type_text(chunk))
                    .collect();
                let out = self.xdotool.run_all(&commands).await?;
                Ok(ToolResult {
                    output: Some(out.stdout),
                    error: Some(out.stderr),
                    base64_image: Some(self.screenshot().await?),
                    system: None,
                })
            }

            Step::CursorPosition => {
                let out = self
                    .xdotool
                    .run(&XdotoolCommand::new().getmouselocation())
                    .await?;
                self.cursor_position(out)
            }

            Step::Screenshot => Ok(ToolResult::image(self.screenshot().await?)),

            Step::Wait(duration) => {
                tokio::time::sleep(duration).await;
                Ok(ToolResult::image(self.screenshot().await?))
            }
        }
    }

    /// Turn `getmouselocation --shell` output into an `X=<x>,Y=<y>` result in API space
    fn cursor_position(&self, out: CommandOutput) -> Result<ToolResult, ToolError> {
        if !out.stderr.is_empty() {
            return Ok(ToolResult {
                output: Some(out.stdout),
                error: Some(out.stderr),
                ..ToolResult::default()
            });
        }

        let (x, y) = parse_mouse_location(&out.stdout).ok_or_else(|| ToolError::Command {
            program: "xdotool".to_string(),
            reason: "unexpected getmouselocation output".to_string(),
        })?;
        let (x, y) = self.scale(ScalingSource::Computer, x, y)?;
        Ok(ToolResult {
            output: Some(format!("X={},Y={}", x, y)),
            error: Some(out.stderr),
            ..ToolResult::default()
        })
    }

    async fn screenshot(&self) -> Result<String, ToolError> {
        let target = self.scaler.and_then(|s| s.target());
        tokio::task::spawn_blocking(move || screenshot::capture(target))
            .await
            .map_err(|e| ToolError::Screenshot(e.to_string()))?
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &'static str {
        "computer"
    }

    fn to_params(&self) -> Value {
        let (width, height) = match self.scaler {
            Some(scaler) => scaler
                .target()
                .unwrap_or((scaler.width, scaler.height)),
            None => (0, 0),
        };

        json!({
            "name": self.name(),
            "type": self.version.computer_api_type(),
            "display_width_px": width,
            "display_height_px": height,
            "display_number": self.xdotool.display_num(),
        })
    }

    async fn call(&self, input: Value) -> Result<ToolResult, ToolError> {
        let input: ComputerAction =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        let step = self.plan(&input)?;

        tracing::info!(
            action = input.action.as_deref().unwrap_or_default(),
            "Running computer action"
        );
        self.execute(step).await
    }
}

// === Helper Functions ===

fn reject_text(input: &ComputerAction, action: Action) -> Result<(), ToolError> {
    match input.text {
        Some(_) => Err(ToolError::Validation(format!(
            "text is not accepted for {}",
            action
        ))),
        None => Ok(()),
    }
}

fn reject_coordinate(input: &ComputerAction, action: Action) -> Result<(), ToolError> {
    match input.coordinate {
        Some(_) => Err(ToolError::Validation(format!(
            "coordinate is not accepted for {}",
            action
        ))),
        None => Ok(()),
    }
}

fn parse_duration(duration: Option<&Value>) -> Result<f64, ToolError> {
    let seconds = duration.and_then(Value::as_f64).ok_or_else(|| {
        ToolError::Validation(format!(
            "duration must be a number (got {})",
            duration.unwrap_or(&Value::Null)
        ))
    })?;

    if seconds < 0.0 {
        return Err(ToolError::Validation(format!(
            "duration={} must be non-negative",
            seconds
        )));
    }
    if seconds > MAX_DURATION_SECS {
        return Err(ToolError::Validation(format!(
            "duration={} is too long",
            seconds
        )));
    }
    Ok(seconds)
}

/// Split on character boundaries into groups of at most `size` chars
fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
