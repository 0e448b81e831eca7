//! Mouse and keyboard automation via xdotool
//!
//! Commands are chained into a single xdotool invocation, e.g.
//! `xdotool mousemove --sync 10 20 keydown shift click 1 keyup shift`.

use super::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const TYPING_DELAY_MS: u32 = 12;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

// === Command Builder ===

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XdotoolCommand {
    args: Vec<String>,
}

impl XdotoolCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn push(mut self, parts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(parts.into_iter().map(Into::into));
        self
    }

    pub fn mousemove(self, x: i64, y: i64) -> Self {
        self.push(["mousemove".to_string(), "--sync".into(), x.to_string(), y.to_string()])
    }

    pub fn mousedown(self, button: u8) -> Self {
        self.push(["mousedown".to_string(), button.to_string()])
    }

    pub fn mouseup(self, button: u8) -> Self {
        self.push(["mouseup".to_string(), button.to_string()])
    }

    pub fn click(self, button: u8) -> Self {
        self.push(["click".to_string(), button.to_string()])
    }

    pub fn click_repeat(self, button: u8, repeat: u64, delay_ms: Option<u32>) -> Self {
        let mut parts = vec!["click".to_string(), "--repeat".into(), repeat.to_string()];
        if let Some(delay) = delay_ms {
            parts.extend(["--delay".to_string(), delay.to_string()]);
        }
        parts.push(button.to_string());
        self.push(parts)
    }

    /// Press and release keys, e.g. `ctrl+c` or `Return Return`
    pub fn key(self, keys: &str) -> Self {
        self.push(["key", "--"]).push(keys.split_whitespace())
    }

    pub fn keydown(self, keys: &str) -> Self {
        self.push(["keydown"]).push(keys.split_whitespace())
    }

    pub fn keyup(self, keys: &str) -> Self {
        self.push(["keyup"]).push(keys.split_whitespace())
    }

    pub fn type_text(self, text: &str) -> Self {
        self.push(["type".to_string(), "--delay".into(), TYPING_DELAY_MS.to_string(), "--".into(), text.into()])
    }

    pub fn sleep(self, seconds: f64) -> Self {
        self.push(["sleep".to_string(), seconds.to_string()])
    }

    pub fn getmouselocation(self) -> Self {
        self.push(["getmouselocation", "--shell"])
    }
}

// === Execution ===

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct Xdotool {
    program: String,
    display_num: Option<u32>,
    timeout: Duration,
}

impl Default for Xdotool {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Xdotool {
    pub fn new(display_num: Option<u32>) -> Self {
        Self {
            program: "xdotool".to_string(),
            display_num,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Run `program` in place of xdotool
    #[cfg(test)]
    pub(crate) fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            display_num: None,
            timeout,
        }
    }

    pub fn display_num(&self) -> Option<u32> {
        self.display_num
    }

    pub async fn run(&self, command: &XdotoolCommand) -> Result<CommandOutput, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(display) = self.display_num {
            cmd.env("DISPLAY", format!(":{}", display));
        }

        tracing::debug!(program = %self.program, args = ?command.args(), "Running xdotool");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))?
            .map_err(|e| ToolError::Command {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() && stderr.trim().is_empty() {
            stderr = format!("{} exited with {}", self.program, output.status);
        }
        if !stderr.is_empty() {
            tracing::warn!("xdotool error: {}", stderr.trim());
        }

        Ok(CommandOutput { stdout, stderr })
    }

    /// Run commands in order, concatenating their stdout and stderr
    pub async fn run_all(&self, commands: &[XdotoolCommand]) -> Result<CommandOutput, ToolError> {
        let mut combined = CommandOutput::default();
        for command in commands {
            let out = self.run(command).await?;
            combined.stdout.push_str(&out.stdout);
            combined.stderr.push_str(&out.stderr);
        }
        Ok(combined)
    }
}

/// Parse `getmouselocation --shell` output into (x, y)
pub fn parse_mouse_location(stdout: &str) -> Option<(i64, i64)> {
    let mut x = None;
    let mut y = None;
    for line in stdout.lines() {
        if let Some(v) = line.strip_prefix("X=") {
            x = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("Y=") {
            y = v.trim().parse().ok();
        }
    }
    Some((x?, y?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_click_with_modifier() {
        let cmd = XdotoolCommand::new()
            .mousemove(10, 20)
            .keydown("shift")
            .click(1)
            .keyup("shift");
        assert_eq!(
            cmd.args(),
            ["mousemove", "--sync", "10", "20", "keydown", "shift", "click", "1", "keyup", "shift"]
        );
    }

    #[test]
    fn test_click_repeat() {
        let double = XdotoolCommand::new().click_repeat(1, 2, Some(10));
        assert_eq!(double.args(), ["click", "--repeat", "2", "--delay", "10", "1"]);

        let scroll = XdotoolCommand::new().click_repeat(5, 3, None);
        assert_eq!(scroll.args(), ["click", "--repeat", "3", "5"]);
    }

    #[test]
    fn test_key_splits_on_whitespace() {
        let cmd = XdotoolCommand::new().key("ctrl+a  Delete");
        assert_eq!(cmd.args(), ["key", "--", "ctrl+a", "Delete"]);
    }

    #[test]
    fn test_type_keeps_text_as_one_argument() {
        let cmd = XdotoolCommand::new().type_text("hello world -v");
        assert_eq!(cmd.args(), ["type", "--delay", "12", "--", "hello world -v"]);
    }

    #[test]
    fn test_hold_sequence() {
        let cmd = XdotoolCommand::new().keydown("a").sleep(1.5).keyup("a");
        assert_eq!(cmd.args(), ["keydown", "a", "sleep", "1.5", "keyup", "a"]);
    }

    #[test]
    fn test_parse_mouse_location() {
        let out = "X=512\nY=384\nSCREEN=0\nWINDOW=12345\n";
        assert_eq!(parse_mouse_location(out), Some((512, 384)));
        assert_eq!(parse_mouse_location("SCREEN=0\n"), None);
    }

    // Stand-in xdotool scripts; unix only since they rely on /bin/sh

    #[cfg(unix)]
    fn fake_xdotool(dir: &tempfile::TempDir, body: &str) -> String {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("xdotool");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{}", body).unwrap();
            file.sync_all().unwrap();
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_output_and_stderr_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_xdotool(&dir, "echo \"$@\"\necho warning >&2");
        let xdotool = Xdotool::with_program(program, Duration::from_secs(10));

        let out = xdotool.run(&XdotoolCommand::new().click(1)).await.unwrap();
        assert_eq!(out.stdout, "click 1\n");
        assert_eq!(out.stderr, "warning\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_without_stderr_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_xdotool(&dir, "exit 3");
        let xdotool = Xdotool::with_program(program.clone(), Duration::from_secs(10));

        let out = xdotool.run(&XdotoolCommand::new().click(1)).await.unwrap();
        assert_eq!(out.stdout, "");
        assert!(out.stderr.starts_with(&format!("{} exited with", program)));
        assert!(out.stderr.contains('3'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_xdotool(&dir, "echo 'Can'\\''t open display' >&2\nexit 1");
        let xdotool = Xdotool::with_program(program, Duration::from_secs(10));

        let out = xdotool.run(&XdotoolCommand::new().click(1)).await.unwrap();
        assert_eq!(out.stderr, "Can't open display\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_concatenates_chunks() {
        let dir = tempfile::tempdir().unwrap();
        // `type --delay 12 -- <text>`: the text is the fifth argument
        let program = fake_xdotool(&dir, "printf '%s' \"$5\"\nprintf '[%s]' \"$5\" >&2");
        let xdotool = Xdotool::with_program(program, Duration::from_secs(10));

        let commands = [
            XdotoolCommand::new().type_text("hello "),
            XdotoolCommand::new().type_text("world"),
        ];
        let out = xdotool.run_all(&commands).await.unwrap();
        assert_eq!(out.stdout, "hello world");
        assert_eq!(out.stderr, "[hello ][world]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_xdotool(&dir, "exec sleep 5");
        let timeout = Duration::from_millis(100);
        let xdotool = Xdotool::with_program(program, timeout);

        let err = xdotool.run(&XdotoolCommand::new().click(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(t) if t == timeout));
    }

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let xdotool = Xdotool::with_program("/nonexistent/xdotool", Duration::from_secs(1));
        let err = xdotool.run(&XdotoolCommand::new().click(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::Command { ref program, .. } if program == "/nonexistent/xdotool"));
    }

    #[test]
    fn test_default_runs_xdotool() {
        let xdotool = Xdotool::new(Some(1));
        assert_eq!(xdotool.program, "xdotool");
        assert_eq!(xdotool.timeout, COMMAND_TIMEOUT);
        assert_eq!(xdotool.display_num(), Some(1));
    }
}
