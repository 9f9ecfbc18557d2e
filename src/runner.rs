use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::PipelineError;

/// One external tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    /// Standard output is written to this file instead of the terminal.
    pub stdout_to: Option<Utf8PathBuf>,
    pub capture: bool,
}

impl Invocation {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdout_to: None,
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// File name of the program, used in messages and by test doubles.
    pub fn tool_name(&self) -> &str {
        self.program.file_name().unwrap_or(self.program.as_str())
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, or a generic line naming the status when the tool printed nothing.
    pub fn failure_message(&self, program: &str) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!(
                "{program} exited with status {}",
                crate::error::display_status(self.code)
            )
        } else {
            stderr.to_string()
        }
    }
}

/// Runs external tools. Failing to start a tool is an error; a tool that runs and exits
/// non-zero is reported through [`ToolOutput::code`].
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, PipelineError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, PipelineError> {
        (**self).run(invocation)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, PipelineError> {
        debug!(command = %invocation.command_line(), "running");
        let mut cmd = Command::new(invocation.program.as_std_path());
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir.as_std_path());
        }

        if let Some(path) = &invocation.stdout_to {
            let file = fs::File::create(path)
                .map_err(|err| PipelineError::Filesystem(format!("create {path}: {err}")))?;
            cmd.stdout(Stdio::from(file));
        } else if invocation.capture {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
        }
        cmd.stderr(if invocation.capture {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let output = cmd.output().map_err(|err| PipelineError::Launch {
            program: invocation.program.to_string(),
            message: err.to_string(),
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Resolves a bare tool name against `PATH`. Names containing a separator are checked as-is.
pub fn find_in_path(name: &str) -> Option<Utf8PathBuf> {
    let candidate = Utf8Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return utf8(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return utf8(plain);
        }
    }
    None
}

fn utf8(path: PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).ok()
}

pub fn tool_version(runner: &dyn CommandRunner, program: &Utf8Path) -> Option<String> {
    let output = runner
        .run(&Invocation::new(program).arg("--version").capture())
        .ok()?;
    if !output.success() {
        return None;
    }
    let stdout = output.stdout.trim();
    let text = if stdout.is_empty() {
        output.stderr.trim()
    } else {
        stdout
    };
    text.lines().find(|line| !line.trim().is_empty()).map(|line| line.trim().to_string())
}
