/// Processing Command Module
///
/// Runs the external data-processing pipeline that regenerates the JSON
/// artifacts (including the export record) and waits for it to finish.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::ProcessingError;

/// Keep only the end of stderr in error messages
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub duration: Duration,
    pub stdout_lines: usize,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the processing command to completion
    async fn run(&self) -> Result<ProcessOutput, ProcessingError>;

    /// Human readable command line, for logs
    fn describe(&self) -> String;
}

/// Runs a configured program as a child process, bounded by a timeout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            workdir: None,
            timeout,
        }
    }

    /// Build from a whitespace separated command line such as `python3 process_all.py`
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self) -> Result<ProcessOutput, ProcessingError> {
        let command_line = self.describe();
        let started = std::time::Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &self.workdir {
            command.current_dir(workdir);
        }

        let child = command.spawn().map_err(|source| ProcessingError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        log::info!("Started `{}` (timeout {}s)", command_line, self.timeout.as_secs());

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ProcessingError::Spawn {
                command: command_line.clone(),
                source,
            })?,
            Err(_) => {
                log::error!("`{}` timed out, killing it", command_line);
                return Err(ProcessingError::TimedOut {
                    command: command_line,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            log::debug!("[process] {}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessingError::Failed {
                command: command_line,
                status: output.status.to_string(),
                stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
            });
        }

        Ok(ProcessOutput {
            duration: started.elapsed(),
            stdout_lines: stdout.lines().count(),
        })
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
