// External command execution
// (c) 2024 NetTune contributors

use std::process::{Command, Stdio};

use anyhow::{Context as _, Result};
use tracing::{debug, trace};

/// A program and its arguments, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The program to run
    pub program: String,
    /// Arguments to pass to it
    pub args: Vec<String>,
}

impl CommandLine {
    /// Constructor
    #[must_use]
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Argument list in the form [`CommandRunner`] wants
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Runs external programs on behalf of the platform layer.
///
/// Implementations return the program's standard output (trimmed) on success.
/// A non-zero exit status is an error, whose message includes anything the
/// program wrote to stderr.
pub trait CommandRunner: std::fmt::Debug {
    /// Runs a program with the caller's privileges
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Runs a program that needs elevated privileges (sysctl writes, MTU changes)
    fn run_privileged(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Convenience wrapper for [`CommandRunner::run`]
    fn run_line(&self, line: &CommandLine) -> Result<String> {
        self.run(&line.program, &line.arg_refs())
    }

    /// Convenience wrapper for [`CommandRunner::run_privileged`]
    fn run_line_privileged(&self, line: &CommandLine) -> Result<String> {
        self.run_privileged(&line.program, &line.arg_refs())
    }
}

/// The real [`CommandRunner`], which spawns processes.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    use_sudo: bool,
}

impl SystemRunner {
    /// Constructor.
    ///
    /// If `use_sudo` is set, privileged commands are run via `sudo`
    /// unless we are already running as root.
    #[must_use]
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn execute(program: &str, args: &[&str], stdin: Stdio) -> Result<String> {
        trace!("exec: {program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(stdin)
            .output()
            .with_context(|| format!("could not run {program}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{program} failed ({}): {}", output.status, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        Self::execute(program, args, Stdio::null())
    }

    fn run_privileged(&self, program: &str, args: &[&str]) -> Result<String> {
        if !self.use_sudo || running_as_root() {
            return Self::execute(program, args, Stdio::inherit());
        }
        debug!("escalating via sudo: {program}");
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(program);
        full.extend_from_slice(args);
        // sudo may need to prompt for a password, so it keeps our stdin
        Self::execute("sudo", &full, Stdio::inherit())
    }
}

#[cfg(test)]
mod test {
    use super::{CommandLine, CommandRunner as _, SystemRunner};

    #[test]
    fn command_line_display() {
        let c = CommandLine::new("sysctl", ["-w", "net.core.rmem_max=1"]);
        assert_eq!(c.to_string(), "sysctl -w net.core.rmem_max=1");
        assert_eq!(c.arg_refs(), vec!["-w", "net.core.rmem_max=1"]);
    }

    #[test]
    fn missing_program_is_an_error() {
        let r = SystemRunner::new(false);
        let e = r.run("nettune-no-such-program", &[]).unwrap_err();
        assert!(e.to_string().contains("could not run"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_trimmed_stdout() {
        let r = SystemRunner::new(false);
        assert_eq!(r.run("echo", &["  hello "]).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn failing_status_is_an_error() {
        let r = SystemRunner::new(false);
        assert!(r.run("false", &[]).is_err());
    }
}
