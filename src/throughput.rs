//! End-to-end throughput test with iperf3
// (c) 2024 NetTune contributors

use std::{process::Stdio, time::Duration};

use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::Configuration;
use crate::os::CommandRunner;

/// How to install iperf3 on common systems
pub const INSTALL_HINTS: &[(&str, &str)] = &[
    ("macOS", "brew install iperf3"),
    ("Ubuntu/Debian", "sudo apt install iperf3"),
    ("CentOS/RHEL", "sudo yum install iperf3"),
];

/// Parameters for a throughput test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IperfParams {
    /// Server to test against
    pub server: String,
    /// Test length in seconds
    pub duration: u16,
    /// Connection timeout in seconds
    pub connect_timeout: u16,
    /// Wall-clock limit for the whole run
    pub limit: Duration,
}

impl From<&Configuration> for IperfParams {
    fn from(c: &Configuration) -> Self {
        Self {
            server: c.iperf_server.clone(),
            duration: c.iperf_duration,
            connect_timeout: c.iperf_connect_timeout,
            limit: c.iperf_timeout_duration(),
        }
    }
}

impl IperfParams {
    /// Arguments to `iperf3`
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "-c".into(),
            self.server.clone(),
            "-t".into(),
            self.duration.to_string(),
            "--connect-timeout".into(),
            (u32::from(self.connect_timeout) * 1000).to_string(),
        ]
    }
}

/// What a completed test produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughputReport {
    /// The receiver-side summary line, if one was found
    pub receiver: Option<String>,
    /// Everything iperf3 printed
    pub output: String,
}

/// Why a throughput test did not complete
#[derive(Debug, thiserror::Error)]
pub enum ThroughputError {
    /// iperf3 is not on the path
    #[error("iperf3 is not installed")]
    NotInstalled,
    /// The test ran past its wall-clock limit and was killed
    #[error("timed out: no response from {server} within {} s", limit.as_secs())]
    Timeout {
        /// Server
        server: String,
        /// The limit that was exceeded
        limit: Duration,
    },
    /// iperf3 exited unsuccessfully
    #[error("could not reach {server}: {output}")]
    Failed {
        /// Server
        server: String,
        /// What iperf3 printed
        output: String,
    },
    /// iperf3 could not be started
    #[error("could not run iperf3: {0}")]
    Launch(#[from] std::io::Error),
}

/// Is iperf3 available?
#[must_use]
pub fn is_installed<R: CommandRunner + ?Sized>(runner: &R) -> bool {
    runner.run("iperf3", &["--version"]).is_ok()
}

/// Finds the receiver-side summary line in iperf3 output
#[must_use]
pub fn parse_receiver_line(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.contains("receiver"))
        .map(|l| l.trim().to_string())
}

/// Checks that iperf3 is available, then runs it
pub fn measure<R: CommandRunner + ?Sized>(
    runner: &R,
    params: &IperfParams,
) -> Result<ThroughputReport, ThroughputError> {
    if !is_installed(runner) {
        return Err(ThroughputError::NotInstalled);
    }
    run(params)
}

/// Runs iperf3 against the configured server.
///
/// The child process is killed if it runs past `params.limit`.
/// This sets up its own runtime, so must not be called from async context.
#[tokio::main(flavor = "current_thread")]
pub async fn run(params: &IperfParams) -> Result<ThroughputReport, ThroughputError> {
    run_program("iperf3", &params.args(), &params.server, params.limit).await
}

async fn run_program(
    program: &str,
    args: &[String],
    server: &str,
    limit: Duration,
) -> Result<ThroughputReport, ThroughputError> {
    let mut command = tokio::process::Command::new(program);
    let _ = command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    trace!("spawning command: {command:?}");
    let child = command.spawn()?;

    // On timeout the child is dropped, which kills it.
    let result = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| ThroughputError::Timeout {
            server: server.into(),
            limit,
        })??;

    let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&result.stderr));
    debug!("{program} exited with {}", result.status);
    if !result.status.success() {
        return Err(ThroughputError::Failed {
            server: server.into(),
            output: output.trim().into(),
        });
    }
    Ok(ThroughputReport {
        receiver: parse_receiver_line(&output),
        output,
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{
        is_installed, measure, parse_receiver_line, run_program, IperfParams, ThroughputError,
    };
    use crate::config::Configuration;
    use crate::os::test::FakeRunner;

    const OUTPUT: &str = "Connecting to host iperf.he.net, port 5201\n\
        [  5] local 192.0.2.10 port 50000 connected to 216.218.207.42 port 5201\n\
        - - - - - - - - - - - - - - - - - - - - - - - - -\n\
        [ ID] Interval           Transfer     Bitrate         Retr\n\
        [  5]   0.00-5.00   sec   562 MBytes   943 Mbits/sec    0             sender\n\
        [  5]   0.00-5.04   sec   560 MBytes   932 Mbits/sec                  receiver\n\
        \n\
        iperf Done.";

    #[test]
    fn receiver_line() {
        assert_eq!(
            parse_receiver_line(OUTPUT).as_deref(),
            Some("[  5]   0.00-5.04   sec   560 MBytes   932 Mbits/sec                  receiver")
        );
        assert_eq!(parse_receiver_line("iperf Done."), None);
    }

    #[test]
    fn arguments() {
        let p = IperfParams::from(&Configuration::default());
        assert_eq!(
            p.args(),
            vec!["-c", "iperf.he.net", "-t", "5", "--connect-timeout", "5000"]
        );
        assert_eq!(p.limit, Duration::from_secs(15));
    }

    #[test]
    fn installation_check() {
        assert!(is_installed(&FakeRunner::with(&[("iperf3 --version", "iperf 3.16")])));
        assert!(!is_installed(&FakeRunner::default()));
    }

    #[test]
    fn not_installed() {
        let p = IperfParams::from(&Configuration::default());
        assert!(matches!(
            measure(&FakeRunner::default(), &p),
            Err(ThroughputError::NotInstalled)
        ));
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let args = vec!["5".to_string()];
        let err = run_program("sleep", &args, "nowhere", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputError::Timeout { .. }));
    }

    #[tokio::test]
    async fn captures_output() {
        let args = vec![OUTPUT.to_string()];
        let report = run_program("echo", &args, "here", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(report.receiver.unwrap().ends_with("receiver"));
    }

    #[tokio::test]
    async fn failure_keeps_output() {
        let args = vec!["-c".to_string(), "echo refused >&2; exit 1".to_string()];
        let err = run_program("sh", &args, "there", Duration::from_secs(5))
            .await
            .unwrap_err();
        let ThroughputError::Failed { output, .. } = err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(output, "refused");
    }

    #[tokio::test]
    async fn missing_program() {
        let err = run_program("/nonexistent/iperf3", &[], "x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputError::Launch(_)));
    }
}
