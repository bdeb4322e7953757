//! Bounded shellouts to well-known local CLIs (screen grabbers).

use helpme_core::{Error, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = crate::env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .clamp(50, 300_000);
    Duration::from_millis(ms)
}

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(bin))
        .find(|cand| cand.is_file())
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// Run a command to completion with a coarse timeout. Output is discarded; tools used here
/// write their result to a file named on the command line.
pub fn run_bounded(mut cmd: Command, timeout: Duration) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotConfigured(format!("{program} not found"))
        } else {
            Error::Io(format!("{program}: {e}"))
        }
    })?;

    let start = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| Error::Io(format!("{program}: {e}")))?
        {
            if !status.success() {
                return Err(Error::Io(format!("{program} exited with {status}")));
            }
            return Ok(());
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Timeout(format!(
                "{program} did not finish within {}ms",
                timeout.as_millis()
            )));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_not_configured() {
        let err = run_bounded(
            Command::new("helpme-no-such-tool-xyz"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "{err}");
        assert!(!has("helpme-no-such-tool-xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_tool_is_killed_at_the_deadline() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let t0 = Instant::now();
        let err = run_bounded(cmd, Duration::from_millis(100)).unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert!(t0.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        assert!(matches!(
            run_bounded(cmd, Duration::from_secs(2)),
            Err(Error::Io(_))
        ));
    }
}
