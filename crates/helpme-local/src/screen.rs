use helpme_core::{Error, Result, ScreenCapture};
use std::process::Command;
use std::time::Duration;

use crate::shellout;

/// Which grabber to drive, picked by platform and what is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grabber {
    /// macOS `screencapture -x <file>`.
    ScreenCapture,
    /// Wayland `grim <file>`.
    Grim,
    /// X11 `scrot -o <file>`.
    Scrot,
    /// ImageMagick `import -window root <file>`.
    Import,
}

impl Grabber {
    pub fn binary(self) -> &'static str {
        match self {
            Self::ScreenCapture => "screencapture",
            Self::Grim => "grim",
            Self::Scrot => "scrot",
            Self::Import => "import",
        }
    }

    fn command(self, path: &std::path::Path) -> Command {
        let mut cmd = Command::new(self.binary());
        match self {
            Self::ScreenCapture => {
                cmd.arg("-x").arg(path);
            }
            Self::Grim => {
                cmd.arg(path);
            }
            Self::Scrot => {
                cmd.arg("-o").arg(path);
            }
            Self::Import => {
                cmd.args(["-window", "root"]).arg(path);
            }
        }
        cmd
    }

    /// First available grabber for this machine.
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "macos") {
            return shellout::has("screencapture").then_some(Self::ScreenCapture);
        }
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let order: &[Self] = if wayland {
            &[Self::Grim, Self::Scrot, Self::Import]
        } else {
            &[Self::Scrot, Self::Import, Self::Grim]
        };
        order.iter().copied().find(|g| shellout::has(g.binary()))
    }
}

/// Full-screen PNG capture through a platform screenshot tool.
#[derive(Debug, Clone)]
pub struct ShellScreenCapture {
    grabber: Option<Grabber>,
    timeout: Duration,
}

impl ShellScreenCapture {
    pub fn detect() -> Self {
        Self {
            grabber: Grabber::detect(),
            timeout: shellout::timeout_from_env_ms("HELPME_SCREEN_TIMEOUT_MS", 10_000),
        }
    }

    pub fn with_grabber(grabber: Grabber) -> Self {
        Self {
            grabber: Some(grabber),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn grabber(&self) -> Option<Grabber> {
        self.grabber
    }
}

impl ScreenCapture for ShellScreenCapture {
    fn capture(&self) -> Result<Vec<u8>> {
        let grabber = self.grabber.ok_or_else(|| {
            Error::NotConfigured(
                "no screenshot tool found (screencapture, grim, scrot or import)".to_string(),
            )
        })?;
        let tmp = tempfile::Builder::new()
            .prefix("helpme-screen-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| Error::Io(e.to_string()))?
            .into_temp_path();
        shellout::run_bounded(grabber.command(&tmp), self.timeout)?;
        let bytes = std::fs::read(&tmp).map_err(|e| Error::Io(e.to_string()))?;
        if bytes.is_empty() {
            return Err(Error::Io(format!("{} produced no image", grabber.binary())));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_grabber_is_not_configured() {
        let cap = ShellScreenCapture {
            grabber: None,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(cap.capture(), Err(Error::NotConfigured(_))));
    }

    #[test]
    fn grabber_commands_name_the_output_file() {
        let p = std::path::Path::new("/tmp/x.png");
        let cmd = Grabber::Import.command(p);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["-window", "root", "/tmp/x.png"]);
        assert_eq!(Grabber::Scrot.command(p).get_program(), "scrot");
    }

    #[test]
    fn detection_does_not_panic() {
        let _ = Grabber::detect();
    }
}
