//! Runner-side handle on the magnifier child process.
//!
//! Commands are fire-and-forget: `visible` mirrors the last command written,
//! the child never confirms it.

use crate::ipc::{write_command, MagnifierCommand};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// How long `stop` waits after `quit` before killing the child
pub const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// File name of the magnifier binary, without the platform suffix
pub const MAGNIFIER_BIN: &str = "AimLens_Magnifier";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("magnifier executable not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to spawn magnifier: {0}")]
    Spawn(#[source] io::Error),
    #[error("magnifier stdin was not captured")]
    NoStdin,
    #[error("magnifier is not running")]
    NotRunning,
    #[error("failed to write to magnifier: {0}")]
    Pipe(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnifierStatus {
    NotRunning,
    Hidden,
    Visible,
}

impl fmt::Display for MagnifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MagnifierStatus::NotRunning => write!(f, "not running"),
            MagnifierStatus::Hidden => write!(f, "running (hidden)"),
            MagnifierStatus::Visible => write!(f, "running (visible)"),
        }
    }
}

struct RunningChild {
    child: Child,
    stdin: ChildStdin,
}

pub struct MagnifierProcess {
    program: PathBuf,
    args: Vec<String>,
    running: Option<RunningChild>,
    visible: bool,
}

/// Path of the magnifier binary installed next to the current executable
pub fn magnifier_exe_path() -> Result<PathBuf, ProcessError> {
    let exe = std::env::current_exe().map_err(ProcessError::Spawn)?;
    let dir = exe
        .parent()
        .ok_or_else(|| ProcessError::NotFound(exe.clone()))?;
    let path = dir.join(format!("{}{}", MAGNIFIER_BIN, std::env::consts::EXE_SUFFIX));
    if !path.exists() {
        return Err(ProcessError::NotFound(path));
    }
    Ok(path)
}

impl MagnifierProcess {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            running: None,
            visible: false,
        }
    }

    /// The installed magnifier in IPC mode, reading `config_path`
    pub fn installed(config_path: &Path) -> Result<Self, ProcessError> {
        let program = magnifier_exe_path()?;
        let args = vec![
            "--ipc".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
        ];
        Ok(Self::new(program, args))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Last visibility sent to the child
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether a child is alive. Reaps one that has exited.
    pub fn is_running(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        match running.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("Magnifier exited on its own ({})", status);
                self.running = None;
                self.visible = false;
                false
            }
            Err(e) => {
                warn!("Failed to query magnifier state: {}", e);
                true
            }
        }
    }

    pub fn status(&mut self) -> MagnifierStatus {
        if !self.is_running() {
            MagnifierStatus::NotRunning
        } else if self.visible {
            MagnifierStatus::Visible
        } else {
            MagnifierStatus::Hidden
        }
    }

    /// Spawn the child hidden. Does nothing if one is already running.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_running() {
            return Ok(());
        }
        self.visible = false;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(ProcessError::Spawn)?;
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::NoStdin);
        };

        info!("Magnifier started (pid {})", child.id());
        self.running = Some(RunningChild { child, stdin });
        Ok(())
    }

    pub fn show(&mut self) -> Result<(), ProcessError> {
        self.send(MagnifierCommand::Show)?;
        self.visible = true;
        Ok(())
    }

    pub fn hide(&mut self) -> Result<(), ProcessError> {
        self.send(MagnifierCommand::Hide)?;
        self.visible = false;
        Ok(())
    }

    /// Flip visibility, starting the child first if needed
    pub fn toggle(&mut self) -> Result<(), ProcessError> {
        if let Err(e) = self.start() {
            error!("Failed to start magnifier: {}", e);
            return Err(e);
        }
        if self.visible {
            self.hide()
        } else {
            self.show()
        }
    }

    /// Ask the child to quit; kill it if it has not exited within [`QUIT_TIMEOUT`]
    pub fn stop(&mut self) {
        self.visible = false;
        let Some(RunningChild { mut child, mut stdin }) = self.running.take() else {
            return;
        };

        if let Err(e) = write_command(&mut stdin, MagnifierCommand::Quit) {
            warn!("Failed to send quit to magnifier: {}", e);
        }
        drop(stdin);

        let deadline = Instant::now() + QUIT_TIMEOUT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Magnifier exited ({})", status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(20));
                }
                Ok(None) | Err(_) => break,
            }
        }

        warn!("Magnifier did not quit within {:?}, killing it", QUIT_TIMEOUT);
        if let Err(e) = child.kill() {
            warn!("Failed to kill magnifier: {}", e);
        }
        let _ = child.wait();
    }

    /// Replace the child with a fresh one, keeping its visibility
    pub fn restart(&mut self) -> Result<(), ProcessError> {
        let was_visible = self.is_running() && self.visible;
        self.stop();
        self.start()?;
        if was_visible {
            self.show()?;
        }
        info!("Magnifier restarted");
        Ok(())
    }

    fn send(&mut self, command: MagnifierCommand) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Err(ProcessError::NotRunning);
        }
        let Some(running) = self.running.as_mut() else {
            return Err(ProcessError::NotRunning);
        };

        if let Err(e) = write_command(&mut running.stdin, command) {
            error!("Magnifier pipe broken, dropping handle: {}", e);
            if let Some(mut broken) = self.running.take() {
                let _ = broken.child.kill();
                let _ = broken.child.wait();
            }
            self.visible = false;
            return Err(ProcessError::Pipe(e));
        }
        Ok(())
    }
}

impl Drop for MagnifierProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Child that echoes nothing and exits on `quit` or EOF
    fn obedient() -> MagnifierProcess {
        MagnifierProcess::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"while read line; do [ "$line" = quit ] && exit 0; done"#.to_string(),
            ],
        )
    }

    #[test]
    fn test_status_follows_commands() {
        let mut process = obedient();
        assert_eq!(process.status(), MagnifierStatus::NotRunning);

        process.start().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Hidden);
        process.show().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Visible);
        assert_eq!(process.status().to_string(), "running (visible)");
        process.hide().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Hidden);

        let started = Instant::now();
        process.stop();
        assert!(started.elapsed() < QUIT_TIMEOUT);
        assert_eq!(process.status(), MagnifierStatus::NotRunning);
    }

    #[test]
    fn test_toggle_starts_lazily() {
        let mut process = obedient();
        process.toggle().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Visible);
        process.toggle().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Hidden);
        process.stop();
    }

    #[test]
    fn test_restart_keeps_visibility() {
        let mut process = obedient();
        process.toggle().unwrap();
        process.restart().unwrap();
        assert_eq!(process.status(), MagnifierStatus::Visible);
        process.stop();
    }

    #[test]
    fn test_missing_program_reports_spawn_error() {
        let mut process = MagnifierProcess::new("/nonexistent/aimlens-magnifier", Vec::new());
        assert!(matches!(process.toggle(), Err(ProcessError::Spawn(_))));
        assert_eq!(process.status(), MagnifierStatus::NotRunning);
    }

    #[test]
    fn test_dead_child_resets_status() {
        let mut process = MagnifierProcess::new("sh", vec!["-c".to_string(), "exit 0".to_string()]);
        process.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while process.is_running() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(process.show(), Err(ProcessError::NotRunning)));
        assert!(!process.is_visible());
    }

    #[test]
    fn test_stubborn_child_is_killed() {
        let mut process = MagnifierProcess::new(
            "sh",
            vec!["-c".to_string(), "trap '' TERM; sleep 10".to_string()],
        );
        process.start().unwrap();

        let started = Instant::now();
        process.stop();
        assert!(started.elapsed() >= QUIT_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(process.status(), MagnifierStatus::NotRunning);
    }
}
