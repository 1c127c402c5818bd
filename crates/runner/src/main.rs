//! AimLens.Runner - Controller Process
//!
//! This process manages:
//! - Global hotkeys (crosshair toggle, magnifier toggle, exit)
//! - The crosshair overlay window
//! - The magnifier child process, driven over its stdin
//! - Config file polling: reload, re-register hotkeys, restart the child
//!
//! Usage: AimLens_Runner [--config <path>]

#![windows_subsystem = "windows"]

mod overlay;
mod schedule;

use aimlens_core::config::{
    load_config_from, resolve_config_path, save_config, AppConfig, ConfigWatcher,
};
use aimlens_core::hotkey::{HotkeyAction, HotkeyBindings};
use aimlens_core::magnifier_process::MagnifierProcess;
use aimlens_core::platform::enable_dpi_awareness;
use anyhow::{anyhow, bail, Context, Result};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use overlay::CrosshairOverlay;
use parking_lot::Mutex;
use schedule::ReloadSchedule;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder};

#[derive(Debug)]
enum UserEvent {
    Hotkey(u32),
}

struct Runner {
    config_path: PathBuf,
    config: AppConfig,
    watcher: ConfigWatcher,
    schedule: ReloadSchedule,
    manager: GlobalHotKeyManager,
    bindings: HotkeyBindings,
    overlay: CrosshairOverlay,
    magnifier: Option<MagnifierProcess>,
}

impl Runner {
    fn new(
        config_path: PathBuf,
        config: AppConfig,
        manager: GlobalHotKeyManager,
        overlay: CrosshairOverlay,
    ) -> Self {
        let mut runner = Self {
            watcher: ConfigWatcher::new(config_path.clone()),
            config_path,
            config,
            schedule: ReloadSchedule::new(Instant::now()),
            manager,
            bindings: HotkeyBindings::default(),
            overlay,
            magnifier: None,
        };
        runner.register_hotkeys();
        runner
    }

    fn register_hotkeys(&mut self) {
        let old: Vec<_> = self.bindings.hotkeys().collect();
        if !old.is_empty() {
            if let Err(e) = self.manager.unregister_all(&old) {
                warn!("Failed to unregister hotkeys: {:?}", e);
            }
        }

        self.bindings = HotkeyBindings::from_config(&self.config.hotkeys);
        for hotkey in self.bindings.hotkeys() {
            if let Err(e) = self.manager.register(hotkey) {
                warn!("Failed to register hotkey {:?}: {:?}", hotkey, e);
            }
        }

        let hotkeys = &self.config.hotkeys;
        info!(
            "{} hotkey(s) active (toggle '{}', magnifier '{}', exit '{}')",
            self.bindings.len(),
            hotkeys.toggle,
            hotkeys.magnifier,
            hotkeys.exit
        );
    }

    /// Returns true when the runner should exit
    fn on_hotkey(&mut self, id: u32) -> bool {
        match self.bindings.action(id) {
            Some(HotkeyAction::ToggleCrosshair) => self.overlay.toggle(),
            Some(HotkeyAction::ToggleMagnifier) => self.toggle_magnifier(),
            Some(HotkeyAction::Exit) => {
                info!("Exit hotkey pressed");
                return true;
            }
            None => {}
        }
        false
    }

    fn toggle_magnifier(&mut self) {
        if self.magnifier.is_none() {
            match MagnifierProcess::installed(&self.config_path) {
                Ok(process) => self.magnifier = Some(process),
                Err(e) => {
                    error!("Magnifier not available: {}", e);
                    return;
                }
            }
        }
        let Some(magnifier) = self.magnifier.as_mut() else {
            return;
        };

        if let Err(e) = magnifier.toggle() {
            warn!("Magnifier toggle failed: {}", e);
        }
        info!("Magnifier {}", magnifier.status());
    }

    fn tick(&mut self, now: Instant) {
        if self.schedule.poll_due(now) && self.watcher.poll() {
            self.reload(now);
        }
        if self.schedule.restart_due(now) {
            self.restart_magnifier();
        }
    }

    fn reload(&mut self, now: Instant) {
        info!("Config changed, reloading {}", self.config_path.display());
        self.config = load_config_from(&self.config_path);
        self.overlay.set_config(&self.config.crosshair);
        self.register_hotkeys();

        let running = self
            .magnifier
            .as_mut()
            .map_or(false, |magnifier| magnifier.is_running());
        if running {
            self.schedule.schedule_restart(now);
        }
    }

    fn restart_magnifier(&mut self) {
        let Some(magnifier) = self.magnifier.as_mut() else {
            return;
        };
        if !magnifier.is_running() {
            return;
        }
        if let Err(e) = magnifier.restart() {
            error!("Failed to restart magnifier: {}", e);
        }
        info!("Magnifier {}", magnifier.status());
    }

    fn next_deadline(&self) -> Instant {
        self.schedule.next_deadline()
    }

    fn shutdown(&mut self) {
        if let Some(mut magnifier) = self.magnifier.take() {
            magnifier.stop();
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Option<PathBuf>> {
    let mut config = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("AimLens.Runner starting...");

    let explicit = parse_args(std::env::args().skip(1))?;
    enable_dpi_awareness();

    let config_path =
        resolve_config_path(explicit.as_deref()).context("Failed to locate config file")?;
    if !config_path.exists() {
        info!("No config at {}, writing defaults", config_path.display());
        if let Err(e) = save_config(&config_path, &AppConfig::default()) {
            warn!("Failed to write default config: {}", e);
        }
    }
    let config = load_config_from(&config_path);

    let event_loop: EventLoop<UserEvent> = EventLoopBuilder::with_user_event()
        .build()
        .context("Failed to create event loop")?;

    // Must live on the event loop thread
    let manager = GlobalHotKeyManager::new()
        .map_err(|e| anyhow!("Failed to create hotkey manager: {:?}", e))?;
    let proxy = Mutex::new(event_loop.create_proxy());
    GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
        if event.state == HotKeyState::Pressed {
            let _ = proxy.lock().send_event(UserEvent::Hotkey(event.id));
        }
    }));

    let mut overlay = CrosshairOverlay::new(&event_loop, &config.crosshair)?;
    overlay.show();

    let mut runner = Runner::new(config_path, config, manager, overlay);
    info!("Runner ready, entering event loop");

    event_loop
        .run(move |event, elwt| match event {
            Event::UserEvent(UserEvent::Hotkey(id)) => {
                if runner.on_hotkey(id) {
                    runner.shutdown();
                    elwt.exit();
                }
            }
            Event::WindowEvent {
                event: WindowEvent::RedrawRequested,
                ..
            } => runner.overlay.redraw(),
            Event::AboutToWait => {
                runner.tick(Instant::now());
                elwt.set_control_flow(ControlFlow::WaitUntil(runner.next_deadline()));
            }
            Event::LoopExiting => runner.shutdown(),
            _ => {}
        })
        .context("Event loop failed")?;

    info!("AimLens.Runner exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let none: Vec<String> = Vec::new();
        assert_eq!(parse_args(none).unwrap(), None);

        let explicit = parse_args(["--config".to_string(), "my.json".to_string()]).unwrap();
        assert_eq!(explicit, Some(PathBuf::from("my.json")));

        assert!(parse_args(["--config".to_string()]).is_err());
        assert!(parse_args(["--ipc".to_string()]).is_err());
    }
}
