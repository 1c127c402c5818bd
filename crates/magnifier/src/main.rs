//! AimLens.Magnifier - Screen magnifier process
//!
//! This process owns:
//! - The magnifier window (winit + softbuffer)
//! - The capture loop feeding it frames
//! - In `--ipc` mode, a reader thread turning stdin lines into commands
//!
//! Usage: AimLens_Magnifier [--ipc | --no-hotkey] [--config <path>]
//! Without flags the magnifier is shown at once; `-` toggles it and Escape
//! quits.

#![windows_subsystem = "windows"]

mod surface;

use aimlens_core::capture::native_source_factory;
use aimlens_core::config::{load_config_from, resolve_config_path};
use aimlens_core::frame::FrameNotifier;
use aimlens_core::hotkey::parse_hotkey;
use aimlens_core::ipc::{spawn_stdin_reader, MagnifierCommand};
use aimlens_core::monitor::{MonitorGeometry, MonitorLayout};
use aimlens_core::platform::{enable_dpi_awareness, native_capabilities, NativeCapabilities};
use aimlens_core::MagnifierController;
use anyhow::{anyhow, bail, Context, Result};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use surface::WinitSurface;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{
    ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget,
};
use winit::window::{WindowBuilder, WindowLevel};

type Controller = MagnifierController<WinitSurface, NativeCapabilities>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Commands on stdin, starts hidden
    Ipc,
    /// Local hotkeys, starts visible
    Standalone,
    /// No hotkeys, starts visible
    NoHotkey,
}

#[derive(Debug, PartialEq)]
struct Args {
    mode: Mode,
    config: Option<PathBuf>,
}

#[derive(Debug)]
enum UserEvent {
    Command(MagnifierCommand),
    FrameReady,
    ToggleHotkey,
    ExitHotkey,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut ipc = false;
    let mut no_hotkey = false;
    let mut config = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ipc" => ipc = true,
            "--no-hotkey" => no_hotkey = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    let mode = if ipc {
        Mode::Ipc
    } else if no_hotkey {
        Mode::NoHotkey
    } else {
        Mode::Standalone
    };
    Ok(Args { mode, config })
}

fn main() -> Result<()> {
    // stdout is left alone; the runner only talks to our stdin
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    tracing::info!("AimLens.Magnifier starting in {:?} mode", args.mode);

    enable_dpi_awareness();

    let config_path =
        resolve_config_path(args.config.as_deref()).context("Failed to locate config file")?;
    let config = load_config_from(&config_path).magnifier;
    tracing::info!(
        "Loaded {}: {}px -> {}px, {} fps, {}",
        config_path.display(),
        config.capture_size,
        config.display_size,
        config.target_fps,
        config.interpolation
    );

    let event_loop: EventLoop<UserEvent> = EventLoopBuilder::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    let layout = monitor_layout(&event_loop);
    tracing::info!("Found {} monitor(s)", layout.len());

    let window = window_builder(config.display_size)
        .build(&event_loop)
        .context("Failed to create magnifier window")?;
    let surface = WinitSurface::new(Rc::new(window))?;

    let frame_proxy = Mutex::new(event_loop.create_proxy());
    let notify: FrameNotifier = Arc::new(move || {
        let _ = frame_proxy.lock().send_event(UserEvent::FrameReady);
    });

    let mut controller = MagnifierController::new(
        config,
        &layout,
        surface,
        native_capabilities(),
        native_source_factory(),
        Some(notify),
    )
    .context("Failed to set up magnifier")?;

    let mut hotkeys = None;
    match args.mode {
        Mode::Ipc => {
            let proxy = event_loop.create_proxy();
            spawn_stdin_reader(move |command| {
                proxy.send_event(UserEvent::Command(command)).is_ok()
            })
            .context("Failed to start command reader")?;
        }
        Mode::Standalone => {
            hotkeys = Some(register_local_hotkeys(event_loop.create_proxy())?);
            controller.show_magnifier();
        }
        Mode::NoHotkey => controller.show_magnifier(),
    }

    event_loop
        .run(move |event, elwt| {
            // The manager unregisters everything when dropped
            let _hotkeys = &hotkeys;

            match event {
                Event::UserEvent(user_event) => handle_user_event(&mut controller, user_event, elwt),
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::RedrawRequested => controller.redraw(),
                    WindowEvent::CloseRequested => {
                        controller.close();
                        elwt.exit();
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    controller.poll_timers(Instant::now());
                    match controller.next_deadline() {
                        Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                        None => elwt.set_control_flow(ControlFlow::Wait),
                    }
                }
                Event::LoopExiting => controller.close(),
                _ => {}
            }
        })
        .context("Event loop failed")?;

    tracing::info!("AimLens.Magnifier exiting");
    Ok(())
}

fn handle_user_event(
    controller: &mut Controller,
    event: UserEvent,
    elwt: &EventLoopWindowTarget<UserEvent>,
) {
    match event {
        UserEvent::FrameReady => {
            controller.pump_frames();
        }
        UserEvent::Command(MagnifierCommand::Show) => controller.show_magnifier(),
        UserEvent::Command(MagnifierCommand::Hide) => controller.hide_magnifier(),
        UserEvent::ToggleHotkey => controller.toggle(),
        UserEvent::Command(MagnifierCommand::Quit) | UserEvent::ExitHotkey => {
            tracing::info!("Quit requested");
            controller.close();
            elwt.exit();
        }
    }
}

fn window_builder(display_size: u32) -> WindowBuilder {
    let builder = WindowBuilder::new()
        .with_title("AimLens Magnifier")
        .with_inner_size(PhysicalSize::new(display_size, display_size))
        .with_decorations(false)
        .with_resizable(false)
        .with_visible(false)
        .with_active(false)
        .with_window_level(WindowLevel::AlwaysOnTop);

    #[cfg(windows)]
    let builder = {
        use winit::platform::windows::WindowBuilderExtWindows;
        builder.with_skip_taskbar(true)
    };

    builder
}

/// Monitors in OS enumeration order; monitor 1 is the first one
fn monitor_layout<T>(target: &EventLoopWindowTarget<T>) -> MonitorLayout {
    let monitors = target
        .available_monitors()
        .map(|monitor| {
            let position = monitor.position();
            let size = monitor.size();
            MonitorGeometry::new(position.x, position.y, size.width, size.height)
        })
        .collect();
    MonitorLayout::new(monitors)
}

/// `-` toggles, Escape quits
fn register_local_hotkeys(proxy: EventLoopProxy<UserEvent>) -> Result<GlobalHotKeyManager> {
    let manager = GlobalHotKeyManager::new()
        .map_err(|e| anyhow!("Failed to create hotkey manager: {:?}", e))?;

    let toggle = parse_hotkey("-")?;
    let exit = parse_hotkey("escape")?;
    for hotkey in [toggle, exit] {
        manager
            .register(hotkey)
            .map_err(|e| anyhow!("Failed to register hotkey {:?}: {:?}", hotkey, e))?;
    }

    let (toggle_id, exit_id) = (toggle.id(), exit.id());
    let proxy = Mutex::new(proxy);
    GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
        if event.state != HotKeyState::Pressed {
            return;
        }
        let user_event = if event.id == toggle_id {
            UserEvent::ToggleHotkey
        } else if event.id == exit_id {
            UserEvent::ExitHotkey
        } else {
            return;
        };
        let _ = proxy.lock().send_event(user_event);
    }));

    tracing::info!("Hotkeys registered: '-' toggles, Escape quits");
    Ok(manager)
}
