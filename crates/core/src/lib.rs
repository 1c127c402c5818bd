//! AimLens Core Library
//!
//! Shared functionality for the AimLens processes
//!
//! Architecture:
//! - Runner process owns the crosshair overlay and the global hotkeys, and
//!   drives the magnifier as a child process (magnifier_process module)
//! - Magnifier process owns the magnifier window and its capture loop
//!   (magnifier_window, capture_loop modules)
//! - IPC is one text command per line on the magnifier's stdin (ipc module)

pub mod capture;
pub mod capture_loop;
pub mod config;
pub mod crosshair;
pub mod fps;
pub mod frame;
pub mod gpu;
pub mod hotkey;
pub mod ipc;
pub mod magnifier_process;
pub mod magnifier_window;
pub mod monitor;
pub mod platform;
pub mod resample;

pub use crate::capture_loop::{CaptureLoop, LoopState};
pub use crate::config::{AppConfig, MagnifierConfig};
pub use crate::magnifier_window::{MagnifierController, MagnifierSurface, WindowVisibility};
