//! Key-combo strings from the config (`"ctrl+alt+x"`, `"f1"`, `"-"`) to
//! `global-hotkey` hotkeys.

use crate::config::HotkeyConfig;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyParseError {
    #[error("empty hotkey")]
    Empty,
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("'{0}' cannot be registered as a global hotkey")]
    Unsupported(String),
    #[error("hotkey '{0}' has no key, only modifiers")]
    MissingKey(String),
}

/// Mouse buttons and wheel directions the settings UI can record
const POINTER_KEYS: &[&str] = &[
    "mouse1",
    "mouse2",
    "mouse3",
    "mouse4",
    "mouse5",
    "scroll_up",
    "scroll_down",
];

fn modifier(token: &str) -> Option<Modifiers> {
    match token {
        "ctrl" | "control" => Some(Modifiers::CONTROL),
        "alt" => Some(Modifiers::ALT),
        "shift" => Some(Modifiers::SHIFT),
        "win" | "super" | "cmd" => Some(Modifiers::META),
        _ => None,
    }
}

fn key_code(token: &str) -> Option<Code> {
    let code = match token {
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,
        "-" | "minus" => Code::Minus,
        "=" | "equal" => Code::Equal,
        "\\" | "backslash" => Code::Backslash,
        "esc" | "escape" => Code::Escape,
        "space" => Code::Space,
        "tab" => Code::Tab,
        "enter" | "return" => Code::Enter,
        "insert" => Code::Insert,
        "delete" => Code::Delete,
        "home" => Code::Home,
        "end" => Code::End,
        "page_up" | "pageup" => Code::PageUp,
        "page_down" | "pagedown" => Code::PageDown,
        "up" => Code::ArrowUp,
        "down" => Code::ArrowDown,
        "left" => Code::ArrowLeft,
        "right" => Code::ArrowRight,
        _ => return None,
    };
    Some(code)
}

/// Parse a `+`-separated combo. Case and surrounding spaces are ignored.
///
/// A lone `+` is not a valid key; `-` is, so the standalone magnifier's toggle
/// can be written `"-"`.
pub fn parse_hotkey(spec: &str) -> Result<HotKey, HotkeyParseError> {
    let spec = spec.trim().to_lowercase();
    if spec.is_empty() {
        return Err(HotkeyParseError::Empty);
    }

    let mut mods = Modifiers::empty();
    let mut key = None;
    for token in spec.split('+').map(str::trim) {
        if POINTER_KEYS.contains(&token) {
            return Err(HotkeyParseError::Unsupported(token.to_string()));
        }
        if let Some(m) = modifier(token) {
            mods |= m;
            continue;
        }
        match key_code(token) {
            Some(code) if key.is_none() => key = Some(code),
            _ => return Err(HotkeyParseError::UnknownKey(token.to_string())),
        }
    }

    let code = key.ok_or_else(|| HotkeyParseError::MissingKey(spec.clone()))?;
    let mods = if mods.is_empty() { None } else { Some(mods) };
    Ok(HotKey::new(mods, code))
}

/// What a runner hotkey does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleCrosshair,
    ToggleMagnifier,
    Exit,
}

/// Parsed runner hotkeys, looked up by the id `global-hotkey` reports
#[derive(Debug, Clone, Default)]
pub struct HotkeyBindings {
    bindings: Vec<(HotkeyAction, HotKey)>,
}

impl HotkeyBindings {
    /// Parse every configured combo. Empty entries are disabled; invalid
    /// ones are logged and skipped.
    pub fn from_config(config: &HotkeyConfig) -> Self {
        let entries = [
            (HotkeyAction::ToggleCrosshair, config.toggle.as_str()),
            (HotkeyAction::ToggleMagnifier, config.magnifier.as_str()),
            (HotkeyAction::Exit, config.exit.as_str()),
        ];

        let mut bindings: Vec<(HotkeyAction, HotKey)> = Vec::new();
        for (action, spec) in entries {
            if spec.trim().is_empty() {
                continue;
            }
            match parse_hotkey(spec) {
                Ok(hotkey) if bindings.iter().any(|(_, bound)| *bound == hotkey) => {
                    warn!("Hotkey '{}' for {:?} is already bound, skipping", spec, action);
                }
                Ok(hotkey) => bindings.push((action, hotkey)),
                Err(e) => warn!("Skipping hotkey for {:?}: {}", action, e),
            }
        }
        Self { bindings }
    }

    pub fn hotkeys(&self) -> impl Iterator<Item = HotKey> + '_ {
        self.bindings.iter().map(|(_, hotkey)| *hotkey)
    }

    pub fn action(&self, id: u32) -> Option<HotkeyAction> {
        self.bindings
            .iter()
            .find(|(_, hotkey)| hotkey.id() == id)
            .map(|(action, _)| *action)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
