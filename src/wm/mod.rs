//! Window-manager backends. One is chosen at startup from the session
//! environment and kept for the life of the process.

mod hyprland;
mod runner;
mod window;
mod x11;

use std::{env, sync::Arc};

use strum_macros::{Display, EnumString, IntoStaticStr};
use tracing::info;

pub use hyprland::Hyprland;
#[cfg(test)]
pub use runner::MockCommandRunner;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use window::{Window, WindowManager, FOCUS_SETTLE_DELAY};
pub use x11::X11;

use crate::common::error::HelperError;

#[derive(PartialEq, Eq, Clone, Copy, Debug, EnumString, Display, IntoStaticStr)]
pub enum Backend {
    X11,
    Hyprland,
}

/// The environment variables that identify the desktop session.
#[derive(Clone, Debug, Default)]
pub struct SessionEnv {
    pub hyprland_instance: Option<String>,
    pub display: Option<String>,
    pub wayland_display: Option<String>,
}

impl SessionEnv {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|value| !value.is_empty());
        Self {
            hyprland_instance: non_empty("HYPRLAND_INSTANCE_SIGNATURE"),
            display: non_empty("DISPLAY"),
            wayland_display: non_empty("WAYLAND_DISPLAY"),
        }
    }

    pub fn backend(&self) -> Result<Backend, HelperError> {
        if self.hyprland_instance.is_some() {
            Ok(Backend::Hyprland)
        } else if self.display.is_some() {
            Ok(Backend::X11)
        } else if self.wayland_display.is_some() {
            Err(HelperError::DependencyMissing(
                "a supported Wayland compositor (only Hyprland is supported)".to_string(),
            ))
        } else {
            Err(HelperError::DependencyMissing(
                "a graphical session (neither DISPLAY nor WAYLAND_DISPLAY is set)".to_string(),
            ))
        }
    }
}

/// Builds the backend for the current session.
pub fn detect(runner: Arc<dyn CommandRunner>) -> Result<Arc<dyn WindowManager>, HelperError> {
    detect_from(&SessionEnv::from_env(), runner)
}

pub fn detect_from(
    session: &SessionEnv,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn WindowManager>, HelperError> {
    let backend = session.backend()?;
    let window_manager: Arc<dyn WindowManager> = match backend {
        Backend::X11 => Arc::new(X11::new(runner)?),
        Backend::Hyprland => Arc::new(Hyprland::new(runner)?),
    };
    info!(backend = window_manager.name(), "Window manager selected");
    Ok(window_manager)
}
