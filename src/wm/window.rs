use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::error::HelperError;

/// Backend focus calls return before the window manager has processed them.
pub const FOCUS_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Backend-specific handle, opaque to callers.
    pub id: String,
    /// The class from the candidate list that matched.
    pub class: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait WindowManager: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tries each class in order and returns a window of the first class
    /// that has one. `Ok(None)` when nothing matches.
    async fn find_window(&self, class_names: &[String]) -> Result<Option<Window>, HelperError>;

    /// Activates `window` and waits `FOCUS_SETTLE_DELAY` before returning.
    /// An empty ID is rejected before any backend call.
    async fn focus_window(&self, window: &Window) -> Result<(), HelperError>;
}

pub(crate) fn ensure_focusable(window: &Window) -> Result<(), HelperError> {
    if window.id.trim().is_empty() {
        return Err(HelperError::InvalidArgument(
            "cannot focus window: no window ID provided".to_string(),
        ));
    }
    Ok(())
}
