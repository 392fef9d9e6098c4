use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    collab::{InputAutomation, Notifier, Severity, TradeSelector, TradeStore},
    common::error::HelperError,
    trade::TradeEntry,
    wm::{Window, WindowManager},
};

/// Remembers every list it was offered and answers with a fixed index.
/// Ordered record of focus and warp calls, shareable between fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingSelector {
    choice: Option<usize>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<TradeEntry>>>,
}

impl RecordingSelector {
    pub fn choosing(index: usize) -> Self {
        Self {
            choice: Some(index),
            ..Default::default()
        }
    }

    pub fn dismissing() -> Self {
        Self::default()
    }

    /// Holds the menu open for `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<TradeEntry>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeSelector for RecordingSelector {
    async fn select_from(
        &self,
        entries: &[TradeEntry],
    ) -> Result<Option<TradeEntry>, HelperError> {
        self.calls.lock().unwrap().push(entries.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.choice.and_then(|index| entries.get(index).cloned()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, message: &str, severity: Severity) -> Result<(), HelperError> {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeInput {
    warps: Mutex<usize>,
    log: CallLog,
}

impl FakeInput {
    pub fn logging_to(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn warps(&self) -> usize {
        *self.warps.lock().unwrap()
    }
}

#[async_trait]
impl InputAutomation for FakeInput {
    async fn perform_hideout_warp(&self) -> Result<(), HelperError> {
        *self.warps.lock().unwrap() += 1;
        self.log.record("warp");
        Ok(())
    }
}

/// Window manager over a fixed set of windows. Records focused IDs.
#[derive(Default)]
pub struct FakeWindowManager {
    windows: Vec<Window>,
    focused: Mutex<Vec<String>>,
    focus_delay: Option<Duration>,
    log: CallLog,
}

impl FakeWindowManager {
    pub fn with_window(window: Window) -> Self {
        Self {
            windows: vec![window],
            ..Default::default()
        }
    }

    /// Each focus takes `delay` before returning.
    pub fn slow_focus(mut self, delay: Duration) -> Self {
        self.focus_delay = Some(delay);
        self
    }

    pub fn logging_to(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn focused(&self) -> Vec<String> {
        self.focused.lock().unwrap().clone()
    }
}

#[async_trait]
impl WindowManager for FakeWindowManager {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn find_window(&self, class_names: &[String]) -> Result<Option<Window>, HelperError> {
        Ok(class_names.iter().find_map(|class| {
            self.windows
                .iter()
                .find(|window| &window.class == class)
                .cloned()
        }))
    }

    async fn focus_window(&self, window: &Window) -> Result<(), HelperError> {
        if window.id.is_empty() {
            return Err(HelperError::InvalidArgument(
                "cannot focus window: no window ID provided".to_string(),
            ));
        }
        self.log.record(format!("focus {}", window.id));
        if let Some(delay) = self.focus_delay {
            tokio::time::sleep(delay).await;
        }
        self.focused.lock().unwrap().push(window.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTradeStore {
    initial: Vec<TradeEntry>,
    saved: Mutex<Vec<TradeEntry>>,
}

impl MemoryTradeStore {
    pub fn with_entries(entries: Vec<TradeEntry>) -> Self {
        Self {
            initial: entries,
            ..Default::default()
        }
    }

    pub fn saved(&self) -> Vec<TradeEntry> {
        self.saved.lock().unwrap().clone()
    }
}

impl TradeStore for MemoryTradeStore {
    fn save(&self, entry: &TradeEntry) -> Result<(), HelperError> {
        self.saved.lock().unwrap().push(entry.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<TradeEntry>, HelperError> {
        Ok(self.initial.clone())
    }
}
