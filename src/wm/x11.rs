use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{
    window::ensure_focusable, CommandRunner, Window, WindowManager, FOCUS_SETTLE_DELAY,
};
use crate::common::{error::HelperError, utils::require_binary};

/// X11 backend driving `xdotool`.
pub struct X11 {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl X11 {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Result<Self, HelperError> {
        Self::with_program(runner, "xdotool")
    }

    pub(crate) fn with_program(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
    ) -> Result<Self, HelperError> {
        let program = program.into();
        require_binary(&program)?;
        Ok(Self::from_parts(runner, program))
    }

    pub(crate) fn from_parts(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn xdotool(&self, args: &[&str]) -> Result<super::CommandOutput, HelperError> {
        let args = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.run(self.program.clone(), args).await
    }
}

#[async_trait]
impl WindowManager for X11 {
    fn name(&self) -> &'static str {
        "X11"
    }

    async fn find_window(&self, class_names: &[String]) -> Result<Option<Window>, HelperError> {
        for class in class_names {
            // xdotool exits non-zero when nothing matches
            let output = self.xdotool(&["search", "--class", class.as_str()]).await?;
            let Some(window_id) = output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
            else {
                trace!(%class, "No window for class");
                continue;
            };

            let title = self.xdotool(&["getwindowname", window_id]).await?;
            let title = title
                .success
                .then(|| title.stdout.trim().to_string())
                .filter(|title| !title.is_empty());

            debug!(%class, window_id, ?title, "Found window");
            return Ok(Some(Window {
                id: window_id.to_string(),
                class: class.clone(),
                title,
            }));
        }
        Ok(None)
    }

    async fn focus_window(&self, window: &Window) -> Result<(), HelperError> {
        ensure_focusable(window)?;

        let output = self.xdotool(&["windowactivate", window.id.as_str()]).await?;
        if !output.success {
            return Err(HelperError::Backend(format!(
                "failed to focus window {} - {}",
                window.id,
                output.stderr.trim()
            )));
        }

        tokio::time::sleep(FOCUS_SETTLE_DELAY).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::{CommandOutput, MockCommandRunner};

    fn classes() -> Vec<String> {
        vec!["GameWindowV2".to_string(), "GameWindow".to_string()]
    }

    #[tokio::test]
    async fn test_find_window_falls_back_to_later_class() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args.len() == 3 && args[2] == "GameWindowV2")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed("")));
        runner
            .expect_run()
            .withf(|_, args| args.len() == 3 && args[2] == "GameWindow")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::succeeded("41943041\n41943050\n")));
        runner
            .expect_run()
            .withf(|_, args| args[0] == "getwindowname" && args[1] == "41943041")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::succeeded("Path of Exile\n")));

        let x11 = X11::from_parts(Arc::new(runner), "xdotool");
        let window = x11.find_window(&classes()).await.unwrap().unwrap();
        assert_eq!(window.class, "GameWindow");
        assert_eq!(window.id, "41943041");
        assert_eq!(window.title.as_deref(), Some("Path of Exile"));
    }

    #[tokio::test]
    async fn test_find_window_none_is_not_an_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(2)
            .returning(|_, _| Ok(CommandOutput::failed("")));

        let x11 = X11::from_parts(Arc::new(runner), "xdotool");
        assert_eq!(x11.find_window(&classes()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_focus_empty_id_makes_no_backend_call() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        let x11 = X11::from_parts(Arc::new(runner), "xdotool");
        let result = x11.focus_window(&Window::default()).await;
        assert!(matches!(result, Err(HelperError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_focus_waits_for_settle_delay() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args[0] == "windowactivate" && args[1] == "42")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::succeeded("")));

        let x11 = X11::from_parts(Arc::new(runner), "xdotool");
        let window = Window {
            id: "42".to_string(),
            class: "GameWindow".to_string(),
            title: None,
        };
        let started = std::time::Instant::now();
        x11.focus_window(&window).await.unwrap();
        assert!(started.elapsed() >= FOCUS_SETTLE_DELAY);
    }

    #[test]
    fn test_construction_requires_helper_binary() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        let result = X11::with_program(Arc::new(runner), "xdotool-not-installed-7d2e");
        assert!(matches!(result, Err(HelperError::DependencyMissing(_))));
    }
}
