use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    common::{error::HelperError, utils::require_binary},
    wm::CommandRunner,
};

/// Synthesizes the keystrokes for in-game actions. Callers focus the game
/// window first.
#[async_trait]
pub trait InputAutomation: Send + Sync {
    async fn perform_hideout_warp(&self) -> Result<(), HelperError>;
}

pub struct XdotoolInput {
    runner: Arc<dyn CommandRunner>,
    program: String,
    hideout_command: String,
}

impl XdotoolInput {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        hideout_command: impl Into<String>,
    ) -> Result<Self, HelperError> {
        require_binary("xdotool")?;
        Ok(Self::from_parts(runner, "xdotool", hideout_command))
    }

    pub(crate) fn from_parts(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        hideout_command: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            hideout_command: hideout_command.into(),
        }
    }

    async fn xdotool(&self, args: &[&str]) -> Result<(), HelperError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let output = self.runner.run(self.program.clone(), args.clone()).await?;
        if !output.success {
            return Err(HelperError::Backend(format!(
                "{} {} failed - {}",
                self.program,
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl InputAutomation for XdotoolInput {
    async fn perform_hideout_warp(&self) -> Result<(), HelperError> {
        debug!(command = %self.hideout_command, "Performing hideout warp");
        self.xdotool(&["key", "--clearmodifiers", "Return"]).await?;
        self.xdotool(&["type", "--delay", "10", "--", self.hideout_command.as_str()])
            .await?;
        self.xdotool(&["key", "--clearmodifiers", "Return"]).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::wm::{CommandOutput, MockCommandRunner};

    #[tokio::test]
    async fn test_hideout_warp_sends_chat_command() {
        let calls = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
        let recorded = calls.clone();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(3)
            .returning(move |program, args| {
                assert_eq!(program, "xdotool");
                recorded.lock().unwrap().push(args);
                Ok(CommandOutput::succeeded(""))
            });

        let input = XdotoolInput::from_parts(Arc::new(runner), "xdotool", "/hideout");
        input.perform_hideout_warp().await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1].last().map(String::as_str), Some("/hideout"));
        assert_eq!(calls[2], vec!["key", "--clearmodifiers", "Return"]);
    }

    #[tokio::test]
    async fn test_hideout_warp_stops_at_first_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| Ok(CommandOutput::failed("no display")));

        let input = XdotoolInput::from_parts(Arc::new(runner), "xdotool", "/hideout");
        assert!(matches!(
            input.perform_hideout_warp().await,
            Err(HelperError::Backend(_))
        ));
    }
}
