use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::{common::error::HelperError, trade::TradeEntry};

/// Presents trades to the user and reports which one, if any, was picked.
#[async_trait]
pub trait TradeSelector: Send + Sync {
    async fn select_from(&self, entries: &[TradeEntry])
        -> Result<Option<TradeEntry>, HelperError>;
}

pub struct RofiSelector {
    program: String,
}

impl RofiSelector {
    const PROMPT: &'static str = "Trades";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TradeSelector for RofiSelector {
    async fn select_from(
        &self,
        entries: &[TradeEntry],
    ) -> Result<Option<TradeEntry>, HelperError> {
        let menu: String = entries
            .iter()
            .map(|entry| format!("{}\n", entry.summary()))
            .collect();

        let mut child = Command::new(&self.program)
            .args(["-dmenu", "-i", "-format", "i", "-p"])
            .arg(Self::PROMPT)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(menu.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        // rofi exits 1 when the menu is dismissed
        if !output.status.success() {
            debug!(status = %output.status, "Selection dismissed");
            return Ok(None);
        }

        let chosen = String::from_utf8_lossy(&output.stdout);
        let chosen = chosen.trim();
        if chosen.is_empty() {
            return Ok(None);
        }
        let index: usize = chosen.parse().map_err(|_| {
            HelperError::Backend(format!(
                "{} returned a non-index selection {}",
                self.program, chosen
            ))
        })?;
        Ok(entries.get(index).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::testing::SomeTestParams;

    fn fake_menu(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("fake-rofi");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_menu_gets_prompt_and_rows_and_index_picks_entry() {
        let dir = tempfile::tempdir().unwrap();
        let args_path = dir.path().join("args");
        let menu_path = dir.path().join("menu");
        let program = fake_menu(
            dir.path(),
            &format!(
                "echo \"$@\" > {}\ncat > {}\necho 1",
                args_path.display(),
                menu_path.display()
            ),
        );
        let entries = vec![
            SomeTestParams::trade_entry("First", "Goldrim"),
            SomeTestParams::trade_entry("Second", "Wanderlust"),
        ];

        let chosen = RofiSelector::new(program)
            .select_from(&entries)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chosen.player_name, "Second");

        let args = std::fs::read_to_string(&args_path).unwrap();
        assert!(args.contains("-dmenu"));
        assert!(args.contains("-p Trades"));
        let menu = std::fs::read_to_string(&menu_path).unwrap();
        assert_eq!(menu.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_dismissed_menu_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_menu(dir.path(), "cat > /dev/null\nexit 1");
        let entries = vec![SomeTestParams::trade_entry("First", "Goldrim")];

        let chosen = RofiSelector::new(program).select_from(&entries).await.unwrap();
        assert!(chosen.is_none());
    }
}
