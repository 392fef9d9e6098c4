use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    collab::{LogNotifier, Notifier},
    config::Config,
    context::Context,
    trade::{DedupKey, MessageKind, ParsedTrade, TradeEntry},
};

pub struct SomeTestParams {}

impl SomeTestParams {
    pub fn log_prefix() -> String {
        "2024/03/01 20:00:00 123456789 cffb0734 [INFO Client 4242]".to_string()
    }

    pub fn incoming_line(player: &str, item: &str) -> String {
        format!(
            "{} @From {}: Hi, I would like to buy your {} listed for 10 chaos in Standard (stash tab \"~price 10 chaos\"; position: left 3, top 7)",
            Self::log_prefix(),
            player,
            item
        )
    }

    pub fn outgoing_line(player: &str, item: &str) -> String {
        format!(
            "{} @To {}: Hi, I would like to buy your {} listed for 1 divine in Standard (stash tab \"sale\"; position: left 1, top 1)",
            Self::log_prefix(),
            player,
            item
        )
    }

    pub fn parsed_trade(player: &str, item: &str, received_at: DateTime<Utc>) -> ParsedTrade {
        ParsedTrade {
            player_name: player.to_string(),
            item_name: item.to_string(),
            kind: MessageKind::Incoming,
            price: Some("10 chaos".to_string()),
            league: Some("Standard".to_string()),
            trigger: "incoming_priced".to_string(),
            raw_line: Self::incoming_line(player, item),
            received_at,
        }
    }

    pub fn trade_entry(player: &str, item: &str) -> TradeEntry {
        let parsed = Self::parsed_trade(player, item, Utc::now());
        let id = DedupKey::for_trade(&parsed, Duration::from_secs(60)).trade_id(0);
        TradeEntry::new(id, parsed)
    }

    pub fn game_window_classes() -> Vec<String> {
        vec!["pathofexile".to_string(), "steam_app_238960".to_string()]
    }

    /// Config rooted in `dir` with no external dependencies and fast timers.
    pub fn config(dir: &Path) -> Config {
        Config {
            log_path: dir.join("Client.txt"),
            dependencies: Vec::new(),
            socket_path: dir.join("poe-helper.sock"),
            history_path: dir.join("trades.jsonl"),
            poll_interval_ms: 20,
            connect_timeout_ms: 1000,
            response_timeout_ms: 2000,
            selection_timeout_secs: 5,
            shutdown_grace_ms: 500,
            ..Default::default()
        }
    }

    pub fn context(log_path: &Path) -> Context {
        Self::context_with_notifier(log_path, Arc::new(LogNotifier))
    }

    pub fn context_with_notifier(log_path: &Path, notifier: Arc<dyn Notifier>) -> Context {
        let dir = log_path.parent().unwrap_or(log_path);
        let config = Config {
            log_path: log_path.to_path_buf(),
            ..Self::config(dir)
        };
        Context::with_notifier(config, notifier)
    }
}
