use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use super::TradeState;
use crate::common::types::{TradeId, TRADE_ID_NAMESPACE};

/// Direction of the whisper that produced a trade.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Debug,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum MessageKind {
    /// Someone wants to buy from us.
    Incoming,
    /// We asked someone else to sell to us.
    Outgoing,
}

/// Fields extracted from one matching log line, before the registry owns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedTrade {
    pub player_name: String,
    pub item_name: String,
    pub kind: MessageKind,
    pub price: Option<String>,
    pub league: Option<String>,
    pub trigger: String,
    pub raw_line: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub id: TradeId,
    pub player_name: String,
    pub item_name: String,
    pub kind: MessageKind,
    pub price: Option<String>,
    pub league: Option<String>,
    pub trigger: String,
    pub raw_line: String,
    pub received_at: DateTime<Utc>,
    pub state: TradeState,
    pub updated_at: DateTime<Utc>,
}

impl TradeEntry {
    pub(crate) fn new(id: TradeId, parsed: ParsedTrade) -> Self {
        Self {
            id,
            player_name: parsed.player_name,
            item_name: parsed.item_name,
            kind: parsed.kind,
            price: parsed.price,
            league: parsed.league,
            trigger: parsed.trigger,
            raw_line: parsed.raw_line,
            received_at: parsed.received_at,
            state: TradeState::New,
            updated_at: parsed.received_at,
        }
    }

    /// One-line label used by selection menus and notifications.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} | {} | {}", self.kind, self.player_name, self.item_name);
        if let Some(price) = &self.price {
            summary.push_str(&format!(" | {}", price));
        }
        summary
    }
}

/// Identity used to collapse repeated whispers for the same request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    player_name: String,
    item_name: String,
    bucket: i64,
}

impl DedupKey {
    pub fn new(
        player_name: impl AsRef<str>,
        item_name: impl AsRef<str>,
        at: DateTime<Utc>,
        bucket_width: Duration,
    ) -> Self {
        let width = bucket_width.as_secs().max(1) as i64;
        Self {
            player_name: player_name.as_ref().trim().to_string(),
            item_name: item_name.as_ref().trim().to_string(),
            bucket: at.timestamp().div_euclid(width),
        }
    }

    pub fn for_trade(parsed: &ParsedTrade, bucket_width: Duration) -> Self {
        Self::new(
            &parsed.player_name,
            &parsed.item_name,
            parsed.received_at,
            bucket_width,
        )
    }

    /// The same player/item pair one bucket earlier.
    pub fn previous(&self) -> Self {
        Self {
            player_name: self.player_name.clone(),
            item_name: self.item_name.clone(),
            bucket: self.bucket - 1,
        }
    }

    pub fn trade_id(&self, generation: u32) -> TradeId {
        let name = format!("{}#{}", self, generation);
        Uuid::new_v5(&TRADE_ID_NAMESPACE, name.as_bytes())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}|{}|{}", self.player_name, self.item_name, self.bucket)
    }
}
