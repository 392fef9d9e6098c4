use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    common::error::HelperError,
    trade::{MessageKind, ParsedTrade},
};

const PLAYER_GROUP: &str = "player";
const ITEM_GROUP: &str = "item";
const PRICE_GROUP: &str = "price";
const LEAGUE_GROUP: &str = "league";

/// A trigger as written in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub pattern: String,
    pub kind: MessageKind,
}

impl TriggerConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TriggerPattern {
    name: String,
    regex: Regex,
    kind: MessageKind,
}

impl TriggerPattern {
    pub fn compile(config: &TriggerConfig) -> Result<Self, HelperError> {
        let regex = Regex::new(&config.pattern)?;
        for group in [PLAYER_GROUP, ITEM_GROUP] {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(HelperError::Config(format!(
                    "Trigger {} is missing the named group ({})",
                    config.name, group
                )));
            }
        }
        Ok(Self {
            name: config.name.clone(),
            regex,
            kind: config.kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, line: &str, received_at: DateTime<Utc>) -> Option<ParsedTrade> {
        let captures = self.regex.captures(line)?;
        let group = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Some(ParsedTrade {
            player_name: group(PLAYER_GROUP)?,
            item_name: group(ITEM_GROUP)?,
            kind: self.kind,
            price: group(PRICE_GROUP),
            league: group(LEAGUE_GROUP),
            trigger: self.name.clone(),
            raw_line: line.to_string(),
            received_at,
        })
    }
}

/// Trigger patterns in priority order. The first match wins.
#[derive(Clone, Debug, Default)]
pub struct TriggerSet {
    patterns: Vec<TriggerPattern>,
}

impl TriggerSet {
    pub fn compile(configs: &[TriggerConfig]) -> Result<Self, HelperError> {
        let patterns = configs
            .iter()
            .map(TriggerPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn parse_line(&self, line: &str, received_at: DateTime<Utc>) -> Option<ParsedTrade> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.parse(line, received_at))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Whisper formats used by the official trade site.
pub fn default_triggers() -> Vec<TriggerConfig> {
    vec![
        TriggerConfig::new(
            "incoming_priced",
            r"@From (?:<[^>]*> )?(?P<player>[^:]+): Hi, I would like to buy your (?P<item>.+?) listed for (?P<price>.+?) in (?P<league>.+?)(?: \(|\.?$)",
            MessageKind::Incoming,
        ),
        TriggerConfig::new(
            "incoming_unpriced",
            r"@From (?:<[^>]*> )?(?P<player>[^:]+): Hi, I would like to buy your (?P<item>.+?) in (?P<league>.+?)(?: \(|\.?$)",
            MessageKind::Incoming,
        ),
        TriggerConfig::new(
            "incoming_bulk",
            r"@From (?:<[^>]*> )?(?P<player>[^:]+): Hi, I'd like to buy your (?P<item>.+?) for my (?P<price>.+?) in (?P<league>.+?)\.?$",
            MessageKind::Incoming,
        ),
        TriggerConfig::new(
            "outgoing_priced",
            r"@To (?:<[^>]*> )?(?P<player>[^:]+): Hi, I would like to buy your (?P<item>.+?) listed for (?P<price>.+?) in (?P<league>.+?)(?: \(|\.?$)",
            MessageKind::Outgoing,
        ),
    ]
}
