use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Lifecycle of a trade entry.
///
/// `New -> Active -> {Completed | Expired | Cancelled}`, with `New -> Expired`
/// allowed for entries nobody ever picked up. Terminal states never change.
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
pub enum TradeState {
    New,
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl TradeState {
    pub fn is_terminal(&self) -> bool {
        match self {
            TradeState::New | TradeState::Active => false,
            TradeState::Completed | TradeState::Expired | TradeState::Cancelled => true,
        }
    }

    pub fn can_transition_to(&self, target: TradeState) -> bool {
        matches!(
            (self, target),
            (TradeState::New, TradeState::Active)
                | (TradeState::New, TradeState::Expired)
                | (TradeState::Active, TradeState::Completed)
                | (TradeState::Active, TradeState::Expired)
                | (TradeState::Active, TradeState::Cancelled)
        )
    }
}
