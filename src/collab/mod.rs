//! Collaborators the service drives but does not own: desktop
//! notifications, the selection menu, synthetic input and trade history.

mod input;
mod notifier;
mod selector;
mod store;

pub use input::{InputAutomation, XdotoolInput};
pub use notifier::{CommandNotifier, LogNotifier, Notifier, Severity};
pub use selector::{RofiSelector, TradeSelector};
pub use store::{JsonLinesTradeStore, TradeStore};
