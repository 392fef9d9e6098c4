mod entry;
mod registry;
mod state;

pub use entry::{DedupKey, MessageKind, ParsedTrade, TradeEntry};
pub use registry::{AddOutcome, RegistrySettings, TradeRegistry};
pub use state::TradeState;
