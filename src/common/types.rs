use uuid::Uuid;

pub type TradeId = Uuid;

// Namespace for deriving trade IDs from dedup keys. Changing it changes every ID.
pub(crate) const TRADE_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x5f, 0x0e, 0x8a, 0x21, 0x7c, 0x34, 0x4b, 0x5d, 0x9e, 0x61, 0x0b, 0x3a, 0xd2, 0x47, 0x18, 0xc9,
]);

pub const APP_NAME: &str = "poe-helper";
pub const APP_DISPLAY_NAME: &str = "POE Helper";
