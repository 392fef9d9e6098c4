//! Fixtures and fake collaborators for unit and integration tests.

mod fakes;
mod params;

pub use fakes::{
    CallLog, FakeInput, FakeWindowManager, MemoryTradeStore, RecordingNotifier, RecordingSelector,
};
pub use params::SomeTestParams;
