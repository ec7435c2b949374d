// Device state table and eviction policy

mod entry;
mod reaper;
mod table;

pub use entry::{LivenessEntry, UpdateOutcome};
pub use reaper::run_reaper;
pub use table::{DeviceStateTable, DEFAULT_OFFLINE_THRESHOLD};
