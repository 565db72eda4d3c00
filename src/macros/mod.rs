// src/macros/mod.rs - Macro model, persistence, recording and playback
pub mod model;
pub mod player;
pub mod recorder;
pub mod storage;
pub mod store;

pub use model::{Frame, InvalidFormat, Macro, parse_macros, serialize_macros};
pub use player::{PlaybackHandle, PlaybackMode, PlaybackReport, PlaybackSettings, Player, PlayerError, SpeedWarning};
pub use recorder::{Recorder, RecorderError, RecordingStatus, StopOutcome};
pub use storage::{FileStorage, MacroStorage, MemoryStorage, StorageError};
pub use store::{MacroStore, MacroSummary, StoreError};
