pub mod engine;
pub mod keys;
pub mod pitch;
pub mod sample;
pub mod voice;

pub use engine::{EngineCommand, EngineError, EngineHandle, EngineUpdate, spawn_engine};
pub use keys::{KeyEffect, KeyEvent, KeyTracker};
pub use pitch::{BASE_FREQUENCY, Note};
pub use sample::{BaseSample, SampleCell};
pub use voice::Voice;
