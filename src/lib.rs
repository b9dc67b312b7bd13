//! Wellnest
//!
//! Offline-first storage and sync for wellness sessions: every write lands in
//! a local read model and a durable action queue, and the sync engine drains
//! that queue to the remote API whenever connectivity allows.

pub mod config;
pub mod db;
pub mod models;
pub mod queue;
pub mod read_model;
pub mod recorder;
pub mod sync;

pub use config::{Config, ConfigError, Environment};
pub use db::{init_db, Database, KeyKind, StoreError, StoreSpec};
pub use models::{
    ActionType, ExerciseEntry, ExerciseSession, MeditationEntry, MeditationSession, Session,
    SleepEntry, SleepSession,
};
pub use queue::{ActionQueue, DeadLetter, QueueItem};
pub use read_model::LocalReadModel;
pub use recorder::{RecordError, Recorded, Recorder};
pub use sync::{DrainReport, DrainStatus, SyncEngine, SyncError, SyncSettings};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
