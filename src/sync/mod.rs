//! Background sync of queued actions to the remote API.
//!
//! The [`SyncEngine`] owns no state beyond an in-flight flag; the queue it
//! drains lives in the local database, so a drain interrupted by a crash or a
//! closed session picks up where it left off on the next trigger.

mod connectivity;
mod engine;
mod error;
mod handler;

pub use connectivity::{Connectivity, HttpProbe, StaticConnectivity};
pub use engine::{DrainReport, DrainStatus, SyncEngine, SyncFailure, SyncSettings};
pub use error::{ConfigurationError, HandlerError, SyncError};
pub use handler::{
    build_client, ActionHandler, HandlerRegistry, HttpActionHandler, IDEMPOTENCY_HEADER,
};
