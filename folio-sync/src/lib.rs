//! FOLIO Sync - Connector orchestration
//!
//! Wires the caches from `folio-cache` to a widget on one side and a remote
//! data source on the other:
//!
//! - [`SyncController`]: the synchronous state machine, driven by explicit
//!   `now` instants so it can be tested without a runtime
//! - [`RequestCoordinator`]: range planning, fetch deduplication and the
//!   parent and sub-cache request queues
//! - [`spawn_connector`]: runs a controller on a tokio task behind a
//!   cloneable [`ConnectorHandle`]
//! - [`sim`]: an in-memory remote for demos and integration tests

pub mod controller;
pub mod coordinator;
pub mod details;
pub mod driver;
pub mod error;
pub mod remote;
pub mod schedule;
pub mod sim;
pub mod telemetry;

pub use controller::{ConfirmOutcome, ConnectorEvent, DataOutcome, MessageOutcome, SyncController};
pub use coordinator::{RequestCoordinator, SubcacheRequest, Viewport};
pub use details::DetailsTracker;
pub use driver::{spawn_connector, ConnectorHandle, ConnectorSnapshot, SpawnedConnector};
pub use error::{SyncError, SyncResult};
pub use remote::RemoteDataSource;
pub use schedule::ScheduledTask;
pub use sim::{spawn_backend, InMemoryBackend};
pub use telemetry::{init_tracing, TelemetryConfig};
