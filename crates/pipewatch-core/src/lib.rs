// pipewatch-core: store synchronizer and dashboard service between pipewatch-api and consumers.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ChannelSettings, ClientConfig, ScopeRefreshPolicy, StoreSettings};
pub use dashboard::Dashboard;
pub use error::CoreError;
pub use store::DataStore;
pub use stream::{EntityStream, EntityWatchStream};

// Re-export the resource types consumers see in snapshots.
pub use pipewatch_api::{
    ChannelState, Connection, ConnectionTestResult, DataPreview, EventQuery, EventType,
    MonitoringMetric, Pipeline, PipelineAction, PipelineStatus, PushMessage, ReplicationEvent,
    SessionSignal, UserProfile,
};
