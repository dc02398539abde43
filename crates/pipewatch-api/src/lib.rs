// pipewatch-api: resilient async client for the replication dashboard API (REST + push channel)

pub mod endpoints;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod token;
pub mod transport;
pub mod websocket;

pub use endpoints::ApiClient;
pub use error::{ChannelError, Error, ErrorKind, Failure, FieldError, NoResponse, classify};
pub use models::{
    Connection, ConnectionTestResult, DataPreview, EventQuery, EventType, HealthStatus,
    MonitoringMetric, Pipeline, PipelineAction, PipelineStatus, ReplicationEvent, UserProfile,
};
pub use orchestrator::{
    Backoff, Orchestrator, RequestOptions, RetryPolicy, SessionSignal, TimeoutPolicy, TimeoutTier,
};
pub use token::{MemoryTokenStore, StoredSession, TokenStore};
pub use transport::{ApiRequest, ApiResponse, Expect, Transport, TransportConfig};
pub use websocket::{ChannelConfig, ChannelState, ClientMessage, EventChannel, PushMessage};
