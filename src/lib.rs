// PPMP Planner Library - Procurement Planning Workflow
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod observability;
pub mod planner;
pub mod planning;
pub mod store;
pub mod telemetry;
pub mod validation;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, PlannerConfig};
pub use database::{init_database, shutdown_database};
#[cfg(feature = "database")]
pub use database::SqliteStore;
pub use error::{ConflictKind, PlannerError, PlannerResult, StoreError};
pub use observability::{side_channel_metrics, OperationTimer, SideChannelMetrics};
pub use planner::Planner;
pub use planning::{Inbox, ListCache, Organization, PpmpService, UploadFile};
pub use store::{LocalObjectStorage, MemoryStore, ObjectStorage, Page, PageResult, RecordStore};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    AppApprovals, AppGate, BacGate, BacStatus, PpmpWorkflow, PurchaseRequests, SideChannel,
    TransitionOutcome, TransitionRequest, WorkflowAction,
};
