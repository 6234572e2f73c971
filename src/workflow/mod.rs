//! Approval workflow: the PPMP header state machine, the per-row APP
//! sub-machine, the BAC sign-off gate, purchase request spin-off and the
//! audit/notification side channel.

pub mod app_approval;
pub mod bac;
pub mod engine;
pub mod purchase_request;
pub mod roles;
pub mod side_channel;
pub mod transitions;

pub use app_approval::{AppApprovals, AppGate};
pub use bac::{BacGate, BacSignoff, BacStatus};
pub use engine::{PpmpWorkflow, TransitionOutcome, TransitionRequest};
pub use purchase_request::{CreatedPurchaseRequest, PurchaseRequests};
pub use roles::{resolve_unit_head, ActorRole, Capability};
pub use side_channel::{AuditTrail, Notifier, SideChannel, StoreSideChannel};
pub use transitions::{Recipients, TransitionRule, WorkflowAction, TRANSITIONS};
