// Append-only and side-channel records: BAC approvals, audit log, APP
// approvals, purchase requests and notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::org::UserId;
use super::ppmp::{PpmpId, PpmpStatus};
use super::row::{ItemKey, RowId};
use crate::error::PlannerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacApproval {
    pub id: i64,
    pub ppmp_id: PpmpId,
    pub user_id: UserId,
    pub approved_at: DateTime<Utc>,
}

pub const BAC_APPROVAL_ACTION: &str = "bac_approval";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub ppmp_id: PpmpId,
    pub user_id: Option<UserId>,
    pub action: String,
    pub from_status: PpmpStatus,
    pub to_status: PpmpStatus,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Human readable label for the history view.
    pub fn describe(&self) -> String {
        let label = match self.action.as_str() {
            "submit_to_unit_head" => "Submitted to Unit Head".to_string(),
            "submit_to_budget" => "Submitted to Budget Officer".to_string(),
            "submit_to_bac" => "Submitted to BAC".to_string(),
            "submit_to_hope" => "Submitted to HOPE".to_string(),
            "approve" => "Approved by HOPE".to_string(),
            "return" => "Returned to proponent".to_string(),
            "return_to_budget" => "Returned to Budget Officer".to_string(),
            "return_to_bac" => "Returned to BAC".to_string(),
            "return_to_unit_head" => "Returned to Unit Head".to_string(),
            "revise" => "Revised".to_string(),
            BAC_APPROVAL_ACTION => "BAC approval".to_string(),
            other => super::org::title_case(other, '_'),
        };
        match &self.remarks {
            Some(remark) if !remark.is_empty() => format!("{label}: {remark}"),
            _ => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub ppmp_id: PpmpId,
    pub user_id: UserId,
    pub action: String,
    pub from_status: PpmpStatus,
    pub to_status: PpmpStatus,
    pub remarks: Option<String>,
}

/// Year-level APP approval. Once `approved_at` is set it is never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppApproval {
    pub fiscal_year: i32,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseRequestStatus {
    #[default]
    Draft,
    Submitted,
}

impl PurchaseRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseRequestStatus::Draft => "draft",
            PurchaseRequestStatus::Submitted => "submitted",
        }
    }
}

impl FromStr for PurchaseRequestStatus {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "draft" => Ok(PurchaseRequestStatus::Draft),
            "submitted" => Ok(PurchaseRequestStatus::Submitted),
            other => Err(PlannerError::validation(
                "status",
                format!("unknown purchase request status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: i64,
    pub ppmp_row_id: RowId,
    pub created_by: UserId,
    pub status: PurchaseRequestStatus,
    pub reference_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseRequest {
    pub ppmp_row_id: RowId,
    pub created_by: UserId,
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequestItem {
    pub id: i64,
    pub purchase_request_id: i64,
    pub ppmp_row_id: RowId,
    pub lot_index: usize,
    pub item_index: usize,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub estimated_cost: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseRequestItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.lot_index, self.item_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseRequestItem {
    pub purchase_request_id: i64,
    pub ppmp_row_id: RowId,
    pub key: ItemKey,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PpmpSubmitted,
    PpmpSubmittedToBudget,
    PpmpSubmittedToBac,
    PpmpSubmittedToHope,
    PpmpApproved,
    PpmpReturned,
    PpmpReturnedToUnitHead,
    PpmpReturnedToBudget,
    PpmpReturnedToBac,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 9] = [
        NotificationKind::PpmpSubmitted,
        NotificationKind::PpmpSubmittedToBudget,
        NotificationKind::PpmpSubmittedToBac,
        NotificationKind::PpmpSubmittedToHope,
        NotificationKind::PpmpApproved,
        NotificationKind::PpmpReturned,
        NotificationKind::PpmpReturnedToUnitHead,
        NotificationKind::PpmpReturnedToBudget,
        NotificationKind::PpmpReturnedToBac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PpmpSubmitted => "ppmp_submitted",
            NotificationKind::PpmpSubmittedToBudget => "ppmp_submitted_to_budget",
            NotificationKind::PpmpSubmittedToBac => "ppmp_submitted_to_bac",
            NotificationKind::PpmpSubmittedToHope => "ppmp_submitted_to_hope",
            NotificationKind::PpmpApproved => "ppmp_approved",
            NotificationKind::PpmpReturned => "ppmp_returned",
            NotificationKind::PpmpReturnedToUnitHead => "ppmp_returned_to_unit_head",
            NotificationKind::PpmpReturnedToBudget => "ppmp_returned_to_budget",
            NotificationKind::PpmpReturnedToBac => "ppmp_returned_to_bac",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| PlannerError::validation("type", format!("unknown notification type '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}
