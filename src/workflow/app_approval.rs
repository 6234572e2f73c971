// Per-row APP approval and the annual APP gate

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::roles::{ActorRole, Capability};
use crate::error::{ConflictKind, PlannerError, PlannerResult};
use crate::model::{AppApproval, AppStatus, PpmpRow, PpmpStatus, RowId, User, UserId};
use crate::store::{Page, PageResult, RecordStore, RowFilter};

/// Whether the year's APP may be approved right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppGate {
    pub fiscal_year: i32,
    pub total_rows: usize,
    pub pending_rows: usize,
    pub approved_at: Option<DateTime<Utc>>,
}

impl AppGate {
    pub fn is_enabled(&self) -> bool {
        self.total_rows > 0 && self.pending_rows == 0 && self.approved_at.is_none()
    }

    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

#[derive(Clone)]
pub struct AppApprovals {
    store: Arc<dyn RecordStore>,
}

impl AppApprovals {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn approve_row(&self, row_id: RowId, actor_id: UserId) -> PlannerResult<PpmpRow> {
        self.set_row_status(row_id, actor_id, AppStatus::Approved).await
    }

    pub async fn mark_row_pending(&self, row_id: RowId, actor_id: UserId) -> PlannerResult<PpmpRow> {
        self.set_row_status(row_id, actor_id, AppStatus::Pending).await
    }

    async fn set_row_status(
        &self,
        row_id: RowId,
        actor_id: UserId,
        target: AppStatus,
    ) -> PlannerResult<PpmpRow> {
        let action = match target {
            AppStatus::Approved => "approve row",
            AppStatus::Pending => "mark row pending",
        };
        let row = self
            .store
            .get_row(row_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp row", row_id))?;
        let ppmp = self
            .store
            .get_ppmp(row.ppmp_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp", row.ppmp_id))?;
        let actor = self.load_user(actor_id).await?;

        if !ActorRole::from_user(&actor).can_review_rows() {
            return Err(PlannerError::unauthorized(
                action,
                format!("user {} ({}) is neither BAC nor HOPE", actor.id, actor.user_type),
            ));
        }
        if ppmp.status != PpmpStatus::ApprovedByHope {
            return Err(PlannerError::invalid_transition(action, ppmp.status));
        }
        if row.app_status == target {
            return Err(PlannerError::invalid_transition(action, format!("row {}", target.as_str())));
        }
        if target == AppStatus::Pending && self.approval(ppmp.fiscal_year).await?.is_some() {
            return Err(PlannerError::Conflict(ConflictKind::AppAlreadyApproved {
                fiscal_year: ppmp.fiscal_year,
            }));
        }

        let updated = self.store.set_row_app_status(row_id, target).await?;
        info!(
            row.id = row_id,
            ppmp.id = ppmp.id,
            app_status = target.as_str(),
            actor.id = actor_id,
            "Row APP status changed"
        );
        Ok(updated)
    }

    /// Rows of every HOPE-approved PPMP in the year and the APP record.
    pub async fn gate(&self, fiscal_year: i32) -> PlannerResult<AppGate> {
        let base = RowFilter {
            fiscal_year: Some(fiscal_year),
            ppmp_status: Some(PpmpStatus::ApprovedByHope),
            ..Default::default()
        };
        let probe = Page { offset: 0, limit: 0 };
        let total_rows = self.store.list_app_rows(&base, probe).await?.total;
        let pending = RowFilter {
            app_status: Some(AppStatus::Pending),
            ..base
        };
        let pending_rows = self.store.list_app_rows(&pending, probe).await?.total;
        let approved_at = self
            .approval(fiscal_year)
            .await?
            .and_then(|approval| approval.approved_at);

        Ok(AppGate {
            fiscal_year,
            total_rows,
            pending_rows,
            approved_at,
        })
    }

    /// Finalizes the year's APP. HOPE only, and only while the gate is open.
    pub async fn approve_app(&self, fiscal_year: i32, actor_id: UserId) -> PlannerResult<AppApproval> {
        let actor = self.load_user(actor_id).await?;
        if !ActorRole::from_user(&actor).has(Capability::Hope) {
            return Err(PlannerError::unauthorized(
                "approve the APP",
                format!("user {} ({}) is not HOPE", actor.id, actor.user_type),
            ));
        }

        let gate = self.gate(fiscal_year).await?;
        if gate.is_approved() {
            return Err(PlannerError::Conflict(ConflictKind::AppAlreadyApproved { fiscal_year }));
        }
        if gate.total_rows == 0 {
            return Err(PlannerError::validation(
                "fiscal_year",
                format!("FY{fiscal_year} has no HOPE-approved rows to approve"),
            ));
        }
        if gate.pending_rows > 0 {
            return Err(PlannerError::validation(
                "app_status",
                format!("{} of {} rows are still pending", gate.pending_rows, gate.total_rows),
            ));
        }

        let approval = self
            .store
            .upsert_app_approval(fiscal_year, actor_id, Utc::now())
            .await?;
        info!(fiscal_year, actor.id = actor_id, rows = gate.total_rows, "APP approved");
        Ok(approval)
    }

    pub async fn approval(&self, fiscal_year: i32) -> PlannerResult<Option<AppApproval>> {
        Ok(self
            .store
            .get_app_approval(fiscal_year)
            .await?
            .filter(|approval| approval.approved_at.is_some()))
    }

    /// APP listing: rows of HOPE-approved PPMPs matching `filter`.
    pub async fn list_rows(&self, filter: &RowFilter, page: Page) -> PlannerResult<PageResult<PpmpRow>> {
        let filter = RowFilter {
            ppmp_status: Some(PpmpStatus::ApprovedByHope),
            ..filter.clone()
        };
        self.store.list_app_rows(&filter, page).await
    }

    async fn load_user(&self, user_id: UserId) -> PlannerResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("user", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_conditions() {
        let open = AppGate {
            fiscal_year: 2025,
            total_rows: 3,
            pending_rows: 0,
            approved_at: None,
        };
        assert!(open.is_enabled());
        assert!(!AppGate { total_rows: 0, ..open.clone() }.is_enabled());
        assert!(!AppGate { pending_rows: 1, ..open.clone() }.is_enabled());
        assert!(!AppGate {
            approved_at: Some(Utc::now()),
            ..open
        }
        .is_enabled());
    }
}
