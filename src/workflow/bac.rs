// BAC multi-approver gate
//
// Collecting approvals never moves the header. Forwarding to HOPE is a
// separate `submit_to_hope` transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::roles::{ActorRole, Capability};
use super::side_channel::AuditTrail;
use crate::error::{PlannerError, PlannerResult};
use crate::model::{BacApproval, NewAuditEntry, PpmpId, User, UserId, UserType, BAC_APPROVAL_ACTION};
use crate::store::{RecordStore, UserFilter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacSignoff {
    pub user_id: UserId,
    pub name: String,
    pub user_type: UserType,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Roster of active BAC users and who has signed off.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacStatus {
    pub ppmp_id: PpmpId,
    pub roster: Vec<BacSignoff>,
}

impl BacStatus {
    pub fn approved(&self) -> usize {
        self.roster.iter().filter(|s| s.approved_at.is_some()).count()
    }

    pub fn required(&self) -> usize {
        self.roster.len()
    }

    /// N-of-N. An empty roster never counts as approved.
    pub fn all_approved(&self) -> bool {
        !self.roster.is_empty() && self.approved() == self.required()
    }

    pub fn has_approved(&self, user_id: UserId) -> bool {
        self.roster
            .iter()
            .any(|s| s.user_id == user_id && s.approved_at.is_some())
    }
}

#[derive(Clone)]
pub struct BacGate {
    store: Arc<dyn RecordStore>,
    audit: AuditTrail,
}

impl BacGate {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    /// Casts `user_id`'s approval. A second cast by the same user is a
    /// conflict and writes nothing.
    pub async fn approve(&self, ppmp_id: PpmpId, user_id: UserId) -> PlannerResult<BacApproval> {
        let ppmp = self
            .store
            .get_ppmp(ppmp_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp", ppmp_id))?;
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("user", user_id))?;

        if !ActorRole::from_user(&user).has(Capability::BacMember) {
            return Err(PlannerError::unauthorized(
                BAC_APPROVAL_ACTION,
                format!("user {} ({}) is not an active BAC member", user.id, user.user_type),
            ));
        }
        if !ppmp.status.is_with_bac() {
            return Err(PlannerError::invalid_transition("cast a BAC approval", ppmp.status));
        }

        let approval = self.store.insert_bac_approval(ppmp_id, user_id).await?;
        info!(ppmp.id = ppmp_id, user.id = user_id, "BAC approval recorded");

        self.audit
            .record(NewAuditEntry {
                ppmp_id,
                user_id,
                action: BAC_APPROVAL_ACTION.to_string(),
                from_status: ppmp.status,
                to_status: ppmp.status,
                remarks: Some("BAC member approved".to_string()),
            })
            .await;

        Ok(approval)
    }

    pub async fn status(&self, ppmp_id: PpmpId) -> PlannerResult<BacStatus> {
        let roster: Vec<User> = self
            .store
            .list_users(&UserFilter::active(&UserType::BAC))
            .await?;
        let approvals = self.store.list_bac_approvals(ppmp_id).await?;

        let roster = roster
            .into_iter()
            .map(|user| BacSignoff {
                approved_at: approvals
                    .iter()
                    .find(|a| a.user_id == user.id)
                    .map(|a| a.approved_at),
                user_id: user.id,
                name: user.name,
                user_type: user.user_type,
            })
            .collect();

        Ok(BacStatus { ppmp_id, roster })
    }

    pub async fn all_approved(&self, ppmp_id: PpmpId) -> PlannerResult<bool> {
        Ok(self.status(ppmp_id).await?.all_approved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signoff(user_id: UserId, approved: bool) -> BacSignoff {
        BacSignoff {
            user_id,
            name: format!("BAC {user_id}"),
            user_type: UserType::BacMember,
            approved_at: approved.then(Utc::now),
        }
    }

    #[test]
    fn test_n_of_n() {
        let partial = BacStatus {
            ppmp_id: 1,
            roster: vec![signoff(1, true), signoff(2, false)],
        };
        assert_eq!(partial.approved(), 1);
        assert!(!partial.all_approved());
        assert!(partial.has_approved(1));

        let full = BacStatus {
            ppmp_id: 1,
            roster: vec![signoff(1, true), signoff(2, true)],
        };
        assert!(full.all_approved());

        let empty = BacStatus {
            ppmp_id: 1,
            roster: vec![],
        };
        assert!(!empty.all_approved());
    }
}
