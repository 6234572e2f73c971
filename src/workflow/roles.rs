// Actor capabilities
//
// A user's standing toward one PPMP is computed once per attempt. Every
// permission question in the workflow is answered from the resulting
// capability set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::transitions::{edges_from, WorkflowAction};
use crate::error::{PlannerError, PlannerResult};
use crate::model::{EndUser, Ppmp, PpmpStatus, RemarkRole, User, UserId, UserType};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Created the PPMP (the proponent).
    Creator,
    /// Head of the PPMP's school or office.
    UnitHead,
    BudgetOfficer,
    /// Any BAC role; may cast a BAC approval.
    BacMember,
    /// BAC chairperson, vice chairperson or secretariat; may forward to HOPE.
    BacSubmitter,
    BacSecretariat,
    Hope,
}

impl Capability {
    /// Category recorded on header remarks left through this capability.
    pub fn remark_role(&self) -> Option<RemarkRole> {
        match self {
            Capability::UnitHead => Some(RemarkRole::UnitHead),
            Capability::BudgetOfficer => Some(RemarkRole::BudgetOfficer),
            Capability::BacMember | Capability::BacSubmitter | Capability::BacSecretariat => {
                Some(RemarkRole::Bac)
            }
            Capability::Hope => Some(RemarkRole::Hope),
            Capability::Creator => None,
        }
    }
}

/// What one user may do to one PPMP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRole {
    pub user_id: UserId,
    pub user_type: UserType,
    capabilities: BTreeSet<Capability>,
}

impl ActorRole {
    /// Capabilities of `user` toward `ppmp`. Inactive users get none.
    pub fn resolve(user: &User, ppmp: &Ppmp, unit_head: Option<UserId>) -> Self {
        let mut capabilities = BTreeSet::new();
        if user.is_active {
            if ppmp.created_by == Some(user.id) {
                capabilities.insert(Capability::Creator);
            }
            if unit_head == Some(user.id) {
                capabilities.insert(Capability::UnitHead);
            }
            capabilities.extend(Self::type_capabilities(user.user_type));
        }
        Self {
            user_id: user.id,
            user_type: user.user_type,
            capabilities,
        }
    }

    /// Capabilities that follow from the user type alone, for actions that
    /// are not tied to one PPMP (APP approval, row approval).
    pub fn from_user(user: &User) -> Self {
        let capabilities = if user.is_active {
            Self::type_capabilities(user.user_type).collect()
        } else {
            BTreeSet::new()
        };
        Self {
            user_id: user.id,
            user_type: user.user_type,
            capabilities,
        }
    }

    fn type_capabilities(user_type: UserType) -> impl Iterator<Item = Capability> {
        [
            (user_type.is_budget_officer(), Capability::BudgetOfficer),
            (user_type.is_bac(), Capability::BacMember),
            (user_type.is_bac_submitter(), Capability::BacSubmitter),
            (user_type.is_bac_secretariat(), Capability::BacSecretariat),
            (user_type.is_hope(), Capability::Hope),
        ]
        .into_iter()
        .filter_map(|(held, capability)| held.then_some(capability))
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Legal edges out of `status` for this actor, in table order.
    pub fn permitted_actions(&self, status: PpmpStatus) -> Vec<WorkflowAction> {
        let mut actions = Vec::new();
        for rule in edges_from(status) {
            if self.has(rule.actor) && !actions.contains(&rule.action) {
                actions.push(rule.action);
            }
        }
        actions
    }

    /// Rows are editable by the creator while the PPMP is a draft, and by the
    /// BAC secretariat while it sits with the BAC.
    pub fn can_edit_rows(&self, status: PpmpStatus) -> bool {
        (status == PpmpStatus::Draft && self.has(Capability::Creator))
            || (status.is_with_bac() && self.has(Capability::BacSecretariat))
    }

    /// BAC users and HOPE may flip a row's APP status.
    pub fn can_review_rows(&self) -> bool {
        self.has(Capability::BacMember) || self.has(Capability::Hope)
    }
}

/// The unit head of the PPMP's school or office, looked up on every call.
pub async fn resolve_unit_head(
    store: &dyn RecordStore,
    end_user: &EndUser,
) -> PlannerResult<Option<UserId>> {
    let head = match end_user {
        EndUser::School(id) => store
            .get_school(*id)
            .await?
            .ok_or_else(|| PlannerError::not_found("school", id))?
            .head_user_id,
        EndUser::Office(id) => store
            .get_office(*id)
            .await?
            .ok_or_else(|| PlannerError::not_found("office", id))?
            .head_user_id,
    };
    Ok(head)
}

/// Loads the user and the unit head, then resolves capabilities.
pub async fn load_actor(
    store: &dyn RecordStore,
    user_id: UserId,
    ppmp: &Ppmp,
) -> PlannerResult<ActorRole> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| PlannerError::not_found("user", user_id))?;
    let unit_head = resolve_unit_head(store, &ppmp.end_user).await?;
    Ok(ActorRole::resolve(&user, ppmp, unit_head))
}
