// PPMP transition table
//
// Each edge of the header state machine is one `TransitionRule`. The engine
// never branches on roles or statuses directly; it looks the edge up here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::roles::Capability;
use crate::error::PlannerError;
use crate::model::{NotificationKind, PpmpStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    SubmitToUnitHead,
    SubmitToBudget,
    SubmitToBac,
    SubmitToHope,
    Approve,
    Return,
    ReturnToBudget,
    ReturnToBac,
    ReturnToUnitHead,
    Revise,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 10] = [
        WorkflowAction::SubmitToUnitHead,
        WorkflowAction::SubmitToBudget,
        WorkflowAction::SubmitToBac,
        WorkflowAction::SubmitToHope,
        WorkflowAction::Approve,
        WorkflowAction::Return,
        WorkflowAction::ReturnToBudget,
        WorkflowAction::ReturnToBac,
        WorkflowAction::ReturnToUnitHead,
        WorkflowAction::Revise,
    ];

    /// Name written to the audit log.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::SubmitToUnitHead => "submit_to_unit_head",
            WorkflowAction::SubmitToBudget => "submit_to_budget",
            WorkflowAction::SubmitToBac => "submit_to_bac",
            WorkflowAction::SubmitToHope => "submit_to_hope",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Return => "return",
            WorkflowAction::ReturnToBudget => "return_to_budget",
            WorkflowAction::ReturnToBac => "return_to_bac",
            WorkflowAction::ReturnToUnitHead => "return_to_unit_head",
            WorkflowAction::Revise => "revise",
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(
            self,
            WorkflowAction::Return
                | WorkflowAction::ReturnToBudget
                | WorkflowAction::ReturnToBac
                | WorkflowAction::ReturnToUnitHead
        )
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowAction {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        WorkflowAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == needle)
            .ok_or_else(|| PlannerError::validation("action", format!("unknown workflow action '{s}'")))
    }
}

/// Who receives a notification after the transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipients {
    Nobody,
    UnitHead,
    BudgetOfficers,
    BacUsers,
    HopeUsers,
    Creator,
}

/// Precondition checked against the store before the status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    HasRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub kind: NotificationKind,
    pub title: &'static str,
    /// `{fy}` and `{end_user}` are substituted at send time.
    pub message: &'static str,
}

impl NotificationTemplate {
    pub fn render(&self, fiscal_year: i32, end_user: &str) -> String {
        self.message
            .replace("{fy}", &fiscal_year.to_string())
            .replace("{end_user}", end_user)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub action: WorkflowAction,
    pub from: &'static [PpmpStatus],
    pub to: PpmpStatus,
    pub actor: Capability,
    pub guard: Guard,
    pub requires_remark: bool,
    pub recipients: Recipients,
    pub template: Option<NotificationTemplate>,
}

impl TransitionRule {
    pub fn applies_to(&self, action: WorkflowAction, status: PpmpStatus) -> bool {
        self.action == action && self.from.contains(&status)
    }
}

use PpmpStatus::*;

const SUBMITTED_TEMPLATE: NotificationTemplate = NotificationTemplate {
    kind: NotificationKind::PpmpSubmitted,
    title: "PPMP Submitted for Review",
    message: "{end_user} FY{fy} PPMP has been submitted and requires your review.",
};

const BUDGET_REVIEW_TEMPLATE: NotificationTemplate = NotificationTemplate {
    kind: NotificationKind::PpmpSubmittedToBudget,
    title: "PPMP submitted for budget review",
    message: "PPMP for FY{fy} - {end_user} requires your budget review.",
};

const BAC_REVIEW_TEMPLATE: NotificationTemplate = NotificationTemplate {
    kind: NotificationKind::PpmpSubmittedToBac,
    title: "PPMP submitted for BAC review",
    message: "PPMP for FY{fy} - {end_user} requires BAC review and approval.",
};

const HOPE_APPROVAL_TEMPLATE: NotificationTemplate = NotificationTemplate {
    kind: NotificationKind::PpmpSubmittedToHope,
    title: "PPMP submitted for approval",
    message: "PPMP for FY{fy} - {end_user} requires your approval.",
};

/// The header state machine.
pub static TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        action: WorkflowAction::SubmitToUnitHead,
        from: &[Draft],
        to: Submitted,
        actor: Capability::Creator,
        guard: Guard::HasRows,
        requires_remark: false,
        recipients: Recipients::UnitHead,
        template: Some(SUBMITTED_TEMPLATE),
    },
    TransitionRule {
        action: WorkflowAction::SubmitToBudget,
        from: &[Submitted, ReturnedToUnitHead],
        to: SubmittedToBudget,
        actor: Capability::UnitHead,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::BudgetOfficers,
        template: Some(BUDGET_REVIEW_TEMPLATE),
    },
    TransitionRule {
        action: WorkflowAction::SubmitToBac,
        from: &[SubmittedToBudget, ReturnedToBudget],
        to: SubmittedToBac,
        actor: Capability::BudgetOfficer,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::BacUsers,
        template: Some(BAC_REVIEW_TEMPLATE),
    },
    TransitionRule {
        action: WorkflowAction::SubmitToHope,
        from: &[SubmittedToBudget, ReturnedToBudget],
        to: SubmittedToHope,
        actor: Capability::BudgetOfficer,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::HopeUsers,
        template: Some(HOPE_APPROVAL_TEMPLATE),
    },
    TransitionRule {
        action: WorkflowAction::SubmitToHope,
        from: &[SubmittedToBac, ReturnedToBac],
        to: SubmittedToHope,
        actor: Capability::BacSubmitter,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::HopeUsers,
        template: Some(HOPE_APPROVAL_TEMPLATE),
    },
    TransitionRule {
        action: WorkflowAction::Approve,
        from: &[SubmittedToHope],
        to: ApprovedByHope,
        actor: Capability::Hope,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::Creator,
        template: Some(NotificationTemplate {
            kind: NotificationKind::PpmpApproved,
            title: "PPMP approved",
            message: "PPMP FY{fy} - {end_user} has been approved by HOPE.",
        }),
    },
    TransitionRule {
        action: WorkflowAction::ReturnToBudget,
        from: &[SubmittedToHope],
        to: ReturnedToBudget,
        actor: Capability::Hope,
        guard: Guard::Always,
        requires_remark: true,
        recipients: Recipients::BudgetOfficers,
        template: Some(NotificationTemplate {
            kind: NotificationKind::PpmpReturnedToBudget,
            title: "PPMP returned to Budget",
            message: "PPMP FY{fy} - {end_user} was returned and requires your budget review.",
        }),
    },
    TransitionRule {
        action: WorkflowAction::ReturnToBac,
        from: &[SubmittedToHope],
        to: ReturnedToBac,
        actor: Capability::Hope,
        guard: Guard::Always,
        requires_remark: true,
        recipients: Recipients::BacUsers,
        template: Some(NotificationTemplate {
            kind: NotificationKind::PpmpReturnedToBac,
            title: "PPMP returned to BAC",
            message: "PPMP FY{fy} - {end_user} was returned and requires BAC review.",
        }),
    },
    TransitionRule {
        action: WorkflowAction::ReturnToUnitHead,
        from: &[SubmittedToBudget, ReturnedToBudget],
        to: ReturnedToUnitHead,
        actor: Capability::BudgetOfficer,
        guard: Guard::Always,
        requires_remark: true,
        recipients: Recipients::UnitHead,
        template: Some(NotificationTemplate {
            kind: NotificationKind::PpmpReturnedToUnitHead,
            title: "PPMP returned to you",
            message: "PPMP FY{fy} - {end_user} was returned by Budget Officer and requires your action.",
        }),
    },
    TransitionRule {
        action: WorkflowAction::Return,
        from: &[Submitted, ReturnedToUnitHead],
        to: Returned,
        actor: Capability::UnitHead,
        guard: Guard::Always,
        requires_remark: true,
        recipients: Recipients::Creator,
        template: Some(NotificationTemplate {
            kind: NotificationKind::PpmpReturned,
            title: "PPMP returned for revision",
            message: "PPMP FY{fy} - {end_user} was returned by the Unit Head and requires revision.",
        }),
    },
    TransitionRule {
        action: WorkflowAction::Return,
        from: &[SubmittedToHope],
        to: Returned,
        actor: Capability::Hope,
        guard: Guard::Always,
        requires_remark: true,
        recipients: Recipients::Nobody,
        template: None,
    },
    TransitionRule {
        action: WorkflowAction::Revise,
        from: &[Returned],
        to: Draft,
        actor: Capability::Creator,
        guard: Guard::Always,
        requires_remark: false,
        recipients: Recipients::Nobody,
        template: None,
    },
];

/// Rules for `action` out of `status`. Empty when the edge does not exist.
pub fn rules_for(action: WorkflowAction, status: PpmpStatus) -> Vec<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .filter(|rule| rule.applies_to(action, status))
        .collect()
}

/// Every edge leaving `status`, regardless of actor.
pub fn edges_from(status: PpmpStatus) -> impl Iterator<Item = &'static TransitionRule> {
    TRANSITIONS.iter().filter(move |rule| rule.from.contains(&status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_terminal_status_has_no_edges() {
        assert_eq!(edges_from(ApprovedByHope).count(), 0);
    }

    #[test]
    fn test_every_status_is_reachable() {
        let reachable: HashSet<PpmpStatus> = TRANSITIONS.iter().map(|r| r.to).collect();
        for status in PpmpStatus::ALL {
            if status != Draft {
                assert!(reachable.contains(&status), "{status} unreachable");
            }
        }
    }

    #[test]
    fn test_return_edges_require_remarks() {
        for rule in TRANSITIONS {
            assert_eq!(rule.requires_remark, rule.action.is_return(), "{}", rule.action);
        }
    }

    #[test]
    fn test_same_action_rules_never_overlap_for_one_actor() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                if a.action == b.action && a.actor == b.actor {
                    assert!(a.from.iter().all(|s| !b.from.contains(s)));
                }
            }
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "submit-to-hope".parse::<WorkflowAction>().unwrap(),
            WorkflowAction::SubmitToHope
        );
        assert!("approve_all".parse::<WorkflowAction>().is_err());
    }

    #[test]
    fn test_template_render() {
        assert_eq!(
            HOPE_APPROVAL_TEMPLATE.render(2025, "Central ES"),
            "PPMP for FY2025 - Central ES requires your approval."
        );
    }
}
