// PPMP header record and its status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::org::{title_case, OfficeId, SchoolId, UserId};
use crate::error::PlannerError;

pub type PpmpId = i64;

/// Header status. `ApprovedByHope` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpmpStatus {
    Draft,
    Submitted,
    SubmittedToBudget,
    SubmittedToBac,
    SubmittedToHope,
    ApprovedByHope,
    Returned,
    ReturnedToUnitHead,
    ReturnedToBudget,
    ReturnedToBac,
}

impl PpmpStatus {
    pub const ALL: [PpmpStatus; 10] = [
        PpmpStatus::Draft,
        PpmpStatus::Submitted,
        PpmpStatus::SubmittedToBudget,
        PpmpStatus::SubmittedToBac,
        PpmpStatus::SubmittedToHope,
        PpmpStatus::ApprovedByHope,
        PpmpStatus::Returned,
        PpmpStatus::ReturnedToUnitHead,
        PpmpStatus::ReturnedToBudget,
        PpmpStatus::ReturnedToBac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PpmpStatus::Draft => "draft",
            PpmpStatus::Submitted => "submitted",
            PpmpStatus::SubmittedToBudget => "submitted_to_budget",
            PpmpStatus::SubmittedToBac => "submitted_to_bac",
            PpmpStatus::SubmittedToHope => "submitted_to_hope",
            PpmpStatus::ApprovedByHope => "approved_by_hope",
            PpmpStatus::Returned => "returned",
            PpmpStatus::ReturnedToUnitHead => "returned_to_unit_head",
            PpmpStatus::ReturnedToBudget => "returned_to_budget",
            PpmpStatus::ReturnedToBac => "returned_to_bac",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == PpmpStatus::ApprovedByHope
    }

    pub fn is_with_bac(&self) -> bool {
        matches!(self, PpmpStatus::SubmittedToBac | PpmpStatus::ReturnedToBac)
    }

    /// "submitted_to_bac" -> "Submitted To Bac"
    pub fn label(&self) -> String {
        title_case(self.as_str(), '_')
    }
}

impl fmt::Display for PpmpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PpmpStatus {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PpmpStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| PlannerError::validation("status", format!("unknown PPMP status '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndUserType {
    School,
    Office,
}

impl EndUserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndUserType::School => "school",
            EndUserType::Office => "office",
        }
    }
}

impl FromStr for EndUserType {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "school" => Ok(EndUserType::School),
            "office" => Ok(EndUserType::Office),
            other => Err(PlannerError::validation(
                "end_user_type",
                format!("expected 'school' or 'office', got '{other}'"),
            )),
        }
    }
}

/// The school or office that owns a PPMP. Exactly one of the two ids is set
/// in the persisted columns; this type makes any other combination
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EndUserColumns", into = "EndUserColumns")]
pub enum EndUser {
    School(SchoolId),
    Office(OfficeId),
}

impl EndUser {
    pub fn kind(&self) -> EndUserType {
        match self {
            EndUser::School(_) => EndUserType::School,
            EndUser::Office(_) => EndUserType::Office,
        }
    }

    pub fn school_id(&self) -> Option<SchoolId> {
        match self {
            EndUser::School(id) => Some(*id),
            EndUser::Office(_) => None,
        }
    }

    pub fn office_id(&self) -> Option<OfficeId> {
        match self {
            EndUser::Office(id) => Some(*id),
            EndUser::School(_) => None,
        }
    }

    pub fn from_columns(
        end_user_type: EndUserType,
        school_id: Option<SchoolId>,
        office_id: Option<OfficeId>,
    ) -> Result<Self, PlannerError> {
        match (end_user_type, school_id, office_id) {
            (EndUserType::School, Some(id), None) => Ok(EndUser::School(id)),
            (EndUserType::Office, None, Some(id)) => Ok(EndUser::Office(id)),
            (EndUserType::School, None, _) => {
                Err(PlannerError::validation("school_id", "School is required"))
            }
            (EndUserType::Office, _, None) => {
                Err(PlannerError::validation("office_id", "Office is required"))
            }
            _ => Err(PlannerError::validation(
                "end_user_type",
                "school_id and office_id are mutually exclusive",
            )),
        }
    }
}

impl fmt::Display for EndUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndUser::School(id) => write!(f, "school #{id}"),
            EndUser::Office(id) => write!(f, "office #{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndUserColumns {
    end_user_type: EndUserType,
    #[serde(default)]
    school_id: Option<SchoolId>,
    #[serde(default)]
    office_id: Option<OfficeId>,
}

impl TryFrom<EndUserColumns> for EndUser {
    type Error = PlannerError;

    fn try_from(columns: EndUserColumns) -> Result<Self, Self::Error> {
        EndUser::from_columns(columns.end_user_type, columns.school_id, columns.office_id)
    }
}

impl From<EndUser> for EndUserColumns {
    fn from(end_user: EndUser) -> Self {
        EndUserColumns {
            end_user_type: end_user.kind(),
            school_id: end_user.school_id(),
            office_id: end_user.office_id(),
        }
    }
}

/// Category of the actor who left a header remark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemarkRole {
    UnitHead,
    BudgetOfficer,
    Bac,
    Hope,
}

impl RemarkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemarkRole::UnitHead => "unit_head",
            RemarkRole::BudgetOfficer => "budget_officer",
            RemarkRole::Bac => "bac",
            RemarkRole::Hope => "hope",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRemark {
    pub text: String,
    pub role: RemarkRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ppmp {
    pub id: PpmpId,
    pub fiscal_year: i32,
    #[serde(flatten)]
    pub end_user: EndUser,
    pub created_by: Option<UserId>,
    pub status: PpmpStatus,
    #[serde(default)]
    pub remarks: Vec<HeaderRemark>,
    /// Bumped on every status write; updates are conditional on it.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ppmp {
    pub fn is_editable(&self) -> bool {
        self.status == PpmpStatus::Draft
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPpmp {
    pub fiscal_year: i32,
    pub end_user: EndUser,
    pub created_by: UserId,
}

/// Conditional header write: applied only if the stored version still equals
/// `expected_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub ppmp_id: PpmpId,
    pub expected_version: i64,
    pub status: PpmpStatus,
    pub remarks: Option<Vec<HeaderRemark>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_end_user_serializes_as_columns() {
        let value = serde_json::to_value(EndUser::School(4)).unwrap();
        assert_eq!(
            value,
            json!({"end_user_type": "school", "school_id": 4, "office_id": null})
        );
    }

    #[test]
    fn test_end_user_rejects_both_ids() {
        let result: Result<EndUser, _> = serde_json::from_value(json!({
            "end_user_type": "school", "school_id": 1, "office_id": 2
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_ppmp_flattens_end_user() {
        let now = Utc::now();
        let ppmp = Ppmp {
            id: 1,
            fiscal_year: 2025,
            end_user: EndUser::Office(9),
            created_by: Some(3),
            status: PpmpStatus::Draft,
            remarks: vec![],
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&ppmp).unwrap();
        assert_eq!(value["end_user_type"], "office");
        assert_eq!(value["office_id"], 9);
        let back: Ppmp = serde_json::from_value(value).unwrap();
        assert_eq!(back, ppmp);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(PpmpStatus::SubmittedToBac.label(), "Submitted To Bac");
        assert_eq!("returned_to_budget".parse::<PpmpStatus>().unwrap(), PpmpStatus::ReturnedToBudget);
        assert!("unknown".parse::<PpmpStatus>().is_err());
    }
}
