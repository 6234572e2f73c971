// Reference data: users, schools and offices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlannerError;

pub type UserId = i64;
pub type SchoolId = i64;
pub type OfficeId = i64;

/// Staff role. Governs every permission check in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "super admin")]
    SuperAdmin,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "budget officer")]
    BudgetOfficer,
    #[serde(rename = "accounting officer")]
    AccountingOfficer,
    #[serde(rename = "procurement officer")]
    ProcurementOfficer,
    #[serde(rename = "bac chairperson")]
    BacChairperson,
    #[serde(rename = "bac vice chairperson")]
    BacViceChairperson,
    #[serde(rename = "bac secretariat")]
    BacSecretariat,
    #[serde(rename = "bac member")]
    BacMember,
    #[serde(rename = "schools division superintendent")]
    SchoolsDivisionSuperintendent,
    #[serde(rename = "supply officer - division")]
    SupplyOfficerDivision,
    #[serde(rename = "supply officer - school")]
    SupplyOfficerSchool,
    #[serde(rename = "section chief")]
    SectionChief,
    #[serde(rename = "division staff")]
    DivisionStaff,
    #[serde(rename = "school staff")]
    SchoolStaff,
    #[serde(rename = "school head")]
    SchoolHead,
}

impl UserType {
    pub const ALL: [UserType; 16] = [
        UserType::SuperAdmin,
        UserType::Admin,
        UserType::BudgetOfficer,
        UserType::AccountingOfficer,
        UserType::ProcurementOfficer,
        UserType::BacChairperson,
        UserType::BacViceChairperson,
        UserType::BacSecretariat,
        UserType::BacMember,
        UserType::SchoolsDivisionSuperintendent,
        UserType::SupplyOfficerDivision,
        UserType::SupplyOfficerSchool,
        UserType::SectionChief,
        UserType::DivisionStaff,
        UserType::SchoolStaff,
        UserType::SchoolHead,
    ];

    pub const BAC: [UserType; 4] = [
        UserType::BacChairperson,
        UserType::BacViceChairperson,
        UserType::BacMember,
        UserType::BacSecretariat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::SuperAdmin => "super admin",
            UserType::Admin => "admin",
            UserType::BudgetOfficer => "budget officer",
            UserType::AccountingOfficer => "accounting officer",
            UserType::ProcurementOfficer => "procurement officer",
            UserType::BacChairperson => "bac chairperson",
            UserType::BacViceChairperson => "bac vice chairperson",
            UserType::BacSecretariat => "bac secretariat",
            UserType::BacMember => "bac member",
            UserType::SchoolsDivisionSuperintendent => "schools division superintendent",
            UserType::SupplyOfficerDivision => "supply officer - division",
            UserType::SupplyOfficerSchool => "supply officer - school",
            UserType::SectionChief => "section chief",
            UserType::DivisionStaff => "division staff",
            UserType::SchoolStaff => "school staff",
            UserType::SchoolHead => "school head",
        }
    }

    pub fn is_bac(&self) -> bool {
        Self::BAC.contains(self)
    }

    /// Chairperson, vice chairperson and secretariat may forward a PPMP to
    /// HOPE. Plain members only sign off.
    pub fn is_bac_submitter(&self) -> bool {
        matches!(
            self,
            UserType::BacChairperson | UserType::BacViceChairperson | UserType::BacSecretariat
        )
    }

    pub fn is_bac_secretariat(&self) -> bool {
        *self == UserType::BacSecretariat
    }

    pub fn is_budget_officer(&self) -> bool {
        *self == UserType::BudgetOfficer
    }

    /// Head of Procuring Entity (the Schools Division Superintendent).
    pub fn is_hope(&self) -> bool {
        *self == UserType::SchoolsDivisionSuperintendent
    }

    pub fn is_school_user(&self) -> bool {
        matches!(
            self,
            UserType::SupplyOfficerSchool | UserType::SchoolHead | UserType::SchoolStaff
        )
    }

    pub fn is_division_user(&self) -> bool {
        matches!(
            self,
            UserType::SupplyOfficerDivision | UserType::DivisionStaff
        )
    }

    pub fn has_staff_access(&self) -> bool {
        matches!(self, UserType::Admin | UserType::SuperAdmin)
    }

    pub fn account_type(&self) -> AccountType {
        if self.is_school_user() {
            AccountType::School
        } else {
            AccountType::Office
        }
    }

    /// "super admin" -> "Super Admin"
    pub fn label(&self) -> String {
        title_case(self.as_str(), ' ')
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        UserType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| PlannerError::validation("type", format!("unknown user type '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    School,
    Office,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub designation: Option<String>,
    pub school_id: Option<SchoolId>,
    pub office_id: Option<OfficeId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn account_type(&self) -> AccountType {
        self.user_type.account_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    pub designation: Option<String>,
    pub school_id: Option<SchoolId>,
    pub office_id: Option<OfficeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub head_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    pub head_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Capitalizes each `sep`-separated word and joins them with spaces.
pub(crate) fn title_case(s: &str, sep: char) -> String {
    s.split(sep)
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_round_trips_through_strings() {
        for t in UserType::ALL {
            assert_eq!(t.as_str().parse::<UserType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_account_type_derivation() {
        assert_eq!(UserType::SchoolHead.account_type(), AccountType::School);
        assert_eq!(UserType::SupplyOfficerSchool.account_type(), AccountType::School);
        assert_eq!(UserType::DivisionStaff.account_type(), AccountType::Office);
        assert_eq!(UserType::BudgetOfficer.account_type(), AccountType::Office);
    }

    #[test]
    fn test_bac_predicates() {
        assert!(UserType::BacMember.is_bac());
        assert!(!UserType::BacMember.is_bac_submitter());
        assert!(UserType::BacSecretariat.is_bac_submitter());
        assert!(!UserType::BudgetOfficer.is_bac());
    }

    #[test]
    fn test_labels() {
        assert_eq!(UserType::SuperAdmin.label(), "Super Admin");
        assert_eq!(UserType::SupplyOfficerSchool.label(), "Supply Officer - School");
    }
}
