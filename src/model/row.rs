// PPMP rows, their lot/item structure and threaded remarks

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::org::UserId;
use super::ppmp::PpmpId;
use crate::error::PlannerError;

pub type RowId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Goods,
    Infrastructure,
    ConsultingServices,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Goods => "goods",
            ProjectType::Infrastructure => "infrastructure",
            ProjectType::ConsultingServices => "consulting_services",
        }
    }
}

impl FromStr for ProjectType {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "goods" => Ok(ProjectType::Goods),
            "infrastructure" => Ok(ProjectType::Infrastructure),
            "consulting_services" => Ok(ProjectType::ConsultingServices),
            other => Err(PlannerError::validation(
                "project_type",
                format!("unknown project type '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcurementMode {
    #[serde(rename = "competitive bidding")]
    CompetitiveBidding,
    #[serde(rename = "negotiated procurement")]
    NegotiatedProcurement,
    #[serde(rename = "small value procurement")]
    SmallValueProcurement,
    #[serde(rename = "direct contracting")]
    DirectContracting,
    #[serde(rename = "repeat order")]
    RepeatOrder,
    #[serde(rename = "agency to agency")]
    AgencyToAgency,
    #[serde(rename = "others")]
    Others,
}

impl ProcurementMode {
    pub const ALL: [ProcurementMode; 7] = [
        ProcurementMode::CompetitiveBidding,
        ProcurementMode::NegotiatedProcurement,
        ProcurementMode::SmallValueProcurement,
        ProcurementMode::DirectContracting,
        ProcurementMode::RepeatOrder,
        ProcurementMode::AgencyToAgency,
        ProcurementMode::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcurementMode::CompetitiveBidding => "competitive bidding",
            ProcurementMode::NegotiatedProcurement => "negotiated procurement",
            ProcurementMode::SmallValueProcurement => "small value procurement",
            ProcurementMode::DirectContracting => "direct contracting",
            ProcurementMode::RepeatOrder => "repeat order",
            ProcurementMode::AgencyToAgency => "agency to agency",
            ProcurementMode::Others => "others",
        }
    }
}

impl FromStr for ProcurementMode {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace(['_', '-'], " ");
        ProcurementMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == needle)
            .ok_or_else(|| {
                PlannerError::validation("procurement_mode", format!("unknown procurement mode '{s}'"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub name: String,
    #[serde(default)]
    pub items: Vec<LotItem>,
}

/// Positional reference to one item inside a row's lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub lot_index: usize,
    pub item_index: usize,
}

impl ItemKey {
    pub fn new(lot_index: usize, item_index: usize) -> Self {
        Self {
            lot_index,
            item_index,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lot_index, self.item_index)
    }
}

impl FromStr for ItemKey {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlannerError::validation("item", format!("expected 'lot-item', got '{s}'"));
        let (lot, item) = s.trim().split_once('-').ok_or_else(invalid)?;
        Ok(ItemKey {
            lot_index: lot.parse().map_err(|_| invalid())?,
            item_index: item.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// Empty when the upload failed.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    #[default]
    Pending,
    Approved,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Pending => "pending",
            AppStatus::Approved => "approved",
        }
    }
}

impl FromStr for AppStatus {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(AppStatus::Pending),
            "approved" => Ok(AppStatus::Approved),
            other => Err(PlannerError::validation(
                "app_status",
                format!("unknown APP status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpmpRow {
    pub id: RowId,
    pub ppmp_id: PpmpId,
    pub general_description: String,
    pub project_type: ProjectType,
    #[serde(default)]
    pub items: Vec<Lot>,
    pub procurement_mode: Option<ProcurementMode>,
    #[serde(default)]
    pub pre_procurement_conference: bool,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_end_date: Option<NaiveDate>,
    pub delivery_period: Option<NaiveDate>,
    pub source_of_funds: Option<String>,
    pub estimated_budget: Option<f64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub remarks: Vec<String>,
    #[serde(default)]
    pub app_status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PpmpRow {
    pub fn item(&self, key: ItemKey) -> Option<&LotItem> {
        self.items
            .get(key.lot_index)
            .and_then(|lot| lot.items.get(key.item_index))
    }

    /// Every item key in lot order.
    pub fn item_keys(&self) -> Vec<ItemKey> {
        self.items
            .iter()
            .enumerate()
            .flat_map(|(l, lot)| (0..lot.items.len()).map(move |i| ItemKey::new(l, i)))
            .collect()
    }
}

/// Editable fields of a row, used for both insert and update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowDraft {
    pub general_description: String,
    pub project_type: Option<ProjectType>,
    #[serde(default)]
    pub items: Vec<Lot>,
    pub procurement_mode: Option<ProcurementMode>,
    #[serde(default)]
    pub pre_procurement_conference: bool,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_end_date: Option<NaiveDate>,
    pub delivery_period: Option<NaiveDate>,
    pub source_of_funds: Option<String>,
    pub estimated_budget: Option<f64>,
    #[serde(default)]
    pub remarks: Vec<String>,
}

/// A row that passed validation and is ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFields {
    pub general_description: String,
    pub project_type: ProjectType,
    pub items: Vec<Lot>,
    pub procurement_mode: Option<ProcurementMode>,
    pub pre_procurement_conference: bool,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_end_date: Option<NaiveDate>,
    pub delivery_period: Option<NaiveDate>,
    pub source_of_funds: Option<String>,
    pub estimated_budget: Option<f64>,
    pub remarks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRemark {
    pub id: i64,
    pub ppmp_row_id: RowId,
    pub text: String,
    pub role: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRowRemark {
    pub ppmp_row_id: RowId,
    pub text: String,
    pub role: String,
    pub created_by: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(items: Vec<Lot>) -> PpmpRow {
        let now = Utc::now();
        PpmpRow {
            id: 1,
            ppmp_id: 1,
            general_description: "ICT equipment".to_string(),
            project_type: ProjectType::Goods,
            items,
            procurement_mode: None,
            pre_procurement_conference: false,
            procurement_start_date: None,
            procurement_end_date: None,
            delivery_period: None,
            source_of_funds: None,
            estimated_budget: None,
            attachments: vec![],
            remarks: vec![],
            app_status: AppStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(description: &str) -> LotItem {
        LotItem {
            description: description.to_string(),
            quantity: Some(1.0),
            unit: Some("unit".to_string()),
            estimated_cost: Some(10.0),
        }
    }

    #[test]
    fn test_item_key_parsing() {
        assert_eq!("1-2".parse::<ItemKey>().unwrap(), ItemKey::new(1, 2));
        assert_eq!(ItemKey::new(0, 3).to_string(), "0-3");
        assert!("12".parse::<ItemKey>().is_err());
        assert!("a-1".parse::<ItemKey>().is_err());
    }

    #[test]
    fn test_item_keys_follow_lot_order() {
        let row = row_with(vec![
            Lot {
                name: "Lot 1".into(),
                items: vec![item("Laptop"), item("Mouse")],
            },
            Lot {
                name: "Lot 2".into(),
                items: vec![item("Printer")],
            },
        ]);
        assert_eq!(
            row.item_keys(),
            vec![ItemKey::new(0, 0), ItemKey::new(0, 1), ItemKey::new(1, 0)]
        );
        assert_eq!(row.item(ItemKey::new(1, 0)).unwrap().description, "Printer");
        assert!(row.item(ItemKey::new(1, 1)).is_none());
    }

    #[test]
    fn test_procurement_mode_accepts_loose_spelling() {
        assert_eq!(
            "small_value_procurement".parse::<ProcurementMode>().unwrap(),
            ProcurementMode::SmallValueProcurement
        );
        assert_eq!(
            serde_json::to_string(&ProcurementMode::AgencyToAgency).unwrap(),
            "\"agency to agency\""
        );
    }

    #[test]
    fn test_app_status_defaults_to_pending() {
        assert_eq!(AppStatus::default(), AppStatus::Pending);
    }
}
