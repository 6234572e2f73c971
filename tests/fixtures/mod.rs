//! Shared fixtures for integration tests
//!
//! Builds a planner over an in-memory store seeded with one school and the
//! full cast of reviewers: proponent, school head, budget officer, BAC
//! chairperson, BAC member and HOPE.

#![allow(dead_code)]

use std::sync::Arc;

use ppmp_planner::config::PlannerConfig;
use ppmp_planner::model::{
    EndUser, Lot, LotItem, NewUser, Ppmp, PpmpRow, PpmpStatus, ProjectType, RowDraft, School,
    User, UserType,
};
use ppmp_planner::workflow::WorkflowAction;
use ppmp_planner::{MemoryStore, Planner, RecordStore};

pub const FISCAL_YEAR: i32 = 2025;

pub struct PlannerFixture {
    pub planner: Planner,
    pub store: Arc<MemoryStore>,
    pub school: School,
    pub proponent: User,
    pub head: User,
    pub budget: User,
    pub bac_chair: User,
    pub bac_member: User,
    pub hope: User,
}

impl PlannerFixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let planner = Planner::new(PlannerConfig::default(), store.clone());
        Self::seed(planner, store).await
    }

    /// Seeds reference data into an already wired planner.
    pub async fn seed(planner: Planner, store: Arc<MemoryStore>) -> Self {
        let org = planner.organization();
        let school = org.create_school("Central ES", None).await.unwrap();

        let user = |name: &str, user_type: UserType, school_id: Option<i64>| NewUser {
            name: name.to_string(),
            email: format!("{}@deped.gov.ph", name.to_lowercase().replace(' ', ".")),
            user_type,
            designation: None,
            school_id,
            office_id: None,
        };

        let proponent = org
            .create_user(user("Ana Supply", UserType::SupplyOfficerSchool, Some(school.id)))
            .await
            .unwrap();
        let head = org
            .create_user(user("Ben Head", UserType::SchoolHead, Some(school.id)))
            .await
            .unwrap();
        let budget = org
            .create_user(user("Cora Budget", UserType::BudgetOfficer, None))
            .await
            .unwrap();
        let bac_chair = org
            .create_user(user("Dan Chair", UserType::BacChairperson, None))
            .await
            .unwrap();
        let bac_member = org
            .create_user(user("Eva Member", UserType::BacMember, None))
            .await
            .unwrap();
        let hope = org
            .create_user(user("Fe Hope", UserType::SchoolsDivisionSuperintendent, None))
            .await
            .unwrap();

        org.set_unit_head(EndUser::School(school.id), Some(head.id))
            .await
            .unwrap();
        let school = org
            .schools()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == school.id)
            .unwrap();

        Self {
            planner,
            store,
            school,
            proponent,
            head,
            budget,
            bac_chair,
            bac_member,
            hope,
        }
    }

    pub async fn draft(&self) -> Ppmp {
        self.planner
            .ppmps()
            .create_ppmp(FISCAL_YEAR, EndUser::School(self.school.id), self.proponent.id)
            .await
            .unwrap()
    }

    pub async fn add_row(&self, ppmp: &Ppmp) -> PpmpRow {
        self.planner
            .ppmps()
            .add_row(ppmp.id, self.proponent.id, laptop_row())
            .await
            .unwrap()
    }

    pub async fn act(&self, ppmp: &Ppmp, actor: &User, action: WorkflowAction) -> Ppmp {
        self.planner
            .transition(ppmp.id, actor.id, action, None)
            .await
            .unwrap()
            .ppmp
    }

    pub async fn act_with_remark(
        &self,
        ppmp: &Ppmp,
        actor: &User,
        action: WorkflowAction,
        remark: &str,
    ) -> Ppmp {
        self.planner
            .transition(ppmp.id, actor.id, action, Some(remark.to_string()))
            .await
            .unwrap()
            .ppmp
    }

    /// Drafts a one-row PPMP and walks it through to `submitted_to_bac`.
    pub async fn at_bac(&self) -> (Ppmp, PpmpRow) {
        let ppmp = self.draft().await;
        let row = self.add_row(&ppmp).await;
        let ppmp = self.act(&ppmp, &self.proponent, WorkflowAction::SubmitToUnitHead).await;
        let ppmp = self.act(&ppmp, &self.head, WorkflowAction::SubmitToBudget).await;
        let ppmp = self.act(&ppmp, &self.budget, WorkflowAction::SubmitToBac).await;
        assert_eq!(ppmp.status, PpmpStatus::SubmittedToBac);
        (ppmp, row)
    }

    /// Full path through BAC to HOPE approval.
    pub async fn approved(&self) -> (Ppmp, PpmpRow) {
        let (ppmp, row) = self.at_bac().await;
        let ppmp = self.act(&ppmp, &self.bac_chair, WorkflowAction::SubmitToHope).await;
        let ppmp = self.act(&ppmp, &self.hope, WorkflowAction::Approve).await;
        assert_eq!(ppmp.status, PpmpStatus::ApprovedByHope);
        (ppmp, row)
    }

    pub async fn audit_count(&self, ppmp: &Ppmp) -> usize {
        self.store.list_audit_entries(ppmp.id).await.unwrap().len()
    }
}

pub fn laptop_lot() -> Lot {
    Lot {
        name: "Lot 1".to_string(),
        items: vec![LotItem {
            description: "Laptop".to_string(),
            quantity: Some(5.0),
            unit: Some("unit".to_string()),
            estimated_cost: Some(50000.0),
        }],
    }
}

/// Two lots; the second has three items so key (1,2) exists.
pub fn laptop_row() -> RowDraft {
    let item = |description: &str, cost: f64| LotItem {
        description: description.to_string(),
        quantity: Some(1.0),
        unit: Some("piece".to_string()),
        estimated_cost: Some(cost),
    };
    RowDraft {
        general_description: "ICT equipment".to_string(),
        project_type: Some(ProjectType::Goods),
        items: vec![
            laptop_lot(),
            Lot {
                name: "Lot 2".to_string(),
                items: vec![item("Mouse", 500.0), item("Keyboard", 900.0), item("Printer", 12000.0)],
            },
        ],
        source_of_funds: Some("MOOE".to_string()),
        estimated_budget: Some(263400.0),
        ..Default::default()
    }
}
