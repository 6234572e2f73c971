// Purchase request spin-off from APP-approved rows

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ConflictKind, PlannerError, PlannerResult};
use crate::model::{
    AppStatus, ItemKey, NewPurchaseRequest, NewPurchaseRequestItem, Ppmp, PpmpRow, PpmpStatus,
    PurchaseRequest, PurchaseRequestItem, RowId, UserId,
};
use crate::store::{PurchaseRequestFilter, RecordStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedPurchaseRequest {
    pub request: PurchaseRequest,
    pub items: Vec<PurchaseRequestItem>,
}

#[derive(Clone)]
pub struct PurchaseRequests {
    store: Arc<dyn RecordStore>,
}

impl PurchaseRequests {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Item keys of the row already claimed by a purchase request. Always
    /// read from the item table.
    pub async fn items_in_purchase_requests(&self, row_id: RowId) -> PlannerResult<BTreeSet<ItemKey>> {
        Ok(self
            .store
            .list_purchase_request_items(row_id)
            .await?
            .iter()
            .map(PurchaseRequestItem::key)
            .collect())
    }

    /// Keys still free to put on a new purchase request.
    pub async fn selectable_items(&self, row_id: RowId) -> PlannerResult<Vec<ItemKey>> {
        let row = self.load_row(row_id).await?;
        let taken = self.items_in_purchase_requests(row_id).await?;
        Ok(row
            .item_keys()
            .into_iter()
            .filter(|key| !taken.contains(key))
            .collect())
    }

    /// Whether `caller` may spin a purchase request off this row.
    pub async fn can_create(&self, row_id: RowId, caller: UserId) -> PlannerResult<bool> {
        match self.check_preconditions(row_id, caller).await {
            Ok(_) => Ok(true),
            Err(PlannerError::Unauthorized { .. }) | Err(PlannerError::InvalidTransition { .. }) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create(
        &self,
        row_id: RowId,
        keys: &[ItemKey],
        caller: UserId,
    ) -> PlannerResult<CreatedPurchaseRequest> {
        if keys.is_empty() {
            return Err(PlannerError::validation("items", "Select at least one item"));
        }
        let (row, ppmp) = self.check_preconditions(row_id, caller).await?;

        let selected: BTreeSet<ItemKey> = keys.iter().copied().collect();
        if let Some(unknown) = selected.iter().find(|key| row.item(**key).is_none()) {
            return Err(PlannerError::validation(
                "items",
                format!("row {} has no item {unknown}", row.id),
            ));
        }
        let taken = self.items_in_purchase_requests(row_id).await?;
        if let Some(key) = selected.iter().find(|key| taken.contains(key)) {
            return Err(PlannerError::Conflict(ConflictKind::ItemAlreadyInPurchaseRequest {
                ppmp_row_id: row.id,
                lot_index: key.lot_index,
                item_index: key.item_index,
            }));
        }

        let existing = self
            .store
            .list_purchase_requests(&PurchaseRequestFilter {
                ppmp_row_id: Some(row.id),
                ..Default::default()
            })
            .await?;
        let reference_number = format!(
            "PR-{}-{}-{:04}",
            ppmp.fiscal_year,
            row.id,
            existing.len() + 1
        );

        let request = self
            .store
            .insert_purchase_request(NewPurchaseRequest {
                ppmp_row_id: row.id,
                created_by: caller,
                reference_number: Some(reference_number),
            })
            .await?;

        let new_items: Vec<NewPurchaseRequestItem> = selected
            .iter()
            .filter_map(|key| {
                row.item(*key).map(|item| NewPurchaseRequestItem {
                    purchase_request_id: request.id,
                    ppmp_row_id: row.id,
                    key: *key,
                    description: item.description.clone(),
                    quantity: item.quantity,
                    unit: item.unit.clone(),
                    estimated_cost: item.estimated_cost,
                })
            })
            .collect();

        let items = match self.store.insert_purchase_request_items(new_items).await {
            Ok(items) => items,
            Err(e) => {
                // The request row stays behind empty; cleanup is manual.
                warn!(
                    purchase_request.id = request.id,
                    row.id = row.id,
                    error = %e,
                    "Purchase request items failed to insert, leaving an empty request"
                );
                return Err(e);
            }
        };

        info!(
            purchase_request.id = request.id,
            reference = request.reference_number.as_deref().unwrap_or_default(),
            row.id = row.id,
            items = items.len(),
            "Purchase request created"
        );
        Ok(CreatedPurchaseRequest { request, items })
    }

    pub async fn list(&self, created_by: Option<UserId>) -> PlannerResult<Vec<PurchaseRequest>> {
        self.store
            .list_purchase_requests(&PurchaseRequestFilter {
                created_by,
                ..Default::default()
            })
            .await
    }

    pub async fn items_for_row(&self, row_id: RowId) -> PlannerResult<Vec<PurchaseRequestItem>> {
        self.store.list_purchase_request_items(row_id).await
    }

    async fn check_preconditions(&self, row_id: RowId, caller: UserId) -> PlannerResult<(PpmpRow, Ppmp)> {
        const ACTION: &str = "create a purchase request";
        let row = self.load_row(row_id).await?;
        let ppmp = self
            .store
            .get_ppmp(row.ppmp_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp", row.ppmp_id))?;

        if ppmp.created_by != Some(caller) {
            return Err(PlannerError::unauthorized(
                ACTION,
                "only the PPMP creator may create purchase requests",
            ));
        }
        if ppmp.status != PpmpStatus::ApprovedByHope {
            return Err(PlannerError::invalid_transition(ACTION, ppmp.status));
        }
        if row.app_status != AppStatus::Approved {
            return Err(PlannerError::invalid_transition(ACTION, "row pending APP approval"));
        }
        let app_approved = self
            .store
            .get_app_approval(ppmp.fiscal_year)
            .await?
            .is_some_and(|approval| approval.approved_at.is_some());
        if !app_approved {
            return Err(PlannerError::invalid_transition(
                ACTION,
                format!("FY{} APP not approved", ppmp.fiscal_year),
            ));
        }
        Ok((row, ppmp))
    }

    async fn load_row(&self, row_id: RowId) -> PlannerResult<PpmpRow> {
        self.store
            .get_row(row_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp row", row_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::Ppmp;
    use crate::store::MockRecordStore;
    use chrono::Utc;

    fn approved_ppmp() -> Ppmp {
        let now = Utc::now();
        Ppmp {
            id: 1,
            fiscal_year: 2025,
            end_user: crate::model::EndUser::School(1),
            created_by: Some(7),
            status: PpmpStatus::ApprovedByHope,
            remarks: vec![],
            version: 5,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected_before_any_read() {
        let mock = MockRecordStore::new();
        let service = PurchaseRequests::new(Arc::new(mock));
        let err = service.create(1, &[], 7).await.unwrap_err();
        assert!(err.is_validation());
    }

    fn approved_row(id: RowId) -> PpmpRow {
        let now = Utc::now();
        PpmpRow {
            id,
            ppmp_id: 1,
            general_description: "Laptops".into(),
            project_type: crate::model::ProjectType::Goods,
            items: vec![crate::model::Lot {
                name: "Lot 1".into(),
                items: vec![crate::model::LotItem {
                    description: "Laptop".into(),
                    quantity: Some(5.0),
                    unit: Some("unit".into()),
                    estimated_cost: Some(50000.0),
                }],
            }],
            procurement_mode: None,
            pre_procurement_conference: false,
            procurement_start_date: None,
            procurement_end_date: None,
            delivery_period: None,
            source_of_funds: None,
            estimated_budget: None,
            attachments: vec![],
            remarks: vec![],
            app_status: AppStatus::Approved,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_non_creator_cannot_create() {
        let mut mock = MockRecordStore::new();
        mock.expect_get_row().returning(|id| Ok(Some(approved_row(id))));
        mock.expect_get_ppmp().returning(|_| Ok(Some(approved_ppmp())));
        mock.expect_insert_purchase_request().never();

        let service = PurchaseRequests::new(Arc::new(mock));
        let err = service.create(3, &[ItemKey::new(0, 0)], 99).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!service.can_create(3, 99).await.unwrap());
    }

    #[tokio::test]
    async fn test_item_insert_failure_leaves_empty_request() {
        let mut mock = MockRecordStore::new();
        mock.expect_get_row().returning(|id| Ok(Some(approved_row(id))));
        mock.expect_get_ppmp().returning(|_| Ok(Some(approved_ppmp())));
        mock.expect_get_app_approval().returning(|fiscal_year| {
            Ok(Some(crate::model::AppApproval {
                fiscal_year,
                approved_at: Some(Utc::now()),
                approved_by_user_id: Some(9),
            }))
        });
        mock.expect_list_purchase_request_items().returning(|_| Ok(vec![]));
        mock.expect_list_purchase_requests().returning(|_| Ok(vec![]));
        mock.expect_insert_purchase_request()
            .times(1)
            .withf(|pr| pr.reference_number.as_deref() == Some("PR-2025-3-0001"))
            .returning(|pr| {
                let now = Utc::now();
                Ok(PurchaseRequest {
                    id: 11,
                    ppmp_row_id: pr.ppmp_row_id,
                    created_by: pr.created_by,
                    status: Default::default(),
                    reference_number: pr.reference_number,
                    created_at: now,
                    updated_at: now,
                })
            });
        mock.expect_insert_purchase_request_items()
            .times(1)
            .withf(|items| items.len() == 1 && items[0].purchase_request_id == 11)
            .returning(|_| Err(StoreError::Unavailable("connection reset".into()).into()));

        // Any cleanup call would hit an unexpected mock method and panic
        let service = PurchaseRequests::new(Arc::new(mock));
        let err = service.create(3, &[ItemKey::new(0, 0)], 7).await.unwrap_err();
        assert!(matches!(err, PlannerError::Store(StoreError::Unavailable(_))));
    }
}
