/// Record store and object storage contracts
///
/// Every planning operation talks to persistence through [`RecordStore`], a
/// typed version of the select/insert/update/delete/upsert surface of the
/// hosted database. Adapters map unique-key and foreign-key violations to
/// [`PlannerError::Conflict`] and [`PlannerError::Referential`] so callers
/// never inspect backend error codes.
///
/// Two adapters ship with the crate: [`MemoryStore`] (tests and the CLI's
/// JSON snapshot) and `database::SqliteStore` behind the `database` feature.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::error::PlannerResult;
use crate::model::{
    AppApproval, AppStatus, Attachment, AuditLogEntry, BacApproval, EndUser, EndUserType,
    NewAuditEntry, NewNotification, NewPpmp, NewPurchaseRequest, NewPurchaseRequestItem,
    NewRowRemark, NewUser, Notification, Office, OfficeId, Ppmp, PpmpId, PpmpRow, PpmpStatus,
    PurchaseRequest, PurchaseRequestItem, RowFields, RowId, RowRemark, School, SchoolId,
    StatusUpdate, User, UserId, UserType,
};

pub mod memory;
pub mod storage;

pub use memory::MemoryStore;
pub use storage::{LocalObjectStorage, ObjectStorage};

#[cfg(any(test, feature = "testing"))]
pub use storage::MockObjectStorage;

/// Offset/limit window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// 1-based page number, as shown in list views.
    pub fn number(page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        Self {
            offset: page.saturating_sub(1) * per_page,
            limit: per_page,
        }
    }

    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }

    pub(crate) fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::number(1, 10)
    }
}

/// A page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> PageResult<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PpmpFilter {
    pub fiscal_year: Option<i32>,
    /// Empty matches every status.
    #[serde(default)]
    pub statuses: Vec<PpmpStatus>,
    /// `None` matches every end user; `Some(vec![])` matches nothing.
    pub end_users: Option<Vec<EndUser>>,
    pub created_by: Option<UserId>,
}

impl PpmpFilter {
    pub fn matches(&self, ppmp: &Ppmp) -> bool {
        self.fiscal_year.map_or(true, |fy| ppmp.fiscal_year == fy)
            && (self.statuses.is_empty() || self.statuses.contains(&ppmp.status))
            && self
                .end_users
                .as_ref()
                .map_or(true, |set| set.contains(&ppmp.end_user))
            && self.created_by.map_or(true, |id| ppmp.created_by == Some(id))
    }
}

/// Filter over rows joined with their owning PPMP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub fiscal_year: Option<i32>,
    pub ppmp_status: Option<PpmpStatus>,
    pub end_user_type: Option<EndUserType>,
    /// Case-insensitive match on description or source of funds.
    pub keyword: Option<String>,
    pub app_status: Option<AppStatus>,
}

impl RowFilter {
    pub fn matches(&self, row: &PpmpRow, ppmp: &Ppmp) -> bool {
        let keyword_matches = match self.keyword.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(keyword) => {
                let needle = keyword.to_lowercase();
                row.general_description.to_lowercase().contains(&needle)
                    || row
                        .source_of_funds
                        .as_deref()
                        .is_some_and(|funds| funds.to_lowercase().contains(&needle))
            }
        };
        self.fiscal_year.map_or(true, |fy| ppmp.fiscal_year == fy)
            && self.ppmp_status.map_or(true, |status| ppmp.status == status)
            && self
                .end_user_type
                .map_or(true, |kind| ppmp.end_user.kind() == kind)
            && self.app_status.map_or(true, |status| row.app_status == status)
            && keyword_matches
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    /// Empty matches every type.
    #[serde(default)]
    pub user_types: Vec<UserType>,
    pub active_only: bool,
}

impl UserFilter {
    pub fn active(user_types: &[UserType]) -> Self {
        Self {
            user_types: user_types.to_vec(),
            active_only: true,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        (self.user_types.is_empty() || self.user_types.contains(&user.user_type))
            && (!self.active_only || user.is_active)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestFilter {
    pub created_by: Option<UserId>,
    pub ppmp_row_id: Option<RowId>,
}

impl PurchaseRequestFilter {
    pub fn matches(&self, pr: &PurchaseRequest) -> bool {
        self.created_by.map_or(true, |id| pr.created_by == id)
            && self.ppmp_row_id.map_or(true, |id| pr.ppmp_row_id == id)
    }
}

/// Typed record store contract.
///
/// Lookups return `Ok(None)` for missing records; mutations of missing records
/// fail with `PlannerError::NotFound`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Reference data
    async fn insert_school(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<School>;
    async fn get_school(&self, id: SchoolId) -> PlannerResult<Option<School>>;
    async fn list_schools(&self) -> PlannerResult<Vec<School>>;
    async fn set_school_head(&self, id: SchoolId, head_user_id: Option<UserId>) -> PlannerResult<School>;
    async fn delete_school(&self, id: SchoolId) -> PlannerResult<()>;

    async fn insert_office(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<Office>;
    async fn get_office(&self, id: OfficeId) -> PlannerResult<Option<Office>>;
    async fn list_offices(&self) -> PlannerResult<Vec<Office>>;
    async fn set_office_head(&self, id: OfficeId, head_user_id: Option<UserId>) -> PlannerResult<Office>;
    async fn delete_office(&self, id: OfficeId) -> PlannerResult<()>;

    async fn insert_user(&self, user: NewUser) -> PlannerResult<User>;
    async fn get_user(&self, id: UserId) -> PlannerResult<Option<User>>;
    async fn list_users(&self, filter: &UserFilter) -> PlannerResult<Vec<User>>;
    async fn set_user_active(&self, id: UserId, is_active: bool) -> PlannerResult<User>;
    async fn delete_user(&self, id: UserId) -> PlannerResult<()>;

    // PPMP headers
    async fn insert_ppmp(&self, ppmp: NewPpmp) -> PlannerResult<Ppmp>;
    async fn get_ppmp(&self, id: PpmpId) -> PlannerResult<Option<Ppmp>>;
    async fn list_ppmps(&self, filter: &PpmpFilter, page: Page) -> PlannerResult<PageResult<Ppmp>>;
    /// Compare-and-set on `version`; a mismatch is `ConflictKind::StaleWrite`.
    async fn update_ppmp_status(&self, update: StatusUpdate) -> PlannerResult<Ppmp>;
    /// Rows and their threaded remarks go with the header; audit entries and
    /// BAC approvals block the delete.
    async fn delete_ppmp(&self, id: PpmpId) -> PlannerResult<()>;

    // Rows
    async fn insert_row(&self, ppmp_id: PpmpId, fields: RowFields) -> PlannerResult<PpmpRow>;
    async fn get_row(&self, id: RowId) -> PlannerResult<Option<PpmpRow>>;
    async fn list_rows(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<PpmpRow>>;
    async fn count_rows(&self, ppmp_id: PpmpId) -> PlannerResult<usize>;
    async fn update_row(&self, id: RowId, fields: RowFields) -> PlannerResult<PpmpRow>;
    async fn set_row_attachments(&self, id: RowId, attachments: Vec<Attachment>) -> PlannerResult<PpmpRow>;
    async fn set_row_app_status(&self, id: RowId, status: AppStatus) -> PlannerResult<PpmpRow>;
    /// Fails with `Referential` while purchase request items point at the row.
    async fn delete_row(&self, id: RowId) -> PlannerResult<()>;
    /// Rows joined with their PPMP, newest PPMP first then row order.
    async fn list_app_rows(&self, filter: &RowFilter, page: Page) -> PlannerResult<PageResult<PpmpRow>>;

    async fn insert_row_remark(&self, remark: NewRowRemark) -> PlannerResult<RowRemark>;
    async fn list_row_remarks(&self, row_id: RowId) -> PlannerResult<Vec<RowRemark>>;

    // BAC gate
    /// Unique on (ppmp_id, user_id); a repeat is `ConflictKind::AlreadyApproved`.
    async fn insert_bac_approval(&self, ppmp_id: PpmpId, user_id: UserId) -> PlannerResult<BacApproval>;
    async fn list_bac_approvals(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<BacApproval>>;

    // Audit log
    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> PlannerResult<AuditLogEntry>;
    async fn list_audit_entries(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<AuditLogEntry>>;

    // APP singleton per fiscal year
    async fn get_app_approval(&self, fiscal_year: i32) -> PlannerResult<Option<AppApproval>>;
    async fn upsert_app_approval(
        &self,
        fiscal_year: i32,
        approved_by: UserId,
        approved_at: DateTime<Utc>,
    ) -> PlannerResult<AppApproval>;

    // Purchase requests
    async fn insert_purchase_request(&self, pr: NewPurchaseRequest) -> PlannerResult<PurchaseRequest>;
    async fn insert_purchase_request_items(
        &self,
        items: Vec<NewPurchaseRequestItem>,
    ) -> PlannerResult<Vec<PurchaseRequestItem>>;
    async fn list_purchase_requests(&self, filter: &PurchaseRequestFilter) -> PlannerResult<Vec<PurchaseRequest>>;
    async fn list_purchase_request_items(&self, row_id: RowId) -> PlannerResult<Vec<PurchaseRequestItem>>;

    // Notifications
    async fn insert_notification(&self, notification: NewNotification) -> PlannerResult<Notification>;
    async fn list_notifications(&self, user_id: UserId, unread_only: bool) -> PlannerResult<Vec<Notification>>;
    async fn mark_notification_read(
        &self,
        id: i64,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> PlannerResult<Notification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_numbering() {
        assert_eq!(Page::number(1, 10), Page { offset: 0, limit: 10 });
        assert_eq!(Page::number(3, 10), Page { offset: 20, limit: 10 });
        assert_eq!(Page::number(0, 0), Page { offset: 0, limit: 1 });
        assert_eq!(Page::number(2, 2).slice(&[1, 2, 3, 4, 5]), vec![3, 4]);
    }

    #[test]
    fn test_user_filter() {
        let now = Utc::now();
        let user = User {
            id: 1,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            user_type: UserType::BudgetOfficer,
            designation: None,
            school_id: None,
            office_id: Some(1),
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        assert!(UserFilter::default().matches(&user));
        assert!(!UserFilter::active(&[UserType::BudgetOfficer]).matches(&user));
        assert!(!UserFilter {
            user_types: vec![UserType::BacMember],
            active_only: false
        }
        .matches(&user));
    }
}
