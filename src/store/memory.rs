// In-memory record store with optional JSON snapshot persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    Page, PageResult, PpmpFilter, PurchaseRequestFilter, RecordStore, RowFilter, UserFilter,
};
use crate::error::{ConflictKind, PlannerError, PlannerResult, StoreError};
use crate::model::{
    AppApproval, AppStatus, Attachment, AuditLogEntry, BacApproval, EndUser, NewAuditEntry,
    NewNotification, NewPpmp, NewPurchaseRequest, NewPurchaseRequestItem, NewRowRemark, NewUser,
    Notification, Office, OfficeId, Ppmp, PpmpId, PpmpRow, PpmpStatus, PurchaseRequest,
    PurchaseRequestItem, PurchaseRequestStatus, RowFields, RowId, RowRemark, School, SchoolId,
    StatusUpdate, User, UserId,
};

/// Every table of the relational schema, keyed by primary key.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Tables {
    next_ids: BTreeMap<String, i64>,
    schools: BTreeMap<SchoolId, School>,
    offices: BTreeMap<OfficeId, Office>,
    users: BTreeMap<UserId, User>,
    ppmps: BTreeMap<PpmpId, Ppmp>,
    rows: BTreeMap<RowId, PpmpRow>,
    row_remarks: BTreeMap<i64, RowRemark>,
    bac_approvals: BTreeMap<i64, BacApproval>,
    audit_log: BTreeMap<i64, AuditLogEntry>,
    app_approvals: BTreeMap<i32, AppApproval>,
    purchase_requests: BTreeMap<i64, PurchaseRequest>,
    purchase_request_items: BTreeMap<i64, PurchaseRequestItem>,
    notifications: BTreeMap<i64, Notification>,
}

impl Tables {
    fn next_id(&mut self, table: &str) -> i64 {
        let id = self.next_ids.entry(table.to_string()).or_insert(0);
        *id += 1;
        *id
    }

    fn end_user_name(&self, end_user: &EndUser) -> Option<String> {
        match end_user {
            EndUser::School(id) => self.schools.get(id).map(|s| s.name.clone()),
            EndUser::Office(id) => self.offices.get(id).map(|o| o.name.clone()),
        }
    }

    fn user_is_referenced(&self, id: UserId) -> bool {
        self.ppmps.values().any(|p| p.created_by == Some(id))
            || self.schools.values().any(|s| s.head_user_id == Some(id))
            || self.offices.values().any(|o| o.head_user_id == Some(id))
            || self.bac_approvals.values().any(|a| a.user_id == id)
            || self.audit_log.values().any(|e| e.user_id == Some(id))
            || self.row_remarks.values().any(|r| r.created_by == Some(id))
            || self.purchase_requests.values().any(|pr| pr.created_by == id)
            || self
                .app_approvals
                .values()
                .any(|a| a.approved_by_user_id == Some(id))
    }

    fn row_is_referenced(&self, id: RowId) -> bool {
        self.purchase_requests.values().any(|pr| pr.ppmp_row_id == id)
            || self
                .purchase_request_items
                .values()
                .any(|item| item.ppmp_row_id == id)
    }
}

/// Exclusive hold on the `<snapshot>.lock` sidecar file.
///
/// The flock lives as long as the file handle, so dropping the store
/// releases it.
struct SnapshotLock {
    path: PathBuf,
    _file: fd_lock::RwLock<File>,
}

impl SnapshotLock {
    async fn acquire(snapshot: &Path, wait: bool) -> PlannerResult<Self> {
        let mut name = snapshot.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        tokio::task::spawn_blocking(move || -> PlannerResult<Self> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            let mut lock = fd_lock::RwLock::new(file);
            {
                let held = if wait { lock.write() } else { lock.try_write() };
                match held {
                    // Unlocking happens when the handle closes
                    Ok(guard) => std::mem::forget(guard),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        return Err(PlannerError::Conflict(ConflictKind::SnapshotLocked {
                            path: path.display().to_string(),
                        }));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            debug!(lock = %path.display(), "Acquired snapshot lock");
            Ok(Self { path, _file: lock })
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("snapshot lock task failed: {e}")))?
    }
}

impl fmt::Debug for SnapshotLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotLock").field("path", &self.path).finish()
    }
}

/// Record store backed by in-process tables.
///
/// Enforces the same unique and foreign-key constraints as the SQL schema.
/// A store opened on a snapshot path holds that snapshot exclusively until it
/// is dropped; [`MemoryStore::flush`] writes the whole state as JSON.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
    _lock: Option<SnapshotLock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for any other holder of `path` to let go, then loads it if it
    /// exists, otherwise starts empty. Later flushes write back to the same
    /// file.
    pub async fn open(path: impl AsRef<Path>) -> PlannerResult<Self> {
        Self::open_with(path.as_ref(), true).await
    }

    /// Like [`MemoryStore::open`] but fails with
    /// `ConflictKind::SnapshotLocked` instead of waiting.
    pub async fn try_open(path: impl AsRef<Path>) -> PlannerResult<Self> {
        Self::open_with(path.as_ref(), false).await
    }

    async fn open_with(path: &Path, wait: bool) -> PlannerResult<Self> {
        let path = path.to_path_buf();
        let lock = SnapshotLock::acquire(&path, wait).await?;
        let tables = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path).await?;
            let tables: Tables = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                table: "snapshot",
                reason: format!("{}: {e}", path.display()),
            })?;
            info!(path = %path.display(), ppmps = tables.ppmps.len(), "Loaded planner snapshot");
            tables
        } else {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(path),
            _lock: Some(lock),
        })
    }

    /// Writes the snapshot through a temp file so a crash never leaves a
    /// truncated file behind. No-op for stores without a snapshot path.
    pub async fn flush(&self) -> PlannerResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = {
            let tables = self.tables.read().await;
            serde_json::to_string_pretty(&*tables)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Flushed planner snapshot");
        Ok(())
    }
}

fn paginate<T: Clone>(matches: Vec<T>, page: Page) -> PageResult<T> {
    PageResult {
        total: matches.len(),
        items: page.slice(&matches),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_school(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<School> {
        let mut t = self.tables.write().await;
        if let Some(head) = head_user_id {
            if !t.users.contains_key(&head) {
                return Err(PlannerError::not_found("user", head));
            }
        }
        let now = Utc::now();
        let school = School {
            id: t.next_id("schools"),
            name: name.to_string(),
            head_user_id,
            created_at: now,
            updated_at: now,
        };
        t.schools.insert(school.id, school.clone());
        Ok(school)
    }

    async fn get_school(&self, id: SchoolId) -> PlannerResult<Option<School>> {
        Ok(self.tables.read().await.schools.get(&id).cloned())
    }

    async fn list_schools(&self) -> PlannerResult<Vec<School>> {
        let t = self.tables.read().await;
        let mut schools: Vec<School> = t.schools.values().cloned().collect();
        schools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schools)
    }

    async fn set_school_head(&self, id: SchoolId, head_user_id: Option<UserId>) -> PlannerResult<School> {
        let mut t = self.tables.write().await;
        if let Some(head) = head_user_id {
            if !t.users.contains_key(&head) {
                return Err(PlannerError::not_found("user", head));
            }
        }
        let school = t
            .schools
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("school", id))?;
        school.head_user_id = head_user_id;
        school.updated_at = Utc::now();
        Ok(school.clone())
    }

    async fn delete_school(&self, id: SchoolId) -> PlannerResult<()> {
        let mut t = self.tables.write().await;
        if !t.schools.contains_key(&id) {
            return Err(PlannerError::not_found("school", id));
        }
        let referenced = t.users.values().any(|u| u.school_id == Some(id))
            || t.ppmps.values().any(|p| p.end_user == EndUser::School(id));
        if referenced {
            return Err(PlannerError::Referential { entity: "school", id });
        }
        t.schools.remove(&id);
        Ok(())
    }

    async fn insert_office(&self, name: &str, head_user_id: Option<UserId>) -> PlannerResult<Office> {
        let mut t = self.tables.write().await;
        if let Some(head) = head_user_id {
            if !t.users.contains_key(&head) {
                return Err(PlannerError::not_found("user", head));
            }
        }
        let now = Utc::now();
        let office = Office {
            id: t.next_id("offices"),
            name: name.to_string(),
            head_user_id,
            created_at: now,
            updated_at: now,
        };
        t.offices.insert(office.id, office.clone());
        Ok(office)
    }

    async fn get_office(&self, id: OfficeId) -> PlannerResult<Option<Office>> {
        Ok(self.tables.read().await.offices.get(&id).cloned())
    }

    async fn list_offices(&self) -> PlannerResult<Vec<Office>> {
        let t = self.tables.read().await;
        let mut offices: Vec<Office> = t.offices.values().cloned().collect();
        offices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(offices)
    }

    async fn set_office_head(&self, id: OfficeId, head_user_id: Option<UserId>) -> PlannerResult<Office> {
        let mut t = self.tables.write().await;
        if let Some(head) = head_user_id {
            if !t.users.contains_key(&head) {
                return Err(PlannerError::not_found("user", head));
            }
        }
        let office = t
            .offices
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("office", id))?;
        office.head_user_id = head_user_id;
        office.updated_at = Utc::now();
        Ok(office.clone())
    }

    async fn delete_office(&self, id: OfficeId) -> PlannerResult<()> {
        let mut t = self.tables.write().await;
        if !t.offices.contains_key(&id) {
            return Err(PlannerError::not_found("office", id));
        }
        let referenced = t.users.values().any(|u| u.office_id == Some(id))
            || t.ppmps.values().any(|p| p.end_user == EndUser::Office(id));
        if referenced {
            return Err(PlannerError::Referential { entity: "office", id });
        }
        t.offices.remove(&id);
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> PlannerResult<User> {
        let mut t = self.tables.write().await;
        let email = user.email.trim().to_lowercase();
        if t.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(PlannerError::Conflict(ConflictKind::DuplicateEmail(email)));
        }
        if let Some(school_id) = user.school_id {
            if !t.schools.contains_key(&school_id) {
                return Err(PlannerError::not_found("school", school_id));
            }
        }
        if let Some(office_id) = user.office_id {
            if !t.offices.contains_key(&office_id) {
                return Err(PlannerError::not_found("office", office_id));
            }
        }
        let now = Utc::now();
        let record = User {
            id: t.next_id("users"),
            name: user.name,
            email,
            user_type: user.user_type,
            designation: user.designation,
            school_id: user.school_id,
            office_id: user.office_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: UserId) -> PlannerResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> PlannerResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().filter(|u| filter.matches(u)).cloned().collect())
    }

    async fn set_user_active(&self, id: UserId, is_active: bool) -> PlannerResult<User> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("user", id))?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> PlannerResult<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&id) {
            return Err(PlannerError::not_found("user", id));
        }
        if t.user_is_referenced(id) {
            return Err(PlannerError::Referential { entity: "user", id });
        }
        t.users.remove(&id);
        t.notifications.retain(|_, n| n.user_id != id);
        Ok(())
    }

    async fn insert_ppmp(&self, ppmp: NewPpmp) -> PlannerResult<Ppmp> {
        let mut t = self.tables.write().await;
        let end_user_name = t.end_user_name(&ppmp.end_user).ok_or_else(|| {
            PlannerError::not_found(ppmp.end_user.kind().as_str(), ppmp.end_user)
        })?;
        if !t.users.contains_key(&ppmp.created_by) {
            return Err(PlannerError::not_found("user", ppmp.created_by));
        }
        let duplicate = t
            .ppmps
            .values()
            .any(|p| p.fiscal_year == ppmp.fiscal_year && p.end_user == ppmp.end_user);
        if duplicate {
            return Err(PlannerError::Conflict(ConflictKind::DuplicatePpmp {
                fiscal_year: ppmp.fiscal_year,
                end_user: end_user_name,
            }));
        }
        let now = Utc::now();
        let record = Ppmp {
            id: t.next_id("ppmps"),
            fiscal_year: ppmp.fiscal_year,
            end_user: ppmp.end_user,
            created_by: Some(ppmp.created_by),
            status: PpmpStatus::Draft,
            remarks: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        t.ppmps.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_ppmp(&self, id: PpmpId) -> PlannerResult<Option<Ppmp>> {
        Ok(self.tables.read().await.ppmps.get(&id).cloned())
    }

    async fn list_ppmps(&self, filter: &PpmpFilter, page: Page) -> PlannerResult<PageResult<Ppmp>> {
        let t = self.tables.read().await;
        let matches: Vec<Ppmp> = t
            .ppmps
            .values()
            .rev()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        Ok(paginate(matches, page))
    }

    async fn update_ppmp_status(&self, update: StatusUpdate) -> PlannerResult<Ppmp> {
        let mut t = self.tables.write().await;
        let ppmp = t
            .ppmps
            .get_mut(&update.ppmp_id)
            .ok_or_else(|| PlannerError::not_found("ppmp", update.ppmp_id))?;
        if ppmp.version != update.expected_version {
            return Err(PlannerError::Conflict(ConflictKind::StaleWrite {
                entity: "ppmp",
                id: update.ppmp_id,
            }));
        }
        ppmp.status = update.status;
        if let Some(remarks) = update.remarks {
            ppmp.remarks = remarks;
        }
        ppmp.version += 1;
        ppmp.updated_at = Utc::now();
        Ok(ppmp.clone())
    }

    async fn delete_ppmp(&self, id: PpmpId) -> PlannerResult<()> {
        let mut t = self.tables.write().await;
        if !t.ppmps.contains_key(&id) {
            return Err(PlannerError::not_found("ppmp", id));
        }
        let row_ids: Vec<RowId> = t
            .rows
            .values()
            .filter(|r| r.ppmp_id == id)
            .map(|r| r.id)
            .collect();
        let referenced = t.audit_log.values().any(|e| e.ppmp_id == id)
            || t.bac_approvals.values().any(|a| a.ppmp_id == id)
            || row_ids.iter().any(|row_id| t.row_is_referenced(*row_id));
        if referenced {
            return Err(PlannerError::Referential { entity: "ppmp", id });
        }
        t.row_remarks.retain(|_, r| !row_ids.contains(&r.ppmp_row_id));
        t.rows.retain(|_, r| r.ppmp_id != id);
        t.ppmps.remove(&id);
        Ok(())
    }

    async fn insert_row(&self, ppmp_id: PpmpId, fields: RowFields) -> PlannerResult<PpmpRow> {
        let mut t = self.tables.write().await;
        if !t.ppmps.contains_key(&ppmp_id) {
            return Err(PlannerError::not_found("ppmp", ppmp_id));
        }
        let now = Utc::now();
        let row = PpmpRow {
            id: t.next_id("ppmp_rows"),
            ppmp_id,
            general_description: fields.general_description,
            project_type: fields.project_type,
            items: fields.items,
            procurement_mode: fields.procurement_mode,
            pre_procurement_conference: fields.pre_procurement_conference,
            procurement_start_date: fields.procurement_start_date,
            procurement_end_date: fields.procurement_end_date,
            delivery_period: fields.delivery_period,
            source_of_funds: fields.source_of_funds,
            estimated_budget: fields.estimated_budget,
            attachments: Vec::new(),
            remarks: fields.remarks,
            app_status: AppStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        t.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_row(&self, id: RowId) -> PlannerResult<Option<PpmpRow>> {
        Ok(self.tables.read().await.rows.get(&id).cloned())
    }

    async fn list_rows(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<PpmpRow>> {
        let t = self.tables.read().await;
        Ok(t.rows.values().filter(|r| r.ppmp_id == ppmp_id).cloned().collect())
    }

    async fn count_rows(&self, ppmp_id: PpmpId) -> PlannerResult<usize> {
        let t = self.tables.read().await;
        Ok(t.rows.values().filter(|r| r.ppmp_id == ppmp_id).count())
    }

    async fn update_row(&self, id: RowId, fields: RowFields) -> PlannerResult<PpmpRow> {
        let mut t = self.tables.write().await;
        let row = t
            .rows
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
        row.general_description = fields.general_description;
        row.project_type = fields.project_type;
        row.items = fields.items;
        row.procurement_mode = fields.procurement_mode;
        row.pre_procurement_conference = fields.pre_procurement_conference;
        row.procurement_start_date = fields.procurement_start_date;
        row.procurement_end_date = fields.procurement_end_date;
        row.delivery_period = fields.delivery_period;
        row.source_of_funds = fields.source_of_funds;
        row.estimated_budget = fields.estimated_budget;
        row.remarks = fields.remarks;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn set_row_attachments(&self, id: RowId, attachments: Vec<Attachment>) -> PlannerResult<PpmpRow> {
        let mut t = self.tables.write().await;
        let row = t
            .rows
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
        row.attachments = attachments;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn set_row_app_status(&self, id: RowId, status: AppStatus) -> PlannerResult<PpmpRow> {
        let mut t = self.tables.write().await;
        let row = t
            .rows
            .get_mut(&id)
            .ok_or_else(|| PlannerError::not_found("ppmp row", id))?;
        row.app_status = status;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete_row(&self, id: RowId) -> PlannerResult<()> {
        let mut t = self.tables.write().await;
        if !t.rows.contains_key(&id) {
            return Err(PlannerError::not_found("ppmp row", id));
        }
        if t.row_is_referenced(id) {
            return Err(PlannerError::Referential { entity: "ppmp row", id });
        }
        t.row_remarks.retain(|_, r| r.ppmp_row_id != id);
        t.rows.remove(&id);
        Ok(())
    }

    async fn list_app_rows(&self, filter: &RowFilter, page: Page) -> PlannerResult<PageResult<PpmpRow>> {
        let t = self.tables.read().await;
        let mut matches: Vec<(PpmpId, PpmpRow)> = t
            .rows
            .values()
            .filter_map(|row| {
                let ppmp = t.ppmps.get(&row.ppmp_id)?;
                filter.matches(row, ppmp).then(|| (ppmp.id, row.clone()))
            })
            .collect();
        matches.sort_by(|(pa, ra), (pb, rb)| pb.cmp(pa).then(ra.id.cmp(&rb.id)));
        Ok(paginate(
            matches.into_iter().map(|(_, row)| row).collect(),
            page,
        ))
    }

    async fn insert_row_remark(&self, remark: NewRowRemark) -> PlannerResult<RowRemark> {
        let mut t = self.tables.write().await;
        if !t.rows.contains_key(&remark.ppmp_row_id) {
            return Err(PlannerError::not_found("ppmp row", remark.ppmp_row_id));
        }
        let record = RowRemark {
            id: t.next_id("ppmp_row_remarks"),
            ppmp_row_id: remark.ppmp_row_id,
            text: remark.text,
            role: remark.role,
            created_by: Some(remark.created_by),
            created_at: Utc::now(),
        };
        t.row_remarks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_row_remarks(&self, row_id: RowId) -> PlannerResult<Vec<RowRemark>> {
        let t = self.tables.read().await;
        Ok(t
            .row_remarks
            .values()
            .filter(|r| r.ppmp_row_id == row_id)
            .cloned()
            .collect())
    }

    async fn insert_bac_approval(&self, ppmp_id: PpmpId, user_id: UserId) -> PlannerResult<BacApproval> {
        let mut t = self.tables.write().await;
        if !t.ppmps.contains_key(&ppmp_id) {
            return Err(PlannerError::not_found("ppmp", ppmp_id));
        }
        let exists = t
            .bac_approvals
            .values()
            .any(|a| a.ppmp_id == ppmp_id && a.user_id == user_id);
        if exists {
            return Err(PlannerError::Conflict(ConflictKind::AlreadyApproved {
                ppmp_id,
                user_id,
            }));
        }
        let approval = BacApproval {
            id: t.next_id("ppmp_bac_approvals"),
            ppmp_id,
            user_id,
            approved_at: Utc::now(),
        };
        t.bac_approvals.insert(approval.id, approval.clone());
        Ok(approval)
    }

    async fn list_bac_approvals(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<BacApproval>> {
        let t = self.tables.read().await;
        Ok(t
            .bac_approvals
            .values()
            .filter(|a| a.ppmp_id == ppmp_id)
            .cloned()
            .collect())
    }

    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> PlannerResult<AuditLogEntry> {
        let mut t = self.tables.write().await;
        if !t.ppmps.contains_key(&entry.ppmp_id) {
            return Err(PlannerError::not_found("ppmp", entry.ppmp_id));
        }
        let record = AuditLogEntry {
            id: t.next_id("ppmp_audit_log"),
            ppmp_id: entry.ppmp_id,
            user_id: Some(entry.user_id),
            action: entry.action,
            from_status: entry.from_status,
            to_status: entry.to_status,
            remarks: entry.remarks,
            created_at: Utc::now(),
        };
        t.audit_log.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_audit_entries(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<AuditLogEntry>> {
        let t = self.tables.read().await;
        Ok(t
            .audit_log
            .values()
            .filter(|e| e.ppmp_id == ppmp_id)
            .cloned()
            .collect())
    }

    async fn get_app_approval(&self, fiscal_year: i32) -> PlannerResult<Option<AppApproval>> {
        Ok(self.tables.read().await.app_approvals.get(&fiscal_year).cloned())
    }

    async fn upsert_app_approval(
        &self,
        fiscal_year: i32,
        approved_by: UserId,
        approved_at: DateTime<Utc>,
    ) -> PlannerResult<AppApproval> {
        let mut t = self.tables.write().await;
        let approval = AppApproval {
            fiscal_year,
            approved_at: Some(approved_at),
            approved_by_user_id: Some(approved_by),
        };
        t.app_approvals.insert(fiscal_year, approval.clone());
        Ok(approval)
    }

    async fn insert_purchase_request(&self, pr: NewPurchaseRequest) -> PlannerResult<PurchaseRequest> {
        let mut t = self.tables.write().await;
        if !t.rows.contains_key(&pr.ppmp_row_id) {
            return Err(PlannerError::not_found("ppmp row", pr.ppmp_row_id));
        }
        let now = Utc::now();
        let record = PurchaseRequest {
            id: t.next_id("purchase_requests"),
            ppmp_row_id: pr.ppmp_row_id,
            created_by: pr.created_by,
            status: PurchaseRequestStatus::Draft,
            reference_number: pr.reference_number,
            created_at: now,
            updated_at: now,
        };
        t.purchase_requests.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_purchase_request_items(
        &self,
        items: Vec<NewPurchaseRequestItem>,
    ) -> PlannerResult<Vec<PurchaseRequestItem>> {
        let mut t = self.tables.write().await;
        for item in &items {
            if !t.purchase_requests.contains_key(&item.purchase_request_id) {
                return Err(PlannerError::not_found(
                    "purchase request",
                    item.purchase_request_id,
                ));
            }
            let taken = t
                .purchase_request_items
                .values()
                .any(|existing| existing.ppmp_row_id == item.ppmp_row_id && existing.key() == item.key);
            let repeated = items
                .iter()
                .filter(|other| other.ppmp_row_id == item.ppmp_row_id && other.key == item.key)
                .count()
                > 1;
            if taken || repeated {
                return Err(PlannerError::Conflict(ConflictKind::ItemAlreadyInPurchaseRequest {
                    ppmp_row_id: item.ppmp_row_id,
                    lot_index: item.key.lot_index,
                    item_index: item.key.item_index,
                }));
            }
        }
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            let record = PurchaseRequestItem {
                id: t.next_id("purchase_request_items"),
                purchase_request_id: item.purchase_request_id,
                ppmp_row_id: item.ppmp_row_id,
                lot_index: item.key.lot_index,
                item_index: item.key.item_index,
                description: item.description,
                quantity: item.quantity,
                unit: item.unit,
                estimated_cost: item.estimated_cost,
                created_at: now,
            };
            t.purchase_request_items.insert(record.id, record.clone());
            inserted.push(record);
        }
        Ok(inserted)
    }

    async fn list_purchase_requests(&self, filter: &PurchaseRequestFilter) -> PlannerResult<Vec<PurchaseRequest>> {
        let t = self.tables.read().await;
        Ok(t
            .purchase_requests
            .values()
            .rev()
            .filter(|pr| filter.matches(pr))
            .cloned()
            .collect())
    }

    async fn list_purchase_request_items(&self, row_id: RowId) -> PlannerResult<Vec<PurchaseRequestItem>> {
        let t = self.tables.read().await;
        Ok(t
            .purchase_request_items
            .values()
            .filter(|item| item.ppmp_row_id == row_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: NewNotification) -> PlannerResult<Notification> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&notification.user_id) {
            return Err(PlannerError::not_found("user", notification.user_id));
        }
        let record = Notification {
            id: t.next_id("notifications"),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            link: notification.link,
            read_at: None,
            created_at: Utc::now(),
        };
        t.notifications.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_notifications(&self, user_id: UserId, unread_only: bool) -> PlannerResult<Vec<Notification>> {
        let t = self.tables.read().await;
        Ok(t
            .notifications
            .values()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read()))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        id: i64,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> PlannerResult<Notification> {
        let mut t = self.tables.write().await;
        let notification = t
            .notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| PlannerError::not_found("notification", id))?;
        notification.read_at.get_or_insert(read_at);
        Ok(notification.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeaderRemark, RemarkRole, UserType};
    use tempfile::TempDir;

    async fn seeded() -> (MemoryStore, User, School) {
        let store = MemoryStore::new();
        let school = store.insert_school("Central ES", None).await.unwrap();
        let user = store
            .insert_user(NewUser {
                name: "Supply Officer".into(),
                email: "Supply@Example.com".into(),
                user_type: UserType::SupplyOfficerSchool,
                designation: None,
                school_id: Some(school.id),
                office_id: None,
            })
            .await
            .unwrap();
        (store, user, school)
    }

    #[tokio::test]
    async fn test_duplicate_ppmp_is_conflict() {
        let (store, user, school) = seeded().await;
        let new = NewPpmp {
            fiscal_year: 2025,
            end_user: EndUser::School(school.id),
            created_by: user.id,
        };
        store.insert_ppmp(new.clone()).await.unwrap();
        let err = store.insert_ppmp(new).await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Conflict(ConflictKind::DuplicatePpmp { fiscal_year: 2025, ref end_user }) if end_user == "Central ES"
        ));
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let (store, _, school) = seeded().await;
        let err = store
            .insert_user(NewUser {
                name: "Other".into(),
                email: "supply@example.com".into(),
                user_type: UserType::SchoolStaff,
                designation: None,
                school_id: Some(school.id),
                office_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_stale_status_write_is_rejected() {
        let (store, user, school) = seeded().await;
        let ppmp = store
            .insert_ppmp(NewPpmp {
                fiscal_year: 2025,
                end_user: EndUser::School(school.id),
                created_by: user.id,
            })
            .await
            .unwrap();
        let update = StatusUpdate {
            ppmp_id: ppmp.id,
            expected_version: ppmp.version,
            status: PpmpStatus::Submitted,
            remarks: None,
        };
        let updated = store.update_ppmp_status(update.clone()).await.unwrap();
        assert_eq!(updated.version, 1);

        let err = store.update_ppmp_status(update).await.unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Conflict(ConflictKind::StaleWrite { .. })
        ));
        let stored = store.get_ppmp(ppmp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PpmpStatus::Submitted);
    }

    #[tokio::test]
    async fn test_school_with_users_cannot_be_deleted() {
        let (store, _, school) = seeded().await;
        let err = store.delete_school(school.id).await.unwrap_err();
        assert!(matches!(err, PlannerError::Referential { entity: "school", .. }));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("planner.json");

        let store = MemoryStore::open(&path).await.unwrap();
        let school = store.insert_school("Central ES", None).await.unwrap();
        let office = store.insert_office("Records", None).await.unwrap();
        let user = store
            .insert_user(NewUser {
                name: "Head".into(),
                email: "head@example.com".into(),
                user_type: UserType::DivisionStaff,
                designation: Some("Chief".into()),
                school_id: None,
                office_id: Some(office.id),
            })
            .await
            .unwrap();
        let ppmp = store
            .insert_ppmp(NewPpmp {
                fiscal_year: 2026,
                end_user: EndUser::Office(office.id),
                created_by: user.id,
            })
            .await
            .unwrap();
        store
            .update_ppmp_status(StatusUpdate {
                ppmp_id: ppmp.id,
                expected_version: 0,
                status: PpmpStatus::Submitted,
                remarks: Some(vec![HeaderRemark {
                    text: "ok".into(),
                    role: RemarkRole::UnitHead,
                    created_at: Utc::now(),
                }]),
            })
            .await
            .unwrap();
        store.flush().await.unwrap();
        let saved = store.get_ppmp(ppmp.id).await.unwrap().unwrap();
        drop(store);

        let reopened = MemoryStore::open(&path).await.unwrap();
        let restored = reopened.get_ppmp(ppmp.id).await.unwrap().unwrap();
        assert_eq!(restored, saved);
        assert_eq!(reopened.get_school(school.id).await.unwrap().unwrap().name, "Central ES");

        // ids keep counting after a reload
        let next = reopened.insert_school("North ES", None).await.unwrap();
        assert_eq!(next.id, school.id + 1);
    }
}
