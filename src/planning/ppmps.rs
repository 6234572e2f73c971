// PPMP headers, their rows and row attachments

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::cache::ListCache;
use crate::error::{PlannerError, PlannerResult};
use crate::model::{
    Attachment, EndUser, NewPpmp, NewRowRemark, Ppmp, PpmpId, PpmpRow, PpmpStatus, RowDraft,
    RowId, RowRemark, User, UserId,
};
use crate::observability::OperationTimer;
use crate::store::{ObjectStorage, Page, PageResult, PpmpFilter, RecordStore};
use crate::validation::{required, validate_fiscal_year, validate_row};
use crate::workflow::roles::{load_actor, ActorRole};

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    fn extension(&self) -> &str {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
    }
}

#[derive(Clone)]
pub struct PpmpService {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    cache: ListCache,
}

impl PpmpService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        cache: ListCache,
    ) -> Self {
        Self {
            store,
            storage,
            bucket: bucket.into(),
            cache,
        }
    }

    /// Drops every cached list. Called after each local write.
    fn invalidate_lists(&self) {
        self.cache.invalidate();
    }

    pub async fn create_ppmp(
        &self,
        fiscal_year: i32,
        end_user: EndUser,
        created_by: UserId,
    ) -> PlannerResult<Ppmp> {
        validate_fiscal_year(fiscal_year)?;
        let creator = self.load_user(created_by).await?;
        if !creator.is_active {
            return Err(PlannerError::unauthorized(
                "create a PPMP",
                format!("user {} is inactive", creator.id),
            ));
        }

        let ppmp = self
            .store
            .insert_ppmp(NewPpmp {
                fiscal_year,
                end_user,
                created_by,
            })
            .await?;
        self.invalidate_lists();
        info!(
            ppmp.id = ppmp.id,
            fiscal_year,
            end_user = %end_user,
            created_by,
            "PPMP created"
        );
        Ok(ppmp)
    }

    /// Drafts only, and only by their creator.
    pub async fn delete_ppmp(&self, ppmp_id: PpmpId, actor_id: UserId) -> PlannerResult<()> {
        let ppmp = self.get(ppmp_id).await?;
        if ppmp.created_by != Some(actor_id) {
            return Err(PlannerError::unauthorized(
                "delete the PPMP",
                "only the creator may delete a PPMP",
            ));
        }
        if !ppmp.is_editable() {
            return Err(PlannerError::invalid_transition("delete the PPMP", ppmp.status));
        }
        self.store.delete_ppmp(ppmp_id).await?;
        self.invalidate_lists();
        info!(ppmp.id = ppmp_id, actor.id = actor_id, "PPMP deleted");
        Ok(())
    }

    pub async fn get(&self, ppmp_id: PpmpId) -> PlannerResult<Ppmp> {
        self.store
            .get_ppmp(ppmp_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp", ppmp_id))
    }

    pub async fn list_ppmps(&self, filter: &PpmpFilter, page: Page) -> PlannerResult<PageResult<Ppmp>> {
        let key = ListCache::key("ppmps", &(filter, page));
        self.cache
            .get_or_fetch(key, || self.store.list_ppmps(filter, page))
            .await
    }

    /// The review queue of `user_id`: PPMPs waiting on them.
    pub async fn submissions_for(&self, user_id: UserId, page: Page) -> PlannerResult<PageResult<Ppmp>> {
        let user = self.load_user(user_id).await?;
        if !user.is_active {
            return Ok(PageResult::empty());
        }
        let filter = self.queue_filter(&user).await?;
        self.list_ppmps(&filter, page).await
    }

    async fn queue_filter(&self, user: &User) -> PlannerResult<PpmpFilter> {
        let kind = user.user_type;
        let statuses = if kind.is_budget_officer() {
            vec![PpmpStatus::SubmittedToBudget, PpmpStatus::ReturnedToBudget]
        } else if kind.is_bac() {
            vec![PpmpStatus::SubmittedToBac, PpmpStatus::ReturnedToBac]
        } else if kind.is_hope() {
            vec![PpmpStatus::SubmittedToHope]
        } else {
            let mut headed: Vec<EndUser> = self
                .store
                .list_schools()
                .await?
                .into_iter()
                .filter(|school| school.head_user_id == Some(user.id))
                .map(|school| EndUser::School(school.id))
                .collect();
            headed.extend(
                self.store
                    .list_offices()
                    .await?
                    .into_iter()
                    .filter(|office| office.head_user_id == Some(user.id))
                    .map(|office| EndUser::Office(office.id)),
            );
            return Ok(PpmpFilter {
                statuses: vec![PpmpStatus::Submitted, PpmpStatus::ReturnedToUnitHead],
                end_users: Some(headed),
                ..Default::default()
            });
        };
        Ok(PpmpFilter {
            statuses,
            ..Default::default()
        })
    }

    pub async fn rows(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<PpmpRow>> {
        self.store.list_rows(ppmp_id).await
    }

    pub async fn add_row(&self, ppmp_id: PpmpId, actor_id: UserId, draft: RowDraft) -> PlannerResult<PpmpRow> {
        let fields = validate_row(draft)?;
        let ppmp = self.get(ppmp_id).await?;
        self.check_row_editor(&ppmp, actor_id, "add a row").await?;

        let row = self.store.insert_row(ppmp_id, fields).await?;
        self.invalidate_lists();
        info!(ppmp.id = ppmp_id, row.id = row.id, actor.id = actor_id, "Row added");
        Ok(row)
    }

    pub async fn update_row(&self, row_id: RowId, actor_id: UserId, draft: RowDraft) -> PlannerResult<PpmpRow> {
        let fields = validate_row(draft)?;
        let (row, ppmp) = self.load_row_and_ppmp(row_id).await?;
        self.check_row_editor(&ppmp, actor_id, "edit the row").await?;

        let updated = self.store.update_row(row.id, fields).await?;
        self.invalidate_lists();
        info!(ppmp.id = ppmp.id, row.id = row_id, actor.id = actor_id, "Row updated");
        Ok(updated)
    }

    /// Rows referenced by purchase request items cannot go.
    pub async fn delete_row(&self, row_id: RowId, actor_id: UserId) -> PlannerResult<()> {
        let (_, ppmp) = self.load_row_and_ppmp(row_id).await?;
        self.check_row_editor(&ppmp, actor_id, "delete the row").await?;

        self.store.delete_row(row_id).await?;
        self.invalidate_lists();
        info!(ppmp.id = ppmp.id, row.id = row_id, actor.id = actor_id, "Row deleted");
        Ok(())
    }

    /// Uploads each file and appends it to the row's attachments. A file
    /// that fails to upload is still listed, with an empty url.
    pub async fn upload_attachments(
        &self,
        row_id: RowId,
        actor_id: UserId,
        files: Vec<UploadFile>,
    ) -> PlannerResult<PpmpRow> {
        if files.is_empty() {
            return Err(PlannerError::validation("attachments", "Select at least one file"));
        }
        let (row, ppmp) = self.load_row_and_ppmp(row_id).await?;
        self.check_row_editor(&ppmp, actor_id, "attach files").await?;

        let timer = OperationTimer::start("upload_attachments", row_id);
        let mut failed = 0;
        let timestamp = Utc::now().timestamp_millis();
        let mut attachments = row.attachments.clone();
        for (i, file) in files.into_iter().enumerate() {
            let path = format!("ppmp-{}/{}-{}.{}", ppmp.id, timestamp, i, file.extension());
            let url = match self.storage.upload(&self.bucket, &path, file.bytes).await {
                Ok(stored) => self.storage.public_url(&self.bucket, &stored),
                Err(e) => {
                    warn!(row.id = row_id, file = %file.name, error = %e, "Attachment upload failed");
                    failed += 1;
                    String::new()
                }
            };
            attachments.push(Attachment {
                name: file.name,
                url,
            });
        }
        let updated = self.store.set_row_attachments(row_id, attachments).await?;
        timer.finish(failed);
        Ok(updated)
    }

    /// Appends a threaded remark. Anyone who can see the row may comment.
    pub async fn add_row_remark(&self, row_id: RowId, actor_id: UserId, text: &str) -> PlannerResult<RowRemark> {
        let text = required("remark", text)?;
        let author = self.load_user(actor_id).await?;
        if !author.is_active {
            return Err(PlannerError::unauthorized(
                "add a remark",
                format!("user {} is inactive", author.id),
            ));
        }
        let remark = self
            .store
            .insert_row_remark(NewRowRemark {
                ppmp_row_id: row_id,
                text,
                role: author.user_type.as_str().to_string(),
                created_by: actor_id,
            })
            .await?;
        info!(row.id = row_id, actor.id = actor_id, "Row remark added");
        Ok(remark)
    }

    pub async fn row_remarks(&self, row_id: RowId) -> PlannerResult<Vec<RowRemark>> {
        self.store.list_row_remarks(row_id).await
    }

    async fn check_row_editor(&self, ppmp: &Ppmp, actor_id: UserId, action: &str) -> PlannerResult<ActorRole> {
        let actor = load_actor(self.store.as_ref(), actor_id, ppmp).await?;
        if actor.can_edit_rows(ppmp.status) {
            return Ok(actor);
        }
        let reason = if ppmp.status == PpmpStatus::Draft || ppmp.status.is_with_bac() {
            format!("user {actor_id} may not edit rows of PPMP {}", ppmp.id)
        } else {
            format!("rows are locked while the PPMP is {}", ppmp.status)
        };
        Err(PlannerError::unauthorized(action, reason))
    }

    async fn load_row_and_ppmp(&self, row_id: RowId) -> PlannerResult<(PpmpRow, Ppmp)> {
        let row = self
            .store
            .get_row(row_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp row", row_id))?;
        let ppmp = self.get(row.ppmp_id).await?;
        Ok((row, ppmp))
    }

    async fn load_user(&self, user_id: UserId) -> PlannerResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("user", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::model::{NewUser, ProjectType, UserType};
    use crate::observability::SideChannelMetrics;
    use crate::store::{MemoryStore, MockObjectStorage};

    struct Fixture {
        service: PpmpService,
        store: Arc<MemoryStore>,
        creator: UserId,
        school: i64,
    }

    async fn fixture(storage: MockObjectStorage) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let school = store.insert_school("Central ES", None).await.unwrap();
        let creator = store
            .insert_user(NewUser {
                name: "Supply".into(),
                email: "supply@example.com".into(),
                user_type: UserType::SupplyOfficerSchool,
                designation: None,
                school_id: Some(school.id),
                office_id: None,
            })
            .await
            .unwrap();
        let cache = ListCache::new(
            &CacheConfig {
                max_capacity: 16,
                ttl_seconds: 60,
            },
            Arc::new(SideChannelMetrics::new()),
        );
        let service = PpmpService::new(store.clone(), Arc::new(storage), "ppmp-attachments", cache);
        Fixture {
            service,
            store,
            creator: creator.id,
            school: school.id,
        }
    }

    fn draft() -> RowDraft {
        RowDraft {
            general_description: "Office supplies".into(),
            project_type: Some(ProjectType::Goods),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_sees_own_writes() {
        let f = fixture(MockObjectStorage::new()).await;
        let all = PpmpFilter::default();
        assert_eq!(f.service.list_ppmps(&all, Page::default()).await.unwrap().total, 0);

        f.service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        assert_eq!(f.service.list_ppmps(&all, Page::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_rows_lock_after_submit() {
        let f = fixture(MockObjectStorage::new()).await;
        let ppmp = f
            .service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        f.service.add_row(ppmp.id, f.creator, draft()).await.unwrap();

        f.store
            .update_ppmp_status(crate::model::StatusUpdate {
                ppmp_id: ppmp.id,
                expected_version: ppmp.version,
                status: PpmpStatus::Submitted,
                remarks: None,
            })
            .await
            .unwrap();
        let err = f.service.add_row(ppmp.id, f.creator, draft()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(f.service.rows(ppmp.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_row_validates_before_writing() {
        let f = fixture(MockObjectStorage::new()).await;
        let ppmp = f
            .service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        let row = f.service.add_row(ppmp.id, f.creator, draft()).await.unwrap();

        let mut bad = draft();
        bad.estimated_budget = Some(-1.0);
        assert!(f
            .service
            .update_row(row.id, f.creator, bad)
            .await
            .unwrap_err()
            .is_validation());

        let mut edit = draft();
        edit.general_description = "Bond paper".into();
        edit.estimated_budget = Some(1500.0);
        let updated = f.service.update_row(row.id, f.creator, edit).await.unwrap();
        assert_eq!(updated.general_description, "Bond paper");
        assert_eq!(updated.estimated_budget, Some(1500.0));
        assert_eq!(updated.ppmp_id, ppmp.id);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_entry_with_empty_url() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload()
            .withf(|bucket, path, _| bucket == "ppmp-attachments" && path.ends_with("-0.pdf"))
            .returning(|_, path, _| Ok(path.to_string()));
        storage
            .expect_upload()
            .withf(|_, path, _| path.ends_with("-1.xlsx"))
            .returning(|_, _, _| Err(PlannerError::validation("path", "bucket offline")));
        storage
            .expect_public_url()
            .returning(|bucket, path| format!("https://files.example/{bucket}/{path}"));

        let f = fixture(storage).await;
        let ppmp = f
            .service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        let row = f.service.add_row(ppmp.id, f.creator, draft()).await.unwrap();

        let updated = f
            .service
            .upload_attachments(
                row.id,
                f.creator,
                vec![
                    UploadFile::new("quote.pdf", b"pdf".to_vec()),
                    UploadFile::new("budget.xlsx", b"xls".to_vec()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated.attachments.len(), 2);
        assert!(updated.attachments[0]
            .url
            .starts_with(&format!("https://files.example/ppmp-attachments/ppmp-{}/", ppmp.id)));
        assert_eq!(updated.attachments[1].name, "budget.xlsx");
        assert!(updated.attachments[1].url.is_empty());
    }

    #[tokio::test]
    async fn test_empty_remark_rejected() {
        let f = fixture(MockObjectStorage::new()).await;
        let ppmp = f
            .service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        let row = f.service.add_row(ppmp.id, f.creator, draft()).await.unwrap();
        assert!(f
            .service
            .add_row_remark(row.id, f.creator, "   ")
            .await
            .unwrap_err()
            .is_validation());

        let remark = f
            .service
            .add_row_remark(row.id, f.creator, " check quantities ")
            .await
            .unwrap();
        assert_eq!(remark.text, "check quantities");
        assert_eq!(remark.role, "supply officer - school");
    }

    #[tokio::test]
    async fn test_only_creator_deletes_draft() {
        let f = fixture(MockObjectStorage::new()).await;
        let ppmp = f
            .service
            .create_ppmp(2025, EndUser::School(f.school), f.creator)
            .await
            .unwrap();
        assert!(f.service.delete_ppmp(ppmp.id, 999).await.unwrap_err().is_unauthorized());
        f.service.delete_ppmp(ppmp.id, f.creator).await.unwrap();
        assert!(f.store.get_ppmp(ppmp.id).await.unwrap().is_none());
    }
}
