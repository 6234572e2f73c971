// Audit log and notification side channel
//
// Both run after the primary write has committed. A failure here is logged
// and counted, never returned to the caller and never rolled back.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::roles::resolve_unit_head;
use super::transitions::{NotificationTemplate, Recipients};
use crate::config::NotificationConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::model::{
    AuditLogEntry, EndUser, NewAuditEntry, NewNotification, Notification, Ppmp, UserId, UserType,
};
use crate::observability::SideChannelMetrics;
use crate::store::{RecordStore, UserFilter};

/// Sink for post-commit writes.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SideChannel: Send + Sync {
    async fn append_audit(&self, entry: NewAuditEntry) -> PlannerResult<AuditLogEntry>;
    async fn send_notification(&self, notification: NewNotification) -> PlannerResult<Notification>;
}

/// Writes side-channel records to the record store.
pub struct StoreSideChannel {
    store: Arc<dyn RecordStore>,
}

impl StoreSideChannel {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SideChannel for StoreSideChannel {
    async fn append_audit(&self, entry: NewAuditEntry) -> PlannerResult<AuditLogEntry> {
        self.store.insert_audit_entry(entry).await
    }

    async fn send_notification(&self, notification: NewNotification) -> PlannerResult<Notification> {
        self.store.insert_notification(notification).await
    }
}

/// Append-only history of header transitions.
#[derive(Clone)]
pub struct AuditTrail {
    channel: Arc<dyn SideChannel>,
    metrics: Arc<SideChannelMetrics>,
}

impl AuditTrail {
    pub fn new(channel: Arc<dyn SideChannel>, metrics: Arc<SideChannelMetrics>) -> Self {
        Self { channel, metrics }
    }

    /// Best effort; `None` when the write failed.
    pub async fn record(&self, entry: NewAuditEntry) -> Option<AuditLogEntry> {
        let ppmp_id = entry.ppmp_id;
        let action = entry.action.clone();
        match self.channel.append_audit(entry).await {
            Ok(written) => {
                self.metrics.record_audit_write();
                Some(written)
            }
            Err(e) => {
                warn!(ppmp.id = ppmp_id, action = %action, error = %e, "Failed to write audit entry");
                self.metrics.record_audit_failure();
                None
            }
        }
    }
}

/// Fans a transition out to its next actors.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn SideChannel>,
    store: Arc<dyn RecordStore>,
    settings: NotificationConfig,
    metrics: Arc<SideChannelMetrics>,
}

impl Notifier {
    pub fn new(
        channel: Arc<dyn SideChannel>,
        store: Arc<dyn RecordStore>,
        settings: NotificationConfig,
        metrics: Arc<SideChannelMetrics>,
    ) -> Self {
        Self {
            channel,
            store,
            settings,
            metrics,
        }
    }

    pub fn link_for(&self, ppmp_id: i64) -> String {
        format!("{}/{}", self.settings.link_prefix.trim_end_matches('/'), ppmp_id)
    }

    /// Sends one notification per recipient and returns how many were
    /// written. Never fails.
    pub async fn broadcast(
        &self,
        ppmp: &Ppmp,
        recipients: Recipients,
        template: Option<&NotificationTemplate>,
    ) -> usize {
        let Some(template) = template else {
            return 0;
        };
        if !self.settings.enabled || recipients == Recipients::Nobody {
            return 0;
        }

        let user_ids = match self.recipients(ppmp, recipients).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(ppmp.id = ppmp.id, error = %e, "Failed to resolve notification recipients");
                self.metrics.record_notification_failure();
                return 0;
            }
        };

        let end_user = end_user_label(self.store.as_ref(), &ppmp.end_user).await;
        let message = template.render(ppmp.fiscal_year, &end_user);
        let link = self.link_for(ppmp.id);

        let mut delivered = 0;
        for user_id in user_ids {
            let notification = NewNotification {
                user_id,
                kind: template.kind,
                title: template.title.to_string(),
                message: message.clone(),
                link: Some(link.clone()),
            };
            match self.channel.send_notification(notification).await {
                Ok(_) => {
                    self.metrics.record_notification();
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        ppmp.id = ppmp.id,
                        user.id = user_id,
                        kind = %template.kind,
                        error = %e,
                        "Failed to send notification"
                    );
                    self.metrics.record_notification_failure();
                }
            }
        }
        debug!(ppmp.id = ppmp.id, kind = %template.kind, delivered, "Notifications sent");
        delivered
    }

    /// Active users in the recipient population.
    pub async fn recipients(&self, ppmp: &Ppmp, recipients: Recipients) -> PlannerResult<Vec<UserId>> {
        let store = self.store.as_ref();
        let ids = match recipients {
            Recipients::Nobody => Vec::new(),
            Recipients::UnitHead => {
                let head = resolve_unit_head(store, &ppmp.end_user).await?;
                active_only(store, head).await?
            }
            Recipients::Creator => active_only(store, ppmp.created_by).await?,
            Recipients::BudgetOfficers => user_ids(store, &UserFilter::active(&[UserType::BudgetOfficer])).await?,
            Recipients::BacUsers => user_ids(store, &UserFilter::active(&UserType::BAC)).await?,
            Recipients::HopeUsers => {
                let hope = UserFilter::active(&[UserType::SchoolsDivisionSuperintendent]);
                user_ids(store, &hope).await?
            }
        };
        Ok(ids)
    }
}

async fn active_only(store: &dyn RecordStore, user_id: Option<UserId>) -> PlannerResult<Vec<UserId>> {
    let Some(user_id) = user_id else {
        return Ok(Vec::new());
    };
    Ok(store
        .get_user(user_id)
        .await?
        .filter(|user| user.is_active)
        .map(|user| vec![user.id])
        .unwrap_or_default())
}

async fn user_ids(store: &dyn RecordStore, filter: &UserFilter) -> PlannerResult<Vec<UserId>> {
    Ok(store.list_users(filter).await?.into_iter().map(|u| u.id).collect())
}

/// School or office name for messages; falls back to the id.
pub async fn end_user_label(store: &dyn RecordStore, end_user: &EndUser) -> String {
    let name: Result<Option<String>, PlannerError> = match end_user {
        EndUser::School(id) => store.get_school(*id).await.map(|s| s.map(|s| s.name)),
        EndUser::Office(id) => store.get_office(*id).await.map(|o| o.map(|o| o.name)),
    };
    match name {
        Ok(Some(name)) => name,
        _ => end_user.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::{NewPpmp, NewUser, NotificationKind, PpmpStatus};
    use crate::store::MemoryStore;

    async fn fixture() -> (Arc<MemoryStore>, Ppmp) {
        let store = Arc::new(MemoryStore::new());
        let school = store.insert_school("Central ES", None).await.unwrap();
        let creator = store
            .insert_user(NewUser {
                name: "Proponent".into(),
                email: "p@example.com".into(),
                user_type: UserType::SupplyOfficerSchool,
                designation: None,
                school_id: Some(school.id),
                office_id: None,
            })
            .await
            .unwrap();
        for (i, t) in [UserType::BudgetOfficer, UserType::BudgetOfficer].iter().enumerate() {
            store
                .insert_user(NewUser {
                    name: format!("Budget {i}"),
                    email: format!("budget{i}@example.com"),
                    user_type: *t,
                    designation: None,
                    school_id: None,
                    office_id: None,
                })
                .await
                .unwrap();
        }
        store.set_user_active(3, false).await.unwrap();
        let ppmp = store
            .insert_ppmp(NewPpmp {
                fiscal_year: 2025,
                end_user: EndUser::School(school.id),
                created_by: creator.id,
            })
            .await
            .unwrap();
        (store, ppmp)
    }

    fn template() -> NotificationTemplate {
        NotificationTemplate {
            kind: NotificationKind::PpmpSubmittedToBudget,
            title: "PPMP submitted for budget review",
            message: "PPMP for FY{fy} - {end_user} requires your budget review.",
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_inactive_users() {
        let (store, ppmp) = fixture().await;
        let metrics = Arc::new(SideChannelMetrics::new());
        let notifier = Notifier::new(
            Arc::new(StoreSideChannel::new(store.clone())),
            store.clone(),
            crate::config::PlannerConfig::default().notifications,
            metrics.clone(),
        );

        let sent = notifier
            .broadcast(&ppmp, Recipients::BudgetOfficers, Some(&template()))
            .await;

        assert_eq!(sent, 1);
        let inbox = store.list_notifications(2, false).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message, "PPMP for FY2025 - Central ES requires your budget review.");
        assert_eq!(inbox[0].link.as_deref(), Some("/planning/ppmp/1"));
        assert!(store.list_notifications(3, false).await.unwrap().is_empty());
        assert_eq!(metrics.get_stats().notifications_sent, 1);
    }

    #[tokio::test]
    async fn test_failed_sends_are_counted_not_raised() {
        let (store, ppmp) = fixture().await;
        let mut channel = MockSideChannel::new();
        channel
            .expect_send_notification()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("offline".into()).into()));
        let metrics = Arc::new(SideChannelMetrics::new());
        let notifier = Notifier::new(
            Arc::new(channel),
            store,
            crate::config::PlannerConfig::default().notifications,
            metrics.clone(),
        );

        let sent = notifier
            .broadcast(&ppmp, Recipients::BudgetOfficers, Some(&template()))
            .await;

        assert_eq!(sent, 0);
        assert_eq!(metrics.get_stats().notification_failures, 1);
    }

    #[tokio::test]
    async fn test_audit_failure_returns_none() {
        let mut channel = MockSideChannel::new();
        channel
            .expect_append_audit()
            .returning(|_| Err(StoreError::Unavailable("offline".into()).into()));
        let metrics = Arc::new(SideChannelMetrics::new());
        let trail = AuditTrail::new(Arc::new(channel), metrics.clone());

        let written = trail
            .record(NewAuditEntry {
                ppmp_id: 1,
                user_id: 1,
                action: "submit_to_unit_head".into(),
                from_status: PpmpStatus::Draft,
                to_status: PpmpStatus::Submitted,
                remarks: None,
            })
            .await;

        assert!(written.is_none());
        assert_eq!(metrics.get_stats().audit_failures, 1);
    }

    #[tokio::test]
    async fn test_disabled_notifications_send_nothing() {
        let (store, ppmp) = fixture().await;
        let mut settings = crate::config::PlannerConfig::default().notifications;
        settings.enabled = false;
        let notifier = Notifier::new(
            Arc::new(StoreSideChannel::new(store.clone())),
            store.clone(),
            settings,
            Arc::new(SideChannelMetrics::new()),
        );
        let sent = notifier
            .broadcast(&ppmp, Recipients::Creator, Some(&template()))
            .await;
        assert_eq!(sent, 0);
    }
}
