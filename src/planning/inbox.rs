// Per-user notification inbox

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::error::PlannerResult;
use crate::model::{Notification, UserId};
use crate::store::RecordStore;

#[derive(Clone)]
pub struct Inbox {
    store: Arc<dyn RecordStore>,
}

impl Inbox {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn notifications_for(&self, user_id: UserId, unread_only: bool) -> PlannerResult<Vec<Notification>> {
        self.store.list_notifications(user_id, unread_only).await
    }

    pub async fn unread_count(&self, user_id: UserId) -> PlannerResult<usize> {
        Ok(self.store.list_notifications(user_id, true).await?.len())
    }

    /// Only the recipient may mark a notification read.
    pub async fn mark_read(&self, notification_id: i64, user_id: UserId) -> PlannerResult<Notification> {
        let notification = self
            .store
            .mark_notification_read(notification_id, user_id, Utc::now())
            .await?;
        debug!(notification.id = notification_id, user.id = user_id, "Notification read");
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: UserId) -> PlannerResult<usize> {
        let unread = self.store.list_notifications(user_id, true).await?;
        let now = Utc::now();
        for notification in &unread {
            self.store
                .mark_notification_read(notification.id, user_id, now)
                .await?;
        }
        Ok(unread.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::model::{NewNotification, NewUser, NotificationKind, UserType};
    use crate::store::MemoryStore;

    async fn user(store: &MemoryStore, email: &str) -> UserId {
        store
            .insert_user(NewUser {
                name: email.into(),
                email: email.into(),
                user_type: UserType::SchoolsDivisionSuperintendent,
                designation: None,
                school_id: None,
                office_id: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn notify(store: &MemoryStore, user_id: UserId) -> Notification {
        store
            .insert_notification(NewNotification {
                user_id,
                kind: NotificationKind::PpmpSubmittedToHope,
                title: "PPMP Submitted for Approval".into(),
                message: "FY2025 PPMP awaits approval".into(),
                link: Some("/planning/ppmp/1".into()),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_only_recipient_marks_read() {
        let store = Arc::new(MemoryStore::new());
        let hope = user(&store, "hope@deped.gov.ph").await;
        let other = user(&store, "other@deped.gov.ph").await;
        let first = notify(&store, hope).await;
        notify(&store, hope).await;
        let inbox = Inbox::new(store.clone());

        let err = inbox.mark_read(first.id, other).await.unwrap_err();
        assert!(matches!(err, PlannerError::NotFound { .. }));
        assert_eq!(inbox.unread_count(hope).await.unwrap(), 2);

        let read = inbox.mark_read(first.id, hope).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(inbox.unread_count(hope).await.unwrap(), 1);

        assert_eq!(inbox.mark_all_read(hope).await.unwrap(), 1);
        assert_eq!(inbox.unread_count(hope).await.unwrap(), 0);
        assert_eq!(inbox.notifications_for(hope, false).await.unwrap().len(), 2);
    }
}
