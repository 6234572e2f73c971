/// Composition root
///
/// Wires one record store, one object storage and the configuration into
/// every planning and workflow service, so the CLI and tests build the
/// whole system from a single call.
use std::sync::Arc;

use crate::config::PlannerConfig;
use crate::error::PlannerResult;
use crate::model::{PpmpId, UserId};
use crate::observability::{side_channel_metrics, SideChannelMetrics};
use crate::planning::{Inbox, ListCache, Organization, PpmpService};
use crate::store::{LocalObjectStorage, ObjectStorage, RecordStore};
use crate::workflow::{
    AppApprovals, AuditTrail, BacGate, Notifier, PpmpWorkflow, PurchaseRequests, SideChannel,
    StoreSideChannel, TransitionOutcome, TransitionRequest, WorkflowAction,
};

#[derive(Clone)]
pub struct Planner {
    config: PlannerConfig,
    store: Arc<dyn RecordStore>,
    metrics: Arc<SideChannelMetrics>,
    organization: Organization,
    ppmps: PpmpService,
    workflow: PpmpWorkflow,
    bac: BacGate,
    app: AppApprovals,
    purchase_requests: PurchaseRequests,
    inbox: Inbox,
}

impl Planner {
    /// Planner over `store`, with attachments written under the configured
    /// directory and the process-wide metrics.
    pub fn new(config: PlannerConfig, store: Arc<dyn RecordStore>) -> Self {
        let storage = Arc::new(LocalObjectStorage::new(
            config.storage.attachments_dir.clone(),
            config.storage.public_base_url.clone(),
        ));
        let channel = Arc::new(StoreSideChannel::new(store.clone()));
        Self::from_parts(config, store, storage, channel, side_channel_metrics())
    }

    pub fn from_parts(
        config: PlannerConfig,
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        channel: Arc<dyn SideChannel>,
        metrics: Arc<SideChannelMetrics>,
    ) -> Self {
        let audit = AuditTrail::new(channel.clone(), metrics.clone());
        let notifier = Notifier::new(
            channel,
            store.clone(),
            config.notifications.clone(),
            metrics.clone(),
        );
        let cache = ListCache::new(&config.cache, metrics.clone());

        Self {
            organization: Organization::new(store.clone()),
            ppmps: PpmpService::new(
                store.clone(),
                storage,
                config.storage.attachments_bucket.clone(),
                cache.clone(),
            ),
            workflow: PpmpWorkflow::new(
                store.clone(),
                audit.clone(),
                notifier,
                metrics.clone(),
                cache,
            ),
            bac: BacGate::new(store.clone(), audit),
            app: AppApprovals::new(store.clone()),
            purchase_requests: PurchaseRequests::new(store.clone()),
            inbox: Inbox::new(store.clone()),
            config,
            store,
            metrics,
        }
    }

    /// Runs one header transition.
    pub async fn transition(
        &self,
        ppmp_id: PpmpId,
        actor_id: UserId,
        action: WorkflowAction,
        remark: Option<String>,
    ) -> PlannerResult<TransitionOutcome> {
        let mut request = TransitionRequest::new(ppmp_id, actor_id, action);
        request.remark = remark;
        self.workflow.execute(request).await
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<SideChannelMetrics> {
        &self.metrics
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn ppmps(&self) -> &PpmpService {
        &self.ppmps
    }

    pub fn workflow(&self) -> &PpmpWorkflow {
        &self.workflow
    }

    pub fn bac(&self) -> &BacGate {
        &self.bac
    }

    pub fn app(&self) -> &AppApprovals {
        &self.app
    }

    pub fn purchase_requests(&self) -> &PurchaseRequests {
        &self.purchase_requests
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }
}
