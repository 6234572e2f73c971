// PPMP header state machine

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::roles::{load_actor, ActorRole};
use super::side_channel::{AuditTrail, Notifier};
use super::transitions::{rules_for, Guard, TransitionRule, WorkflowAction};
use crate::error::{PlannerError, PlannerResult};
use crate::model::{
    AuditLogEntry, HeaderRemark, NewAuditEntry, Ppmp, PpmpId, PpmpStatus, StatusUpdate, UserId,
};
use crate::observability::SideChannelMetrics;
use crate::planning::ListCache;
use crate::store::RecordStore;
use crate::telemetry::{create_workflow_span, generate_correlation_id};

/// One attempt to move a PPMP along an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub ppmp_id: PpmpId,
    pub actor_id: UserId,
    pub action: WorkflowAction,
    pub remark: Option<String>,
}

impl TransitionRequest {
    pub fn new(ppmp_id: PpmpId, actor_id: UserId, action: WorkflowAction) -> Self {
        Self {
            ppmp_id,
            actor_id,
            action,
            remark: None,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub ppmp: Ppmp,
    pub from: PpmpStatus,
    pub action: WorkflowAction,
    /// `None` when the best-effort audit write failed.
    pub audit_entry: Option<AuditLogEntry>,
    pub notified: usize,
    pub correlation_id: String,
    pub duration_ms: u64,
}

/// Executes header transitions: one conditional status write, then the
/// audit and notification side channel.
#[derive(Clone)]
pub struct PpmpWorkflow {
    store: Arc<dyn RecordStore>,
    audit: AuditTrail,
    notifier: Notifier,
    metrics: Arc<SideChannelMetrics>,
    lists: ListCache,
}

impl PpmpWorkflow {
    /// `lists` is the cache shared with the PPMP listings; it is dropped
    /// after every committed transition.
    pub fn new(
        store: Arc<dyn RecordStore>,
        audit: AuditTrail,
        notifier: Notifier,
        metrics: Arc<SideChannelMetrics>,
        lists: ListCache,
    ) -> Self {
        Self {
            store,
            audit,
            notifier,
            metrics,
            lists,
        }
    }

    pub async fn execute(&self, request: TransitionRequest) -> PlannerResult<TransitionOutcome> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(
            request.action.as_str(),
            Some(request.ppmp_id),
            Some(request.actor_id),
            &correlation_id,
        );
        self.run(request, correlation_id).instrument(span).await
    }

    /// Actions `actor_id` may take on the PPMP right now.
    pub async fn available_actions(
        &self,
        ppmp_id: PpmpId,
        actor_id: UserId,
    ) -> PlannerResult<Vec<WorkflowAction>> {
        let ppmp = self.load_ppmp(ppmp_id).await?;
        let actor = load_actor(self.store.as_ref(), actor_id, &ppmp).await?;
        Ok(actor.permitted_actions(ppmp.status))
    }

    /// Audit log of the PPMP, oldest first.
    pub async fn history(&self, ppmp_id: PpmpId) -> PlannerResult<Vec<AuditLogEntry>> {
        self.store.list_audit_entries(ppmp_id).await
    }

    async fn run(
        &self,
        request: TransitionRequest,
        correlation_id: String,
    ) -> PlannerResult<TransitionOutcome> {
        let start = std::time::Instant::now();
        let ppmp = self.load_ppmp(request.ppmp_id).await?;
        let actor = load_actor(self.store.as_ref(), request.actor_id, &ppmp).await?;

        let rule = match self.select_rule(&request, &ppmp, &actor) {
            Ok(rule) => rule,
            Err(e) => return Err(self.reject(e)),
        };
        let remark = match Self::checked_remark(rule, request.remark.as_deref()) {
            Ok(remark) => remark,
            Err(e) => return Err(self.reject(e)),
        };
        if let Err(e) = self.check_guard(rule, &ppmp).await {
            return Err(self.reject(e));
        }

        let remarks = match (&remark, rule.requires_remark) {
            (Some(text), true) => {
                let mut history = ppmp.remarks.clone();
                if let Some(role) = rule.actor.remark_role() {
                    history.push(HeaderRemark {
                        text: text.clone(),
                        role,
                        created_at: Utc::now(),
                    });
                }
                Some(history)
            }
            _ => None,
        };

        let updated = self
            .store
            .update_ppmp_status(StatusUpdate {
                ppmp_id: ppmp.id,
                expected_version: ppmp.version,
                status: rule.to,
                remarks,
            })
            .await
            .map_err(|e| {
                warn!(ppmp.id = ppmp.id, error = %e, "PPMP status write failed");
                e
            })?;

        self.lists.invalidate();
        self.metrics.record_transition();
        info!(
            ppmp.id = updated.id,
            from_status = %ppmp.status,
            to_status = %updated.status,
            action = %request.action,
            actor.id = actor.user_id,
            "PPMP status transition"
        );

        let audit_entry = self
            .audit
            .record(NewAuditEntry {
                ppmp_id: updated.id,
                user_id: actor.user_id,
                action: request.action.as_str().to_string(),
                from_status: ppmp.status,
                to_status: updated.status,
                remarks: remark,
            })
            .await;
        let notified = self
            .notifier
            .broadcast(&updated, rule.recipients, rule.template.as_ref())
            .await;

        Ok(TransitionOutcome {
            ppmp: updated,
            from: ppmp.status,
            action: request.action,
            audit_entry,
            notified,
            correlation_id,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn load_ppmp(&self, ppmp_id: PpmpId) -> PlannerResult<Ppmp> {
        self.store
            .get_ppmp(ppmp_id)
            .await?
            .ok_or_else(|| PlannerError::not_found("ppmp", ppmp_id))
    }

    /// The edge for this action out of the current status that the actor
    /// holds the capability for.
    fn select_rule(
        &self,
        request: &TransitionRequest,
        ppmp: &Ppmp,
        actor: &ActorRole,
    ) -> PlannerResult<&'static TransitionRule> {
        let candidates = rules_for(request.action, ppmp.status);
        if candidates.is_empty() {
            return Err(PlannerError::invalid_transition(request.action, ppmp.status));
        }
        candidates
            .iter()
            .copied()
            .find(|rule| actor.has(rule.actor))
            .ok_or_else(|| {
                let required: Vec<String> = candidates
                    .iter()
                    .map(|rule| format!("{:?}", rule.actor))
                    .collect();
                PlannerError::unauthorized(
                    request.action.as_str(),
                    format!(
                        "user {} ({}) lacks the required role: {}",
                        actor.user_id,
                        actor.user_type,
                        required.join(" or ")
                    ),
                )
            })
    }

    fn checked_remark(rule: &TransitionRule, remark: Option<&str>) -> PlannerResult<Option<String>> {
        let remark = remark.map(str::trim).filter(|r| !r.is_empty());
        if rule.requires_remark && remark.is_none() {
            return Err(PlannerError::validation(
                "remarks",
                "A remark is required when returning a PPMP",
            ));
        }
        Ok(remark.map(str::to_string))
    }

    async fn check_guard(&self, rule: &TransitionRule, ppmp: &Ppmp) -> PlannerResult<()> {
        match rule.guard {
            Guard::Always => Ok(()),
            Guard::HasRows => {
                if self.store.count_rows(ppmp.id).await? == 0 {
                    Err(PlannerError::validation(
                        "rows",
                        "Add at least one row before submitting",
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn reject(&self, error: PlannerError) -> PlannerError {
        self.metrics.record_rejection();
        warn!(error = %error, "PPMP transition rejected");
        error
    }
}
