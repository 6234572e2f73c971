use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Workflow and side-channel counters.
///
/// Audit and notification writes are best effort: when one fails after the
/// status change committed, the failure is counted here so the gap in the
/// history is visible rather than silent.
#[derive(Debug, Default)]
pub struct SideChannelMetrics {
    pub transitions_committed: AtomicU64,
    pub transitions_rejected: AtomicU64,
    pub audit_writes: AtomicU64,
    pub audit_failures: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notification_failures: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl SideChannelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&self) {
        self.transitions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_write(&self) {
        self.audit_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Audit log write failed after commit");
    }

    pub fn record_notification(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SideChannelStats {
        SideChannelStats {
            transitions_committed: self.transitions_committed.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            audit_writes: self.audit_writes.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Workflow metrics: transitions={}, rejected={}, audit_writes={}, audit_failures={}, notifications={}, notification_failures={}, cache_hits={}, cache_misses={}",
            stats.transitions_committed,
            stats.transitions_rejected,
            stats.audit_writes,
            stats.audit_failures,
            stats.notifications_sent,
            stats.notification_failures,
            stats.cache_hits,
            stats.cache_misses
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideChannelStats {
    pub transitions_committed: u64,
    pub transitions_rejected: u64,
    pub audit_writes: u64,
    pub audit_failures: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Global metrics instance
static SIDE_CHANNEL_METRICS: std::sync::LazyLock<Arc<SideChannelMetrics>> =
    std::sync::LazyLock::new(|| Arc::new(SideChannelMetrics::new()));

pub fn side_channel_metrics() -> Arc<SideChannelMetrics> {
    Arc::clone(&SIDE_CHANNEL_METRICS)
}

/// Measures a store-heavy call against one row or PPMP.
pub struct OperationTimer {
    operation: &'static str,
    subject_id: i64,
    start: Instant,
}

impl OperationTimer {
    pub fn start(operation: &'static str, subject_id: i64) -> Self {
        Self {
            operation,
            subject_id,
            start: Instant::now(),
        }
    }

    /// `failed` counts the parts of the operation that were skipped.
    pub fn finish(self, failed: usize) {
        let elapsed_ms = self.start.elapsed().as_millis();
        if failed > 0 {
            warn!(
                operation = self.operation,
                subject.id = self.subject_id,
                failed,
                elapsed_ms,
                "Operation finished with failures"
            );
        } else {
            debug!(
                operation = self.operation,
                subject.id = self.subject_id,
                elapsed_ms,
                "Operation finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SideChannelMetrics::new();
        metrics.record_transition();
        metrics.record_transition();
        metrics.record_audit_failure();
        metrics.record_notification_failure();

        let stats = metrics.get_stats();
        assert_eq!(stats.transitions_committed, 2);
        assert_eq!(stats.audit_failures, 1);
        assert_eq!(stats.notification_failures, 1);
        assert_eq!(stats.notifications_sent, 0);
    }
}
