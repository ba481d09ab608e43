//! Event Sink - Audit Log and Metrics Fan-out
//!
//! Drains the engine's event channel until every sender is dropped.
//! Metrics are updated first; the audit append follows. A failed audit
//! write is logged as critical but does not stop the sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::adapters::persistence::AuditLog;
use crate::usecases::EngineEvent;

use super::prometheus::EngineMetrics;

#[derive(Default)]
pub struct EventSink {
    audit: Option<Arc<AuditLog>>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume events until the channel closes. Returns the number handled.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<EngineEvent>) -> u64 {
        let mut handled = 0;
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
            handled += 1;
        }
        info!(handled, "Event sink drained");
        handled
    }

    async fn handle(&self, event: EngineEvent) {
        debug!(kind = event.kind(), market_id = ?event.market_id(), "Engine event");
        if let Some(metrics) = &self.metrics {
            metrics.record(&event);
        }
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(event).await {
                error!(critical = true, error = %e, "Audit append failed");
            }
        }
    }
}
