use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::models::ReviewRecord;
use crate::store::ReviewStore;

pub type ReviewSinkFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Receives an escalation record for every non-clear source verdict.
/// Escalation is best-effort: a sink failure must never fail the turn.
pub trait ReviewSink: Send + Sync {
    fn escalate<'a>(&'a self, record: &'a ReviewRecord) -> ReviewSinkFuture<'a>;
}

pub struct StoreReviewSink {
    store: Arc<dyn ReviewStore>,
}

impl StoreReviewSink {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }
}

impl ReviewSink for StoreReviewSink {
    fn escalate<'a>(&'a self, record: &'a ReviewRecord) -> ReviewSinkFuture<'a> {
        Box::pin(async move {
            if let Err(err) = self.store.append_review_record(record).await {
                warn!(
                    conversation_id = %record.conversation_id,
                    source = record.source.as_str(),
                    error = %err,
                    "failed to persist review record, continuing the turn"
                );
            }
        })
    }
}
