use std::sync::Arc;

use rpcgw_storage::{AnalyticsRepository, MetadataRepository};

#[derive(Clone)]
pub struct ReportingState {
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub metadata: Arc<dyn MetadataRepository>,
}

impl ReportingState {
    pub fn new(
        analytics: Arc<dyn AnalyticsRepository>,
        metadata: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            analytics,
            metadata,
        }
    }
}
