//! サービスの状態（読み取り専用）

use crate::decision::{ComparisonMethod, Observation, SyncAction, SyncDecision};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service: String,
    pub primary_found: bool,
    pub primary_name: Option<String>,
    pub primary_healthy: bool,
    pub primary_version: Option<String>,
    pub replica_name: String,
    pub replica_found: bool,
    pub replica_running: bool,
    pub replica_healthy: bool,
    pub replica_version: Option<String>,
    pub in_sync: bool,
    pub method: Option<ComparisonMethod>,
    pub reason: Option<String>,
    /// 調査自体に失敗した場合の理由
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn from_observation(
        service: &str,
        replica_name: &str,
        observation: &Observation,
        decision: &SyncDecision,
    ) -> Self {
        let primary = observation.primary.as_ref();
        let replica = observation.replica.as_ref();

        Self {
            service: service.to_string(),
            primary_found: primary.is_some(),
            primary_name: primary.map(|p| p.container.name.clone()),
            primary_healthy: observation.primary_healthy(),
            primary_version: primary.and_then(|p| p.health.version.as_known().map(str::to_string)),
            replica_name: replica_name.to_string(),
            replica_found: replica.is_some(),
            replica_running: replica.is_some_and(|r| r.running),
            replica_healthy: observation.replica_healthy(),
            replica_version: replica.and_then(|r| r.health.version.as_known().map(str::to_string)),
            in_sync: observation.primary_healthy()
                && replica.is_some_and(|r| r.running)
                && decision.action == SyncAction::NoActionNeeded,
            method: decision.method,
            reason: Some(decision.reason.clone()),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// 調査できなかった場合（すべて false / 不明）
    pub fn unavailable(service: &str, replica_name: &str, error: impl ToString) -> Self {
        Self {
            service: service.to_string(),
            primary_found: false,
            primary_name: None,
            primary_healthy: false,
            primary_version: None,
            replica_name: replica_name.to_string(),
            replica_found: false,
            replica_running: false,
            replica_healthy: false,
            replica_version: None,
            in_sync: false,
            method: None,
            reason: None,
            error: Some(error.to_string()),
            checked_at: Utc::now(),
        }
    }
}
