//! サービス単位の照合
//!
//! 観測 → 判定 → 実行 → 作成後の確認 を1サービスについて行います。
//! 状態は持たず、毎回ランタイムとヘルスエンドポイントから取得し直します。

use crate::decision::{Observation, Observed, SyncAction, SyncDecision, decide};
use crate::error::Result;
use crate::status::ServiceStatus;
use standby_container::{
    ContainerRuntime, HealthProbe, HealthResult, Inspector, ReplicaCreated, RetryPolicy,
    Synthesizer, VersionToken,
};
use standby_core::{PrimarySelection, ServiceSpec, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// 1回の照合結果
#[derive(Debug, Clone)]
pub struct ServiceOutcome {
    pub service: String,
    pub observation: Observation,
    pub decision: SyncDecision,
    pub replica: Option<ReplicaCreated>,
    /// 作成後の確認結果
    pub verification: Option<HealthResult>,
}

#[derive(Clone)]
pub struct Reconciler {
    inspector: Inspector,
    probe: HealthProbe,
    synthesizer: Synthesizer,
    retry: RetryPolicy,
    selection: PrimarySelection,
    verify_delay: Duration,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: &Settings) -> Self {
        Self {
            inspector: Inspector::new(runtime.clone()),
            probe: HealthProbe::new(runtime.clone(), settings.health_timeout),
            synthesizer: Synthesizer::new(runtime)
                .with_replica_labels(settings.replica_labels.clone())
                .with_settle_delay(settings.settle_delay),
            retry: RetryPolicy::from_retries(settings.health_retries, settings.retry_delay),
            selection: settings.primary_selection,
            verify_delay: settings.verify_delay,
        }
    }

    /// プライマリとレプリカの現在の状態を調べる
    pub async fn observe(&self, spec: &ServiceSpec) -> Result<Observation> {
        Ok(Observation {
            version_configured: spec.version_path.is_some(),
            primary: self.observe_primary(spec).await?,
            replica: self.observe_replica(spec).await?,
        })
    }

    async fn observe_primary(&self, spec: &ServiceSpec) -> Result<Option<Observed>> {
        let Some(primary) = self
            .inspector
            .find_primary(&spec.primary_pattern, self.selection, &spec.replica_name)
            .await?
        else {
            return Ok(None);
        };

        // 一覧取得後に消えた場合は「見つからない」と同じ扱い
        let Some(details) = self.inspector.details(&primary.id).await? else {
            tracing::debug!(service = %spec.name, primary = %primary, "Primary vanished during inspection");
            return Ok(None);
        };

        let healthy = self
            .probe
            .check_health_with_retry(
                &primary.name,
                &spec.health_endpoint,
                spec.health_port,
                self.probe.timeout(),
                &self.retry,
            )
            .await;

        let version = match &spec.version_path {
            Some(path) if healthy => {
                self.probe
                    .read_version(&primary.name, &spec.health_endpoint, spec.health_port, path)
                    .await
            }
            _ => VersionToken::Absent,
        };

        Ok(Some(Observed {
            image: details.image_identity(),
            running: details.running,
            container: primary,
            health: HealthResult { healthy, version },
        }))
    }

    async fn observe_replica(&self, spec: &ServiceSpec) -> Result<Option<Observed>> {
        let Some(details) = self.inspector.details(&spec.replica_name).await? else {
            return Ok(None);
        };

        let health = if details.running {
            self.probe
                .probe(
                    &details.name,
                    &spec.health_endpoint,
                    spec.health_port,
                    spec.version_path.as_ref(),
                )
                .await
        } else {
            tracing::warn!(
                service = %spec.name,
                replica = %details.name,
                "Replica exists but is not running"
            );
            HealthResult::unhealthy()
        };

        Ok(Some(Observed {
            container: details.to_ref(),
            running: details.running,
            image: details.image_identity(),
            health,
        }))
    }

    /// 観測・判定・実行を1回行う
    pub async fn reconcile(&self, spec: &ServiceSpec) -> Result<ServiceOutcome> {
        let observation = self.observe(spec).await?;
        let decision = decide(&observation);

        let mut outcome = ServiceOutcome {
            service: spec.name.clone(),
            observation,
            decision,
            replica: None,
            verification: None,
        };

        let primary = match (&outcome.observation.primary, outcome.decision.action) {
            (None, _) => {
                tracing::warn!(
                    service = %spec.name,
                    pattern = %spec.primary_pattern,
                    "Primary not found, skipping"
                );
                return Ok(outcome);
            }
            (Some(_), SyncAction::NoActionNeeded) => {
                tracing::debug!(service = %spec.name, reason = %outcome.decision.reason, "No action needed");
                return Ok(outcome);
            }
            (Some(primary), _) => primary.container.clone(),
        };

        tracing::info!(
            service = %spec.name,
            action = %outcome.decision.action,
            reason = %outcome.decision.reason,
            primary = %primary,
            replica = %spec.replica_name,
            "Sync started"
        );

        let created = match outcome.decision.action {
            SyncAction::RecreateStale => {
                self.synthesizer
                    .recreate(&primary, &spec.replica_name, &spec.network)
                    .await?
            }
            _ => {
                self.synthesizer
                    .create_replica(&primary, &spec.replica_name, &spec.network)
                    .await?
            }
        };

        tracing::info!(
            service = %spec.name,
            replica = %created.replica,
            "Sync completed"
        );

        outcome.verification = Some(self.verify(spec).await);
        outcome.replica = Some(created);
        Ok(outcome)
    }

    /// 作成直後のヘルスチェック（ログのみ、リトライしない）
    async fn verify(&self, spec: &ServiceSpec) -> HealthResult {
        if !self.verify_delay.is_zero() {
            sleep(self.verify_delay).await;
        }

        let result = self
            .probe
            .probe(
                &spec.replica_name,
                &spec.health_endpoint,
                spec.health_port,
                spec.version_path.as_ref(),
            )
            .await;

        if result.healthy {
            tracing::info!(
                service = %spec.name,
                replica = %spec.replica_name,
                version = %result.version,
                "Replica is healthy"
            );
        } else {
            tracing::warn!(
                service = %spec.name,
                replica = %spec.replica_name,
                "Replica is not healthy yet, will re-evaluate next cycle"
            );
        }
        result
    }

    /// 現在の状態（エラーにしない）
    pub async fn status(&self, spec: &ServiceSpec) -> ServiceStatus {
        match self.observe(spec).await {
            Ok(observation) => {
                let decision = decide(&observation);
                ServiceStatus::from_observation(&spec.name, &spec.replica_name, &observation, &decision)
            }
            Err(e) => {
                tracing::debug!(service = %spec.name, error = %e, "Status inspection failed");
                ServiceStatus::unavailable(&spec.name, &spec.replica_name, e)
            }
        }
    }

    /// レプリカを停止・削除し、次のサイクルで作り直させる
    ///
    /// レプリカが存在した場合は true。
    pub async fn force_sync(&self, spec: &ServiceSpec) -> Result<bool> {
        if !self.inspector.exists(&spec.replica_name).await? {
            tracing::info!(service = %spec.name, replica = %spec.replica_name, "No replica to remove");
            return Ok(false);
        }

        self.inspector.stop(&spec.replica_name).await?;
        self.inspector.remove(&spec.replica_name).await?;
        tracing::info!(
            service = %spec.name,
            replica = %spec.replica_name,
            "Replica removed, it will be recreated on the next cycle"
        );
        Ok(true)
    }
}
