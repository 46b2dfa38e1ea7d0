//! レプリカの合成
//!
//! プライマリのイメージ・環境変数・ラベル・マウントをそのまま複製し、
//! プラットフォームの管理対象外であることを示すラベルを付けて作成します。

use crate::error::ContainerError;
use crate::inspector::Inspector;
use crate::model::{ContainerImageSpec, ContainerRef, ReplicaRequest};
use crate::runtime::ContainerRuntime;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("プライマリ '{primary}' のスナップショットを取得できません: {source}")]
    Snapshot {
        primary: String,
        #[source]
        source: ContainerError,
    },

    #[error("既存レプリカ '{replica}' を片付けられません: {source}")]
    Cleanup {
        replica: String,
        #[source]
        source: ContainerError,
    },

    #[error("レプリカ '{replica}' の作成が拒否されました: {source}")]
    Rejected {
        replica: String,
        #[source]
        source: ContainerError,
    },

    #[error("レプリカ '{replica}' を起動できません: {source}")]
    Start {
        replica: String,
        #[source]
        source: ContainerError,
    },
}

/// 作成されたレプリカ
#[derive(Debug, Clone)]
pub struct ReplicaCreated {
    pub replica: ContainerRef,
    /// 複製に使ったプライマリのスナップショット
    pub spec: ContainerImageSpec,
}

#[derive(Clone)]
pub struct Synthesizer {
    runtime: Arc<dyn ContainerRuntime>,
    inspector: Inspector,
    replica_labels: BTreeMap<String, String>,
    settle_delay: Duration,
}

impl Synthesizer {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            inspector: Inspector::new(runtime.clone()),
            runtime,
            replica_labels: BTreeMap::new(),
            settle_delay: Duration::from_secs(2),
        }
    }

    pub fn with_replica_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.replica_labels = labels;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// プライマリを複製してレプリカを作成・起動
    pub async fn create_replica(
        &self,
        primary: &ContainerRef,
        replica_name: &str,
        network: &str,
    ) -> Result<ReplicaCreated, SynthesisError> {
        let details = self
            .inspector
            .inspect_ref(primary)
            .await
            .map_err(|source| SynthesisError::Snapshot {
                primary: primary.name.clone(),
                source,
            })?;
        let spec = details.spec;

        if spec.mounts.is_empty() {
            tracing::warn!(
                primary = %primary.name,
                replica = %replica_name,
                "Primary has no mounts; shared state (sessions, local files) will not survive failover"
            );
        }

        let request = ReplicaRequest {
            name: replica_name.to_string(),
            spec,
            image_id: details.image_id,
            network: network.to_string(),
            extra_labels: self.replica_labels.clone(),
        };

        tracing::info!(
            primary = %primary.name,
            replica = %replica_name,
            image = %request.spec.image,
            image_id = %request.image_to_run(),
            env = request.spec.env.len(),
            labels = request.spec.labels.len(),
            mounts = request.spec.mounts.len(),
            network = %network,
            "Creating replica"
        );

        let id = self
            .runtime
            .create(&request)
            .await
            .map_err(|source| SynthesisError::Rejected {
                replica: replica_name.to_string(),
                source,
            })?;

        self.runtime
            .start(&id)
            .await
            .map_err(|source| SynthesisError::Start {
                replica: replica_name.to_string(),
                source,
            })?;

        Ok(ReplicaCreated {
            replica: ContainerRef {
                id,
                name: replica_name.to_string(),
            },
            spec: request.spec,
        })
    }

    /// 既存レプリカを停止・削除してから作り直す
    pub async fn recreate(
        &self,
        primary: &ContainerRef,
        replica_name: &str,
        network: &str,
    ) -> Result<ReplicaCreated, SynthesisError> {
        let cleanup = |source: ContainerError| SynthesisError::Cleanup {
            replica: replica_name.to_string(),
            source,
        };

        if self.inspector.is_running(replica_name).await.map_err(cleanup)? {
            self.inspector.stop(replica_name).await.map_err(cleanup)?;
        }
        self.inspector.remove(replica_name).await.map_err(cleanup)?;

        // 同名コンテナの再作成競合を避ける
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }

        self.create_replica(primary, replica_name, network).await
    }
}
