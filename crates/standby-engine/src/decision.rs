//! 同期判定
//!
//! 1サイクル分の観測結果からアクションを決める純粋関数。
//!
//! 判定順序：
//! 1. プライマリが見つからない、または unhealthy → 何もしない
//! 2. レプリカが存在しない → 作成
//! 3. レプリカが停止している → 作り直し
//! 4. バージョンパスが設定され、両方のバージョンが取得できた → バージョンで比較
//! 5. それ以外 → イメージ（ダイジェスト）で比較

use serde::Serialize;
use standby_container::{ContainerRef, HealthResult, VersionToken, short_digest, versions_equal};
use std::fmt;

/// 判定結果のアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    NoActionNeeded,
    CreateMissing,
    RecreateStale,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActionNeeded => f.write_str("no-action-needed"),
            Self::CreateMissing => f.write_str("create-missing"),
            Self::RecreateStale => f.write_str("recreate-stale"),
        }
    }
}

/// 比較に使った方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMethod {
    Version,
    ImageDigest,
}

impl fmt::Display for ComparisonMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => f.write_str("version"),
            Self::ImageDigest => f.write_str("image-digest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDecision {
    pub action: SyncAction,
    pub reason: String,
    /// 比較を行った場合のみ
    pub method: Option<ComparisonMethod>,
}

impl SyncDecision {
    fn no_action(reason: impl Into<String>, method: Option<ComparisonMethod>) -> Self {
        Self {
            action: SyncAction::NoActionNeeded,
            reason: reason.into(),
            method,
        }
    }

    pub fn needs_action(&self) -> bool {
        self.action != SyncAction::NoActionNeeded
    }
}

/// 1つのコンテナについて観測した事実
#[derive(Debug, Clone)]
pub struct Observed {
    pub container: ContainerRef,
    pub running: bool,
    pub health: HealthResult,
    /// ダイジェスト（なければイメージ参照）
    pub image: Option<String>,
}

/// 1サービス分の観測結果
#[derive(Debug, Clone)]
pub struct Observation {
    pub version_configured: bool,
    pub primary: Option<Observed>,
    pub replica: Option<Observed>,
}

impl Observation {
    pub fn primary_healthy(&self) -> bool {
        self.primary.as_ref().is_some_and(|p| p.health.healthy)
    }

    pub fn replica_healthy(&self) -> bool {
        self.replica.as_ref().is_some_and(|r| r.health.healthy)
    }
}

pub fn decide(observation: &Observation) -> SyncDecision {
    let Some(primary) = &observation.primary else {
        return SyncDecision::no_action("primary not found", None);
    };
    if !primary.health.healthy {
        return SyncDecision::no_action(
            format!("primary {} is unhealthy", primary.container.name),
            None,
        );
    }
    let Some(replica) = &observation.replica else {
        return SyncDecision {
            action: SyncAction::CreateMissing,
            reason: "replica missing".to_string(),
            method: None,
        };
    };
    if !replica.running {
        return SyncDecision {
            action: SyncAction::RecreateStale,
            reason: "replica not running".to_string(),
            method: None,
        };
    }

    if observation.version_configured
        && let (VersionToken::Known(primary_version), VersionToken::Known(replica_version)) =
            (&primary.health.version, &replica.health.version)
    {
        return if versions_equal(&primary.health.version, &replica.health.version) {
            SyncDecision::no_action(
                format!("in sync (version {})", primary_version),
                Some(ComparisonMethod::Version),
            )
        } else {
            SyncDecision {
                action: SyncAction::RecreateStale,
                reason: format!(
                    "version mismatch ({} -> {})",
                    replica_version, primary_version
                ),
                method: Some(ComparisonMethod::Version),
            }
        };
    }

    match (&primary.image, &replica.image) {
        (Some(primary_image), Some(replica_image)) if primary_image == replica_image => {
            SyncDecision::no_action(
                format!("in sync (image {})", short_digest(primary_image)),
                Some(ComparisonMethod::ImageDigest),
            )
        }
        (primary_image, replica_image) => SyncDecision {
            action: SyncAction::RecreateStale,
            reason: format!(
                "image mismatch ({} -> {})",
                display_image(replica_image.as_deref()),
                display_image(primary_image.as_deref())
            ),
            method: Some(ComparisonMethod::ImageDigest),
        },
    }
}

fn display_image(image: Option<&str>) -> String {
    image.map(short_digest).unwrap_or_else(|| "unknown".to_string())
}
