//! ランタイムインスペクタ
//!
//! プライマリの発見、存在・起動状態の確認、スナップショット取得、
//! 冪等な停止・削除を提供します。

use crate::error::{ContainerError, Result};
use crate::model::{ContainerDetails, ContainerImageSpec, ContainerRef, ContainerSummary};
use crate::runtime::ContainerRuntime;
use regex::Regex;
use standby_core::PrimarySelection;
use std::sync::Arc;

#[derive(Clone)]
pub struct Inspector {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Inspector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// パターンに一致する実行中コンテナからプライマリを選ぶ
    ///
    /// 停止中のコンテナは対象外。`exclude` に一致する名前（レプリカ自身）は除外する。
    pub async fn find_primary(
        &self,
        pattern: &Regex,
        policy: PrimarySelection,
        exclude: &str,
    ) -> Result<Option<ContainerRef>> {
        let running = self.runtime.list_running().await?;
        let selected = select_primary(running, pattern, policy, exclude);
        if let Some(ref primary) = selected {
            tracing::debug!(pattern = %pattern, primary = %primary, "Resolved primary container");
        }
        Ok(selected)
    }

    /// コンテナの詳細（存在しなければ None）
    pub async fn details(&self, name: &str) -> Result<Option<ContainerDetails>> {
        match self.runtime.inspect(name).await {
            Ok(details) => Ok(Some(details)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.details(name).await?.is_some())
    }

    pub async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.details(name).await?.is_some_and(|d| d.running))
    }

    /// 複製用のスナップショットを取得
    pub async fn snapshot(&self, target: &ContainerRef) -> Result<ContainerImageSpec> {
        Ok(self.inspect_ref(target).await?.spec)
    }

    /// 解決済み参照（ID）で inspect する
    pub async fn inspect_ref(&self, target: &ContainerRef) -> Result<ContainerDetails> {
        self.runtime.inspect(&target.id).await
    }

    /// イメージの同一性（ダイジェスト）
    pub async fn image_identity(&self, name: &str) -> Result<Option<String>> {
        Ok(self.details(name).await?.and_then(|d| d.image_identity()))
    }

    /// 停止（存在しない・停止済みは成功扱い）
    pub async fn stop(&self, name: &str) -> Result<()> {
        match self.runtime.stop(name).await {
            Ok(()) => {
                tracing::debug!(container = %name, "Stopped container");
                Ok(())
            }
            Err(ContainerError::ContainerNotFound { .. })
            | Err(ContainerError::ContainerAlreadyStopped { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 削除（存在しない場合は成功扱い）
    pub async fn remove(&self, name: &str) -> Result<()> {
        match self.runtime.remove(name).await {
            Ok(()) => {
                tracing::debug!(container = %name, "Removed container");
                Ok(())
            }
            Err(ContainerError::ContainerNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// 候補からプライマリを決定的に選ぶ
///
/// 作成日時でポリシーに従って選び、同時刻の場合は名前の昇順で最初のもの。
pub fn select_primary(
    candidates: Vec<ContainerSummary>,
    pattern: &Regex,
    policy: PrimarySelection,
    exclude: &str,
) -> Option<ContainerRef> {
    let mut matched: Vec<ContainerSummary> = candidates
        .into_iter()
        .filter(|c| c.name != exclude && pattern.is_match(&c.name))
        .collect();

    matched.sort_by(|a, b| match policy {
        PrimarySelection::Oldest => a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)),
        PrimarySelection::Newest => b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name)),
    });

    if matched.len() > 1 {
        tracing::debug!(
            pattern = %pattern,
            candidates = matched.len(),
            policy = ?policy,
            "Multiple containers match primary pattern"
        );
    }

    matched.first().map(ContainerSummary::to_ref)
}
