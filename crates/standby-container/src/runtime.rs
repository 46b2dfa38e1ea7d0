use crate::error::Result;
use crate::model::{ContainerDetails, ContainerSummary, ExecOutput, ReplicaRequest};
use async_trait::async_trait;
use std::time::Duration;

/// コンテナランタイムのトレイト
///
/// 存在しない対象への操作は `ContainerError::ContainerNotFound`、
/// 停止済みコンテナの停止は `ContainerError::ContainerAlreadyStopped` を返す。
/// 冪等性の判断は呼び出し側（Inspector）で行う。
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// ランタイムへの疎通確認
    async fn ping(&self) -> Result<()>;

    /// 実行中のコンテナ一覧
    async fn list_running(&self) -> Result<Vec<ContainerSummary>>;

    /// 名前またはIDでコンテナを調べる
    async fn inspect(&self, name: &str) -> Result<ContainerDetails>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn remove(&self, name: &str) -> Result<()>;

    /// コンテナを作成してIDを返す（起動はしない）
    async fn create(&self, request: &ReplicaRequest) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    /// コンテナ内でコマンドを実行（コンテナのネットワーク名前空間で動く）
    async fn exec(&self, name: &str, cmd: Vec<String>, timeout: Duration) -> Result<ExecOutput>;
}
