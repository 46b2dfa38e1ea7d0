use colored::Colorize;
use standby_container::{ContainerRuntime, DockerRuntime};
use std::sync::Arc;

/// Dockerに接続する（失敗時は対処方法を表示）
pub async fn connect_with_error_handling() -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    match DockerRuntime::connect().await {
        Ok(runtime) => Ok(Arc::new(runtime)),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            // ヒントは下にまとめて出す
            eprintln!("  {}", e.to_string().lines().next().unwrap_or_default());
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • DOCKER_HOST の設定を確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}
