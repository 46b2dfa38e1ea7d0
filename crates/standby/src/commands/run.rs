use crate::docker;
use colored::Colorize;
use standby_core::StandbyConfig;
use standby_engine::{FileConfigSource, LoopControl, Scheduler};
use std::path::Path;
use tokio::sync::watch;

fn print_services(config: &StandbyConfig) {
    for service in &config.services {
        let state = if service.enabled {
            "有効".green()
        } else {
            "無効".dimmed()
        };
        println!(
            "  • {} → {} ({})",
            service.name.cyan(),
            service.effective_replica_name(),
            state
        );
    }
}

/// 照合ループを起動し、停止シグナルまで動かし続ける
pub async fn handle(config_path: &Path, config: StandbyConfig) -> anyhow::Result<()> {
    println!("{}", "standby を起動します...".blue());
    println!("設定ファイル: {}", config_path.display().to_string().cyan());
    print_services(&config);
    println!();

    // Docker に接続できなければ起動しない
    let runtime = docker::connect_with_error_handling().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing in-flight service");
        let _ = shutdown_tx.send(true);
    });

    let control = LoopControl::new(config.settings.check_interval, shutdown_rx);
    let scheduler = Scheduler::new(runtime, FileConfigSource::new(config_path), config);
    scheduler.run(control).await;

    println!("{}", "✓ 停止しました".green());
    Ok(())
}

/// 1サイクルだけ実行
pub async fn handle_once(config_path: &Path, config: StandbyConfig) -> anyhow::Result<()> {
    println!("{}", "全サービスを照合中...".blue());
    print_services(&config);
    println!();

    let runtime = docker::connect_with_error_handling().await?;

    // 送信側は保持したまま（停止要求なし）
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let control = LoopControl::new(config.settings.check_interval, shutdown_rx);
    let mut scheduler = Scheduler::new(runtime, FileConfigSource::new(config_path), config);
    let report = scheduler.run_cycle(&control).await;

    println!();
    println!(
        "照合: {}件  作成/再作成: {}件  無効: {}件  失敗: {}件",
        report.processed, report.actions, report.disabled, report.failed
    );

    if report.failed > 0 {
        return Err(anyhow::anyhow!(
            "{}件のサービスで照合に失敗しました",
            report.failed
        ));
    }
    println!("{}", "✓ 完了".green());
    Ok(())
}

/// Ctrl-C または SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
