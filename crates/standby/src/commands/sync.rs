use crate::docker;
use colored::Colorize;
use standby_core::StandbyConfig;
use standby_engine::Reconciler;

/// レプリカを削除して、次のサイクルで作り直させる
pub async fn handle(config: &StandbyConfig, service: &str) -> anyhow::Result<()> {
    let definition = config.service(service).ok_or_else(|| {
        anyhow::anyhow!(
            "サービス '{}' が見つかりません\n利用可能なサービス: {}",
            service,
            config.service_names().join(", ")
        )
    })?;
    let spec = definition.resolve(&config.settings)?;

    println!(
        "{} のレプリカ {} を削除します...",
        spec.name.cyan(),
        spec.replica_name.cyan()
    );

    let runtime = docker::connect_with_error_handling().await?;
    let reconciler = Reconciler::new(runtime, &config.settings);

    if reconciler.force_sync(&spec).await? {
        println!("{}", "✓ レプリカを削除しました".green());
        println!("  次の照合サイクルで作り直されます");
    } else {
        println!("{}", "レプリカは存在しません".dimmed());
        println!("  次の照合サイクルで作成されます");
    }

    if !definition.enabled {
        println!(
            "{}",
            "⚠ このサービスは無効化されているため、再作成されません".yellow()
        );
    }
    Ok(())
}
