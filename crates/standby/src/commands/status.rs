use crate::docker;
use colored::Colorize;
use standby_core::{ServiceDefinition, StandbyConfig};
use standby_engine::{Reconciler, ServiceStatus};

fn select<'a>(
    config: &'a StandbyConfig,
    service: Option<&str>,
) -> anyhow::Result<Vec<&'a ServiceDefinition>> {
    match service {
        Some(name) => {
            let definition = config.service(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "サービス '{}' が見つかりません\n利用可能なサービス: {}",
                    name,
                    config.service_names().join(", ")
                )
            })?;
            Ok(vec![definition])
        }
        None => Ok(config.services.iter().collect()),
    }
}

fn mark(ok: bool) -> colored::ColoredString {
    if ok { "✓".green() } else { "✗".red() }
}

fn print_status(status: &ServiceStatus) {
    println!("{}", status.service.cyan().bold());

    match &status.primary_name {
        Some(name) => println!(
            "  プライマリ: {} {} バージョン: {}",
            name,
            mark(status.primary_healthy),
            status.primary_version.as_deref().unwrap_or("不明")
        ),
        None => println!("  プライマリ: {}", "見つかりません".yellow()),
    }

    if status.replica_found {
        let state = if status.replica_running {
            mark(status.replica_healthy)
        } else {
            "停止中".yellow()
        };
        println!(
            "  レプリカ:   {} {} バージョン: {}",
            status.replica_name,
            state,
            status.replica_version.as_deref().unwrap_or("不明")
        );
    } else {
        println!(
            "  レプリカ:   {} {}",
            status.replica_name,
            "存在しません".yellow()
        );
    }

    let sync = if status.in_sync {
        "同期済み".green()
    } else {
        "未同期".red()
    };
    match (&status.method, &status.reason) {
        (Some(method), Some(reason)) => println!("  状態: {} ({}: {})", sync, method, reason),
        (None, Some(reason)) => println!("  状態: {} ({})", sync, reason),
        _ => println!("  状態: {}", sync),
    }

    if let Some(error) = &status.error {
        println!("  {} {}", "エラー:".red(), error);
    }
}

/// サービスの状態を表示（読み取りのみ）
pub async fn handle(config: &StandbyConfig, service: Option<&str>, json: bool) -> anyhow::Result<()> {
    let definitions = select(config, service)?;
    let runtime = docker::connect_with_error_handling().await?;
    let reconciler = Reconciler::new(runtime, &config.settings);

    let mut statuses = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let replica_name = definition.effective_replica_name();
        let status = if !definition.enabled {
            ServiceStatus::unavailable(&definition.name, &replica_name, "disabled")
        } else {
            match definition.resolve(&config.settings) {
                Ok(spec) => reconciler.status(&spec).await,
                Err(e) => ServiceStatus::unavailable(&definition.name, &replica_name, e),
            }
        };
        statuses.push(status);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("{}", "サービスが定義されていません".dimmed());
    }
    for (i, status) in statuses.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_status(status);
    }
    Ok(())
}
