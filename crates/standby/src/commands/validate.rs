use colored::Colorize;
use std::path::Path;

pub fn handle(config_path: &Path) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());
    println!(
        "設定ファイル: {}",
        config_path.display().to_string().cyan()
    );

    let config = match standby_core::parse_config_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let settings = &config.settings;
    println!();
    println!("設定:");
    println!("  チェック間隔: {}秒", settings.check_interval.as_secs());
    println!("  ログレベル: {}", settings.log_level);
    println!(
        "  ネットワーク: {}",
        settings.network.as_deref().unwrap_or("(未設定)")
    );
    println!(
        "  ヘルスチェック: タイムアウト {}秒 / リトライ {}回",
        settings.health_timeout.as_secs(),
        settings.health_retries
    );

    println!("  サービス: {}個", config.services.len());
    let mut invalid = 0;
    for definition in &config.services {
        if !definition.enabled {
            println!("    - {} {}", definition.name.cyan(), "(無効)".dimmed());
            continue;
        }
        match definition.resolve(settings) {
            Ok(spec) => {
                let version = spec
                    .version_path
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "(イメージで比較)".to_string());
                println!(
                    "    {} {} (primary: {}, health: {}:{}, version: {}, replica: {})",
                    "✓".green(),
                    spec.name.cyan(),
                    spec.primary_pattern,
                    spec.health_endpoint,
                    spec.health_port,
                    version,
                    spec.replica_name
                );
            }
            Err(e) => {
                invalid += 1;
                println!("    {} {}: {}", "✗".red(), definition.name.cyan(), e);
            }
        }
    }

    println!();
    if invalid > 0 {
        eprintln!(
            "{}",
            format!("✗ {}個のサービスに設定エラーがあります", invalid)
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    Ok(())
}
