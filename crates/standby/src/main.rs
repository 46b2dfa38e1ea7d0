mod commands;
mod docker;

use clap::{Parser, Subcommand};
use colored::Colorize;
use standby_core::{LogLevel, StandbyConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "standby")]
#[command(about = "プライマリと同期したフェイルオーバー用レプリカを維持する", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は STANDBY_CONFIG_PATH → ./standby.kdl の順に探す）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 照合ループを起動（Ctrl-C / SIGTERM で停止）
    Run,
    /// 全サービスを1回だけ照合して終了
    Check,
    /// サービスの状態を表示
    Status {
        /// サービス名（指定しない場合は全サービス）
        service: Option<String>,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// レプリカを削除し、次のサイクルで作り直させる
    Sync {
        /// サービス名
        service: String,
    },
    /// 設定を検証
    Validate,
    /// バージョン情報を表示
    Version,
}

/// ログを初期化（RUST_LOG が設定されていればそちらを優先）
fn init_logging(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter_str()));

    // stdout は status --json などの出力に使う
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(config: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => standby_core::find_config_file().map_err(|e| {
            eprintln!("{}", "✗ 設定ファイルが見つかりません".red().bold());
            e.into()
        }),
    }
}

/// 設定を読み込み、その log_level でログを初期化する
fn load(config: Option<PathBuf>) -> anyhow::Result<(PathBuf, StandbyConfig)> {
    let path = resolve_config_path(config)?;
    let config = standby_core::parse_config_file(&path)?;
    init_logging(config.settings.log_level);
    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok((path, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // 設定ファイル不要
        Commands::Version => {
            println!("standby {}", env!("CARGO_PKG_VERSION"));
        }
        // 読み込みエラー自体を表示する
        Commands::Validate => {
            let path = resolve_config_path(cli.config)?;
            commands::validate::handle(&path)?;
        }
        Commands::Run => {
            let (path, config) = load(cli.config)?;
            commands::run::handle(&path, config).await?;
        }
        Commands::Check => {
            let (path, config) = load(cli.config)?;
            commands::run::handle_once(&path, config).await?;
        }
        Commands::Status { service, json } => {
            let (_, config) = load(cli.config)?;
            commands::status::handle(&config, service.as_deref(), json).await?;
        }
        Commands::Sync { service } => {
            let (_, config) = load(cli.config)?;
            commands::sync::handle(&config, &service).await?;
        }
    }

    Ok(())
}
