//! 設定モデル
//!
//! KDL形式：
//! ```kdl
//! settings {
//!     check_interval 60
//!     network "proxy"
//!     // 指定すると既定のラベルを置き換える
//!     replica_labels {
//!         coolify.managed "false"
//!         com.docker.compose.project "standby"
//!     }
//! }
//!
//! service "api" {
//!     primary "^api-"
//!     health_endpoint "/health"
//!     health_port 3000
//!     version_path ".version"
//! }
//! ```

use crate::error::{ConfigError, Result};
use crate::field_path::FieldPath;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// 設定ファイル全体
#[derive(Debug, Clone, Default)]
pub struct StandbyConfig {
    pub settings: Settings,
    pub services: Vec<ServiceDefinition>,
}

impl StandbyConfig {
    /// 名前でサービス定義を検索
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}

/// ログレベル
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// tracing の EnvFilter ディレクティブ
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

/// パターンに複数のコンテナが一致した場合の選択ポリシー
///
/// どちらも「最も健全なもの」を意味しない。作成日時が同じ場合は名前順。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimarySelection {
    /// 作成日時が最も古いもの
    #[default]
    Oldest,
    /// 作成日時が最も新しいもの
    Newest,
}

impl PrimarySelection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "oldest" | "first" => Some(Self::Oldest),
            "newest" | "last" => Some(Self::Newest),
            _ => None,
        }
    }
}

/// 全体設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub check_interval: Duration,
    pub log_level: LogLevel,
    /// レプリカを接続するネットワーク（サービス側で上書き可能）
    pub network: Option<String>,
    pub primary_selection: PrimarySelection,
    pub health_timeout: Duration,
    /// 初回のヘルスチェックが失敗した後のリトライ回数（試行は最大 1 + health_retries 回）
    pub health_retries: u32,
    pub retry_delay: Duration,
    /// 削除から作成までの待機時間
    pub settle_delay: Duration,
    /// 作成後ヘルスチェックまでの待機時間
    pub verify_delay: Duration,
    /// レプリカに追加するラベル（プラットフォームの管理対象外にする）
    ///
    /// プライマリから複製したラベルに上書きで追加される。既定値は Coolify の
    /// `coolify.managed` を false にするだけなので、他のプラットフォームの管理ラベル
    /// （`com.docker.compose.*` など）は `replica_labels` ブロックで上書きすること。
    pub replica_labels: BTreeMap<String, String>,
}

impl Settings {
    pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

    pub fn default_replica_labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("coolify.managed".to_string(), "false".to_string()),
            ("standby.managed".to_string(), "false".to_string()),
            ("standby.role".to_string(), "replica".to_string()),
        ])
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval: Self::DEFAULT_CHECK_INTERVAL,
            log_level: LogLevel::Info,
            network: None,
            primary_selection: PrimarySelection::Oldest,
            health_timeout: Duration::from_secs(5),
            health_retries: 3,
            retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
            verify_delay: Duration::from_secs(5),
            replica_labels: Self::default_replica_labels(),
        }
    }
}

/// 設定ファイルから読み込んだままのサービス定義（未検証）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub primary: Option<String>,
    pub health_endpoint: Option<String>,
    pub health_port: Option<i128>,
    pub version_path: Option<String>,
    pub replica_name: Option<String>,
    pub network: Option<String>,
    pub enabled: bool,
    /// パース中に見つかった型不一致など
    pub problems: Vec<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: None,
            health_endpoint: None,
            health_port: None,
            version_path: None,
            replica_name: None,
            network: None,
            enabled: true,
            problems: Vec::new(),
        }
    }

    /// レプリカ名（未指定なら `<name>-failover`）
    pub fn effective_replica_name(&self) -> String {
        self.replica_name
            .clone()
            .unwrap_or_else(|| format!("{}-failover", self.name))
    }

    /// 検証して ServiceSpec に変換
    pub fn resolve(&self, settings: &Settings) -> Result<ServiceSpec> {
        let name = self.name.as_str();

        if let Some(problem) = self.problems.first() {
            return Err(ConfigError::service(name, problem.clone()));
        }

        let pattern = self
            .primary
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::service(name, "primary パターンが指定されていません"))?;
        let primary_pattern = Regex::new(pattern).map_err(|e| {
            ConfigError::service(name, format!("primary パターンが不正です: {}", e))
        })?;

        let health_endpoint = self
            .health_endpoint
            .clone()
            .ok_or_else(|| ConfigError::service(name, "health_endpoint が指定されていません"))?;
        if !health_endpoint.starts_with('/') {
            return Err(ConfigError::service(
                name,
                format!(
                    "health_endpoint は '/' で始まる必要があります: {}",
                    health_endpoint
                ),
            ));
        }
        if health_endpoint.chars().any(|c| c.is_whitespace() || c == '\'') {
            return Err(ConfigError::service(
                name,
                format!("health_endpoint に使用できない文字があります: {}", health_endpoint),
            ));
        }

        let port = self
            .health_port
            .ok_or_else(|| ConfigError::service(name, "health_port が指定されていません"))?;
        let health_port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                ConfigError::service(name, format!("health_port が範囲外です: {}", port))
            })?;

        let version_path = self
            .version_path
            .as_deref()
            .map(FieldPath::parse)
            .transpose()
            .map_err(|e| ConfigError::service(name, e.to_string()))?;

        let network = self
            .network
            .clone()
            .or_else(|| settings.network.clone())
            .ok_or_else(|| {
                ConfigError::service(name, "network が指定されていません（settings またはサービス）")
            })?;

        let replica_name = self.effective_replica_name();

        Ok(ServiceSpec {
            name: self.name.clone(),
            primary_pattern,
            health_endpoint,
            health_port,
            version_path,
            replica_name,
            network,
            enabled: self.enabled,
        })
    }
}

/// 検証済みのサービス定義
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub primary_pattern: Regex,
    pub health_endpoint: String,
    pub health_port: u16,
    pub version_path: Option<FieldPath>,
    pub replica_name: String,
    pub network: String,
    pub enabled: bool,
}
