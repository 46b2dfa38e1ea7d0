//! KDLパーサー
//!
//! standby.kdl をパースして StandbyConfig を生成します。
//! サービスブロックの型不一致はファイル全体のエラーにせず、
//! そのサービスの `problems` に記録します（resolve 時に ConfigError になる）。

use crate::error::{ConfigError, Result};
use crate::model::{LogLevel, PrimarySelection, ServiceDefinition, Settings, StandbyConfig};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// KDLファイルをパース
pub fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<StandbyConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config_str(&content)?;
    tracing::debug!(
        path = %path.display(),
        services = config.services.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// KDL文字列をパース
pub fn parse_config_str(content: &str) -> Result<StandbyConfig> {
    let doc: KdlDocument = content.parse()?;
    let mut config = StandbyConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "settings" => {
                if let Some(children) = node.children() {
                    config.settings = parse_settings(children)?;
                }
            }
            "service" => {
                let index = config.services.len() + 1;
                let mut service = parse_service(node, index);
                // 後から定義された同名サービスだけを無効にする
                if config.service(&service.name).is_some() {
                    service
                        .problems
                        .push("同じ名前のサービスが複数定義されています".to_string());
                }
                config.services.push(service);
            }
            other => {
                tracing::debug!(node = %other, "Ignoring unknown top-level node");
            }
        }
    }

    Ok(config)
}

/// settings ブロックをパース
fn parse_settings(doc: &KdlDocument) -> Result<Settings> {
    let mut settings = Settings::default();

    for node in doc.nodes() {
        let key = node.name().value();
        match key {
            "check_interval" => settings.check_interval = settings_duration(node)?,
            "health_timeout" => settings.health_timeout = settings_duration(node)?,
            "retry_delay" => settings.retry_delay = settings_duration(node)?,
            "settle_delay" => settings.settle_delay = settings_duration(node)?,
            "verify_delay" => settings.verify_delay = settings_duration(node)?,
            "log_level" => {
                let value = settings_string(node)?;
                settings.log_level = LogLevel::parse(value).ok_or_else(|| {
                    ConfigError::InvalidSettings(format!(
                        "log_level は debug|info|warn|error のいずれかです: {}",
                        value
                    ))
                })?;
            }
            "network" => settings.network = Some(settings_string(node)?.to_string()),
            "primary_selection" => {
                let value = settings_string(node)?;
                settings.primary_selection = PrimarySelection::parse(value).ok_or_else(|| {
                    ConfigError::InvalidSettings(format!(
                        "primary_selection は oldest|newest のいずれかです: {}",
                        value
                    ))
                })?;
            }
            "health_retries" => {
                let value = first_value(node)
                    .and_then(KdlValue::as_integer)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| {
                        ConfigError::InvalidSettings(
                            "health_retries は 0 以上の整数で指定してください".to_string(),
                        )
                    })?;
                settings.health_retries = value;
            }
            "replica_labels" => {
                settings.replica_labels.clear();
                if let Some(labels) = node.children() {
                    for label in labels.nodes() {
                        let value = first_value(label)
                            .and_then(KdlValue::as_string)
                            .unwrap_or("")
                            .to_string();
                        settings
                            .replica_labels
                            .insert(label.name().value().to_string(), value);
                    }
                }
            }
            other => {
                tracing::debug!(key = %other, "Ignoring unknown settings key");
            }
        }
    }

    if settings.check_interval.is_zero() {
        return Err(ConfigError::InvalidSettings(
            "check_interval は 0 より大きい値を指定してください".to_string(),
        ));
    }

    Ok(settings)
}

/// service ノードをパース
///
/// 名前のないブロックは `service#N` として扱い、resolve 時にエラーにする。
fn parse_service(node: &KdlNode, index: usize) -> ServiceDefinition {
    let mut service = match first_value(node).and_then(KdlValue::as_string) {
        Some(name) => ServiceDefinition::new(name),
        None => {
            let mut service = ServiceDefinition::new(format!("service#{}", index));
            service
                .problems
                .push("service には名前が必要です".to_string());
            service
        }
    };

    let Some(children) = node.children() else {
        return service;
    };

    for child in children.nodes() {
        let key = child.name().value();
        match key {
            "primary" | "primary_pattern" => service.primary = string_field(&mut service.problems, child),
            "health_endpoint" => service.health_endpoint = string_field(&mut service.problems, child),
            "version_path" => service.version_path = string_field(&mut service.problems, child),
            "replica_name" => service.replica_name = string_field(&mut service.problems, child),
            "network" => service.network = string_field(&mut service.problems, child),
            "health_port" => match first_value(child).and_then(KdlValue::as_integer) {
                Some(port) => service.health_port = Some(port),
                None => service
                    .problems
                    .push("health_port は整数で指定してください".to_string()),
            },
            "enabled" => match first_value(child).and_then(KdlValue::as_bool) {
                Some(enabled) => service.enabled = enabled,
                None => service
                    .problems
                    .push("enabled は #true または #false で指定してください".to_string()),
            },
            other => {
                tracing::debug!(service = %service.name, key = %other, "Ignoring unknown service key");
            }
        }
    }

    service
}

fn first_value(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn string_field(problems: &mut Vec<String>, node: &KdlNode) -> Option<String> {
    match first_value(node).and_then(KdlValue::as_string) {
        Some(value) => Some(value.to_string()),
        None => {
            problems.push(format!(
                "{} は文字列で指定してください",
                node.name().value()
            ));
            None
        }
    }
}

fn settings_string(node: &KdlNode) -> Result<&str> {
    first_value(node)
        .and_then(KdlValue::as_string)
        .ok_or_else(|| {
            ConfigError::InvalidSettings(format!(
                "{} は文字列で指定してください",
                node.name().value()
            ))
        })
}

fn settings_duration(node: &KdlNode) -> Result<Duration> {
    first_value(node).and_then(parse_duration).ok_or_else(|| {
        ConfigError::InvalidSettings(format!(
            "{} は秒数（整数）または \"500ms\" / \"30s\" / \"2m\" の形式で指定してください",
            node.name().value()
        ))
    })
}

/// 整数は秒として扱う。文字列は ms / s / m の単位付き。
fn parse_duration(value: &KdlValue) -> Option<Duration> {
    if let Some(secs) = value.as_integer() {
        return u64::try_from(secs).ok().map(Duration::from_secs);
    }

    let s = value.as_string()?.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    s.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests;
