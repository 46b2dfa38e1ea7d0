//! ヘルス＆バージョンプローブ
//!
//! ヘルスエンドポイントへの HTTP GET を対象コンテナ内から実行します
//! （ホスト側のプロキシやDNSを経由しない）。
//! 失敗はすべて「unhealthy」または `VersionToken::Absent` に畳み込まれ、
//! 呼び出し側にエラーとして伝播しません。

use crate::error::ContainerError;
use crate::runtime::ContainerRuntime;
use standby_core::FieldPath;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// バージョントークン
///
/// `Absent` はどの値とも（`Absent` 同士でも）等しくない。
/// 誤って比較しないよう `PartialEq` は実装しない。比較は [`versions_equal`] を使う。
#[derive(Debug, Clone)]
pub enum VersionToken {
    Known(String),
    Absent,
}

impl VersionToken {
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Self::Known(v),
            _ => Self::Absent,
        }
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(v) => Some(v),
            Self::Absent => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => f.write_str(v),
            Self::Absent => f.write_str("unknown"),
        }
    }
}

/// 両方が既知でバイト単位で一致する場合のみ true
pub fn versions_equal(a: &VersionToken, b: &VersionToken) -> bool {
    match (a, b) {
        (VersionToken::Known(a), VersionToken::Known(b)) => a.as_bytes() == b.as_bytes(),
        _ => false,
    }
}

/// プローブ結果
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: VersionToken,
}

impl HealthResult {
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            version: VersionToken::Absent,
        }
    }
}

/// リトライ設定
///
/// `multiplier` が 1.0 のとき固定間隔。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// 初回の試行に加えて `retries` 回リトライする
    pub fn from_retries(retries: u32, delay: Duration) -> Self {
        Self::fixed(retries.saturating_add(1), delay)
    }

    /// n回目（0始まり）の試行後の待機時間
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let delay = self.delay.mul_f64(factor);
        delay.min(self.max_delay.max(self.delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

/// ヘルスエンドポイントのHTTPレスポンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// プローブの失敗（呼び出し側には伝播しない）
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("コンテナ内でのリクエスト実行に失敗しました: {0}")]
    Exec(#[from] ContainerError),

    #[error("コンテナ内に curl / wget がありません")]
    NoHttpClient,

    #[error("ヘルスエンドポイントに接続できません (exit code: {exit_code:?})")]
    Transport { exit_code: Option<i64> },

    #[error("プローブ出力を解釈できません: {0}")]
    MalformedOutput(String),
}

/// コンテナ内で実行する HTTP GET コマンドを組み立てる
///
/// curl があれば本文の後に改行とステータスコードを出力する。
/// curl がなく wget のみの場合、成功時に 200 を付与する（wget は 2xx 以外で失敗する）。
pub fn build_probe_command(endpoint: &str, port: u16, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    let url = shell_escape(&format!("http://localhost:{}{}", port, endpoint));
    let script = format!(
        "if command -v curl >/dev/null 2>&1; then \
         curl -s -m {secs} -w '\\n%{{http_code}}' {url}; \
         elif command -v wget >/dev/null 2>&1; then \
         wget -q -T {secs} -O - {url} && printf '\\n200'; \
         else exit 127; fi"
    );
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// プローブコマンドの出力を解釈する
pub fn parse_probe_output(output: &crate::model::ExecOutput) -> Result<HttpResponse, ProbeError> {
    if output.exit_code == Some(127) {
        return Err(ProbeError::NoHttpClient);
    }

    let Some((body, code)) = output.stdout.rsplit_once('\n') else {
        return Err(ProbeError::Transport {
            exit_code: output.exit_code,
        });
    };

    let status = code
        .trim()
        .parse::<u16>()
        .map_err(|_| ProbeError::MalformedOutput(format!("ステータスコード: {:?}", code)))?;

    // curl は接続失敗時に 000 を出力する
    if status == 0 {
        return Err(ProbeError::Transport {
            exit_code: output.exit_code,
        });
    }

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

/// レスポンス本文からバージョンを取り出す
///
/// 本文が空・JSONでない・フィールドがない・null のいずれも `Absent`。
pub fn extract_version(body: &str, path: &FieldPath) -> VersionToken {
    let body = body.trim();
    if body.is_empty() {
        return VersionToken::Absent;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => VersionToken::from_option(path.extract_token(&json)),
        Err(_) => VersionToken::Absent,
    }
}

/// シェル用にエスケープ
fn shell_escape(s: &str) -> String {
    // シングルクォートでラップしてエスケープ
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// ヘルス＆バージョンプローブ
#[derive(Clone)]
pub struct HealthProbe {
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Duration,
}

impl HealthProbe {
    /// exec 自体のタイムアウトに加える余裕
    const EXEC_GRACE: Duration = Duration::from_secs(2);

    pub fn new(runtime: Arc<dyn ContainerRuntime>, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// コンテナ内から HTTP GET を実行
    pub async fn http_get(
        &self,
        name: &str,
        endpoint: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<HttpResponse, ProbeError> {
        let cmd = build_probe_command(endpoint, port, timeout);
        let output = self
            .runtime
            .exec(name, cmd, timeout + Self::EXEC_GRACE)
            .await?;
        parse_probe_output(&output)
    }

    /// 2xx なら true。それ以外・通信失敗はすべて false
    pub async fn check_health(&self, name: &str, endpoint: &str, port: u16, timeout: Duration) -> bool {
        match self.http_get(name, endpoint, port, timeout).await {
            Ok(response) => {
                if !response.is_success() {
                    tracing::debug!(container = %name, status = response.status, "Health endpoint returned non-2xx");
                }
                response.is_success()
            }
            Err(e) => {
                tracing::debug!(container = %name, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// 失敗時のみリトライ。使い切ったら false
    pub async fn check_health_with_retry(
        &self,
        name: &str,
        endpoint: &str,
        port: u16,
        timeout: Duration,
        policy: &RetryPolicy,
    ) -> bool {
        let attempts = policy.attempts.max(1);
        for attempt in 0..attempts {
            if self.check_health(name, endpoint, port, timeout).await {
                return true;
            }

            // 最後の試行でなければ待機
            if attempt + 1 < attempts {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    container = %name,
                    attempt = attempt + 1,
                    of = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Health check failed, retrying"
                );
                sleep(delay).await;
            }
        }
        false
    }

    /// ヘルスレスポンスからバージョンを読む
    pub async fn read_version(&self, name: &str, endpoint: &str, port: u16, path: &FieldPath) -> VersionToken {
        match self.http_get(name, endpoint, port, self.timeout).await {
            Ok(response) => extract_version(&response.body, path),
            Err(e) => {
                tracing::debug!(container = %name, error = %e, "Version probe failed");
                VersionToken::Absent
            }
        }
    }

    /// 1回のリクエストでヘルスとバージョンを取得
    pub async fn probe(
        &self,
        name: &str,
        endpoint: &str,
        port: u16,
        path: Option<&FieldPath>,
    ) -> HealthResult {
        match self.http_get(name, endpoint, port, self.timeout).await {
            Ok(response) => HealthResult {
                healthy: response.is_success(),
                version: path
                    .map(|p| extract_version(&response.body, p))
                    .unwrap_or(VersionToken::Absent),
            },
            Err(e) => {
                tracing::debug!(container = %name, error = %e, "Health probe failed");
                HealthResult::unhealthy()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecOutput;

    fn output(exit_code: i64, stdout: &str) -> ExecOutput {
        ExecOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_versions_equal_absent_never_equal() {
        assert!(!versions_equal(&VersionToken::Absent, &VersionToken::Absent));
        assert!(!versions_equal(
            &VersionToken::Absent,
            &VersionToken::Known("1.0".to_string())
        ));
        assert!(!versions_equal(
            &VersionToken::Known("1.0".to_string()),
            &VersionToken::Absent
        ));
    }

    #[test]
    fn test_versions_equal_known() {
        let a = VersionToken::Known("1.0.0".to_string());
        assert!(versions_equal(&a, &VersionToken::Known("1.0.0".to_string())));
        // セマンティックバージョンとしての比較はしない
        assert!(!versions_equal(&a, &VersionToken::Known("1.0".to_string())));
        assert!(!versions_equal(&a, &VersionToken::Known("v1.0.0".to_string())));
    }

    #[test]
    fn test_version_token_from_option() {
        assert!(VersionToken::from_option(None).as_known().is_none());
        assert!(VersionToken::from_option(Some(String::new())).as_known().is_none());
        assert_eq!(
            VersionToken::from_option(Some("2.3.0".to_string())).as_known(),
            Some("2.3.0")
        );
    }

    #[test]
    fn test_parse_probe_output_success() {
        let response = parse_probe_output(&output(0, "{\"version\":\"2.3.0\"}\n200")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"version\":\"2.3.0\"}");
        assert!(response.is_success());
    }

    #[test]
    fn test_parse_probe_output_empty_body() {
        let response = parse_probe_output(&output(0, "\n204")).unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.body, "");
    }

    #[test]
    fn test_parse_probe_output_non_2xx() {
        let response = parse_probe_output(&output(0, "Service Unavailable\n503")).unwrap();
        assert!(!response.is_success());
    }

    #[test]
    fn test_parse_probe_output_transport_failures() {
        assert!(matches!(
            parse_probe_output(&output(7, "\n000")),
            Err(ProbeError::Transport { .. })
        ));
        assert!(matches!(
            parse_probe_output(&output(8, "")),
            Err(ProbeError::Transport { .. })
        ));
        assert!(matches!(
            parse_probe_output(&output(127, "")),
            Err(ProbeError::NoHttpClient)
        ));
        assert!(matches!(
            parse_probe_output(&output(0, "body\nnot-a-code")),
            Err(ProbeError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_extract_version_degrades_to_absent() {
        let path = FieldPath::parse(".version").unwrap();
        assert_eq!(extract_version(r#"{"version":"1.1.0"}"#, &path).as_known(), Some("1.1.0"));
        assert!(!extract_version("", &path).is_known());
        assert!(!extract_version("OK", &path).is_known());
        assert!(!extract_version(r#"{"status":"ok"}"#, &path).is_known());
        assert!(!extract_version(r#"{"version":null}"#, &path).is_known());
    }

    #[test]
    fn test_build_probe_command() {
        let cmd = build_probe_command("/health", 3000, Duration::from_secs(5));
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert!(cmd[2].contains("curl -s -m 5"));
        assert!(cmd[2].contains("'http://localhost:3000/health'"));
        assert!(cmd[2].contains("wget -q -T 5"));
    }

    #[test]
    fn test_build_probe_command_minimum_timeout() {
        let cmd = build_probe_command("/", 80, Duration::from_millis(200));
        assert!(cmd[2].contains("-m 1 "));
    }

    #[test]
    fn test_retry_policy_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_policy_from_retries_adds_initial_attempt() {
        assert_eq!(RetryPolicy::from_retries(0, Duration::ZERO).attempts, 1);
        assert_eq!(RetryPolicy::from_retries(3, Duration::ZERO).attempts, 4);
        assert_eq!(RetryPolicy::from_retries(u32::MAX, Duration::ZERO).attempts, u32::MAX);
    }

    #[test]
    fn test_retry_policy_backoff_capped() {
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10000),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("hello"), "'hello'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }
}
