//! 照合ループ
//!
//! 一定間隔で全サービスを順番に照合します。
//! 停止要求はサービスの処理と処理の間、および待機中にのみ確認し、
//! 処理中のサービスを中断することはありません。

use crate::reconciler::{Reconciler, ServiceOutcome};
use standby_container::ContainerRuntime;
use standby_core::{StandbyConfig, parse_config_file};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// ループの制御（間隔と停止要求）
pub struct LoopControl {
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl LoopControl {
    pub fn new(interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { interval, shutdown }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// 指定時間待機する。停止要求があれば即座に true を返す
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;

        loop {
            if self.is_shutdown() {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.shutdown.changed()).await {
                Err(_elapsed) => return self.is_shutdown(),
                Ok(Ok(())) => continue,
                // 送信側がいなくなったら通常の待機のみ
                Ok(Err(_)) => {
                    tokio::time::sleep_until(deadline).await;
                    return self.is_shutdown();
                }
            }
        }
    }
}

/// 次のサイクルまでの待機
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPlan {
    Idle(Duration),
    /// 間隔を超過した（待機なしで次へ）
    Overrun { by: Duration },
}

impl SleepPlan {
    pub fn duration(&self) -> Duration {
        match self {
            Self::Idle(d) => *d,
            Self::Overrun { .. } => Duration::ZERO,
        }
    }
}

/// `interval - elapsed`（0未満にはならない）
pub fn next_sleep(interval: Duration, elapsed: Duration) -> SleepPlan {
    if elapsed <= interval {
        SleepPlan::Idle(interval - elapsed)
    } else {
        SleepPlan::Overrun {
            by: elapsed - interval,
        }
    }
}

/// 次の待機を決め、超過していればそのサイクルについて1回だけ警告する
fn pace(interval: Duration, elapsed: Duration) -> SleepPlan {
    let plan = next_sleep(interval, elapsed);
    if let SleepPlan::Overrun { by } = plan {
        tracing::warn!(
            interval_secs = interval.as_secs_f64(),
            overrun_ms = by.as_millis() as u64,
            "Cycle took longer than the check interval, starting next cycle immediately"
        );
    }
    plan
}

/// 毎サイクル設定を読み直すための供給元
pub trait ConfigSource: Send {
    fn load(&self) -> standby_core::Result<StandbyConfig>;
}

/// 設定ファイルから読む
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> standby_core::Result<StandbyConfig> {
        parse_config_file(&self.path)
    }
}

/// 1サイクルの集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub processed: usize,
    pub disabled: usize,
    pub failed: usize,
    pub actions: usize,
    /// 停止要求で途中終了した
    pub interrupted: bool,
}

/// `Scheduler::run` の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    /// 間隔を超過し、待機せずに次へ進んだ回数
    pub overruns: u64,
    /// 次のサイクルまで待機した回数
    pub idle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Primary,
    Replica,
}

/// ヘルス状態の遷移をログに出すためだけの記録
#[derive(Debug, Default)]
struct HealthTracker {
    last: HashMap<(String, Role), bool>,
}

impl HealthTracker {
    fn record(&mut self, service: &str, role: Role, container: &str, healthy: bool) {
        let previous = self.last.insert((service.to_string(), role), healthy);
        match previous {
            Some(was) if was != healthy => {
                if healthy {
                    tracing::info!(service = %service, container = %container, role = ?role, "Became healthy");
                } else {
                    tracing::warn!(service = %service, container = %container, role = ?role, "Became unhealthy");
                }
            }
            None if !healthy => {
                tracing::warn!(service = %service, container = %container, role = ?role, "Unhealthy");
            }
            _ => {}
        }
    }

    fn observe(&mut self, outcome: &ServiceOutcome) {
        let observation = &outcome.observation;
        if let Some(primary) = &observation.primary {
            self.record(
                &outcome.service,
                Role::Primary,
                &primary.container.name,
                primary.health.healthy,
            );
        }
        // 作り直した場合は作成後の確認結果を優先する
        let replica_health = outcome
            .verification
            .as_ref()
            .map(|v| v.healthy)
            .or_else(|| observation.replica.as_ref().map(|r| r.health.healthy));
        let replica_name = outcome
            .replica
            .as_ref()
            .map(|r| r.replica.name.as_str())
            .or_else(|| observation.replica.as_ref().map(|r| r.container.name.as_str()));
        if let (Some(healthy), Some(name)) = (replica_health, replica_name) {
            self.record(&outcome.service, Role::Replica, name, healthy);
        }
    }

    /// 設定から消えたサービスの記録を捨てる
    fn retain(&mut self, config: &StandbyConfig) {
        self.last
            .retain(|(service, _), _| config.service(service).is_some_and(|s| s.enabled));
    }
}

pub struct Scheduler<S: ConfigSource> {
    runtime: Arc<dyn ContainerRuntime>,
    source: S,
    config: StandbyConfig,
    health: HealthTracker,
}

impl<S: ConfigSource> Scheduler<S> {
    /// `initial` は起動時に読み込み済みの設定
    pub fn new(runtime: Arc<dyn ContainerRuntime>, source: S, initial: StandbyConfig) -> Self {
        Self {
            runtime,
            source,
            config: initial,
            health: HealthTracker::default(),
        }
    }

    pub fn config(&self) -> &StandbyConfig {
        &self.config
    }

    /// 設定を読み直す。失敗したら前回の設定を使い続ける
    fn refresh_config(&mut self) {
        match self.source.load() {
            Ok(config) => {
                if config.settings.check_interval != self.config.settings.check_interval {
                    tracing::info!(
                        interval_secs = config.settings.check_interval.as_secs_f64(),
                        "Check interval changed"
                    );
                }
                self.config = config;
                self.health.retain(&self.config);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reload configuration, keeping previous configuration");
            }
        }
    }

    /// 全サービスを1回ずつ照合する
    pub async fn run_cycle(&mut self, control: &LoopControl) -> CycleReport {
        self.refresh_config();

        let mut report = CycleReport::default();
        let reconciler = Reconciler::new(self.runtime.clone(), &self.config.settings);

        for definition in &self.config.services {
            if control.is_shutdown() {
                tracing::info!("Shutdown requested, stopping before next service");
                report.interrupted = true;
                break;
            }

            if !definition.enabled {
                tracing::debug!(service = %definition.name, "Service disabled, skipping");
                report.disabled += 1;
                continue;
            }

            report.processed += 1;

            let spec = match definition.resolve(&self.config.settings) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(service = %definition.name, error = %e, "Invalid service configuration, skipping");
                    report.failed += 1;
                    continue;
                }
            };

            match reconciler.reconcile(&spec).await {
                Ok(outcome) => {
                    if outcome.replica.is_some() {
                        report.actions += 1;
                    }
                    self.health.observe(&outcome);
                }
                Err(e) => {
                    tracing::warn!(service = %spec.name, error = %e, "Sync failed");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            processed = report.processed,
            disabled = report.disabled,
            failed = report.failed,
            actions = report.actions,
            "Cycle finished"
        );
        report
    }

    /// 停止要求があるまでサイクルを繰り返す
    pub async fn run(mut self, mut control: LoopControl) -> RunSummary {
        tracing::info!(
            services = self.config.services.len(),
            interval_secs = control.interval().as_secs_f64(),
            "Starting reconciliation loop"
        );

        let mut summary = RunSummary::default();
        loop {
            let started = Instant::now();
            let report = self.run_cycle(&control).await;
            summary.cycles += 1;
            if report.interrupted || control.is_shutdown() {
                break;
            }

            control.set_interval(self.config.settings.check_interval);
            match pace(control.interval(), started.elapsed()) {
                SleepPlan::Overrun { .. } => summary.overruns += 1,
                SleepPlan::Idle(duration) => {
                    summary.idle += 1;
                    if control.sleep(duration).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            overruns = summary.overruns,
            "Reconciliation loop stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sleep_remaining() {
        let plan = next_sleep(Duration::from_secs(60), Duration::from_secs(12));
        assert_eq!(plan, SleepPlan::Idle(Duration::from_secs(48)));
        assert_eq!(plan.duration(), Duration::from_secs(48));
    }

    #[test]
    fn test_next_sleep_exact_interval() {
        let plan = next_sleep(Duration::from_secs(60), Duration::from_secs(60));
        assert_eq!(plan, SleepPlan::Idle(Duration::ZERO));
    }

    #[test]
    fn test_next_sleep_overrun_is_zero() {
        let plan = next_sleep(Duration::from_secs(60), Duration::from_secs(75));
        assert_eq!(
            plan,
            SleepPlan::Overrun {
                by: Duration::from_secs(15)
            }
        );
        assert_eq!(plan.duration(), Duration::ZERO);
    }

    #[test]
    fn test_pace_returns_plan_it_logged() {
        let interval = Duration::from_millis(1);
        assert_eq!(
            pace(interval, Duration::from_millis(11)),
            SleepPlan::Overrun {
                by: Duration::from_millis(10)
            }
        );
        assert_eq!(pace(interval, Duration::ZERO), SleepPlan::Idle(interval));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut control = LoopControl::new(Duration::from_secs(60), rx);

        let handle = tokio::spawn(async move { control.sleep(Duration::from_secs(60)).await });
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_shutdown() {
        let (_tx, rx) = watch::channel(false);
        let mut control = LoopControl::new(Duration::from_millis(10), rx);
        assert!(!control.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_sleep_survives_dropped_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let mut control = LoopControl::new(Duration::from_millis(10), rx);
        assert!(!control.sleep(Duration::from_millis(10)).await);
    }

    #[test]
    fn test_health_tracker_records_transitions() {
        let mut tracker = HealthTracker::default();
        tracker.record("api", Role::Primary, "api-1", true);
        tracker.record("api", Role::Primary, "api-1", false);
        assert_eq!(tracker.last.get(&("api".to_string(), Role::Primary)), Some(&false));

        let config = StandbyConfig::default();
        tracker.retain(&config);
        assert!(tracker.last.is_empty());
    }
}
