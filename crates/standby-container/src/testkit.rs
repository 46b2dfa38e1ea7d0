//! テスト用のインメモリランタイム
//!
//! `#[cfg(test)]`（単体テスト）または `testkit` フィーチャ（他クレートの結合テスト）で有効。

use crate::error::{ContainerError, Result};
use crate::model::{ContainerDetails, ContainerImageSpec, ContainerSummary, ExecOutput, ReplicaRequest};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// FakeRuntime 内のコンテナ
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub created: i64,
    pub running: bool,
    pub image_id: Option<String>,
    pub spec: ContainerImageSpec,
}

impl FakeContainer {
    pub fn running(name: &str, image: &str, image_id: &str) -> Self {
        Self {
            id: format!("{}-id", name),
            name: name.to_string(),
            created: 0,
            running: true,
            image_id: Some(image_id.to_string()),
            spec: ContainerImageSpec {
                image: image.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn stopped(self) -> Self {
        Self {
            running: false,
            ..self
        }
    }

    pub fn created_at(self, created: i64) -> Self {
        Self { created, ..self }
    }

    pub fn with_spec(self, spec: ContainerImageSpec) -> Self {
        Self {
            spec: spec.normalize(),
            ..self
        }
    }
}

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    /// イメージ参照 → ダイジェスト
    images: HashMap<String, String>,
    /// コンテナ名 → (ステータス, 本文)
    health: HashMap<String, (u16, String)>,
    calls: Vec<String>,
    created: Vec<ReplicaRequest>,
    unreachable: bool,
    reject_create: bool,
    next_id: u64,
}

impl FakeState {
    fn find(&self, name_or_id: &str) -> Option<&FakeContainer> {
        self.containers
            .get(name_or_id)
            .or_else(|| self.containers.values().find(|c| c.id == name_or_id))
    }

    fn find_mut(&mut self, name_or_id: &str) -> Option<&mut FakeContainer> {
        if self.containers.contains_key(name_or_id) {
            return self.containers.get_mut(name_or_id);
        }
        self.containers.values_mut().find(|c| c.id == name_or_id)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            Err(ContainerError::DockerConnectionFailed(
                "connection refused (fake)".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// インメモリの ContainerRuntime
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, container: FakeContainer) {
        let mut state = self.lock();
        if let Some(image_id) = &container.image_id {
            state
                .images
                .insert(container.spec.image.clone(), image_id.clone());
        }
        state.containers.insert(container.name.clone(), container);
    }

    /// ヘルスエンドポイントの応答を設定（コンテナ作成前でも可）
    pub fn set_health(&self, name: &str, status: u16, body: &str) {
        self.lock()
            .health
            .insert(name.to_string(), (status, body.to_string()));
    }

    pub fn clear_health(&self, name: &str) {
        self.lock().health.remove(name);
    }

    /// イメージ参照に対応するダイジェストを設定
    pub fn set_image_digest(&self, image: &str, digest: &str) {
        self.lock()
            .images
            .insert(image.to_string(), digest.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_reject_create(&self, reject: bool) {
        self.lock().reject_create = reject;
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// 記録された全呼び出し（例: "inspect:api-failover"）
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// 状態を変更する呼び出しのみ
    pub fn mutation_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.starts_with("stop:")
                    || c.starts_with("remove:")
                    || c.starts_with("create:")
                    || c.starts_with("start:")
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// create に渡されたリクエスト
    pub fn created_requests(&self) -> Vec<ReplicaRequest> {
        self.lock().created.clone()
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        self.record("ping".to_string());
        self.lock().check_reachable()
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>> {
        self.record("list_running".to_string());
        let state = self.lock();
        state.check_reachable()?;
        Ok(state
            .containers
            .values()
            .filter(|c| c.running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                created: c.created,
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerDetails> {
        self.record(format!("inspect:{}", name));
        let state = self.lock();
        state.check_reachable()?;
        let container = state
            .find(name)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: name.to_string(),
            })?;
        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.name.clone(),
            running: container.running,
            image_id: container.image_id.clone(),
            spec: container.spec.clone(),
        })
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop:{}", name));
        let mut state = self.lock();
        state.check_reachable()?;
        let container = state
            .find_mut(name)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: name.to_string(),
            })?;
        if !container.running {
            return Err(ContainerError::ContainerAlreadyStopped {
                container: name.to_string(),
            });
        }
        container.running = false;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("remove:{}", name));
        let mut state = self.lock();
        state.check_reachable()?;
        let key = state
            .find(name)
            .map(|c| c.name.clone())
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: name.to_string(),
            })?;
        state.containers.remove(&key);
        Ok(())
    }

    async fn create(&self, request: &ReplicaRequest) -> Result<String> {
        self.record(format!("create:{}", request.name));
        let mut state = self.lock();
        state.check_reachable()?;
        if state.reject_create {
            return Err(ContainerError::DockerApiError(
                "container creation rejected (fake)".to_string(),
            ));
        }
        if state.containers.contains_key(&request.name) {
            return Err(ContainerError::ContainerNameConflict {
                container: request.name.clone(),
            });
        }

        state.next_id += 1;
        let id = format!("{}-id-{}", request.name, state.next_id);
        // Docker と同じく、ID 指定ならそのイメージ、参照指定なら現在のタグ先
        let image_id = match request.image_id.as_ref().filter(|id| !id.is_empty()) {
            Some(id) => Some(id.clone()),
            None => state.images.get(&request.spec.image).cloned(),
        };
        let created = 1_000 + state.next_id as i64;
        let spec = ContainerImageSpec {
            labels: request.effective_labels(),
            ..request.spec.clone()
        };

        state.created.push(request.clone());
        state.containers.insert(
            request.name.clone(),
            FakeContainer {
                id: id.clone(),
                name: request.name.clone(),
                created,
                running: false,
                image_id,
                spec,
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.record(format!("start:{}", id));
        let mut state = self.lock();
        state.check_reachable()?;
        let container = state
            .find_mut(id)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: id.to_string(),
            })?;
        container.running = true;
        Ok(())
    }

    async fn exec(&self, name: &str, _cmd: Vec<String>, _timeout: Duration) -> Result<ExecOutput> {
        self.record(format!("exec:{}", name));
        let state = self.lock();
        state.check_reachable()?;
        let container = state
            .find(name)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: name.to_string(),
            })?;
        if !container.running {
            return Err(ContainerError::ExecFailed {
                container: name.to_string(),
                message: "container is not running".to_string(),
            });
        }

        Ok(match state.health.get(&container.name) {
            Some((status, body)) => ExecOutput {
                exit_code: Some(0),
                stdout: format!("{}\n{}", body, status),
                stderr: String::new(),
            },
            // curl: (7) Failed to connect
            None => ExecOutput {
                exit_code: Some(7),
                stdout: "\n000".to_string(),
                stderr: String::new(),
            },
        })
    }
}
