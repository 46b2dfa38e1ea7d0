//! Docker Engine API 実装（bollard）

use crate::converter::{details_from_inspect, replica_to_create_body};
use crate::error::{ContainerError, Result};
use crate::model::{ContainerDetails, ContainerSummary, ExecOutput, ReplicaRequest};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures_util::stream::StreamExt;
use std::time::Duration;

/// bollard 経由で Docker を操作するランタイム
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルのDockerに接続して疎通を確認
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        let runtime = Self::new(docker);
        runtime.ping().await?;
        Ok(runtime)
    }

    async fn run_exec(&self, name: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        let exec_config = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let message = self
            .docker
            .create_exec(name, exec_config)
            .await
            .map_err(|e| ContainerError::from_docker(e, name))?;

        let mut output = ExecOutput::default();

        match self
            .docker
            .start_exec(&message.id, Some(StartExecOptions::default()))
            .await?
        {
            StartExecResults::Attached {
                output: mut stream,
                ..
            } => {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                            output.stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            output.stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdIn { .. }) => {}
                        Err(e) => {
                            return Err(ContainerError::ExecFailed {
                                container: name.to_string(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ContainerError::ExecFailed {
                    container: name.to_string(),
                    message: "exec がデタッチモードで開始されました".to_string(),
                });
            }
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        output.exit_code = inspect.exit_code;

        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())?;
                Some(ContainerSummary {
                    id,
                    name,
                    created: c.created.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerDetails> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| ContainerError::from_docker(e, name))?;
        Ok(details_from_inspect(name, inspect))
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
            .map_err(|e| ContainerError::from_docker(e, name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ContainerError::from_docker(e, name))
    }

    async fn create(&self, request: &ReplicaRequest) -> Result<String> {
        let options = CreateContainerOptionsBuilder::default()
            .name(&request.name)
            .build();
        let body = replica_to_create_body(request);

        match self.docker.create_container(Some(options), body).await {
            Ok(response) => {
                for warning in &response.warnings {
                    tracing::warn!(container = %request.name, "Docker: {}", warning);
                }
                Ok(response.id)
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::ImageNotFound {
                image: request.spec.image.clone(),
            }),
            Err(e) => Err(ContainerError::from_docker(e, &request.name)),
        }
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| ContainerError::from_docker(e, id))
    }

    async fn exec(&self, name: &str, cmd: Vec<String>, timeout: Duration) -> Result<ExecOutput> {
        tokio::time::timeout(timeout, self.run_exec(name, cmd))
            .await
            .map_err(|_| ContainerError::ExecTimeout {
                container: name.to_string(),
                timeout_ms: timeout.as_millis(),
            })?
    }
}
