#![allow(dead_code)]

use standby_container::testkit::{FakeContainer, FakeRuntime};
use standby_container::{ContainerImageSpec, MountKind, MountSpec};
use standby_core::{ServiceDefinition, ServiceSpec, Settings};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const PRIMARY: &str = "api-7f9c2";
pub const REPLICA: &str = "api-failover";

pub fn digest(c: char) -> String {
    format!("sha256:{}", c.to_string().repeat(64))
}

/// 待機時間をすべて0にした設定
pub fn settings() -> Settings {
    Settings {
        network: Some("proxy".to_string()),
        health_retries: 2,
        retry_delay: Duration::ZERO,
        settle_delay: Duration::ZERO,
        verify_delay: Duration::ZERO,
        check_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

pub fn definition(name: &str, version_path: Option<&str>) -> ServiceDefinition {
    ServiceDefinition {
        primary: Some(format!("^{}-", name)),
        health_endpoint: Some("/health".to_string()),
        health_port: Some(3000),
        version_path: version_path.map(str::to_string),
        ..ServiceDefinition::new(name)
    }
}

pub fn service(version_path: Option<&str>) -> ServiceSpec {
    definition("api", version_path).resolve(&settings()).unwrap()
}

pub fn primary_spec() -> ContainerImageSpec {
    ContainerImageSpec {
        image: "registry.example.com/api:2.3.0".to_string(),
        env: vec![
            "PORT=3000".to_string(),
            "DATABASE_URL=postgres://db:5432/app".to_string(),
        ],
        labels: BTreeMap::from([
            ("platform.managed".to_string(), "true".to_string()),
            ("traefik.enable".to_string(), "true".to_string()),
        ]),
        mounts: vec![
            MountSpec {
                kind: MountKind::Volume,
                source: "api-sessions".to_string(),
                destination: "/app/sessions".to_string(),
                mode: "z".to_string(),
                read_only: false,
            },
            MountSpec {
                kind: MountKind::Bind,
                source: "/srv/api/uploads".to_string(),
                destination: "/app/uploads".to_string(),
                mode: String::new(),
                read_only: false,
            },
        ],
    }
    .normalize()
}

pub fn primary(image_digest: &str) -> FakeContainer {
    FakeContainer::running(PRIMARY, "registry.example.com/api:2.3.0", image_digest)
        .created_at(100)
        .with_spec(primary_spec())
}

pub fn replica(image: &str, image_digest: &str) -> FakeContainer {
    FakeContainer::running(REPLICA, image, image_digest).created_at(50)
}

pub fn fake() -> Arc<FakeRuntime> {
    Arc::new(FakeRuntime::new())
}
