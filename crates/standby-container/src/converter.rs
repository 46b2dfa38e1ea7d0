//! Docker API モデルとの相互変換
//!
//! - inspect 結果 → ContainerDetails（スナップショット）
//! - ReplicaRequest → コンテナ作成ボディ

use crate::model::{ContainerDetails, ContainerImageSpec, MountKind, MountSpec, ReplicaRequest};
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, HostConfig, MountPoint, MountPointTypeEnum,
    RestartPolicy, RestartPolicyNameEnum,
};
use std::collections::{BTreeMap, HashMap};

/// inspect 結果からスナップショットを組み立てる
pub fn details_from_inspect(fallback_name: &str, inspect: ContainerInspectResponse) -> ContainerDetails {
    let name = inspect
        .name
        .as_deref()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| fallback_name.to_string());

    let running = inspect
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false);

    let config = inspect.config.unwrap_or_default();

    let labels: BTreeMap<String, String> = config.labels.unwrap_or_default().into_iter().collect();

    let mounts = inspect
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter_map(mount_from_point)
        .collect();

    let spec = ContainerImageSpec {
        image: config.image.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        labels,
        mounts,
    }
    .normalize();

    ContainerDetails {
        id: inspect.id.unwrap_or_default(),
        name,
        running,
        image_id: inspect.image.filter(|i| !i.is_empty()),
        spec,
    }
}

fn mount_from_point(point: MountPoint) -> Option<MountSpec> {
    let destination = point.destination?;
    let kind = match point.typ {
        Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
        Some(MountPointTypeEnum::TMPFS) => MountKind::Tmpfs,
        _ => MountKind::Bind,
    };
    // ボリュームは名前で、バインドはホストパスで再マウントする
    let source = match kind {
        MountKind::Volume => point.name.or(point.source).unwrap_or_default(),
        MountKind::Bind => point.source.unwrap_or_default(),
        MountKind::Tmpfs => String::new(),
    };
    if kind != MountKind::Tmpfs && source.is_empty() {
        tracing::warn!(destination = %destination, "Skipping mount without source");
        return None;
    }

    Some(MountSpec {
        kind,
        source,
        destination,
        mode: point.mode.unwrap_or_default(),
        read_only: !point.rw.unwrap_or(true),
    })
}

/// マウントを `-v` 形式のバインド文字列に変換
///
/// 例: `/srv/data:/data:ro,z`、`pgdata:/var/lib/postgresql/data`
pub fn mount_to_bind(mount: &MountSpec) -> String {
    let mut options: Vec<&str> = Vec::new();
    if mount.read_only {
        options.push("ro");
    }
    options.extend(
        mount
            .mode
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != "rw" && *m != "ro"),
    );

    if options.is_empty() {
        format!("{}:{}", mount.source, mount.destination)
    } else {
        format!("{}:{}:{}", mount.source, mount.destination, options.join(","))
    }
}

/// ReplicaRequest をコンテナ作成ボディに変換
pub fn replica_to_create_body(request: &ReplicaRequest) -> ContainerCreateBody {
    let spec = &request.spec;

    let binds: Vec<String> = spec
        .mounts
        .iter()
        .filter(|m| m.kind != MountKind::Tmpfs)
        .map(mount_to_bind)
        .collect();

    let tmpfs: HashMap<String, String> = spec
        .mounts
        .iter()
        .filter(|m| m.kind == MountKind::Tmpfs)
        .map(|m| (m.destination.clone(), m.mode.clone()))
        .collect();

    let host_config = HostConfig {
        binds: Some(binds),
        tmpfs: if tmpfs.is_empty() { None } else { Some(tmpfs) },
        network_mode: Some(request.network.clone()),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            maximum_retry_count: None,
        }),
        ..Default::default()
    };

    ContainerCreateBody {
        image: Some(request.image_to_run().to_string()),
        env: Some(spec.env.clone()),
        labels: Some(request.effective_labels().into_iter().collect()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState};

    fn request_with_mounts(mounts: Vec<MountSpec>) -> ReplicaRequest {
        ReplicaRequest {
            name: "api-failover".to_string(),
            spec: ContainerImageSpec {
                image: "ghcr.io/acme/api:2.3.0".to_string(),
                env: vec!["PORT=3000".to_string(), "RUST_LOG=info".to_string()],
                labels: BTreeMap::from([
                    ("traefik.enable".to_string(), "true".to_string()),
                    (
                        "traefik.http.routers.api.rule".to_string(),
                        "Host(`api.example.com`)".to_string(),
                    ),
                ]),
                mounts,
            },
            image_id: None,
            network: "proxy".to_string(),
            extra_labels: BTreeMap::from([("standby.role".to_string(), "replica".to_string())]),
        }
    }

    #[test]
    fn test_create_body_clones_image_env_and_labels() {
        let body = replica_to_create_body(&request_with_mounts(vec![]));

        assert_eq!(body.image, Some("ghcr.io/acme/api:2.3.0".to_string()));
        assert_eq!(
            body.env,
            Some(vec!["PORT=3000".to_string(), "RUST_LOG=info".to_string()])
        );

        let labels = body.labels.unwrap();
        assert_eq!(labels.get("traefik.enable"), Some(&"true".to_string()));
        assert_eq!(labels.get("standby.role"), Some(&"replica".to_string()));
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_create_body_pins_primary_image_id() {
        let request = ReplicaRequest {
            image_id: Some("sha256:aaaa".to_string()),
            ..request_with_mounts(vec![])
        };
        let body = replica_to_create_body(&request);
        assert_eq!(body.image, Some("sha256:aaaa".to_string()));
    }

    #[test]
    fn test_create_body_restart_policy_and_network() {
        let body = replica_to_create_body(&request_with_mounts(vec![]));
        let host_config = body.host_config.unwrap();

        assert_eq!(host_config.network_mode, Some("proxy".to_string()));
        assert_eq!(
            host_config.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        assert_eq!(host_config.binds, Some(vec![]));
        assert!(host_config.tmpfs.is_none());
    }

    #[test]
    fn test_create_body_mounts() {
        let mounts = vec![
            MountSpec {
                kind: MountKind::Bind,
                source: "/srv/api/uploads".to_string(),
                destination: "/app/uploads".to_string(),
                mode: "rw".to_string(),
                read_only: false,
            },
            MountSpec {
                kind: MountKind::Bind,
                source: "/srv/api/config".to_string(),
                destination: "/etc/api".to_string(),
                mode: "z".to_string(),
                read_only: true,
            },
            MountSpec {
                kind: MountKind::Volume,
                source: "api-sessions".to_string(),
                destination: "/var/lib/sessions".to_string(),
                mode: "".to_string(),
                read_only: false,
            },
            MountSpec {
                kind: MountKind::Tmpfs,
                source: String::new(),
                destination: "/tmp/cache".to_string(),
                mode: "size=64m".to_string(),
                read_only: false,
            },
        ];

        let body = replica_to_create_body(&request_with_mounts(mounts));
        let host_config = body.host_config.unwrap();

        let binds = host_config.binds.unwrap();
        assert_eq!(
            binds,
            vec![
                "/srv/api/uploads:/app/uploads".to_string(),
                "/srv/api/config:/etc/api:ro,z".to_string(),
                "api-sessions:/var/lib/sessions".to_string(),
            ]
        );

        let tmpfs = host_config.tmpfs.unwrap();
        assert_eq!(tmpfs.get("/tmp/cache"), Some(&"size=64m".to_string()));
    }

    #[test]
    fn test_details_from_inspect() {
        let inspect = ContainerInspectResponse {
            id: Some("abc123".to_string()),
            name: Some("/api-7f9c".to_string()),
            image: Some("sha256:aaaa".to_string()),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: Some("api:2.3.0".to_string()),
                env: Some(vec!["A=1".to_string()]),
                labels: Some(HashMap::from([
                    ("b".to_string(), "2".to_string()),
                    ("a".to_string(), "1".to_string()),
                ])),
                ..Default::default()
            }),
            mounts: Some(vec![
                MountPoint {
                    typ: Some(MountPointTypeEnum::VOLUME),
                    name: Some("data".to_string()),
                    source: Some("/var/lib/docker/volumes/data/_data".to_string()),
                    destination: Some("/data".to_string()),
                    mode: Some("z".to_string()),
                    rw: Some(true),
                    ..Default::default()
                },
                MountPoint {
                    typ: Some(MountPointTypeEnum::BIND),
                    source: Some("/srv/conf".to_string()),
                    destination: Some("/conf".to_string()),
                    rw: Some(false),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let details = details_from_inspect("api", inspect);
        assert_eq!(details.id, "abc123");
        assert_eq!(details.name, "api-7f9c");
        assert!(details.running);
        assert_eq!(details.image_id, Some("sha256:aaaa".to_string()));
        assert_eq!(details.spec.image, "api:2.3.0");

        let label_keys: Vec<_> = details.spec.labels.keys().cloned().collect();
        assert_eq!(label_keys, vec!["a", "b"]);

        // 宛先パス順に正規化される
        assert_eq!(details.spec.mounts.len(), 2);
        assert_eq!(details.spec.mounts[0].destination, "/conf");
        assert!(details.spec.mounts[0].read_only);
        assert_eq!(details.spec.mounts[1].kind, MountKind::Volume);
        assert_eq!(details.spec.mounts[1].source, "data");
    }

    #[test]
    fn test_details_from_inspect_defaults() {
        let details = details_from_inspect("ghost", ContainerInspectResponse::default());
        assert_eq!(details.name, "ghost");
        assert!(!details.running);
        assert!(details.image_id.is_none());
        assert!(details.spec.mounts.is_empty());
    }
}
