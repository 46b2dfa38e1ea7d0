use super::*;
use std::time::Duration;

#[test]
fn test_parse_full_config() {
    let kdl = r#"
        settings {
            check_interval 30
            log_level "debug"
            network "proxy"
            primary_selection "newest"
            health_timeout "1500ms"
            health_retries 5
            retry_delay "1s"
            settle_delay 3
            verify_delay "1m"
        }

        service "api" {
            primary "^api-[a-z0-9]+$"
            health_endpoint "/health"
            health_port 3000
            version_path ".version"
            replica_name "api-standby"
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    let settings = &config.settings;
    assert_eq!(settings.check_interval, Duration::from_secs(30));
    assert_eq!(settings.log_level, LogLevel::Debug);
    assert_eq!(settings.network.as_deref(), Some("proxy"));
    assert_eq!(settings.primary_selection, PrimarySelection::Newest);
    assert_eq!(settings.health_timeout, Duration::from_millis(1500));
    assert_eq!(settings.health_retries, 5);
    assert_eq!(settings.retry_delay, Duration::from_secs(1));
    assert_eq!(settings.settle_delay, Duration::from_secs(3));
    assert_eq!(settings.verify_delay, Duration::from_secs(60));

    assert_eq!(config.services.len(), 1);
    let api = config.service("api").unwrap();
    assert_eq!(api.primary.as_deref(), Some("^api-[a-z0-9]+$"));
    assert_eq!(api.health_endpoint.as_deref(), Some("/health"));
    assert_eq!(api.health_port, Some(3000));
    assert_eq!(api.version_path.as_deref(), Some(".version"));
    assert_eq!(api.replica_name.as_deref(), Some("api-standby"));
    assert!(api.enabled);
    assert!(api.problems.is_empty());

    let spec = api.resolve(settings).unwrap();
    assert_eq!(spec.replica_name, "api-standby");
    assert_eq!(spec.version_path.unwrap().as_str(), ".version");
}

#[test]
fn test_parse_defaults_without_settings() {
    let kdl = r#"
        service "web" {
            primary "web"
            health_endpoint "/"
            health_port 80
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert_eq!(config.settings, Settings::default());
    assert_eq!(config.service_names(), vec!["web"]);
}

#[test]
fn test_parse_disabled_service() {
    let kdl = r#"
        service "worker" {
            primary "worker"
            health_endpoint "/ping"
            health_port 8080
            enabled #false
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert!(!config.service("worker").unwrap().enabled);
}

#[test]
fn test_malformed_service_does_not_fail_file() {
    let kdl = r#"
        settings {
            network "proxy"
        }
        service "broken" {
            primary "broken"
            health_endpoint "/health"
            health_port "not-a-port"
        }
        service "ok" {
            primary "ok"
            health_endpoint "/health"
            health_port 8080
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert_eq!(config.services.len(), 2);

    let broken = config.service("broken").unwrap();
    assert_eq!(broken.problems.len(), 1);
    assert!(broken.resolve(&config.settings).is_err());

    let ok = config.service("ok").unwrap();
    assert!(ok.resolve(&config.settings).is_ok());
}

#[test]
fn test_parse_replica_labels_replace_defaults() {
    let kdl = r#"
        settings {
            replica_labels {
                coolify.managed "false"
                traefik.enable "true"
            }
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    let labels = &config.settings.replica_labels;
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.get("coolify.managed"), Some(&"false".to_string()));
    assert_eq!(labels.get("traefik.enable"), Some(&"true".to_string()));
    assert!(!labels.contains_key("standby.role"));
}

#[test]
fn test_parse_invalid_log_level() {
    let kdl = r#"
        settings {
            log_level "verbose"
        }
    "#;

    let result = parse_config_str(kdl);
    assert!(matches!(result, Err(ConfigError::InvalidSettings(_))));
}

#[test]
fn test_parse_zero_interval_rejected() {
    let kdl = r#"
        settings {
            check_interval 0
        }
    "#;

    assert!(parse_config_str(kdl).is_err());
}

#[test]
fn test_duplicate_service_only_invalidates_later_block() {
    let kdl = r#"
        settings {
            network "proxy"
        }
        service "api" {
            primary "^api-"
            health_endpoint "/health"
            health_port 3000
        }
        service "web" {
            primary "^web-"
            health_endpoint "/health"
            health_port 8080
        }
        service "web" {
            primary "^web2-"
            health_endpoint "/health"
            health_port 8081
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert_eq!(config.services.len(), 3);

    assert!(config.services[0].resolve(&config.settings).is_ok());
    assert!(config.services[1].resolve(&config.settings).is_ok());

    let duplicate = &config.services[2];
    let err = duplicate.resolve(&config.settings).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidService { .. }));
    assert!(err.to_string().contains("複数定義"));

    // 名前での検索は最初の定義を返す
    assert_eq!(
        config.service("web").unwrap().primary.as_deref(),
        Some("^web-")
    );
}

#[test]
fn test_nameless_service_gets_placeholder_name() {
    let kdl = r#"
        settings {
            network "proxy"
        }
        service "api" {
            primary "^api-"
            health_endpoint "/health"
            health_port 3000
        }
        service {
            primary "^orphan-"
            health_endpoint "/health"
            health_port 9000
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert_eq!(config.service_names(), vec!["api", "service#2"]);

    assert!(config.service("api").unwrap().resolve(&config.settings).is_ok());

    let nameless = config.service("service#2").unwrap();
    let err = nameless.resolve(&config.settings).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidService { .. }));
    assert!(err.to_string().contains("名前が必要"));
}

#[test]
fn test_parse_huge_minute_duration_rejected() {
    let kdl = r#"
        settings {
            check_interval "999999999999999999m"
        }
    "#;

    let result = parse_config_str(kdl);
    assert!(matches!(result, Err(ConfigError::InvalidSettings(_))));
}

#[test]
fn test_parse_syntax_error() {
    let result = parse_config_str("service \"api\" {");
    assert!(matches!(result, Err(ConfigError::KdlParse(_))));
}

#[test]
fn test_unknown_nodes_ignored() {
    let kdl = r#"
        traefik {
            entrypoint "web"
        }
        service "api" {
            primary "api"
            health_endpoint "/health"
            health_port 3000
            labels "ignored"
        }
    "#;

    let config = parse_config_str(kdl).unwrap();
    assert_eq!(config.services.len(), 1);
    assert!(config.services[0].problems.is_empty());
}

#[test]
fn test_parse_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("standby.kdl");
    std::fs::write(
        &path,
        r#"
        service "api" {
            primary "api"
            health_endpoint "/health"
            health_port 3000
        }
        "#,
    )
    .unwrap();

    let config = parse_config_file(&path).unwrap();
    assert_eq!(config.service_names(), vec!["api"]);
}

#[test]
fn test_parse_config_file_missing() {
    let result = parse_config_file("/nonexistent/standby.kdl");
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}
