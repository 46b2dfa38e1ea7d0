//! 設定ファイルの発見

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "standby.kdl";
pub const CONFIG_PATH_ENV: &str = "STANDBY_CONFIG_PATH";

/// standby の設定ディレクトリ（~/.config/standby）
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("standby"))
}

/// カレントディレクトリを起点に standby.kdl を探す
pub fn find_config_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_config_file_from(&current_dir)
}

/// standby.kdl を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STANDBY_CONFIG_PATH (直接パス指定)
/// 2. 起点ディレクトリ: standby.kdl
/// 3. 起点ディレクトリの .standby/standby.kdl
/// 4. ~/.config/standby/standby.kdl (グローバル設定)
pub fn find_config_file_from(start: &Path) -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            path = %path.display(),
            "{} points to a missing file, falling back to search",
            CONFIG_PATH_ENV
        );
    }

    let candidates = [
        start.join(CONFIG_FILE_NAME),
        start.join(".standby").join(CONFIG_FILE_NAME),
    ];
    if let Some(found) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(found);
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join(CONFIG_FILE_NAME);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_in_start_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("standby.kdl"), "// test").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file_from(temp_dir.path()).unwrap();
            assert_eq!(found, temp_dir.path().join("standby.kdl"));
        });
    }

    #[test]
    fn test_find_in_hidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let hidden = temp_dir.path().join(".standby");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("standby.kdl"), "// hidden").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file_from(temp_dir.path()).unwrap();
            assert!(found.ends_with(".standby/standby.kdl"));
        });
    }

    #[test]
    fn test_start_dir_has_priority_over_hidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let hidden = temp_dir.path().join(".standby");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("standby.kdl"), "// hidden").unwrap();
        fs::write(temp_dir.path().join("standby.kdl"), "// visible").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file_from(temp_dir.path()).unwrap();
            assert_eq!(found, temp_dir.path().join("standby.kdl"));
        });
    }

    #[test]
    fn test_env_var_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.kdl");
        fs::write(&custom, "// custom").unwrap();
        fs::write(temp_dir.path().join("standby.kdl"), "// default").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(custom.as_os_str()), || {
            let found = find_config_file_from(temp_dir.path()).unwrap();
            assert_eq!(found, custom);
        });
    }

    #[test]
    fn test_env_var_pointing_to_missing_file_falls_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("standby.kdl"), "// default").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some("/nonexistent/standby.kdl"), || {
            let found = find_config_file_from(temp_dir.path()).unwrap();
            assert_eq!(found, temp_dir.path().join("standby.kdl"));
        });
    }

    #[test]
    fn test_config_dir_ends_with_standby() {
        if let Ok(dir) = get_config_dir() {
            assert!(dir.ends_with("standby"));
        }
    }
}
