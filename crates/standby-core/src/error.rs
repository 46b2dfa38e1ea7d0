use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: standby.kdl\n\
        - ./.standby/ ディレクトリ\n\
        - ~/.config/standby/standby.kdl\n\
        または STANDBY_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("設定ファイルを読み込めません: {path}\n理由: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings が不正です: {0}")]
    InvalidSettings(String),

    #[error("サービス '{service}' の設定が不正です: {message}")]
    InvalidService { service: String, message: String },

    #[error("フィールドパス '{path}' が不正です: {message}")]
    InvalidFieldPath { path: String, message: String },
}

impl ConfigError {
    pub(crate) fn service(service: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
