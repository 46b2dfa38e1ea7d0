use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • DOCKER_HOST の設定を確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error("コンテナ '{container}' は既に停止しています")]
    ContainerAlreadyStopped { container: String },

    #[error("コンテナ名 '{container}' は既に使用されています")]
    ContainerNameConflict { container: String },

    #[error(
        "イメージ '{image}' が見つかりません\n\nヒント:\n  • プライマリのイメージがローカルから削除されていないか確認してください"
    )]
    ImageNotFound { image: String },

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("コンテナ '{container}' でのコマンド実行に失敗しました: {message}")]
    ExecFailed { container: String, message: String },

    #[error("コンテナ '{container}' でのコマンド実行がタイムアウトしました（{timeout_ms}ms）")]
    ExecTimeout { container: String, timeout_ms: u128 },
}

impl ContainerError {
    /// 対象が存在しないことを示すエラーか
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::ContainerNotFound { .. })
    }

    /// bollard のエラーを対象コンテナ名付きで変換
    pub(crate) fn from_docker(err: bollard::errors::Error, container: &str) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => ContainerError::ContainerNotFound {
                container: container.to_string(),
            },
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            } => ContainerError::ContainerAlreadyStopped {
                container: container.to_string(),
            },
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            } => ContainerError::ContainerNameConflict {
                container: container.to_string(),
            },
            _ => err.into(),
        }
    }
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        // 接続エラーの可能性をチェック
        let err_str = err.to_string();
        if err_str.contains("Connection refused")
            || err_str.contains("No such file or directory")
            || err_str.contains("error trying to connect")
        {
            ContainerError::DockerConnectionFailed(err_str)
        } else {
            ContainerError::DockerApiError(err_str)
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
