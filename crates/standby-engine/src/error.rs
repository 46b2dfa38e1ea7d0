use standby_container::{ContainerError, SynthesisError};
use standby_core::ConfigError;
use thiserror::Error;

/// サービス単位のエラー（ループ全体は止めない）
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("コンテナランタイムの調査に失敗しました: {0}")]
    Inspection(#[from] ContainerError),

    #[error("レプリカの合成に失敗しました: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
