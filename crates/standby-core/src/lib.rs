//! standby の設定モデル
//!
//! 設定ファイル（standby.kdl）の発見・パースと、サービス定義の検証を提供します。

pub mod discovery;
pub mod error;
pub mod field_path;
pub mod model;
pub mod parser;

pub use discovery::*;
pub use error::*;
pub use field_path::FieldPath;
pub use model::*;
pub use parser::{parse_config_file, parse_config_str};

/// 設定ファイルを探して読み込む
pub fn load_config() -> Result<StandbyConfig> {
    let path = find_config_file()?;
    parse_config_file(path)
}
