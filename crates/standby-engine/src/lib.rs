//! standby の照合エンジン
//!
//! プライマリを見つけてヘルスとバージョンを調べ、フェイルオーバー用レプリカが
//! 古くなっていれば作り直します。

pub mod decision;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod status;

pub use decision::*;
pub use error::*;
pub use reconciler::*;
pub use scheduler::*;
pub use status::*;
