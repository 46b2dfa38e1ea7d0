pub mod converter;
pub mod docker;
pub mod error;
pub mod inspector;
pub mod model;
pub mod probe;
pub mod runtime;
pub mod synthesizer;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use converter::*;
pub use docker::*;
pub use error::*;
pub use inspector::*;
pub use model::*;
pub use probe::*;
pub use runtime::*;
pub use synthesizer::*;
