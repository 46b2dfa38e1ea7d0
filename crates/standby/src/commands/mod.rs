pub mod run;
pub mod status;
pub mod sync;
pub mod validate;
