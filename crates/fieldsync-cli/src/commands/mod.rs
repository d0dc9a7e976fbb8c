pub mod admin;
pub mod common;
pub mod completions;
pub mod device;
pub mod status;
pub mod sync;
