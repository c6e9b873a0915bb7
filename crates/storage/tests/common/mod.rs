pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{sample_job, state_dir};
