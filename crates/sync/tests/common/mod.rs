#![allow(dead_code)]

pub mod fakes;
pub mod harness;

#[allow(unused_imports)]
pub use fakes::{FakeRemote, FixedTransport, HangingTransport, MemorySource, StallingIndex};
#[allow(unused_imports)]
pub use harness::{Harness, can_bind_localhost, drain};
