//! Test utilities shared by unit tests.

pub mod fixtures;

pub use fixtures::{FakeProbe, ProjectFixture};
