//! Shared fixtures for worker integration tests

pub mod fakes;

pub use fakes::{FakeRecommendations, FakeRemoteLibrary};
