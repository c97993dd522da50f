pub mod actions;
pub mod api;
pub mod color;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod persist;
pub mod selectors;
pub mod slice;
pub mod state;
pub mod store;

pub use api::{BuildHook, HttpBuildHook, HttpPhotoApi, PhotoApi};
pub use error::ClientError;
pub use orchestrator::Orchestrator;
pub use persist::{FileStorage, MemoryStorage, SliceStorage};
pub use slice::{AsyncSlice, AsyncStatus, RequestId};
pub use state::AppState;
pub use store::{Store, TokenSource};

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;
