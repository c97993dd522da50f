//! The `{status, data, error}` primitive shared by every entity slice.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::error::ApiError;
use tracing::debug;

/// Identifies one request signal; completions carry the id of the request they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncStatus {
    #[default]
    Idle,
    Loading,
    Done,
    Error,
    /// A request was interrupted without a completion, e.g. by a restart.
    Abort,
}

/// What happens to previously loaded data when a slice starts a request or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPolicy {
    Clear,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct AsyncSlice<T> {
    pub status: AsyncStatus,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    #[serde(skip)]
    in_flight: Option<RequestId>,
}

impl<T> Default for AsyncSlice<T> {
    fn default() -> Self {
        Self {
            status: AsyncStatus::Idle,
            data: None,
            error: None,
            in_flight: None,
        }
    }
}

impl<T> AsyncSlice<T> {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn done(data: T) -> Self {
        Self {
            status: AsyncStatus::Done,
            data: Some(data),
            error: None,
            in_flight: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == AsyncStatus::Loading
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        self.in_flight == Some(id)
    }

    pub fn begin(&mut self, id: RequestId, policy: DataPolicy) {
        self.status = AsyncStatus::Loading;
        self.error = None;
        self.in_flight = Some(id);
        if policy == DataPolicy::Clear {
            self.data = None;
        }
    }

    pub fn resolve(&mut self, id: RequestId, data: T) -> bool {
        if !self.accepts(id, "success") {
            return false;
        }
        self.status = AsyncStatus::Done;
        self.data = Some(data);
        self.error = None;
        self.in_flight = None;
        true
    }

    pub fn reject(&mut self, id: RequestId, error: ApiError, policy: DataPolicy) -> bool {
        if !self.accepts(id, "failure") {
            return false;
        }
        self.status = AsyncStatus::Error;
        self.error = Some(error);
        self.in_flight = None;
        if policy == DataPolicy::Clear {
            self.data = None;
        }
        true
    }

    pub fn release(&mut self, id: RequestId) -> bool {
        if !self.accepts(id, "release") {
            return false;
        }
        self.status = if self.data.is_some() {
            AsyncStatus::Done
        } else {
            AsyncStatus::Idle
        };
        self.error = None;
        self.in_flight = None;
        true
    }

    pub fn cancel(&mut self, id: RequestId) -> bool {
        if !self.accepts(id, "cancel") {
            return false;
        }
        *self = Self::default();
        true
    }

    pub fn succeed(&mut self, data: T) {
        self.status = AsyncStatus::Done;
        self.data = Some(data);
        self.error = None;
    }

    pub fn fail(&mut self, error: ApiError) {
        self.status = AsyncStatus::Error;
        self.error = Some(error);
    }

    pub fn start(&mut self) {
        self.status = AsyncStatus::Loading;
        self.error = None;
    }

    /// Normalizes a slice read back from storage: nothing is in flight after a restart.
    pub fn restored(mut self) -> Self {
        self.in_flight = None;
        if self.status == AsyncStatus::Loading {
            self.status = AsyncStatus::Abort;
        }
        if self.status != AsyncStatus::Error {
            self.error = None;
        }
        self
    }

    fn accepts(&self, id: RequestId, signal: &'static str) -> bool {
        if self.is_current(id) {
            return true;
        }
        debug!(
            request_id = %id,
            in_flight = ?self.in_flight,
            signal,
            "slice: ignoring signal for superseded request"
        );
        false
    }
}

#[cfg(test)]
#[path = "tests/slice_tests.rs"]
mod tests;
