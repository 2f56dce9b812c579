//! Shared primitives for the Tapline execution engine.
//!
//! Everything here is plain data: identifiers, geometry, the element tree a
//! device reports, and the locate request/provenance types that travel
//! between the compiler, the locator and the cache.

pub mod element;
pub mod geometry;
pub mod locate;
pub mod snapshot;

use thiserror::Error;
use uuid::Uuid;

pub use element::{ElementNode, ElementTree, ResolvedElement};
pub use geometry::{Bbox, Point, Rect, Size};
pub use locate::{HitBy, LocateParams};
pub use snapshot::PageSnapshot;

/// Errors raised while building shared primitives.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("invalid bounding box {0:?}: right/bottom must not precede left/top")]
    InvalidBbox(Bbox),
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one driver run; shared by every dump the run produces.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
        assert_ne!(RunId::new(), RunId::new());
    }
}
