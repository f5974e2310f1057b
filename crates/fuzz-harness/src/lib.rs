//! Road Risk Fuzz Harness
//!
//! Shared property-based testing infrastructure for the workspace.
//! Provides location strategies, random small road networks, damage masks,
//! and hand-built fixture networks with known answers.
//!
//! # Usage
//!
//! ```rust
//! use fuzz_harness::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_fuzz_test(raw in road_grid(4)) {
//!         prop_assert!(!raw.waypoints.is_empty());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use proptest::prelude::*;
}

// Re-export proptest for convenience
pub use proptest;
