//! # LearnStore Testkit
//!
//! Test utilities for LearnStore.
//!
//! This crate provides:
//! - Store fixtures and sample application data
//! - Property-based test generators using proptest
//! - A crash recovery harness over the journal backend
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use learnstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         let repos = store.repositories();
//!         let sample = scenarios::seed_sample_data(&repos);
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
