//! Test utilities for stowage.
//!
//! Provides [`MockBackend`], a scriptable in-memory [`Backend`](stowage::Backend)
//! that records every call so tests can assert on exact load and release
//! counts.
//!
//! # Example
//!
//! ```rust
//! use stowage_test_utils::MockBackend;
//!
//! let backend = MockBackend::new()
//!     .fail_first("ui/menu", 1)
//!     .with_components("ui/menu", &["Canvas"]);
//!
//! assert_eq!(backend.load_count("ui/menu"), 0);
//! ```

pub mod mock_backend;

pub use mock_backend::*;
