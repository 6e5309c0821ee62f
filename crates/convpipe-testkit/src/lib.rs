//! # Convpipe Testkit
//!
//! Testing utilities for the conversion pipeline.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Generators**: Proptest strategies for records and their parameters
//! - **Fixtures**: Scratch storage, a shared output sink for the reporter,
//!   and deliberately slow repositories for cancellation tests
//!
//! End-to-end scenarios live in this crate's `tests/` directory.
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use convpipe_testkit::generators::{records_from_params, ConversionParams};
//!
//! proptest! {
//!     #[test]
//!     fn log_copies_request(params: ConversionParams) {
//!         let (request, _, log) = records_from_params(&params);
//!         prop_assert_eq!(log.request, request);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use convpipe_testkit::fixtures::StorageFixture;
//!
//! let fixture = StorageFixture::new().unwrap();
//! let repos = fixture.open_files().unwrap();
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{parse_lines, SharedOutput, SlowFixture, SlowRepository, StorageFixture};
pub use generators::{records_from_params, ConversionParams};
