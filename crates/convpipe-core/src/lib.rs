//! # Convpipe Core
//!
//! Plain record types for the conversion pipeline. No I/O, no storage.
//!
//! ## Key Types
//!
//! - [`ConversionRequest`] - A requested currency conversion
//! - [`ConversionResponse`] - The answer, carrying a snapshot of its request
//! - [`ConversionLog`] - Audit entry pairing a request and response by value
//! - [`RecordId`] - Opaque id assigned by a store at creation
//! - [`Record`] - Capability every stored type implements

pub mod error;
pub mod record;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use record::{
    ConversionLog, ConversionRequest, ConversionResponse, Identifiable, Info, Record,
    PRIVACY_URL, TERMS_URL,
};
pub use types::{RecordId, RecordKind};
pub use validation::{validate_currency, validate_request};
