//! Record types: conversion requests, responses, and audit logs.
//!
//! Records are plain data. Nested records (`ConversionResponse::query`,
//! `ConversionLog::request`/`response`) are value-copies taken at the time
//! the outer record was built; they never re-read the original.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{RecordId, RecordKind};

/// Terms-of-use reference attached to example responses.
pub const TERMS_URL: &str = "https://exchangerate.host/terms";

/// Privacy-policy reference attached to example responses.
pub const PRIVACY_URL: &str = "https://exchangerate.host/privacy";

/// Capability: the record exposes a stable id.
///
/// By-id store operations are defined only for types implementing this.
pub trait Identifiable {
    fn id(&self) -> &RecordId;

    fn set_id(&mut self, id: RecordId);
}

/// A record that can flow through queues and be persisted by any backend.
pub trait Record:
    Identifiable + Clone + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: RecordKind;
}

/// A request to convert `amount` units of `from` into `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    #[serde(default)]
    pub id: RecordId,
    pub from: String,
    pub to: String,
    pub amount: f64,
}

impl ConversionRequest {
    /// Create an unstored request (empty id).
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: f64) -> Self {
        Self {
            id: RecordId::empty(),
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

/// Rate information returned with a response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Quote time in Unix seconds.
    pub timestamp: i64,
    pub quote: f64,
}

/// The answer to a [`ConversionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResponse {
    #[serde(default)]
    pub id: RecordId,
    pub success: bool,
    pub terms: String,
    pub privacy: String,
    /// Snapshot of the request at response time.
    pub query: ConversionRequest,
    pub info: Info,
    pub result: f64,
}

impl ConversionResponse {
    /// A successful conversion: `result = quote * amount`.
    pub fn success(query: ConversionRequest, info: Info) -> Self {
        let result = info.quote * query.amount;
        Self {
            id: RecordId::empty(),
            success: true,
            terms: TERMS_URL.to_string(),
            privacy: PRIVACY_URL.to_string(),
            query,
            info,
            result,
        }
    }

    /// A failed conversion with a zero result.
    pub fn failure(query: ConversionRequest, info: Info) -> Self {
        Self {
            id: RecordId::empty(),
            success: false,
            terms: TERMS_URL.to_string(),
            privacy: PRIVACY_URL.to_string(),
            query,
            info,
            result: 0.0,
        }
    }
}

/// Audit entry pairing one request with its response, by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionLog {
    #[serde(default)]
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub request: ConversionRequest,
    pub response: ConversionResponse,
}

impl ConversionLog {
    /// Create an unstored log stamped with the current time.
    pub fn new(request: ConversionRequest, response: ConversionResponse) -> Self {
        Self::at(Utc::now(), request, response)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        request: ConversionRequest,
        response: ConversionResponse,
    ) -> Self {
        Self {
            id: RecordId::empty(),
            timestamp,
            request,
            response,
        }
    }
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl Identifiable for $ty {
            fn id(&self) -> &RecordId {
                &self.id
            }

            fn set_id(&mut self, id: RecordId) {
                self.id = id;
            }
        }

        impl Record for $ty {
            const KIND: RecordKind = $kind;
        }
    };
}

impl_record!(ConversionRequest, RecordKind::Request);
impl_record!(ConversionResponse, RecordKind::Response);
impl_record!(ConversionLog, RecordKind::Log);

impl fmt::Display for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request: Id={}, From={}, To={}, Amount={:.2}",
            self.id, self.from, self.to, self.amount
        )
    }
}

impl fmt::Display for ConversionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response: Id={}, Success={}, Result={:.2}",
            self.id, self.success, self.result
        )
    }
}

impl fmt::Display for ConversionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Log: Id={}, Timestamp={}, RequestFrom={}, ResponseResult={:.2}",
            self.id,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.request.from,
            self.response.result
        )
    }
}
