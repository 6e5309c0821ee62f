//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, Info};

/// Generate a three-letter uppercase currency code.
pub fn currency_code() -> impl Strategy<Value = String> {
    "[A-Z]{3}".prop_map(String::from)
}

/// Generate two different currency codes.
pub fn currency_pair() -> impl Strategy<Value = (String, String)> {
    (currency_code(), currency_code()).prop_filter("currencies must differ", |(a, b)| a != b)
}

/// Generate a valid (positive, finite) amount.
pub fn amount() -> impl Strategy<Value = f64> {
    0.01f64..1.0e9
}

/// Generate a quote rate.
pub fn quote() -> impl Strategy<Value = f64> {
    0.0001f64..1.0e4
}

/// Generate a reasonable Unix timestamp in seconds.
pub fn timestamp_secs() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800
}

/// Generate a valid, unstored request.
pub fn request() -> impl Strategy<Value = ConversionRequest> {
    (currency_pair(), amount())
        .prop_map(|((from, to), amount)| ConversionRequest::new(from, to, amount))
}

/// Parameters for generating one request/response/log triple.
#[derive(Debug, Clone)]
pub struct ConversionParams {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub quote: f64,
    pub timestamp: i64,
    pub success: bool,
}

impl Arbitrary for ConversionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (currency_pair(), amount(), quote(), timestamp_secs(), any::<bool>())
            .prop_map(|((from, to), amount, quote, timestamp, success)| ConversionParams {
                from,
                to,
                amount,
                quote,
                timestamp,
                success,
            })
            .boxed()
    }
}

impl ConversionParams {
    fn at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Build unstored records from parameters.
pub fn records_from_params(
    params: &ConversionParams,
) -> (ConversionRequest, ConversionResponse, ConversionLog) {
    let request = ConversionRequest::new(params.from.clone(), params.to.clone(), params.amount);
    let info = Info {
        timestamp: params.timestamp,
        quote: params.quote,
    };
    let response = if params.success {
        ConversionResponse::success(request.clone(), info)
    } else {
        ConversionResponse::failure(request.clone(), info)
    };
    let log = ConversionLog::at(params.at(), request.clone(), response.clone());
    (request, response, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convpipe_core::validate_request;

    proptest! {
        #[test]
        fn test_generated_requests_validate(req in request()) {
            prop_assert!(validate_request(&req).is_ok());
            prop_assert!(req.id.is_empty());
        }

        #[test]
        fn test_triples_share_values(params: ConversionParams) {
            let (request, response, log) = records_from_params(&params);

            prop_assert_eq!(&response.query, &request);
            prop_assert_eq!(&log.request, &request);
            prop_assert_eq!(&log.response, &response);
            if !params.success {
                prop_assert_eq!(response.result, 0.0);
            }
        }
    }
}
