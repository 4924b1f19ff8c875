//! Message types for PromQL API responses
//!
//! The backend answers GET /api/v1/query?query=rate(http_requests[1m]) with something like:
//!
//! {
//!   status: "success"
//!   data: {
//!     resultType: "vector",
//!     result: [
//!       {
//!         metric: { source_id: "0f1c...", status_code: "200", .. },
//!         value: [ 1535779665000000000, "271323437" ]
//!       }
//!     ]
//!   }
//! }
//!
//! and /api/v1/query_range with `resultType: "matrix"`, where each result entry
//! carries `values: [[ts, val], ..]` instead of a single `value`.
//!
//! The type of the entries depends on `resultType`, so the `data` object is decoded
//! generically first, and each entry is then decoded as the variant the tag names.

use crate::Error;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, DeserializeOwned},
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    num::ParseFloatError,
    str::FromStr,
};
use tracing::warn;

/// Metric labels, as a sorted map of label name to label value
pub type Labels = BTreeMap<String, String>;

/// A numeric token exactly as the backend sent it.
///
/// The backend sends timestamps as JSON numbers and sample values as JSON strings
/// (`"NaN"` and `"+Inf"` included). Nanosecond timestamps have 19 digits, more than
/// an f64 can hold, so the text is kept verbatim and converted only on demand.
/// Serializing writes the token back in the same form it was read.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DecimalToken {
    text: String,
    quoted: bool,
}

impl DecimalToken {
    /// A token which serializes as a bare JSON number. Fails if `text` is not a JSON number.
    pub fn number(text: impl Into<String>) -> Result<Self, Error> {
        let text = text.into();
        serde_json::Number::from_str(&text)?;
        Ok(Self {
            text,
            quoted: false,
        })
    }

    /// A token which serializes as a JSON string. Fails if `text` is not numeric.
    pub fn string(text: impl Into<String>) -> Result<Self, Error> {
        let text = text.into();
        text.parse::<f64>()
            .map_err(|err| Error::InvalidRequest(format!("not a numeric string {text:?}: {err}")))?;
        Ok(Self { text, quoted: true })
    }

    /// The token text, byte-for-byte as received
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True if the token was a JSON string rather than a JSON number
    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// Lossy conversion to f64. Understands `NaN` and `+Inf`.
    pub fn to_f64(&self) -> Result<f64, ParseFloatError> {
        self.text.parse()
    }

    /// Exact conversion to a decimal, for anything that fits in 28 significant digits
    pub fn to_decimal(&self) -> Result<Decimal, rust_decimal::Error> {
        Decimal::from_str(&self.text).or_else(|_| Decimal::from_scientific(&self.text))
    }

    /// Interpret the token as unix seconds, with an optional fractional part
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let decimal = self.to_decimal().ok()?;
        let secs = decimal.floor();
        let nanos = ((decimal - secs) * Decimal::from(1_000_000_000u32))
            .trunc()
            .to_u32()?;
        DateTime::from_timestamp(secs.to_i64()?, nanos)
    }
}

impl Display for DecimalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for DecimalToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Going through Value keeps the original digits (serde_json arbitrary_precision)
        match Value::deserialize(deserializer)? {
            Value::Number(num) => Ok(Self {
                text: num.to_string(),
                quoted: false,
            }),
            Value::String(text) => {
                if text.parse::<f64>().is_err() {
                    return Err(de::Error::custom(format!("not a numeric string: {text:?}")));
                }
                Ok(Self { text, quoted: true })
            }
            other => Err(de::Error::custom(format!(
                "expected a number or numeric string, found {other}"
            ))),
        }
    }
}

impl Serialize for DecimalToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.quoted {
            serializer.serialize_str(&self.text)
        } else {
            serde_json::Number::from_str(&self.text)
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer)
        }
    }
}

/// A `[timestamp, value]` pair
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Point(pub DecimalToken, pub DecimalToken);

impl Point {
    /// The timestamp of this point
    pub fn timestamp(&self) -> &DecimalToken {
        &self.0
    }

    /// The sample value of this point
    pub fn value(&self) -> &DecimalToken {
        &self.1
    }
}

/// A single labelled value, member of a `vector` result
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Sample {
    /// The metric labels
    #[serde(default)]
    pub metric: Labels,
    /// The timestamp and value
    pub value: Point,
}

/// A labelled sequence of values, member of a `matrix` result
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Series {
    /// The metric labels
    #[serde(default)]
    pub metric: Labels,
    /// The timestamp/value pairs, in time order
    #[serde(default)]
    pub values: Vec<Point>,
}

/// The data payload of a query response.
///
/// Serializes as `{"resultType": "vector" | "matrix", "result": [...]}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "resultType", content = "result", rename_all = "camelCase")]
pub enum QueryData {
    /// Result from an instant query (single value per series)
    Vector(Vec<Sample>),
    /// Result from a range query (multiple values per series)
    Matrix(Vec<Series>),
}

impl QueryData {
    /// Decode from an already parsed `data` object, dispatching on its `resultType`.
    /// A missing or null `result` is an empty result.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawData {
            result_type: String,
            #[serde(default)]
            result: Option<Vec<Value>>,
        }

        let raw: RawData = serde_json::from_value(value)?;
        let entries = raw.result.unwrap_or_default();
        match raw.result_type.as_str() {
            "vector" => Ok(Self::Vector(decode_entries(entries)?)),
            "matrix" => Ok(Self::Matrix(decode_entries(entries)?)),
            _ => Err(Error::UnknownResultType(raw.result_type)),
        }
    }

    /// The `resultType` tag of this data
    pub fn result_type(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
        }
    }

    /// Number of samples or series
    pub fn len(&self) -> usize {
        match self {
            Self::Vector(samples) => samples.len(),
            Self::Matrix(series) => series.len(),
        }
    }

    /// True if there are no samples or series
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to vector result, returning error if it was a matrix
    pub fn into_vector(self) -> Result<Vec<Sample>, Error> {
        match self {
            Self::Vector(data) => Ok(data),
            Self::Matrix(_) => Err(Error::UnknownResultType("matrix".into())),
        }
    }

    /// Convert to matrix result, returning error if it was a vector
    pub fn into_matrix(self) -> Result<Vec<Series>, Error> {
        match self {
            Self::Matrix(data) => Ok(data),
            Self::Vector(_) => Err(Error::UnknownResultType("vector".into())),
        }
    }
}

impl<'de> Deserialize<'de> for QueryData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

fn decode_entries<T: DeserializeOwned>(entries: Vec<Value>) -> Result<Vec<T>, Error> {
    entries
        .into_iter()
        .map(|entry| serde_json::from_value(entry).map_err(Error::from))
        .collect()
}

/// A decoded query response, plus the context of the query that produced it.
///
/// This is also the JSON body posted to webhooks, so a receiver can decode it
/// with `serde_json::from_slice::<QueryResult>`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueryResult {
    /// Status reported by the backend, normally "success"
    pub status: String,
    /// The typed result entries
    pub data: QueryData,
    /// Opaque context of the registered query. Never filled in by the backend.
    #[serde(default)]
    pub context: String,
}

impl QueryResult {
    /// True if the query matched nothing
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the context echo
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl PromResponse {
    pub fn into_result(self) -> Result<QueryResult, Error> {
        for warning in &self.warnings {
            warn!("PromQL API response: {warning}");
        }

        if self.status == "error" {
            return Err(Error::API(
                self.error_type.unwrap_or_default(),
                self.error.unwrap_or_default(),
            ));
        }

        let data = QueryData::from_value(self.data.ok_or(Error::MissingData)?)?;
        Ok(QueryResult {
            status: self.status,
            data,
            context: String::new(),
        })
    }

    /// Number of result entries, without looking at their type
    pub fn result_count(&self) -> usize {
        self.data
            .as_ref()
            .and_then(|data| data.get("result"))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Result<QueryResult, Error> {
        serde_json::from_str::<PromResponse>(text)?.into_result()
    }

    #[test]
    fn test_vector_keeps_exact_digits() {
        let text = r#"{
          "status": "success",
          "data": {
            "resultType": "vector",
            "result": [
              {
                "metric": {"status_code": "200", "user_agent": "Go-http-client/1.1"},
                "value": [1535779665000000000, 271323437]
              },
              {
                "metric": {"status_code": "500"},
                "value": [1535779665.123, "NaN"]
              }
            ]
          }
        }"#;

        let result = decode(text).unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.context, "");

        let samples = result.data.into_vector().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].metric.get("status_code").unwrap(), "200");
        assert_eq!(
            samples[0].metric.get("user_agent").unwrap(),
            "Go-http-client/1.1"
        );
        assert_eq!(samples[0].value.timestamp().as_str(), "1535779665000000000");
        assert_eq!(samples[0].value.value().as_str(), "271323437");
        assert!(!samples[0].value.value().is_quoted());
        assert_eq!(
            samples[0].value.timestamp().to_decimal().unwrap(),
            Decimal::from(1_535_779_665_000_000_000i64)
        );

        assert_eq!(samples[1].value.timestamp().as_str(), "1535779665.123");
        assert!(samples[1].value.value().is_quoted());
        assert!(samples[1].value.value().to_f64().unwrap().is_nan());
    }

    #[test]
    fn test_matrix_decodes_series() {
        let text = r#"{"status":"success","data":{"resultType":"matrix","result":[
            {"metric":{"__name__":"tick_time","source_id":"abc"},"values":[[1762534433.802,"1.8974293514080933"],[1762534447.802,"2.029724353457351"]]}
        ]}}"#;

        let result = decode(text).unwrap();
        assert_eq!(result.data.result_type(), "matrix");
        let series = result.data.into_matrix().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metric.get("source_id").unwrap(), "abc");
        assert_eq!(series[0].values.len(), 2);
        assert_eq!(series[0].values[1].value().as_str(), "2.029724353457351");
        assert_eq!(series[0].values[1].value().to_f64().unwrap(), 2.029724353457351);
    }

    #[test]
    fn test_missing_result_is_empty() {
        let result = decode(r#"{"status":"success","data":{"resultType":"vector"}}"#).unwrap();
        assert!(result.is_empty());

        let result =
            decode(r#"{"status":"success","data":{"resultType":"matrix","result":null}}"#).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_unknown_result_type_fails() {
        let err = decode(r#"{"status":"success","data":{"resultType":"scalar","result":[1, "2"]}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResultType(t) if t == "scalar"));

        // Even with nothing to decode
        let err = decode(r#"{"status":"success","data":{"resultType":"string"}}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownResultType(_)));
    }

    #[test]
    fn test_malformed_entry_fails_whole_decode() {
        let text = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{},"value":[1, "1"]},
            {"metric":{},"values":[[1, "1"]]}
        ]}}"#;
        assert!(matches!(decode(text).unwrap_err(), Error::Json(_)));

        let text = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{},"value":[1, "not a number"]}
        ]}}"#;
        assert!(matches!(decode(text).unwrap_err(), Error::Json(_)));
    }

    #[test]
    fn test_error_status_and_missing_data() {
        let err = decode(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "API: bad_data: parse error");

        assert!(matches!(
            decode(r#"{"status":"success"}"#).unwrap_err(),
            Error::MissingData
        ));
    }

    #[test]
    fn test_result_count_ignores_type() {
        let resp: PromResponse = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"whatever","result":[{"a":1},{"b":2}]}}"#,
        )
        .unwrap();
        assert_eq!(resp.result_count(), 2);

        let resp: PromResponse =
            serde_json::from_str(r#"{"status":"success","data":{"resultType":"vector"}}"#).unwrap();
        assert_eq!(resp.result_count(), 0);
    }

    #[test]
    fn test_reserialize_with_context() {
        let text = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{"a":"b"},"value":[1535779665000000000,"1.50"]}]}}"#;
        let result = decode(text).unwrap().with_context("some-context");

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{"a":"b"},"value":[1535779665000000000,"1.50"]}]},"context":"some-context"}"#
        );

        // A webhook receiver gets the same thing back
        let received: QueryResult = serde_json::from_str(&json).unwrap();
        assert_eq!(received, result);
    }

    #[test]
    fn test_token_conversions() {
        let token = DecimalToken::number("1762534433.802").unwrap();
        let dt = token.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1762534433);
        assert_eq!(dt.timestamp_subsec_millis(), 802);

        assert!(DecimalToken::number("\"1\"").is_err());
        assert!(DecimalToken::string("+Inf").unwrap().to_f64().unwrap().is_infinite());
        assert!(DecimalToken::string("abc").is_err());
        assert_eq!(
            DecimalToken::number("1.5e3").unwrap().to_decimal().unwrap(),
            Decimal::from(1500)
        );
    }
}
