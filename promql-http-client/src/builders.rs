use super::{Error, QueryRangeRequest};
use chrono::{DateTime, TimeDelta, Utc};
use std::{ops::Range, time::Duration};

/// Builder for a /api/v1/query_range request.
///
/// A range must be given, either explicitly or as "since some duration ago".
/// If no step is given, it is derived so the range holds roughly `count` points.
pub struct QueryRangeRequestBuilder {
    query: String,
    range: Option<Range<DateTime<Utc>>>,
    step: Option<Duration>,
    count: u32,
}

impl QueryRangeRequestBuilder {
    /// Start building a range request for the given query
    pub fn new(query: String) -> Self {
        Self {
            query,
            range: None,
            step: None,
            count: 256,
        }
    }

    /// Query over an explicit time range
    pub fn range(mut self, range: Range<DateTime<Utc>>) -> Self {
        self.range = Some(range);
        self
    }

    /// Query from `time` ago until now
    pub fn since(mut self, time: Duration) -> Self {
        let end = Utc::now();
        let start = TimeDelta::from_std(time)
            .ok()
            .and_then(|delta| end.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.range = Some(start..end);
        self
    }

    /// Use a fixed resolution step
    pub fn step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }

    /// Target number of points, used to derive the step when none is given
    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Build the request
    pub fn build(self) -> Result<QueryRangeRequest, Error> {
        let range = self
            .range
            .ok_or_else(|| Error::InvalidRequest("missing time range".into()))?;
        if range.end < range.start {
            return Err(Error::InvalidRequest(format!(
                "range end {} is before start {}",
                range.end, range.start
            )));
        }

        let step = match self.step {
            Some(step) => step,
            None => (range.end - range.start)
                .checked_div(self.count.max(1) as i32)
                .and_then(|delta| delta.to_std().ok())
                .unwrap_or_default(),
        };

        Ok(QueryRangeRequest {
            query: self.query,
            start: range.start.timestamp(),
            end: range.end.timestamp(),
            step: format_step(step),
        })
    }
}

/// Format a step as a compact duration string, e.g. `1m30s`.
/// Steps under a second are rounded up to `1s`, the finest step worth asking for.
fn format_step(step: Duration) -> String {
    let secs = step.as_secs().max(1);
    humantime::format_duration(Duration::from_secs(secs))
        .to_string()
        .replace(' ', "")
}
