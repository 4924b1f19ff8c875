//! Finding the `source_id` values a PromQL query selects on.

use displaydoc::Display;
use promql_parser::{
    label::{MatchOp, Matcher},
    parser::{self, Expr, VectorSelector},
};

/// The label which log-cache indexes data by
pub const SOURCE_ID_LABEL: &str = "source_id";

/// Invalid PromQL: {0}
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub struct ParseError(pub String);

impl std::error::Error for ParseError {}

/// Parse `query` and return every value of an equality `source_id` matcher,
/// in the order they appear, without duplicates.
pub fn extract_source_ids(query: &str) -> Result<Vec<String>, ParseError> {
    extract_label_values(query, SOURCE_ID_LABEL)
}

/// Parse `query` and return every value of an equality matcher on `label`,
/// in the order they appear, without duplicates.
///
/// Regex and negative matchers are skipped, since their values don't name anything.
pub fn extract_label_values(query: &str, label: &str) -> Result<Vec<String>, ParseError> {
    let expr = parser::parse(query).map_err(ParseError)?;
    let mut values = Vec::new();
    collect_label_values(&expr, label, &mut values);
    Ok(values)
}

fn collect_label_values(expr: &Expr, label: &str, values: &mut Vec<String>) {
    match expr {
        Expr::VectorSelector(vs) => collect_from_selector(vs, label, values),
        Expr::MatrixSelector(ms) => collect_from_selector(&ms.vs, label, values),
        Expr::Call(call) => {
            for arg in &call.args.args {
                collect_label_values(arg, label, values);
            }
        }
        Expr::Aggregate(agg) => {
            collect_label_values(&agg.expr, label, values);
            if let Some(param) = &agg.param {
                collect_label_values(param, label, values);
            }
        }
        Expr::Binary(bin) => {
            collect_label_values(&bin.lhs, label, values);
            collect_label_values(&bin.rhs, label, values);
        }
        Expr::Paren(paren) => collect_label_values(&paren.expr, label, values),
        Expr::Unary(unary) => collect_label_values(&unary.expr, label, values),
        Expr::Subquery(sq) => collect_label_values(&sq.expr, label, values),
        Expr::Extension(_) | Expr::NumberLiteral(_) | Expr::StringLiteral(_) => {}
    }
}

fn collect_from_selector(vs: &VectorSelector, label: &str, values: &mut Vec<String>) {
    let or_groups = vs.matchers.or_matchers.iter().flatten();
    for matcher in vs.matchers.matchers.iter().chain(or_groups) {
        if is_equality_on(matcher, label) && !values.contains(&matcher.value) {
            values.push(matcher.value.clone());
        }
    }
}

fn is_equality_on(matcher: &Matcher, label: &str) -> bool {
    matcher.name == label && matches!(matcher.op, MatchOp::Equal)
}
