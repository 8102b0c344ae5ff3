//! Free-text search expressions and their compilation into a predicate.
//!
//! Wire form (JSON): `{"term": {"field", "operator", "value"}}`,
//! `{"and": [...]}`, `{"or": [...]}` or `{}`. An object carrying more than
//! one of the three keys is rejected when it is decoded.

use serde::{Deserialize, Serialize};

use crate::error::InsightsError;
use crate::relation::Relation;
use crate::sql::{escape_like, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchField {
    AdName,
    AccountName,
    AdSetName,
    CampaignName,
}

impl SearchField {
    pub fn column(self) -> String {
        match self {
            SearchField::AdName => Relation::Ads.col("name"),
            SearchField::AccountName => Relation::AdAccounts.col("name"),
            SearchField::AdSetName => Relation::AdSets.col("name"),
            SearchField::CampaignName => Relation::Campaigns.col("name"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchOperator {
    Contains,
    StartsWith,
    Equals,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchTerm {
    pub field: SearchField,
    pub operator: SearchOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression", into = "RawExpression")]
pub enum SearchExpression {
    Empty,
    Term(SearchTerm),
    And(Vec<SearchExpression>),
    Or(Vec<SearchExpression>),
}

impl SearchExpression {
    pub fn term(field: SearchField, operator: SearchOperator, value: impl Into<String>) -> Self {
        SearchExpression::Term(SearchTerm {
            field,
            operator,
            value: value.into(),
        })
    }

    pub fn contains(field: SearchField, value: impl Into<String>) -> Self {
        Self::term(field, SearchOperator::Contains, value)
    }

    pub fn starts_with(field: SearchField, value: impl Into<String>) -> Self {
        Self::term(field, SearchOperator::StartsWith, value)
    }

    pub fn equals(field: SearchField, value: impl Into<String>) -> Self {
        Self::term(field, SearchOperator::Equals, value)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    term: Option<SearchTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    and: Option<Vec<SearchExpression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    or: Option<Vec<SearchExpression>>,
}

impl TryFrom<RawExpression> for SearchExpression {
    type Error = InsightsError;

    fn try_from(raw: RawExpression) -> Result<Self, Self::Error> {
        match (raw.term, raw.and, raw.or) {
            (None, None, None) => Ok(SearchExpression::Empty),
            (Some(term), None, None) => Ok(SearchExpression::Term(term)),
            (None, Some(children), None) => Ok(SearchExpression::And(children)),
            (None, None, Some(children)) => Ok(SearchExpression::Or(children)),
            _ => Err(InsightsError::InvalidFilter(
                "search expression must carry exactly one of term, and, or".into(),
            )),
        }
    }
}

impl From<SearchExpression> for RawExpression {
    fn from(expr: SearchExpression) -> Self {
        let mut raw = RawExpression {
            term: None,
            and: None,
            or: None,
        };
        match expr {
            SearchExpression::Empty => {}
            SearchExpression::Term(term) => raw.term = Some(term),
            SearchExpression::And(children) => raw.and = Some(children),
            SearchExpression::Or(children) => raw.or = Some(children),
        }
        raw
    }
}

// ------------------------------------------------------------------ //
//  Compilation                                                        //
// ------------------------------------------------------------------ //

/// Compile `expr` into a boolean predicate, binding values into `params`.
///
/// Returns `None` when the expression constrains nothing, in which case the
/// caller must leave the predicate out entirely.
pub fn compile(expr: &SearchExpression, params: &mut Params) -> Option<String> {
    match expr {
        SearchExpression::Empty => None,
        SearchExpression::Term(term) => Some(compile_term(term, params)),
        SearchExpression::And(children) => compile_group(children, " AND ", params),
        SearchExpression::Or(children) => compile_group(children, " OR ", params),
    }
}

fn compile_term(term: &SearchTerm, params: &mut Params) -> String {
    let column = term.field.column();
    match term.operator {
        SearchOperator::Contains => {
            let ph = params.bind_text(format!("%{}%", escape_like(&term.value)));
            format!("{column} ILIKE {ph}")
        }
        SearchOperator::StartsWith => {
            let ph = params.bind_text(format!("{}%", escape_like(&term.value)));
            format!("{column} ILIKE {ph}")
        }
        SearchOperator::Equals => {
            let ph = params.bind_text(term.value.as_str());
            format!("{column} = {ph}")
        }
    }
}

fn compile_group(children: &[SearchExpression], sep: &str, params: &mut Params) -> Option<String> {
    let parts: Vec<String> = children
        .iter()
        .filter_map(|child| compile(child, params))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("({})", parts.join(sep)))
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{SqlParam, SqlQuery};

    fn compiled(expr: &SearchExpression) -> (Option<String>, Params) {
        let mut params = Params::default();
        let text = compile(expr, &mut params);
        (text, params)
    }

    #[test]
    fn empty_expression_compiles_to_nothing() {
        let (text, params) = compiled(&SearchExpression::Empty);
        assert_eq!(text, None);
        assert!(params.is_empty());
    }

    #[test]
    fn operators_map_to_patterns() {
        let (text, params) = compiled(&SearchExpression::contains(SearchField::AdName, "asdf"));
        assert_eq!(text.as_deref(), Some("a.name ILIKE $1"));
        assert_eq!(params.as_slice(), &[SqlParam::Text("%asdf%".into())]);

        let (text, params) =
            compiled(&SearchExpression::starts_with(SearchField::CampaignName, "Spring"));
        assert_eq!(text.as_deref(), Some("c.name ILIKE $1"));
        assert_eq!(params.as_slice(), &[SqlParam::Text("Spring%".into())]);

        let (text, params) = compiled(&SearchExpression::equals(SearchField::AdSetName, "50%"));
        assert_eq!(text.as_deref(), Some("ast.name = $1"));
        assert_eq!(params.as_slice(), &[SqlParam::Text("50%".into())]);
    }

    #[test]
    fn single_child_group_is_parenthesized() {
        let child = SearchExpression::contains(SearchField::AccountName, "x");
        let (inner, _) = compiled(&child);
        let (wrapped, _) = compiled(&SearchExpression::And(vec![child]));
        assert_eq!(wrapped, Some(format!("({})", inner.unwrap())));
    }

    #[test]
    fn or_of_two_names_matches_reference_text() {
        let expr = SearchExpression::Or(vec![
            SearchExpression::contains(SearchField::AdName, "asdf"),
            SearchExpression::contains(SearchField::AccountName, "asdf"),
        ]);
        let (text, params) = compiled(&expr);
        assert_eq!(text.as_deref(), Some("(a.name ILIKE $1 OR aa.name ILIKE $2)"));

        let query = SqlQuery::new(format!("AND {}", text.unwrap()), params);
        assert_eq!(
            query.interpolated(),
            "AND (a.name ILIKE '%asdf%' OR aa.name ILIKE '%asdf%')"
        );
    }

    #[test]
    fn nested_groups_drop_empty_children() {
        let expr = SearchExpression::And(vec![
            SearchExpression::Or(vec![]),
            SearchExpression::Empty,
            SearchExpression::Or(vec![
                SearchExpression::contains(SearchField::AdName, "a"),
                SearchExpression::And(vec![SearchExpression::Empty]),
                SearchExpression::equals(SearchField::CampaignName, "b"),
            ]),
            SearchExpression::starts_with(SearchField::AdSetName, "c"),
        ]);
        let (text, params) = compiled(&expr);
        assert_eq!(
            text.as_deref(),
            Some("((a.name ILIKE $1 OR c.name = $2) AND ast.name ILIKE $3)")
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn group_of_only_empty_children_compiles_to_nothing() {
        let expr = SearchExpression::Or(vec![
            SearchExpression::And(vec![]),
            SearchExpression::Empty,
        ]);
        assert_eq!(compiled(&expr).0, None);
    }

    #[test]
    fn like_wildcards_in_values_are_escaped() {
        let (_, params) = compiled(&SearchExpression::contains(SearchField::AdName, "100%_x"));
        assert_eq!(params.as_slice(), &[SqlParam::Text("%100\\%\\_x%".into())]);
    }

    #[test]
    fn decodes_wire_shape() {
        let expr: SearchExpression = serde_json::from_value(serde_json::json!({
            "or": [
                { "term": { "field": "AdName", "operator": "Contains", "value": "asdf" } },
                { "and": [] },
                {}
            ]
        }))
        .unwrap();
        assert_eq!(
            expr,
            SearchExpression::Or(vec![
                SearchExpression::contains(SearchField::AdName, "asdf"),
                SearchExpression::And(vec![]),
                SearchExpression::Empty,
            ])
        );
    }

    #[test]
    fn rejects_ambiguous_leaf() {
        let result: Result<SearchExpression, _> = serde_json::from_value(serde_json::json!({
            "term": { "field": "AdName", "operator": "Contains", "value": "x" },
            "and": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_operator() {
        let result: Result<SearchExpression, _> = serde_json::from_value(serde_json::json!({
            "term": { "field": "AdName", "operator": "Matches", "value": "x" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let expr = SearchExpression::And(vec![SearchExpression::equals(
            SearchField::AccountName,
            "acme",
        )]);
        assert_eq!(
            serde_json::to_value(&expr).unwrap(),
            serde_json::json!({
                "and": [{ "term": { "field": "AccountName", "operator": "Equals", "value": "acme" } }]
            })
        );
        assert_eq!(
            serde_json::to_value(SearchExpression::Empty).unwrap(),
            serde_json::json!({})
        );
    }
}
