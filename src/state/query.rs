//! Search queries evaluated over JSON document bodies.
//!
//! Field paths are dotted (`metadata.tenant`). A trailing `.keyword`
//! addresses the exact-match form of a text field; JSON-backed stores keep
//! only one form, so the suffix resolves to the field itself.

use crate::state::VersionedDocument;
use serde_json::Value;
use std::cmp::Ordering;

pub const KEYWORD_SUFFIX: &str = ".keyword";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub path: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals any of the values; array fields match when any element does
    Terms { path: String, values: Vec<Value> },
    /// Case-insensitive substring match on a text field
    Text { path: String, text: String },
    /// Inclusive range on a numeric or string field
    Range {
        path: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub filters: Vec<Filter>,
    pub sort: Option<SortSpec>,
    pub from: usize,
    pub size: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: None,
            from: 0,
            size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits {
    /// Matches before pagination
    pub total: usize,
    pub hits: Vec<VersionedDocument>,
}

/// Look up a dotted path in a JSON body
pub fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_suffix(KEYWORD_SUFFIX).unwrap_or(path);
    path.split('.')
        .try_fold(body, |current, segment| current.get(segment))
}

impl Filter {
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Filter::Terms { path, values } => match lookup(body, path) {
                Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                Some(value) => values.contains(value),
                None => false,
            },
            Filter::Text { path, text } => match lookup(body, path) {
                Some(Value::String(s)) => s.to_lowercase().contains(&text.to_lowercase()),
                _ => false,
            },
            Filter::Range { path, gte, lte } => match lookup(body, path) {
                Some(value) => {
                    let above = gte
                        .as_ref()
                        .map_or(true, |lower| compare_values(value, lower) != Ordering::Less);
                    let below = lte
                        .as_ref()
                        .map_or(true, |upper| compare_values(value, upper) != Ordering::Greater);
                    above && below
                }
                None => false,
            },
        }
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON scalars used for sorting and ranges
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Filter, sort and paginate a set of documents
pub fn execute(query: &SearchQuery, documents: Vec<VersionedDocument>) -> SearchHits {
    let mut matched: Vec<VersionedDocument> = documents
        .into_iter()
        .filter(|doc| query.filters.iter().all(|f| f.matches(&doc.body)))
        .collect();

    match &query.sort {
        Some(sort) => matched.sort_by(|a, b| {
            // Documents missing the sort field go last in either order
            let ordering = match (lookup(&a.body, &sort.path), lookup(&b.body, &sort.path)) {
                (Some(x), Some(y)) => {
                    let ord = compare_values(x, y);
                    if sort.order == SortOrder::Descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        }),
        None => matched.sort_by(|a, b| a.id.cmp(&b.id)),
    }

    let total = matched.len();
    let hits = matched
        .into_iter()
        .skip(query.from)
        .take(query.size)
        .collect();

    SearchHits { total, hits }
}
