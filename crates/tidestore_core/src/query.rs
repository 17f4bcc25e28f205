//! Query predicates, sorting and paging.
//!
//! A [`Query`] is dual-target: it filters records in the local cache via
//! [`Query::matches`] and [`Query::apply`], and encodes to the remote
//! query-string protocol (Mongo-style JSON filter plus sort/skip/limit
//! pairs) via [`Query::to_query_pairs`].

use crate::error::{CoreError, CoreResult};
use crate::record::{Document, Record};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// A predicate over record fields.
///
/// The reserved field name `_id` addresses the entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every record.
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Field does not equal value (also matches records missing the field).
    Ne(String, Value),
    /// Field is greater than value.
    Gt(String, Value),
    /// Field is greater than or equal to value.
    Gte(String, Value),
    /// Field is less than value.
    Lt(String, Value),
    /// Field is less than or equal to value.
    Lte(String, Value),
    /// Field is one of the listed values.
    In(String, Vec<Value>),
    /// Field presence check.
    Exists(String, bool),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Evaluates the predicate against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => field_value(record, field).as_ref() == Some(value),
            Filter::Ne(field, value) => field_value(record, field).as_ref() != Some(value),
            Filter::Gt(field, value) => compare_field(record, field, value) == Some(Ordering::Greater),
            Filter::Gte(field, value) => matches!(
                compare_field(record, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(field, value) => compare_field(record, field, value) == Some(Ordering::Less),
            Filter::Lte(field, value) => matches!(
                compare_field(record, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::In(field, values) => field_value(record, field)
                .map(|v| values.contains(&v))
                .unwrap_or(false),
            Filter::Exists(field, expected) => field_value(record, field).is_some() == *expected,
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::Not(filter) => !filter.matches(record),
        }
    }

    /// Encodes the predicate as a Mongo-style JSON filter.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Filter::All => json!({}),
            Filter::Eq(field, value) => json!({ field.clone(): value }),
            Filter::Ne(field, value) => json!({ field.clone(): {"$ne": value} }),
            Filter::Gt(field, value) => json!({ field.clone(): {"$gt": value} }),
            Filter::Gte(field, value) => json!({ field.clone(): {"$gte": value} }),
            Filter::Lt(field, value) => json!({ field.clone(): {"$lt": value} }),
            Filter::Lte(field, value) => json!({ field.clone(): {"$lte": value} }),
            Filter::In(field, values) => json!({ field.clone(): {"$in": values} }),
            Filter::Exists(field, expected) => json!({ field.clone(): {"$exists": expected} }),
            Filter::And(filters) => {
                json!({"$and": filters.iter().map(Filter::to_json).collect::<Vec<_>>()})
            }
            Filter::Or(filters) => {
                json!({"$or": filters.iter().map(Filter::to_json).collect::<Vec<_>>()})
            }
            Filter::Not(filter) => json!({"$not": filter.to_json()}),
        }
    }
}

/// A single sort criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Field name to sort by.
    pub field: String,
    /// Ascending when true, descending otherwise.
    pub ascending: bool,
}

/// A predicate plus sorting and paging, scoping both cache reads and
/// remote fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Record predicate.
    pub filter: Filter,
    /// Sort criteria, applied in order.
    pub sort: Vec<SortField>,
    /// Number of leading results to drop.
    pub skip: Option<u64>,
    /// Maximum number of results to return.
    pub limit: Option<u64>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    /// Creates a query matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: Filter::All,
            sort: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    /// Creates a query with the given predicate.
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::new()
        }
    }

    /// Adds an ascending sort criterion.
    #[must_use]
    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            ascending: true,
        });
        self
    }

    /// Adds a descending sort criterion.
    #[must_use]
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            ascending: false,
        });
        self
    }

    /// Sets the number of leading results to drop.
    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the maximum number of results.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true when skip or limit is set.
    ///
    /// A paged query scopes only part of a collection, so deletions can
    /// never be inferred from absence in its results.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }

    /// Returns true when the predicate matches every record.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        matches!(self.filter, Filter::All)
    }

    /// Evaluates the predicate against a record, ignoring sort and paging.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.filter.matches(record)
    }

    /// Applies predicate, sort and paging to a set of records.
    #[must_use]
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| self.order(a, b));
        }

        let skip = self.skip.unwrap_or(0) as usize;
        let matched: Vec<Record> = matched.into_iter().skip(skip).collect();

        match self.limit {
            Some(limit) => matched.into_iter().take(limit as usize).collect(),
            None => matched,
        }
    }

    /// Returns a copy of this query with skip and limit overridden.
    ///
    /// Used by auto-pagination to advance through bounded pages.
    #[must_use]
    pub fn paged(&self, skip: u64, limit: u64) -> Self {
        let mut query = self.clone();
        query.skip = Some(skip);
        query.limit = Some(limit);
        query
    }

    /// Stable key over predicate and sort, excluding paging.
    ///
    /// Two queries that scope the same record set share a shape key, so
    /// pull anchors survive page-boundary changes.
    #[must_use]
    pub fn shape_key(&self) -> String {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|s| {
                let direction = if s.ascending { 1 } else { -1 };
                json!({s.field.clone(): direction})
            })
            .collect();
        json!({"query": self.filter.to_json(), "sort": sort}).to_string()
    }

    /// Encodes the query for the remote query-string protocol.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        if !self.is_unfiltered() {
            pairs.push(("query".to_string(), self.filter.to_json().to_string()));
        }

        if !self.sort.is_empty() {
            let sort: Document = self
                .sort
                .iter()
                .map(|s| {
                    let direction = if s.ascending { 1 } else { -1 };
                    (s.field.clone(), json!(direction))
                })
                .collect();
            pairs.push(("sort".to_string(), Value::Object(sort).to_string()));
        }

        if let Some(skip) = self.skip {
            pairs.push(("skip".to_string(), skip.to_string()));
        }

        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }

        pairs
    }

    /// Encodes the query into a generic document.
    ///
    /// Used to capture a replayable collection-wide delete.
    pub fn to_document(&self) -> CoreResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::invalid_query(format!(
                "query encoded to non-object value: {other}"
            ))),
        }
    }

    /// Decodes a query from a generic document.
    pub fn from_document(document: Document) -> CoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }

    fn order(&self, a: &Record, b: &Record) -> Ordering {
        for sort in &self.sort {
            let lhs = field_value(a, &sort.field);
            let rhs = field_value(b, &sort.field);
            // Records missing the sort field always order last.
            let ordering = match (lhs, rhs) {
                (Some(l), Some(r)) => {
                    let ordering = compare_values(&l, &r).unwrap_or(Ordering::Equal);
                    if sort.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Resolves a field name against a record, including the `_id` envelope.
fn field_value(record: &Record, field: &str) -> Option<Value> {
    if field == "_id" {
        return record
            .id
            .as_ref()
            .map(|id| Value::String(id.as_str().to_string()));
    }
    record.fields.get(field).cloned()
}

fn compare_field(record: &Record, field: &str, value: &Value) -> Option<Ordering> {
    compare_values(&field_value(record, field)?, value)
}

/// Orders two JSON values of the same primitive kind.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}
