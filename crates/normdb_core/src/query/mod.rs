//! Lazy query pipeline over a collection.
//!
//! A [`Query`] records a chain of operations (seed, filters, ordering,
//! paging) and materializes nothing until [`Query::run`] or one of the
//! mapping terminals. Each run re-reads the collection, so a held
//! query can be re-run after mutations and will reflect them.

pub mod criteria;

use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use crate::index::{BetweenOpts, KeyTuple};
use crate::record::Record;
use criteria::WhereNode;
use normdb_value::Value;
use std::cmp::Ordering;

/// One sort key for `orderBy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    /// Dotted field path to sort by.
    pub path: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl OrderSpec {
    /// An ascending sort on a field.
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }

    /// A descending sort on a field.
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: true,
        }
    }
}

/// Where the pipeline draws its initial records from.
enum Source {
    /// Every record, in the order of the default or a named index.
    All { index: Option<String> },
    /// Exact key lookups.
    Get {
        index: Option<String>,
        keys: Vec<KeyTuple>,
    },
    /// A key range.
    Between {
        index: Option<String>,
        left: KeyTuple,
        right: KeyTuple,
        opts: BetweenOpts,
    },
}

/// One queued pipeline operation.
enum Op {
    Where(WhereNode),
    Predicate(Box<dyn Fn(&Record) -> bool>),
    OrderBy(Vec<OrderSpec>),
    Skip(usize),
    Limit(usize),
}

/// A lazy, chainable query against one collection.
pub struct Query<'a> {
    collection: &'a Collection,
    source: Source,
    ops: Vec<Op>,
    error: Option<CoreError>,
}

impl<'a> Query<'a> {
    /// Creates a query seeded with every record in the collection.
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            source: Source::All { index: None },
            ops: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, error: CoreError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Seeds the query from exact key lookups on the default index.
    ///
    /// Must be the first operation on the query.
    #[must_use]
    pub fn get(self, keys: impl Into<KeyTuple>) -> Self {
        self.get_all(vec![keys.into()])
    }

    /// Seeds the query from exact key lookups, optionally on a named
    /// index via [`Query::using_index`] beforehand.
    ///
    /// Must be the first operation on the query.
    #[must_use]
    pub fn get_all(mut self, keys: Vec<KeyTuple>) -> Self {
        let index = match &self.source {
            Source::All { index } if self.ops.is_empty() => index.clone(),
            _ => {
                return self.fail(CoreError::illegal_argument(
                    "get/getAll must be the first operation on a query",
                ));
            }
        };
        self.source = Source::Get { index, keys };
        self
    }

    /// Seeds the query from a key range.
    ///
    /// Must be the first operation on the query.
    #[must_use]
    pub fn between(
        mut self,
        left: impl Into<KeyTuple>,
        right: impl Into<KeyTuple>,
        opts: BetweenOpts,
    ) -> Self {
        let index = match &self.source {
            Source::All { index } if self.ops.is_empty() => index.clone(),
            _ => {
                return self.fail(CoreError::illegal_argument(
                    "between must be the first operation on a query",
                ));
            }
        };
        self.source = Source::Between {
            index,
            left: left.into(),
            right: right.into(),
            opts,
        };
        self
    }

    /// Routes the seed through a named secondary index.
    ///
    /// Affects `get`/`get_all`/`between` seeds and the order of a
    /// full-collection scan.
    #[must_use]
    pub fn using_index(mut self, name: impl Into<String>) -> Self {
        match &mut self.source {
            Source::All { index }
            | Source::Get { index, .. }
            | Source::Between { index, .. } => *index = Some(name.into()),
        }
        self
    }

    /// Appends a declarative filter parsed from a query value.
    ///
    /// The value may carry `where` criteria (or bare field tests) plus
    /// `orderBy`, `skip`/`offset`, and `limit` directives, which queue
    /// as their respective operations.
    #[must_use]
    pub fn filter(self, query: &Value) -> Self {
        match parse_query_value(query) {
            Ok(parsed) => self.apply_parsed(parsed),
            Err(error) => self.fail(error),
        }
    }

    fn apply_parsed(mut self, parsed: ParsedQuery) -> Self {
        self.ops.push(Op::Where(parsed.where_node));
        if !parsed.order_by.is_empty() {
            self.ops.push(Op::OrderBy(parsed.order_by));
        }
        if let Some(skip) = parsed.skip {
            self.ops.push(Op::Skip(skip));
        }
        if let Some(limit) = parsed.limit {
            self.ops.push(Op::Limit(limit));
        }
        self
    }

    /// Appends a pre-parsed `where` filter.
    #[must_use]
    pub fn filter_where(mut self, node: WhereNode) -> Self {
        self.ops.push(Op::Where(node));
        self
    }

    /// Appends a predicate filter.
    #[must_use]
    pub fn filter_fn(mut self, predicate: impl Fn(&Record) -> bool + 'static) -> Self {
        self.ops.push(Op::Predicate(Box::new(predicate)));
        self
    }

    /// Appends a stable multi-key sort.
    #[must_use]
    pub fn order_by(mut self, specs: Vec<OrderSpec>) -> Self {
        self.ops.push(Op::OrderBy(specs));
        self
    }

    /// Drops the first `count` records.
    #[must_use]
    pub fn skip(mut self, count: usize) -> Self {
        self.ops.push(Op::Skip(count));
        self
    }

    /// Keeps at most `count` records.
    #[must_use]
    pub fn limit(mut self, count: usize) -> Self {
        self.ops.push(Op::Limit(count));
        self
    }

    /// Runs the pipeline and returns matching records.
    ///
    /// The returned vector is fresh; mutating it does not disturb the
    /// collection.
    ///
    /// # Errors
    ///
    /// Surfaces the first error queued while chaining, an unknown index
    /// name, or malformed criteria.
    pub fn run(self) -> CoreResult<Vec<Record>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut records = match &self.source {
            Source::All { index } => self.collection.records_in_order(index.as_deref())?,
            Source::Get { index, keys } => {
                self.collection.index_get_all(index.as_deref(), keys)?
            }
            Source::Between {
                index,
                left,
                right,
                opts,
            } => self
                .collection
                .index_between(index.as_deref(), left, right, *opts)?,
        };

        for op in &self.ops {
            match op {
                Op::Where(node) => records.retain(|record| node.matches(record)),
                Op::Predicate(predicate) => records.retain(|record| predicate(record)),
                Op::OrderBy(specs) => sort_records(&mut records, specs),
                Op::Skip(count) => {
                    records.drain(..(*count).min(records.len()));
                }
                Op::Limit(count) => records.truncate(*count),
            }
        }
        Ok(records)
    }

    /// Runs the pipeline and maps each record through `f`.
    pub fn map<T>(self, f: impl Fn(&Record) -> T) -> CoreResult<Vec<T>> {
        Ok(self.run()?.iter().map(f).collect())
    }

    /// Runs the pipeline and visits each record.
    pub fn for_each(self, mut f: impl FnMut(&Record)) -> CoreResult<()> {
        for record in self.run()? {
            f(&record);
        }
        Ok(())
    }

    /// Runs the pipeline and folds over the records.
    pub fn reduce<T>(self, init: T, mut f: impl FnMut(T, &Record) -> T) -> CoreResult<T> {
        let mut acc = init;
        for record in self.run()? {
            acc = f(acc, &record);
        }
        Ok(acc)
    }

    /// Runs the pipeline and resolves the named accessor on each
    /// record. Records are plain data, so a zero-argument accessor is a
    /// (dotted-path) field read.
    pub fn map_call(self, accessor: &str) -> CoreResult<Vec<Value>> {
        self.map(|record| record.get_path(accessor))
    }
}

/// Sorts records by the key list, stable within equal keys.
fn sort_records(records: &mut [Record], specs: &[OrderSpec]) {
    records.sort_by(|a, b| {
        for spec in specs {
            let ord = a.get_path(&spec.path).cmp_ordered(&b.get_path(&spec.path));
            let ord = if spec.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

struct ParsedQuery {
    where_node: WhereNode,
    order_by: Vec<OrderSpec>,
    skip: Option<usize>,
    limit: Option<usize>,
}

const DIRECTIVES: &[&str] = &["where", "orderBy", "sort", "skip", "offset", "limit"];

/// Parses a full query value: `where` plus directives, with any
/// non-directive top-level keys folded into the `where` clause.
fn parse_query_value(query: &Value) -> CoreResult<ParsedQuery> {
    let entries = match query {
        Value::Map(entries) => entries.as_slice(),
        Value::Undefined | Value::Null => &[],
        other => {
            return Err(CoreError::illegal_argument(format!(
                "query must be an object, got {other:?}"
            )));
        }
    };

    let mut where_value = Value::Undefined;
    let mut bare_fields = Vec::new();
    let mut order_by = Vec::new();
    let mut skip = None;
    let mut limit = None;

    for (key, value) in entries {
        match key.as_str() {
            "where" => where_value = value.clone(),
            "orderBy" | "sort" => order_by = parse_order_by(value)?,
            "skip" | "offset" => skip = Some(parse_count(value, key)?),
            "limit" => limit = Some(parse_count(value, key)?),
            _ => bare_fields.push((key.clone(), value.clone())),
        }
    }

    let mut where_node = WhereNode::parse(&where_value)?;
    if !bare_fields.is_empty() {
        let bare = WhereNode::parse(&Value::Map(bare_fields))?;
        where_node = match where_node {
            WhereNode::Clause(tests) if tests.is_empty() => bare,
            other => WhereNode::Group(vec![
                (criteria::BoolJoin::And, other),
                (criteria::BoolJoin::And, bare),
            ]),
        };
    }

    Ok(ParsedQuery {
        where_node,
        order_by,
        skip,
        limit,
    })
}

/// Parses a paging count. Non-numbers are an argument error, negative
/// counts degrade to zero.
fn parse_count(value: &Value, directive: &str) -> CoreResult<usize> {
    match value {
        Value::Number(n) if n.is_finite() => Ok(if *n < 0.0 { 0 } else { *n as usize }),
        other => Err(CoreError::illegal_argument(format!(
            "{directive} must be a number, got {other:?}"
        ))),
    }
}

/// Parses an `orderBy` directive: a field name, or an array of field
/// names and `[field, "ASC"|"DESC"]` pairs.
fn parse_order_by(value: &Value) -> CoreResult<Vec<OrderSpec>> {
    match value {
        Value::Text(path) => Ok(vec![OrderSpec::asc(path.clone())]),
        Value::Array(items) => {
            let mut specs = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Text(path) => specs.push(OrderSpec::asc(path.clone())),
                    Value::Array(pair) => {
                        let Some(Value::Text(path)) = pair.first() else {
                            return Err(CoreError::illegal_argument(
                                "orderBy pair must start with a field name",
                            ));
                        };
                        let descending = matches!(
                            pair.get(1),
                            Some(Value::Text(dir)) if dir.eq_ignore_ascii_case("desc")
                        );
                        specs.push(OrderSpec {
                            path: path.clone(),
                            descending,
                        });
                    }
                    other => {
                        return Err(CoreError::illegal_argument(format!(
                            "orderBy entries must be field names or pairs, got {other:?}"
                        )));
                    }
                }
            }
            Ok(specs)
        }
        other => Err(CoreError::illegal_argument(format!(
            "orderBy must be a field name or array, got {other:?}"
        ))),
    }
}
