use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use tracing::trace;

use crate::record::Record;

/// A single filter criterion. Active predicates combine by logical AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case insensitive substring match on any of the designated fields.
    Search { term: String, fields: Vec<String> },
    /// Field value must be one of `values`. An empty set does not restrict.
    OneOf {
        field: String,
        values: BTreeSet<String>,
    },
}

/// Identity of a predicate within a view. A view holds at most one predicate per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PredicateKey {
    Search(Vec<String>),
    OneOf(String),
}

impl Predicate {
    pub fn search<I, S>(term: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::Search {
            term: term.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::OneOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key(&self) -> PredicateKey {
        match self {
            Predicate::Search { fields, .. } => PredicateKey::Search(fields.clone()),
            Predicate::OneOf { field, .. } => PredicateKey::OneOf(field.clone()),
        }
    }

    /// An inactive predicate (empty term, empty value set) matches everything.
    pub fn is_active(&self) -> bool {
        match self {
            Predicate::Search { term, .. } => !term.is_empty(),
            Predicate::OneOf { values, .. } => !values.is_empty(),
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self {
            Predicate::Search { term, fields } => {
                if term.is_empty() {
                    return true;
                }
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    record
                        .field(field)
                        .is_some_and(|value| value.to_lowercase().contains(&needle))
                })
            }
            Predicate::OneOf { field, values } => {
                values.is_empty()
                    || record
                        .field(field)
                        .is_some_and(|value| values.contains(value.as_ref()))
            }
        }
    }

    /// Short human readable form for status lines.
    pub fn describe(&self) -> String {
        match self {
            Predicate::Search { term, fields } if fields.len() == 1 => {
                format!("{} ~ \"{}\"", fields[0], term)
            }
            Predicate::Search { term, .. } => format!("\"{term}\""),
            Predicate::OneOf { field, values } => {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{} in {{{}}}", field, values.join(", "))
            }
        }
    }
}

/// Indices of the records passing every active predicate, in input order.
pub fn filter_rows<R: Record>(records: &[R], predicates: &[Predicate]) -> Vec<usize> {
    let active: Vec<&Predicate> = predicates.iter().filter(|p| p.is_active()).collect();
    if active.is_empty() {
        return (0..records.len()).collect();
    }

    let rows: Vec<usize> = records
        .par_iter()
        .enumerate()
        .filter(|(_, record)| active.iter().all(|p| p.matches(*record)))
        .map(|(idx, _)| idx)
        .collect();
    trace!(
        "Filter with {} active predicates kept {}/{} records",
        active.len(),
        rows.len(),
        records.len()
    );
    rows
}

pub fn apply<'a, R: Record>(records: &'a [R], predicates: &[Predicate]) -> Vec<&'a R> {
    filter_rows(records, predicates)
        .into_iter()
        .map(|idx| &records[idx])
        .collect()
}

/// Value histogram of `field` over `rows`, most frequent values first.
/// Missing values are skipped, a `OneOf` predicate can never select them.
pub fn facets<R: Record>(records: &[R], rows: &[usize], field: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for &ridx in rows {
        if let Some(value) = records[ridx].field(field) {
            *counts.entry(value.into_owned()).or_insert(0) += 1;
        }
    }
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_unstable_by(|(va, ca), (vb, cb)| cb.cmp(ca).then_with(|| va.cmp(vb)));
    sorted
}
