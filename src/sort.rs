use std::cmp::Ordering;

use tracing::trace;

use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

/// The single active sort column of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct SortDescriptor {
    pub field: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn ascending(field: impl Into<String>) -> Self {
        SortDescriptor {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        SortDescriptor {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

// Pre-computed comparison key of one cell. Values compare as strings:
// case-folded first, raw bytes break ties. Empty values rank above every text,
// and descending reverses the whole order, so they go last ascending and first
// descending.
#[derive(Debug)]
enum SortKey {
    Text { folded: String, raw: String },
    Empty,
}

impl SortKey {
    fn from_value(value: Option<&str>) -> Self {
        match value {
            None => SortKey::Empty,
            Some(v) if v.is_empty() => SortKey::Empty,
            Some(v) => SortKey::Text {
                folded: v.to_lowercase(),
                raw: v.to_string(),
            },
        }
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (
                SortKey::Text {
                    folded: fa,
                    raw: ra,
                },
                SortKey::Text {
                    folded: fb,
                    raw: rb,
                },
            ) => fa.cmp(fb).then_with(|| ra.cmp(rb)),
            (SortKey::Text { .. }, SortKey::Empty) => Ordering::Less,
            (SortKey::Empty, SortKey::Text { .. }) => Ordering::Greater,
            (SortKey::Empty, SortKey::Empty) => Ordering::Equal,
        }
    }
}

/// Compare two raw cell values the way the sort engine does.
pub fn compare_values(a: Option<&str>, b: Option<&str>, direction: SortDirection) -> Ordering {
    let ordering = SortKey::from_value(a).compare(&SortKey::from_value(b));
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Reorder `rows` (indices into `records`) by the descriptor. Stable, so equal
/// values keep their relative order and sorting twice changes nothing.
pub fn sort_rows<R: Record>(records: &[R], rows: &mut Vec<usize>, descriptor: Option<&SortDescriptor>) {
    let Some(descriptor) = descriptor else {
        return;
    };

    let mut keyed: Vec<(usize, SortKey)> = rows
        .iter()
        .map(|&ridx| {
            let value = records[ridx].field(&descriptor.field);
            (ridx, SortKey::from_value(value.as_deref()))
        })
        .collect();

    keyed.sort_by(|(_, a), (_, b)| match descriptor.direction {
        SortDirection::Ascending => a.compare(b),
        SortDirection::Descending => b.compare(a),
    });

    trace!(
        "Sorted {} rows by {} {:?}",
        keyed.len(),
        descriptor.field,
        descriptor.direction
    );
    *rows = keyed.into_iter().map(|(ridx, _)| ridx).collect();
}

pub fn apply<'a, R: Record>(records: Vec<&'a R>, descriptor: Option<&SortDescriptor>) -> Vec<&'a R> {
    let Some(descriptor) = descriptor else {
        return records;
    };
    let mut keyed: Vec<(&R, SortKey)> = records
        .into_iter()
        .map(|r| {
            let key = SortKey::from_value(r.field(&descriptor.field).as_deref());
            (r, key)
        })
        .collect();
    keyed.sort_by(|(_, a), (_, b)| match descriptor.direction {
        SortDirection::Ascending => a.compare(b),
        SortDirection::Descending => b.compare(a),
    });
    keyed.into_iter().map(|(r, _)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{Person, person};

    fn names(records: &[&Person]) -> Vec<&'static str> {
        records.iter().map(|p| p.name.unwrap_or("")).collect()
    }

    #[test]
    fn no_descriptor_keeps_input_order() {
        let records = vec![person(1, "Bob", ""), person(2, "Alice", "")];
        let refs: Vec<&Person> = records.iter().collect();
        assert_eq!(names(&apply(refs, None)), vec!["Bob", "Alice"]);
    }

    #[test]
    fn empty_values_last_ascending_first_descending() {
        let records = vec![
            person(1, "Alice", ""),
            person(2, "", ""),
            person(3, "Bob", ""),
        ];

        let desc = SortDescriptor::descending("name");
        let sorted = apply(records.iter().collect(), Some(&desc));
        assert_eq!(names(&sorted), vec!["", "Bob", "Alice"]);

        let asc = SortDescriptor::ascending("name");
        let sorted = apply(records.iter().collect(), Some(&asc));
        assert_eq!(names(&sorted), vec!["Alice", "Bob", ""]);
    }

    #[test]
    fn text_compares_case_insensitive() {
        let records = vec![
            person(1, "bob", ""),
            person(2, "Alice", ""),
            person(3, "carol", ""),
        ];
        let sorted = apply(records.iter().collect(), Some(&SortDescriptor::ascending("name")));
        assert_eq!(names(&sorted), vec!["Alice", "bob", "carol"]);
    }

    #[test]
    fn numbers_compare_as_strings() {
        assert_eq!(
            compare_values(Some("10"), Some("9"), SortDirection::Ascending),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some("inf"), Some("apple"), SortDirection::Ascending),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some("10"), Some("9"), SortDirection::Descending),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(None, Some(""), SortDirection::Descending),
            Ordering::Equal
        );
    }

    #[test]
    fn case_ties_fall_back_to_bytes() {
        assert_eq!(
            compare_values(Some("Bob"), Some("bob"), SortDirection::Ascending),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some("bob"), Some("Carol"), SortDirection::Ascending),
            Ordering::Less
        );
    }

    #[test]
    fn sort_is_stable_and_idempotent() {
        let records = vec![
            person(1, "x", "part-time"),
            person(2, "y", "full-time"),
            person(3, "z", "part-time"),
            person(4, "w", ""),
        ];
        let desc = SortDescriptor::ascending("type");
        let mut rows: Vec<usize> = (0..records.len()).collect();
        sort_rows(&records, &mut rows, Some(&desc));
        assert_eq!(rows, vec![1, 0, 2, 3]);

        let again = rows.clone();
        sort_rows(&records, &mut rows, Some(&desc));
        assert_eq!(rows, again);
    }
}
