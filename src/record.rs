//! Records flowing through a data view.
//!
//! The view never inspects a record directly. It only asks for the stable
//! identifier and for named field values, so the same filter, sort, page and
//! selection logic serves employees, interviews and applications alike.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Capability interface every row type of a data view implements.
pub trait Record: Send + Sync {
    type Id: Clone + Eq + Hash + Debug + Send + Sync;

    /// Stable identifier, unique within one row store.
    fn id(&self) -> Self::Id;

    /// Value of a named field. `None` means the field is missing, which the
    /// engines treat like an empty value.
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Ordered column names of a loaded table with name lookup.
#[derive(Debug, Default)]
pub struct Columns {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Columns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Columns { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Generic row of a table file. All cells are kept as strings, `None` is a null cell.
#[derive(Debug, Clone)]
pub struct TableRecord {
    id: String,
    columns: Arc<Columns>,
    values: Vec<Option<String>>,
}

impl TableRecord {
    pub fn new(id: impl Into<String>, columns: Arc<Columns>, values: Vec<Option<String>>) -> Self {
        TableRecord {
            id: id.into(),
            columns,
            values,
        }
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn value(&self, column: usize) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}

impl Record for TableRecord {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.columns
            .position(name)
            .and_then(|idx| self.value(idx))
            .map(Cow::Borrowed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small hand written record used by the engine tests.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Person {
        pub id: u32,
        pub name: Option<&'static str>,
        pub kind: Option<&'static str>,
    }

    impl Record for Person {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }

        fn field(&self, name: &str) -> Option<Cow<'_, str>> {
            match name {
                "name" => self.name.map(Cow::Borrowed),
                "type" => self.kind.map(Cow::Borrowed),
                "id" => Some(Cow::Owned(self.id.to_string())),
                _ => None,
            }
        }
    }

    pub(crate) fn person(id: u32, name: &'static str, kind: &'static str) -> Person {
        Person {
            id,
            name: (!name.is_empty()).then_some(name),
            kind: (!kind.is_empty()).then_some(kind),
        }
    }

    #[test]
    fn table_record_field_lookup() {
        let columns = Arc::new(Columns::new(["id", "name", "department"]));
        let record = TableRecord::new(
            "7",
            Arc::clone(&columns),
            vec![Some("7".into()), Some("Ada".into()), None],
        );

        assert_eq!(record.id(), "7");
        assert_eq!(record.field("name").as_deref(), Some("Ada"));
        assert_eq!(record.field("department"), None);
        assert_eq!(record.field("salary"), None);
        assert_eq!(columns.position("department"), Some(2));
    }
}
