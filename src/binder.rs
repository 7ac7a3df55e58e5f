use std::collections::HashMap;

use crate::error::CrudMiddlewareError;
use crate::placeholders::Placeholder;
use crate::types::RowValues;

/// Where the value for one numbered slot of a rendered statement comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A user placeholder; `position` is its index in the statement's parameter sequence
    /// (distinct named placeholders plus every `?`, in rendered order).
    Param {
        placeholder: Placeholder,
        position: usize,
    },
    /// Current row limit of the statement.
    Limit,
    /// Current row offset of the statement.
    Offset,
    /// A value carried by the statement itself, such as an inserted row field.
    Literal(RowValues),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BindKey {
    Name(String),
    Position(usize),
}

/// Limit and offset values bound into templates that carry them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowWindow {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Bound values for a statement's placeholders.
///
/// Values may be supplied by name, as an ordered list, or as a name to value map; every form
/// resolves against the same parameter sequence. Binding never changes a statement's shape.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    values: HashMap<BindKey, RowValues>,
}

impl ParameterBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named placeholder. A leading `:` is accepted and ignored.
    pub fn bind(&mut self, name: &str, value: impl Into<RowValues>) {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.values
            .insert(BindKey::Name(name.to_string()), value.into());
    }

    /// Bind the parameter at `position` of the parameter sequence.
    pub fn bind_at(&mut self, position: usize, value: impl Into<RowValues>) {
        self.values.insert(BindKey::Position(position), value.into());
    }

    /// Replace every binding with an ordered list.
    pub fn bind_list<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<RowValues>,
    {
        self.values.clear();
        for (position, value) in values.into_iter().enumerate() {
            self.values.insert(BindKey::Position(position), value.into());
        }
    }

    /// Bind every entry of a name to value map, overwriting existing names.
    pub fn bind_map<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RowValues>,
    {
        for (name, value) in values {
            self.bind(name.as_ref(), value);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, placeholder: &Placeholder, position: usize) -> Option<&RowValues> {
        let by_name = match placeholder {
            Placeholder::Named(name) => self.values.get(&BindKey::Name(name.clone())),
            Placeholder::Positional => None,
        };
        by_name.or_else(|| self.values.get(&BindKey::Position(position)))
    }

    /// Produce the value list for a rendered statement, one entry per slot.
    ///
    /// # Errors
    /// Returns `MissingBinding` naming the first placeholder without a value.
    pub fn resolve(
        &self,
        slots: &[Slot],
        window: RowWindow,
    ) -> Result<Vec<RowValues>, CrudMiddlewareError> {
        slots
            .iter()
            .map(|slot| match slot {
                Slot::Param {
                    placeholder,
                    position,
                } => self.lookup(placeholder, *position).cloned().ok_or_else(|| {
                    CrudMiddlewareError::MissingBinding(format!(
                        "no value bound for placeholder {placeholder} (parameter {position})"
                    ))
                }),
                Slot::Limit => Ok(window
                    .limit
                    .map_or(RowValues::Null, |limit| RowValues::Int(clamp(limit)))),
                Slot::Offset => Ok(RowValues::Int(clamp(window.offset.unwrap_or(0)))),
                Slot::Literal(value) => Ok(value.clone()),
            })
            .collect()
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, position: usize) -> Slot {
        Slot::Param {
            placeholder: Placeholder::Named(name.into()),
            position,
        }
    }

    fn positional(position: usize) -> Slot {
        Slot::Param {
            placeholder: Placeholder::Positional,
            position,
        }
    }

    #[test]
    fn name_list_and_map_agree() {
        let slots = vec![named("x", 0)];

        let mut by_name = ParameterBinder::new();
        by_name.bind(":x", 7);
        let mut by_list = ParameterBinder::new();
        by_list.bind_list([7]);
        let mut by_map = ParameterBinder::new();
        by_map.bind_map([("x", 7)]);

        let expected = vec![RowValues::Int(7)];
        for binder in [by_name, by_list, by_map] {
            assert_eq!(binder.resolve(&slots, RowWindow::default()).unwrap(), expected);
        }
    }

    #[test]
    fn positional_binds_left_to_right() {
        let slots = vec![positional(0), named("n", 1), positional(2)];
        let mut binder = ParameterBinder::new();
        binder.bind_list(["a", "b", "c"]);
        let values = binder.resolve(&slots, RowWindow::default()).unwrap();
        assert_eq!(
            values,
            vec![
                RowValues::Text("a".into()),
                RowValues::Text("b".into()),
                RowValues::Text("c".into()),
            ]
        );
    }

    #[test]
    fn rebinding_overwrites() {
        let slots = vec![named("x", 0)];
        let mut binder = ParameterBinder::new();
        binder.bind("x", 1);
        binder.bind("x", 2);
        assert_eq!(
            binder.resolve(&slots, RowWindow::default()).unwrap(),
            vec![RowValues::Int(2)]
        );

        binder.bind_list([3, 4]);
        binder.bind_list([5]);
        assert_eq!(
            binder.resolve(&slots, RowWindow::default()).unwrap(),
            vec![RowValues::Int(5)]
        );
    }

    #[test]
    fn reports_first_gap() {
        let slots = vec![named("x", 0), named("y", 1)];
        let mut binder = ParameterBinder::new();
        binder.bind("x", 1);
        let err = binder.resolve(&slots, RowWindow::default()).unwrap_err();
        assert!(matches!(&err, CrudMiddlewareError::MissingBinding(msg) if msg.contains(":y")));
    }

    #[test]
    fn window_slots_fill_defaults() {
        let binder = ParameterBinder::new();
        let values = binder
            .resolve(
                &[Slot::Limit, Slot::Offset, Slot::Literal(RowValues::Bool(true))],
                RowWindow {
                    limit: None,
                    offset: None,
                },
            )
            .unwrap();
        assert_eq!(values, vec![RowValues::Null, RowValues::Int(0), RowValues::Bool(true)]);
    }
}
