//! Typed field accessors for compare-and-swap
//!
//! A [`FieldLens`] selects one value out of a [`Row`] and writes it back.
//! [`Property`] covers the common case of a single named property;
//! [`lens`] builds one from a getter and a setter closure for anything else
//! (derived values, several properties kept in step).

use std::marker::PhantomData;
use tablekeep_core::{PropertyValue, Result, Row};

/// Getter and setter for one field of a row
pub trait FieldLens<T> {
    /// Read the field
    ///
    /// # Errors
    ///
    /// Returns `PropertyType` if the row does not hold a `T` there.
    fn get(&self, row: &Row) -> Result<T>;

    /// Write the field
    fn set(&self, row: &mut Row, value: T);
}

/// Lens over a single named property
///
/// ```
/// use tablekeep_concurrency::{FieldLens, Property};
/// use tablekeep_core::{Row, RowAddress};
///
/// let status = Property::<String>::new("Status");
/// let mut row = Row::new(RowAddress::parse("p", "r").unwrap()).with("Status", "queued");
/// assert_eq!(status.get(&row).unwrap(), "queued");
/// status.set(&mut row, "running".to_string());
/// assert_eq!(row.get_str("Status"), Some("running"));
/// ```
#[derive(Debug, Clone)]
pub struct Property<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Lens over the property called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: PropertyValue> FieldLens<T> for Property<T> {
    fn get(&self, row: &Row) -> Result<T> {
        row.get_as(&self.name)
    }

    fn set(&self, row: &mut Row, value: T) {
        row.set(self.name.clone(), value.into_value());
    }
}

/// Lens built from closures, see [`lens`]
#[derive(Clone)]
pub struct FnLens<G, S> {
    getter: G,
    setter: S,
}

/// Build a lens from a getter and a setter
pub fn lens<T, G, S>(getter: G, setter: S) -> FnLens<G, S>
where
    G: Fn(&Row) -> Result<T>,
    S: Fn(&mut Row, T),
{
    FnLens { getter, setter }
}

impl<T, G, S> FieldLens<T> for FnLens<G, S>
where
    G: Fn(&Row) -> Result<T>,
    S: Fn(&mut Row, T),
{
    fn get(&self, row: &Row) -> Result<T> {
        (self.getter)(row)
    }

    fn set(&self, row: &mut Row, value: T) {
        (self.setter)(row, value)
    }
}
