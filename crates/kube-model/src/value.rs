//! Dynamic values stored in an [`Instance`]'s field store.
//!
//! The field store is keyed by schema field names and holds [`Value`]s, which
//! can be scalars, sequences, mappings or nested [`Instance`]s. Mapping keys
//! are restricted to the hashable scalars in [`MapKey`].
use std::{collections::BTreeMap, fmt};

use indexmap::IndexMap;
use strum::Display;

use crate::instance::Instance;

/// An insertion-ordered mapping as stored in the field store.
pub type Mapping = IndexMap<MapKey, Value>;

/// The key of a [`Mapping`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl MapKey {
    /// Returns the key as a [`Value`], used when validating keys against a key type.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MapKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MapKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MapKey {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The coarse kind of a [`Value`], used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    List,
    Map,
    Object,
}

/// A single value held by a field.
///
/// Cloning a [`Value`] is always deep: nested instances are cloned into
/// independent copies with their own identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// The absent value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    Seq(Vec<Value>),
    Map(Mapping),
    Object(Box<Instance>),
}

impl Value {
    /// Creates an empty mapping value.
    pub fn empty_map() -> Self {
        Self::Map(Mapping::new())
    }

    /// Creates an empty sequence value.
    pub fn empty_seq() -> Self {
        Self::Seq(Vec::new())
    }

    /// Builds a mapping value from key/value pairs, keeping their order.
    pub fn mapping<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MapKey>,
        V: Into<Self>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Int(_) => ValueKind::Integer,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::String,
            Self::Seq(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The size of sized values: characters of text, elements of sequences and
    /// entries of mappings. Other values have no size.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.chars().count()),
            Self::Seq(items) => Some(items.len()),
            Self::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and numbers. Booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Self]> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Visits every instance nested anywhere in this value.
    pub(crate) fn for_each_object_mut(&mut self, f: &mut impl FnMut(&mut Instance)) {
        match self {
            Self::Object(obj) => f(obj),
            Self::Seq(items) => items.iter_mut().for_each(|v| v.for_each_object_mut(f)),
            Self::Map(map) => map.values_mut().for_each(|v| v.for_each_object_mut(f)),
            _ => {}
        }
    }

    /// A short description for diagnostics, such as `integer 5` or `Deployment "web"`.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => format!("boolean {b}"),
            Self::Int(i) => format!("integer {i}"),
            Self::Number(n) => format!("number {n}"),
            Self::Text(s) => format!("string {s:?}"),
            Self::Seq(items) => format!("list of {} items", items.len()),
            Self::Map(map) => format!("map of {} entries", map.len()),
            Self::Object(obj) => match obj.identifier().and_then(Self::as_str) {
                Some(id) => format!("{} {id:?}", obj.type_name()),
                None => obj.type_name().to_owned(),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Self::Object(Box::new(value))
    }
}

impl From<Mapping> for Value {
    fn from(value: Mapping) -> Self {
        Self::Map(value)
    }
}

impl From<&MapKey> for Value {
    fn from(value: &MapKey) -> Self {
        value.to_value()
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Seq(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<MapKey>, V: Into<Self>, const N: usize> From<[(K, V); N]> for Value {
    fn from(value: [(K, V); N]) -> Self {
        Self::mapping(value)
    }
}

impl<K: Into<MapKey>, V: Into<Self>> From<BTreeMap<K, V>> for Value {
    fn from(value: BTreeMap<K, V>) -> Self {
        Self::mapping(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_len_counts_characters() {
        assert_eq!(Value::from("näme").len(), Some(4));
        assert_eq!(Value::Int(3).len(), None);
        assert!(Value::empty_seq().is_empty());
        assert!(!Value::Null.is_empty());
    }

    #[test]
    fn booleans_are_not_numbers() {
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
    }

    #[test]
    fn mapping_keeps_insertion_order() {
        let value = Value::from([("b", 1), ("a", 2)]);
        let keys = value
            .as_map()
            .expect("value is a map")
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(keys, ["b", "a"]);
    }
}
