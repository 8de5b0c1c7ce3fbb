//! The Type Engine: a closed set of composable type descriptors.
//!
//! A [`TypeDescriptor`] is either a leaf (booleans, numbers, text and the
//! text-shaped leaves from [`crate::validation`]) or a wrapper around one or
//! more inner descriptors. Wrappers always check their inner descriptor first
//! and only then apply their own predicate, so an error raised by the inner
//! descriptor is reported unchanged.
use std::fmt;

use snafu::{ResultExt, Snafu};
use strum::Display;

use crate::{instance, validation, value::Value};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "validation failed for {path}: expected {expected}, got {}: {reason}",
        value.describe()
    ))]
    Invalid {
        value: Value,
        expected: String,
        path: String,
        reason: String,
    },

    #[snafu(display("validation failed for nested object at {path}"))]
    NestedObject {
        path: String,
        #[snafu(source(from(instance::Error, Box::new)))]
        source: Box<instance::Error>,
    },
}

impl Error {
    /// The dotted path of the offending value.
    pub fn path(&self) -> &str {
        match self {
            Self::Invalid { path, .. } | Self::NestedObject { path, .. } => path,
        }
    }
}

/// The location of a value below the instance being validated.
///
/// Paths are built like `outer.inner`, `list[3]`, `map[key]` and
/// `map[key] (key)` for the key itself. The root path prints as `self`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldPath(Option<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn field(&self, name: &str) -> Self {
        match &self.0 {
            Some(path) => Self(Some(format!("{path}.{name}"))),
            None => Self(Some(name.to_owned())),
        }
    }

    pub fn index(&self, index: usize) -> Self {
        Self(Some(format!("{self}[{index}]")))
    }

    pub fn key(&self, key: impl fmt::Display) -> Self {
        Self(Some(format!("{self}[{key}]")))
    }

    pub fn map_key(&self, key: impl fmt::Display) -> Self {
        Self(Some(format!("{self}[{key}] (key)")))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("self"))
    }
}

/// How a field holds the object type it ultimately refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Shape {
    Single,
    Sequence,
    Mapping,
}

/// The de-wrapped object type of a field, see [`TypeDescriptor::original_type`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalType {
    pub shape: Shape,
    pub type_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeDescriptor {
    Boolean,
    Integer,
    /// Integers or floating point numbers.
    Number,
    String,
    Identifier,
    CaseIdentifier,
    SystemIdentifier,
    Path,
    Arn,
    Ipv4,
    /// A storage quantity in `Ki`, `Mi` or `Gi`.
    Memory,
    /// An EBS volume id, optionally as an `aws://<zone>/` URL.
    AwsVolumeId,
    /// Exactly one of the listed values.
    Enum(Vec<Value>),

    Nullable(Box<Self>),
    /// Greater than or equal to zero.
    Positive(Box<Self>),
    NonZero(Box<Self>),
    NonEmpty(Box<Self>),
    List(Box<Self>),
    Map(Box<Self>, Box<Self>),
    /// The first matching candidate wins.
    OneOf(Vec<Self>),
    /// An instance of the named type or any of its subtypes.
    Object(String),
}

impl TypeDescriptor {
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn positive(inner: Self) -> Self {
        Self::Positive(Box::new(inner))
    }

    pub fn non_zero(inner: Self) -> Self {
        Self::NonZero(Box::new(inner))
    }

    pub fn non_empty(inner: Self) -> Self {
        Self::NonEmpty(Box::new(inner))
    }

    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn map(key: Self, value: Self) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }

    pub fn enumeration<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// `Map<String, String>`, the shape of labels, annotations and most selectors.
    pub fn string_map() -> Self {
        Self::map(Self::String, Self::String)
    }

    /// Positive, non-zero integers such as ports and replica counts.
    pub fn count() -> Self {
        Self::positive(Self::non_zero(Self::Integer))
    }

    /// The human readable name, used in errors and help output.
    pub fn name(&self) -> String {
        match self {
            Self::Boolean => "Boolean".to_owned(),
            Self::Integer => "Integer".to_owned(),
            Self::Number => "Number".to_owned(),
            Self::String => "String".to_owned(),
            Self::Identifier => "Identifier".to_owned(),
            Self::CaseIdentifier => "CaseIdentifier".to_owned(),
            Self::SystemIdentifier => "SystemIdentifier".to_owned(),
            Self::Path => "Path".to_owned(),
            Self::Arn => "ARN".to_owned(),
            Self::Ipv4 => "IPv4".to_owned(),
            Self::Memory => "Memory".to_owned(),
            Self::AwsVolumeId => "AWSVolID".to_owned(),
            Self::Enum(values) => {
                let values = values.iter().map(enum_label).collect::<Vec<_>>();
                format!("Enum({})", values.join(", "))
            }
            Self::Nullable(inner) => format!("Nullable<{}>", inner.name()),
            Self::Positive(inner) => format!("Positive<{}>", inner.name()),
            Self::NonZero(inner) => format!("NonZero<{}>", inner.name()),
            Self::NonEmpty(inner) => format!("NonEmpty<{}>", inner.name()),
            Self::List(inner) => format!("List<{}>", inner.name()),
            Self::Map(key, value) => format!("Map<{}, {}>", key.name(), value.name()),
            Self::OneOf(candidates) => {
                let names = candidates.iter().map(Self::name).collect::<Vec<_>>();
                format!("OneOf<{}>", names.join(", "))
            }
            Self::Object(type_name) => type_name.clone(),
        }
    }

    /// Recovers the concrete object type this descriptor ultimately holds,
    /// looking through the scalar wrappers.
    ///
    /// Returns [`None`] for leaves, for [`TypeDescriptor::OneOf`] and for
    /// containers of non-object values.
    pub fn original_type(&self) -> Option<OriginalType> {
        match self {
            Self::Object(type_name) => Some(OriginalType {
                shape: Shape::Single,
                type_name: type_name.clone(),
            }),
            Self::Nullable(inner)
            | Self::Positive(inner)
            | Self::NonZero(inner)
            | Self::NonEmpty(inner) => inner.original_type(),
            Self::List(inner) => inner.object_type().map(|type_name| OriginalType {
                shape: Shape::Sequence,
                type_name,
            }),
            Self::Map(_, value) => value.object_type().map(|type_name| OriginalType {
                shape: Shape::Mapping,
                type_name,
            }),
            _ => None,
        }
    }

    /// The object type held directly (through scalar wrappers only).
    fn object_type(&self) -> Option<String> {
        self.original_type()
            .filter(|original| original.shape == Shape::Single)
            .map(|original| original.type_name)
    }

    /// Checks `value` against this descriptor.
    pub fn check(&self, value: &Value, path: &FieldPath) -> Result<()> {
        match self {
            Self::Boolean => self.ensure(value, path, value.as_bool().is_some(), "expected boolean"),
            Self::Integer => self.ensure(value, path, value.as_i64().is_some(), "expected integer"),
            Self::Number => self.ensure(value, path, value.as_f64().is_some(), "expected number"),
            Self::String => self.ensure(value, path, value.as_str().is_some(), "expected string"),
            Self::Identifier => self.check_text(value, path, validation::is_identifier),
            Self::CaseIdentifier => self.check_text(value, path, validation::is_case_identifier),
            Self::SystemIdentifier => {
                self.check_text(value, path, validation::is_system_identifier)
            }
            Self::Path => self.check_text(value, path, validation::is_path),
            Self::Arn => self.check_text(value, path, validation::is_arn),
            Self::Ipv4 => self.check_text(value, path, validation::is_ipv4),
            Self::Memory => self.check_text(value, path, validation::is_memory),
            Self::AwsVolumeId => self.check_text(value, path, validation::is_aws_volume_id),
            Self::Enum(values) => self.ensure(
                value,
                path,
                values.contains(value),
                "not one of the enumerated values",
            ),

            Self::Nullable(inner) => match value {
                Value::Null => Ok(()),
                _ => inner.check(value, path),
            },
            Self::Positive(inner) => {
                inner.check(value, path)?;
                let positive = value.as_f64().is_some_and(|n| n >= 0.0);
                self.ensure(value, path, positive, "expected positive")
            }
            Self::NonZero(inner) => {
                inner.check(value, path)?;
                let non_zero = value.as_f64().is_some_and(|n| n != 0.0);
                self.ensure(value, path, non_zero, "expected non-zero")
            }
            Self::NonEmpty(inner) => {
                inner.check(value, path)?;
                let non_empty = value.len().is_some_and(|len| len != 0);
                self.ensure(value, path, non_empty, "expected non-empty")
            }
            Self::List(inner) => {
                let items = value
                    .as_seq()
                    .ok_or_else(|| self.invalid(value, path, "not a list"))?;
                items
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, item)| inner.check(item, &path.index(i)))
            }
            Self::Map(key_type, value_type) => {
                let map = value
                    .as_map()
                    .ok_or_else(|| self.invalid(value, path, "not a dictionary"))?;
                map.iter().try_for_each(|(k, v)| {
                    key_type.check(&k.to_value(), &path.map_key(k))?;
                    value_type.check(v, &path.key(k))
                })
            }
            Self::OneOf(candidates) => self.ensure(
                value,
                path,
                candidates.iter().any(|c| c.check(value, path).is_ok()),
                "none of the candidate types matched",
            ),
            Self::Object(type_name) => match value {
                Value::Object(instance) if instance.is_a(type_name) => instance
                    .validate_at(path)
                    .context(NestedObjectSnafu {
                        path: path.to_string(),
                    }),
                _ => Err(self.invalid(value, path, "not the right object type")),
            },
        }
    }

    fn check_text(
        &self,
        value: &Value,
        path: &FieldPath,
        predicate: fn(&str) -> Result<(), validation::Errors>,
    ) -> Result<()> {
        let text = value
            .as_str()
            .ok_or_else(|| self.invalid(value, path, "expected string"))?;
        predicate(text).map_err(|errors| self.invalid(value, path, &errors.to_string()))
    }

    fn ensure(&self, value: &Value, path: &FieldPath, ok: bool, reason: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(self.invalid(value, path, reason))
        }
    }

    fn invalid(&self, value: &Value, path: &FieldPath, reason: &str) -> Error {
        Error::Invalid {
            value: value.clone(),
            expected: self.name(),
            path: path.to_string(),
            reason: reason.to_owned(),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn enum_label(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.describe(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::value::Mapping;

    type T = TypeDescriptor;

    fn root() -> FieldPath {
        FieldPath::root()
    }

    /// Checks acceptance, and that a rejection explains itself.
    fn assert_accepts(ty: &TypeDescriptor, value: &Value, ok: bool) {
        match ty.check(value, &root()) {
            Ok(()) => assert!(ok, "{ty} accepted {value:?}"),
            Err(err) => {
                assert!(!ok, "{ty} rejected {value:?}: {err}");
                assert!(
                    matches!(&err, Error::Invalid { reason, .. } if !reason.is_empty()),
                    "unexpected error: {err}"
                );
            }
        }
    }

    #[rstest]
    #[case(T::Boolean, Value::Bool(true), true)]
    #[case(T::Boolean, Value::Int(1), false)]
    #[case(T::Integer, Value::Int(-4), true)]
    #[case(T::Integer, Value::Bool(false), false)]
    #[case(T::Integer, Value::Number(1.5), false)]
    #[case(T::Number, Value::Int(3), true)]
    #[case(T::Number, Value::Number(1.5), true)]
    #[case(T::Number, Value::Bool(true), false)]
    #[case(T::String, Value::from(""), true)]
    #[case(T::String, Value::Int(1), false)]
    #[case(T::Path, Value::from("/var/log"), true)]
    #[case(T::Path, Value::from("var/log"), false)]
    #[case(T::Arn, Value::from("arn:aws:iam::1234:role/x"), true)]
    #[case(T::Ipv4, Value::from("10.1.2.3"), true)]
    #[case(T::Ipv4, Value::Int(10), false)]
    #[case(T::Memory, Value::from("512Mi"), true)]
    #[case(T::Memory, Value::from("512MB"), false)]
    #[case(T::AwsVolumeId, Value::from("aws://eu-west-1a/vol-0a1b2c"), true)]
    #[case(T::AwsVolumeId, Value::from("vol-"), false)]
    #[case(T::Identifier, Value::from("web-1"), true)]
    #[case(T::Identifier, Value::from("Web"), false)]
    fn leaves(#[case] ty: TypeDescriptor, #[case] value: Value, #[case] ok: bool) {
        assert_accepts(&ty, &value, ok);
    }

    #[rstest]
    #[case(T::nullable(T::Integer), Value::Null, true)]
    #[case(T::nullable(T::Integer), Value::from("x"), false)]
    #[case(T::positive(T::Integer), Value::Int(0), true)]
    #[case(T::positive(T::Integer), Value::Int(-1), false)]
    #[case(T::non_zero(T::Integer), Value::Int(-1), true)]
    #[case(T::non_zero(T::Integer), Value::Int(0), false)]
    #[case(T::non_empty(T::String), Value::from("a"), true)]
    #[case(T::non_empty(T::String), Value::from(""), false)]
    #[case(T::non_empty(T::list(T::Integer)), Value::empty_seq(), false)]
    #[case(T::non_empty(T::string_map()), Value::empty_map(), false)]
    #[case(T::positive(T::Integer), Value::Null, false)]
    fn wrappers(#[case] ty: TypeDescriptor, #[case] value: Value, #[case] ok: bool) {
        assert_accepts(&ty, &value, ok);
    }

    #[test]
    fn inner_failure_is_reported_unchanged() {
        let err = T::positive(T::Integer)
            .check(&Value::from("3"), &root())
            .unwrap_err();
        assert!(
            matches!(&err, Error::Invalid { expected, reason, .. }
                if expected == "Integer" && reason == "expected integer"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn list_rejects_non_lists_and_bad_elements() {
        let ty = T::list(T::String);
        assert!(ty.check(&Value::from("abc"), &root()).is_err());
        assert!(ty.check(&Value::from(vec!["a", "b"]), &root()).is_ok());

        let bad = Value::Seq(vec![Value::from("a"), Value::Int(2)]);
        let err = ty.check(&bad, &FieldPath::root().field("args")).unwrap_err();
        assert_eq!(err.path(), "args[1]");
    }

    #[test]
    fn map_checks_keys_and_values() {
        let ty = T::map(T::Identifier, T::Integer);
        assert!(ty.check(&Value::from([("a", 1)]), &root()).is_ok());
        assert!(ty.check(&Value::from(vec![1]), &root()).is_err());

        let err = ty
            .check(&Value::from([("Bad", 1)]), &FieldPath::root().field("m"))
            .unwrap_err();
        assert_eq!(err.path(), "m[Bad] (key)");

        let err = ty
            .check(&Value::from([("ok", "x")]), &FieldPath::root().field("m"))
            .unwrap_err();
        assert_eq!(err.path(), "m[ok]");

        let mut int_keys = Mapping::new();
        int_keys.insert(1.into(), Value::Int(1));
        assert!(ty.check(&Value::Map(int_keys), &root()).is_err());
    }

    #[test]
    fn one_of_accepts_either_candidate() {
        let ty = T::OneOf(vec![T::Integer, T::String]);
        assert!(ty.check(&Value::Int(1), &root()).is_ok());
        assert!(ty.check(&Value::from("x"), &root()).is_ok());
        assert!(ty.check(&Value::Bool(true), &root()).is_err());
    }

    #[test]
    fn enum_requires_exact_membership() {
        let ty = T::enumeration(["TCP", "UDP"]);
        assert!(ty.check(&Value::from("TCP"), &root()).is_ok());
        assert!(ty.check(&Value::from("tcp"), &root()).is_err());
        assert_eq!(ty.name(), "Enum(TCP, UDP)");
    }

    #[rstest]
    #[case(T::count(), "Positive<NonZero<Integer>>")]
    #[case(T::nullable(T::list(T::Identifier)), "Nullable<List<Identifier>>")]
    #[case(T::string_map(), "Map<String, String>")]
    #[case(T::OneOf(vec![T::Arn, T::Ipv4]), "OneOf<ARN, IPv4>")]
    #[case(T::object("ServicePort"), "ServicePort")]
    fn names(#[case] ty: TypeDescriptor, #[case] expected: &str) {
        assert_eq!(ty.name(), expected);
    }

    #[rstest]
    #[case(T::nullable(T::object("A")), Some((Shape::Single, "A")))]
    #[case(T::non_empty(T::list(T::object("A"))), Some((Shape::Sequence, "A")))]
    #[case(T::map(T::String, T::nullable(T::object("A"))), Some((Shape::Mapping, "A")))]
    #[case(T::list(T::list(T::object("A"))), None)]
    #[case(T::list(T::String), None)]
    #[case(T::Integer, None)]
    fn original_types(#[case] ty: TypeDescriptor, #[case] expected: Option<(Shape, &str)>) {
        let expected = expected.map(|(shape, name)| OriginalType {
            shape,
            type_name: name.to_owned(),
        });
        assert_eq!(ty.original_type(), expected);
    }

    #[test]
    fn root_path_prints_as_self() {
        assert_eq!(FieldPath::root().to_string(), "self");
        assert_eq!(FieldPath::root().index(0).to_string(), "self[0]");
        assert_eq!(
            FieldPath::root().field("spec").field("ports").to_string(),
            "spec.ports"
        );
    }
}
