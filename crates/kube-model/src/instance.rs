//! Model instances: the runtime objects built against a resolved schema.
//!
//! An [`Instance`] owns a field store keyed by schema field names (and alias
//! names), its namespace and cluster bindings, instance-level labels and
//! annotations, and the [`Provenance`] of the call that created it.
use std::{
    collections::BTreeMap,
    fmt,
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use educe::Educe;
use indexmap::IndexMap;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, trace};

use crate::{
    render::{self, Document},
    schema::{self, Catalog, DefaultValue, ResolvedType},
    transform::{self, View},
    types::{self, FieldPath, Shape},
    value::{MapKey, Value},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to look up type"))]
    LookupType { source: schema::Error },

    #[snafu(display(
        "{type_name} is an abstract type and can't be instantiated ({origin}), use one of: {alternatives}"
    ))]
    AbstractType {
        type_name: String,
        alternatives: String,
        origin: Origin,
    },

    #[snafu(display("{subtype} is not a subtype of {type_name} ({origin})"))]
    NotASubtype {
        type_name: String,
        subtype: String,
        origin: Origin,
    },

    #[snafu(display("{type_name} requires its identifier {identifier:?} on construction ({origin})"))]
    MissingIdentifier {
        type_name: String,
        identifier: String,
        origin: Origin,
    },

    #[snafu(display("{type_name} has no identifier, but one was supplied ({origin})"))]
    UnexpectedIdentifier { type_name: String, origin: Origin },

    #[snafu(display("construction of {type_name} was rejected ({origin}): {reason}"))]
    ConstructionRejected {
        type_name: String,
        reason: String,
        origin: Origin,
    },

    #[snafu(display("{type_name} has no field {field:?} ({origin})"))]
    UnknownField {
        type_name: String,
        field: String,
        origin: Origin,
    },

    #[snafu(display("field {field:?} of {type_name} does not hold objects ({origin})"))]
    NotAFactoryField {
        type_name: String,
        field: String,
        origin: Origin,
    },

    #[snafu(display("field {field:?} of {type_name} is a mapping, a key is required ({origin})"))]
    MissingMapKey {
        type_name: String,
        field: String,
        origin: Origin,
    },

    #[snafu(display("{type_name} has an unresolved field {key:?} ({origin})"))]
    UnresolvedKey {
        type_name: String,
        key: String,
        origin: Origin,
    },

    #[snafu(display("{type_name} failed validation ({origin})"))]
    InvalidField {
        type_name: String,
        origin: Origin,
        source: types::Error,
    },

    #[snafu(display("{type_name} failed validation ({origin}): {reason}"))]
    ObjectValidation {
        type_name: String,
        reason: String,
        origin: Origin,
    },

    #[snafu(display("failed to transform field {field:?} of {type_name} ({origin})"))]
    Transform {
        type_name: String,
        field: String,
        origin: Origin,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },
}

/// The source location an instance was created from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Provenance {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// The location of the (outermost `#[track_caller]`) caller.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line(), location.column())
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Where an error's instance was created, if known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Origin(pub Option<Provenance>);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(provenance) => write!(f, "created at {provenance}"),
            None => f.write_str("created at an unknown location"),
        }
    }
}

/// A process-unique instance id. Clones get a fresh one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(u64);

impl Uid {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Construction arguments: an optional positional identifier plus named fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    id: Option<Value>,
    fields: IndexMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            fields: IndexMap::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Namespace and cluster an instance is bound to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Binding {
    pub namespace: Option<String>,
    pub cluster: Option<String>,
}

/// Where [`Instance::new_child`] attaches a new nested object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    field: String,
    subtype: Option<String>,
    key: Option<MapKey>,
}

impl Target {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            subtype: None,
            key: None,
        }
    }

    /// Builds this (more specific) subtype instead of the field's declared type.
    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// The key to insert under, for mapping fields.
    pub fn key(mut self, key: impl Into<MapKey>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl From<&str> for Target {
    fn from(field: &str) -> Self {
        Self::field(field)
    }
}

#[derive(Educe)]
#[educe(Debug, PartialEq)]
pub struct Instance {
    #[educe(Debug(ignore), PartialEq(ignore))]
    catalog: Catalog,
    ty: Arc<ResolvedType>,
    #[educe(PartialEq(ignore))]
    uid: Uid,
    fields: IndexMap<String, Value>,
    binding: Binding,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    #[educe(PartialEq(ignore))]
    provenance: Option<Provenance>,
}

impl Clone for Instance {
    /// A deep copy with a fresh [`Uid`]. Nested instances are cloned too.
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            ty: self.ty.clone(),
            uid: Uid::next(),
            fields: self.fields.clone(),
            binding: self.binding.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            provenance: self.provenance.clone(),
        }
    }
}

impl Instance {
    pub(crate) fn construct(
        catalog: &Catalog,
        type_name: &str,
        args: Args,
        origin: Option<Provenance>,
        binding: Binding,
    ) -> Result<Self> {
        let ty = catalog.get(type_name).context(LookupTypeSnafu)?.clone();
        let origin_of = || Origin(origin.clone());

        ensure!(
            !ty.is_abstract,
            AbstractTypeSnafu {
                type_name,
                alternatives: catalog.concrete_subtypes(type_name).join(", "),
                origin: origin_of(),
            }
        );

        let mut fields = IndexMap::with_capacity(ty.defaults.len());
        for (field, default) in &ty.defaults {
            let value = match default {
                DefaultValue::Value(value) => value.clone(),
                DefaultValue::Object { type_name, args } => Value::from(Self::construct(
                    catalog,
                    type_name,
                    args.clone(),
                    origin.clone(),
                    Binding::default(),
                )?),
            };
            fields.insert(field.clone(), value);
        }

        let Args { id, fields: mut named } = args;
        match (&ty.identifier, id) {
            (Some(identifier), id) if !named.contains_key(identifier) => match id {
                Some(id) => {
                    named.shift_insert(0, identifier.clone(), id);
                }
                None => ensure!(
                    !ty.is_top_level(),
                    MissingIdentifierSnafu {
                        type_name,
                        identifier: identifier.clone(),
                        origin: origin_of(),
                    }
                ),
            },
            (None, Some(_)) => {
                return UnexpectedIdentifierSnafu {
                    type_name,
                    origin: origin_of(),
                }
                .fail();
            }
            _ => {}
        }
        let named = Args { id: None, fields: named };

        if let Some(early) = ty.early {
            early(&ty, &named).map_err(|reason| Error::ConstructionRejected {
                type_name: type_name.to_owned(),
                reason,
                origin: origin_of(),
            })?;
        }

        let binding = if ty.namespaced {
            binding
        } else {
            Binding {
                namespace: None,
                ..binding
            }
        };

        let mut instance = Self {
            catalog: catalog.clone(),
            ty,
            uid: Uid::next(),
            fields,
            binding,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            provenance: None,
        };
        instance.apply_fields(named.fields)?;
        instance.set_provenance(origin);

        debug!(
            type_name = instance.type_name(),
            uid = %instance.uid,
            namespace = ?instance.binding.namespace,
            "constructed instance"
        );
        Ok(instance)
    }

    /// Applies named fields: sequences replace the stored value, mappings merge
    /// into a stored mapping, everything else replaces. Values given under an
    /// alias land on the canonical field.
    fn apply_fields(&mut self, named: IndexMap<String, Value>) -> Result<()> {
        for (field, value) in named {
            let field = self.storage_key(&field)?;
            match value {
                Value::Map(merged) if matches!(self.fields.get(&field), Some(Value::Map(_))) => {
                    if let Some(Value::Map(stored)) = self.fields.get_mut(&field) {
                        stored.extend(merged);
                    }
                }
                value => {
                    self.fields.insert(field, value);
                }
            }
        }
        Ok(())
    }

    /// The canonical field `field` is stored under.
    fn storage_key(&self, field: &str) -> Result<String> {
        self.ty
            .canonical(field)
            .map(ToOwned::to_owned)
            .context(UnknownFieldSnafu {
                type_name: self.type_name(),
                field,
                origin: self.origin(),
            })
    }

    /// Records `provenance` on this instance and every nested instance.
    pub(crate) fn set_provenance(&mut self, provenance: Option<Provenance>) {
        for value in self.fields.values_mut() {
            value.for_each_object_mut(&mut |nested| nested.set_provenance(provenance.clone()));
        }
        self.provenance = provenance;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolved(&self) -> &ResolvedType {
        &self.ty
    }

    pub fn type_name(&self) -> &str {
        &self.ty.name
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub(crate) fn origin(&self) -> Origin {
        Origin(self.provenance.clone())
    }

    /// Whether this instance's type is `type_name` or one of its subtypes.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.ty.is_a(type_name)
    }

    /// The value of the identifier field, if the type has one.
    pub fn identifier(&self) -> Option<&Value> {
        self.ty
            .identifier
            .as_ref()
            .and_then(|field| self.fields.get(field))
    }

    /// The identifier as text, which is what all built-in kinds use.
    pub fn name(&self) -> Option<&str> {
        self.identifier().and_then(Value::as_str)
    }

    /// The identity used by output writers, such as `deployment-web`.
    pub fn output_identifier(&self) -> Option<String> {
        let kind = self.ty.kind.as_ref()?;
        let id = match self.identifier()? {
            Value::Text(id) => id.clone(),
            other => other.describe(),
        };
        Some(format!("{}-{id}", kind.kubectl_type))
    }

    pub fn is_namespaced(&self) -> bool {
        self.ty.namespaced
    }

    pub fn output_order(&self) -> u32 {
        self.ty.output_order
    }

    /// Types whose render must not be cached between writes.
    pub fn always_regenerate(&self) -> bool {
        self.ty.always_regenerate
    }

    pub fn namespace(&self) -> Option<&str> {
        self.binding.namespace.as_deref()
    }

    pub fn cluster(&self) -> Option<&str> {
        self.binding.cluster.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn label(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// The stored fields, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn field_store(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// Reads a field. Alias names read their canonical field.
    pub fn get(&self, field: &str) -> Result<&Value> {
        static NULL: Value = Value::Null;
        let key = self.storage_key(field)?;
        Ok(self.fields.get(&key).unwrap_or(&NULL))
    }

    pub fn get_mut(&mut self, field: &str) -> Result<&mut Value> {
        let key = self.storage_key(field)?;
        Ok(self.fields.entry(key).or_default())
    }

    /// Replaces the value of a field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let key = self.storage_key(field)?;
        trace!(type_name = self.type_name(), field = key.as_str(), uid = %self.uid, "setting field");
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Whether `other` is a direct field value of this instance: held as a
    /// single value, as a sequence element or as a mapping value.
    pub fn holds(&self, other: &Self) -> bool {
        let is_other = |value: &Value| value.as_object().is_some_and(|obj| obj.uid == other.uid);
        self.fields.values().any(|value| match value {
            Value::Seq(items) => items.iter().any(is_other),
            Value::Map(map) => map.values().any(is_other),
            value => is_other(value),
        })
    }

    /// A deep copy with `args` applied on top, following the same replace and
    /// merge rules as construction. A positional id replaces the identifier.
    #[track_caller]
    pub fn clone_with(&self, args: Args) -> Result<Self> {
        let mut copy = self.clone();
        let Args { id, fields } = args;
        if let Some(id) = id {
            let Some(identifier) = self.ty.identifier.clone() else {
                return UnexpectedIdentifierSnafu {
                    type_name: self.type_name(),
                    origin: self.origin(),
                }
                .fail();
            };
            copy.fields.insert(identifier, id);
        }
        copy.apply_fields(fields)?;
        copy.set_provenance(Some(Provenance::caller()));
        Ok(copy)
    }

    /// Builds a nested object for an object-holding field and attaches it: as
    /// the single value, appended to a sequence, or under the target's key in
    /// a mapping.
    #[track_caller]
    pub fn new_child(&mut self, target: impl Into<Target>, args: Args) -> Result<&mut Self> {
        let Target {
            field,
            subtype,
            key,
        } = target.into();
        let origin = Some(Provenance::caller());

        let canonical = self.storage_key(&field)?;
        let original = self.ty.fields[&canonical]
            .original_type()
            .context(NotAFactoryFieldSnafu {
                type_name: self.type_name(),
                field: field.clone(),
                origin: self.origin(),
            })?;

        let child_type = match subtype {
            Some(subtype) => {
                ensure!(
                    self.catalog.is_subtype(&subtype, &original.type_name),
                    NotASubtypeSnafu {
                        type_name: original.type_name.clone(),
                        subtype,
                        origin: self.origin(),
                    }
                );
                subtype
            }
            None => original.type_name,
        };
        ensure!(
            original.shape != Shape::Mapping || key.is_some(),
            MissingMapKeySnafu {
                type_name: self.type_name(),
                field,
                origin: self.origin(),
            }
        );

        let child = Value::from(Self::construct(
            &self.catalog,
            &child_type,
            args,
            origin,
            Binding::default(),
        )?);
        let slot = self.fields.entry(canonical).or_default();
        let attached = match (original.shape, key) {
            (Shape::Single, _) => {
                *slot = child;
                slot
            }
            (Shape::Sequence, _) => {
                if slot.as_seq().is_none() {
                    *slot = Value::empty_seq();
                }
                let Value::Seq(items) = slot else {
                    unreachable!("slot was just made a sequence")
                };
                items.push(child);
                let last = items.len() - 1;
                &mut items[last]
            }
            (Shape::Mapping, key) => {
                if slot.as_map().is_none() {
                    *slot = Value::empty_map();
                }
                let Value::Map(map) = slot else {
                    unreachable!("slot was just made a mapping")
                };
                let key = key.unwrap_or_else(|| unreachable!("mapping keys are checked above"));
                map.insert(key.clone(), child);
                &mut map[&key]
            }
        };
        let Value::Object(child) = attached else {
            unreachable!("an object was just attached")
        };
        Ok(&mut **child)
    }

    /// Validates the transformed view of this instance, see [`Self::validate_view`].
    pub fn validate(&self) -> Result<()> {
        self.validate_at(&FieldPath::root())
    }

    pub(crate) fn validate_at(&self, path: &FieldPath) -> Result<()> {
        let view = transform::view(self)?;
        self.validate_view(&view, path)
    }

    /// Checks every schema field of `view` (absent fields as null), rejects
    /// keys that are neither fields nor aliases, then runs the object-level
    /// validation hook.
    pub fn validate_view(&self, view: &View<'_>, path: &FieldPath) -> Result<()> {
        for (field, ty) in &self.ty.fields {
            ty.check(view.get(field), &path.field(field))
                .context(InvalidFieldSnafu {
                    type_name: self.type_name(),
                    origin: self.origin(),
                })?;
        }

        if let Some(key) = view.keys().find(|key| !self.ty.accepts(key)) {
            return UnresolvedKeySnafu {
                type_name: self.type_name(),
                key,
                origin: self.origin(),
            }
            .fail();
        }

        if let Some(validate) = self.ty.validate {
            validate(view).map_err(|reason| Error::ObjectValidation {
                type_name: self.type_name().to_owned(),
                reason,
                origin: self.origin(),
            })?;
        }
        Ok(())
    }

    /// Renders this instance into its document, see [`render::render_document`].
    pub fn render(&self) -> render::Result<Option<Document>> {
        render::render_document(self)
    }
}
