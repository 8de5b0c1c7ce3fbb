//! Type definitions, schema inference and the closed [`Catalog`] of resolved
//! types.
//!
//! A type is declared once as a [`TypeDef`], which only lists what the type adds
//! on top of its parent. All definitions are registered with a
//! [`CatalogBuilder`], and [`CatalogBuilder::build`] resolves every type against
//! its ancestry in one pass. After that the type universe is closed and the
//! [`Catalog`] is read-only, apart from the lazily built [`ParentIndex`].
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, OnceLock},
};

use indexmap::IndexMap;
use snafu::{OptionExt, Snafu, ensure};
use tracing::{debug, trace};

use crate::{
    index::ParentIndex,
    instance::{self, Args, Instance},
    render::{self, Document, RenderContext},
    transform::{TransformContext, View},
    types::TypeDescriptor,
    value::Value,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("type {type_name:?} is registered more than once"))]
    DuplicateType { type_name: String },

    #[snafu(display("type {type_name:?} derives from unknown type {parent:?}"))]
    UnknownParent { type_name: String, parent: String },

    #[snafu(display("type {type_name:?} is part of an inheritance cycle"))]
    InheritanceCycle { type_name: String },

    #[snafu(display(
        "field {field:?} of type {type_name:?} refers to unknown object type {referenced:?}"
    ))]
    UnknownObjectType {
        type_name: String,
        field: String,
        referenced: String,
    },

    #[snafu(display(
        "failed to infer the type of field {field:?} of type {type_name:?} from its default {representative}"
    ))]
    InferField {
        type_name: String,
        field: String,
        representative: String,
    },

    #[snafu(display(
        "alias {alias:?} of type {type_name:?} points to {canonical:?}, which is not a field"
    ))]
    AliasTarget {
        type_name: String,
        alias: String,
        canonical: String,
    },

    #[snafu(display(
        "transform hook of type {type_name:?} is declared for {field:?}, which is neither a field nor an alias"
    ))]
    TransformTarget { type_name: String, field: String },

    #[snafu(display("unknown type {type_name:?}"))]
    UnknownType { type_name: String },
}

/// Normalizes the stored value of one field when the transformed view is computed.
pub type TransformHook = fn(&TransformContext<'_>, &Value) -> instance::Result<Value>;

/// Object-level invariant, checked after every field passed validation.
pub type ValidateHook = fn(&View<'_>) -> Result<(), String>;

/// Construction precondition, run before any named field is applied.
pub type EarlyHook = fn(&ResolvedType, &Args) -> Result<(), String>;

/// Shapes the transformed view into a document fragment. [`None`] means the
/// instance produces no document.
pub type RenderFn = fn(&mut RenderContext<'_>) -> render::Result<Option<Document>>;

/// The default value of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// A fresh instance of `type_name`, built for every new instance.
    Object { type_name: String, args: Args },
}

impl DefaultValue {
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object {
            type_name: type_name.into(),
            args: Args::new(),
        }
    }
}

impl<T: Into<Value>> From<T> for DefaultValue {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.write_str(&value.describe()),
            Self::Object { type_name, .. } => write!(f, "{type_name} object"),
        }
    }
}

/// What a [`TypeDef`] declares as the type of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Descriptor(TypeDescriptor),
    /// A representative value, turned into a descriptor by [`infer_type`].
    Representative(DefaultValue),
}

/// The identity of a top-level resource kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindInfo {
    pub api_version: String,
    pub kind: String,
    /// The short name used by `kubectl`, such as `deployment`.
    pub kubectl_type: String,
}

/// The declaration of one type, relative to its parent.
#[derive(Clone, Debug)]
pub struct TypeDef {
    name: String,
    parent: Option<String>,
    is_abstract: bool,
    kind: Option<KindInfo>,
    identifier: Option<String>,
    namespaced: Option<bool>,
    has_metadata: Option<bool>,
    output_order: Option<u32>,
    always_regenerate: Option<bool>,
    defaults: IndexMap<String, DefaultValue>,
    types: IndexMap<String, FieldType>,
    aliases: BTreeMap<String, String>,
    transforms: BTreeMap<String, TransformHook>,
    early: Option<EarlyHook>,
    validate: Option<ValidateHook>,
    render: Option<RenderFn>,
    doc: Option<String>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            is_abstract: false,
            kind: None,
            identifier: None,
            namespaced: None,
            has_metadata: None,
            output_order: None,
            always_regenerate: None,
            defaults: IndexMap::new(),
            types: IndexMap::new(),
            aliases: BTreeMap::new(),
            transforms: BTreeMap::new(),
            early: None,
            validate: None,
            render: None,
            doc: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Makes this a top-level resource kind, identified by its `name` field.
    pub fn kind(
        mut self,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        kubectl_type: impl Into<String>,
    ) -> Self {
        self.kind = Some(KindInfo {
            api_version: api_version.into(),
            kind: kind.into(),
            kubectl_type: kubectl_type.into(),
        });
        self.identifier.get_or_insert_with(|| "name".to_owned());
        self
    }

    pub fn identifier(mut self, field: impl Into<String>) -> Self {
        self.identifier = Some(field.into());
        self
    }

    /// Declares a field with an explicit type and default.
    pub fn field(
        mut self,
        name: impl Into<String>,
        ty: TypeDescriptor,
        default: impl Into<DefaultValue>,
    ) -> Self {
        let name = name.into();
        self.types
            .insert(name.clone(), FieldType::Descriptor(ty));
        self.defaults.insert(name, default.into());
        self
    }

    /// Declares (or overrides) only the type of a field.
    pub fn typed(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.types.insert(name.into(), FieldType::Descriptor(ty));
        self
    }

    /// Declares (or overrides) only the default of a field. Fields without a
    /// type anywhere in the ancestry get one inferred from this default.
    pub fn default(mut self, name: impl Into<String>, default: impl Into<DefaultValue>) -> Self {
        self.defaults.insert(name.into(), default.into());
        self
    }

    /// Declares a field whose type is inferred from `representative`, which also
    /// serves as its default.
    pub fn infer(mut self, name: impl Into<String>, representative: impl Into<DefaultValue>) -> Self {
        let name = name.into();
        let representative = representative.into();
        self.types.insert(
            name.clone(),
            FieldType::Representative(representative.clone()),
        );
        self.defaults.insert(name, representative);
        self
    }

    /// Declares a field holding an object, defaulting to a fresh instance of
    /// `type_name` built with `args`.
    pub fn default_object_with(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        args: Args,
    ) -> Self {
        self.defaults.insert(
            name.into(),
            DefaultValue::Object {
                type_name: type_name.into(),
                args,
            },
        );
        self
    }

    pub fn default_object(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.default_object_with(name, type_name, Args::new())
    }

    /// Accepts `alias` as an alternative name of the `canonical` field.
    pub fn alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    pub fn transform(mut self, field: impl Into<String>, hook: TransformHook) -> Self {
        self.transforms.insert(field.into(), hook);
        self
    }

    pub fn on_construct(mut self, hook: EarlyHook) -> Self {
        self.early = Some(hook);
        self
    }

    pub fn validate(mut self, hook: ValidateHook) -> Self {
        self.validate = Some(hook);
        self
    }

    pub fn render(mut self, render: RenderFn) -> Self {
        self.render = Some(render);
        self
    }

    /// Abstract types can't be instantiated, only their concrete subtypes.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn cluster_scoped(mut self) -> Self {
        self.namespaced = Some(false);
        self
    }

    pub fn metadata(mut self, has_metadata: bool) -> Self {
        self.has_metadata = Some(has_metadata);
        self
    }

    pub fn output_order(mut self, order: u32) -> Self {
        self.output_order = Some(order);
        self
    }

    pub fn always_regenerate(mut self) -> Self {
        self.always_regenerate = Some(true);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// Infers a descriptor from a representative default value.
///
/// The rules are evaluated in order and are exhaustive: anything not covered
/// (absent values, empty containers, negative non-integers) yields [`None`].
pub fn infer_type(representative: &DefaultValue) -> Option<TypeDescriptor> {
    match representative {
        DefaultValue::Object { type_name, .. } => Some(TypeDescriptor::object(type_name.clone())),
        DefaultValue::Value(value) => infer_value_type(value),
    }
}

fn infer_value_type(value: &Value) -> Option<TypeDescriptor> {
    use TypeDescriptor as T;

    match value {
        Value::Object(instance) => Some(T::object(instance.type_name())),
        Value::Int(i) if *i > 0 => Some(T::count()),
        Value::Int(i) if *i < 0 => Some(T::non_zero(T::Integer)),
        Value::Int(_) => Some(T::Integer),
        Value::Number(n) if *n >= 0.0 => Some(T::positive(T::Number)),
        Value::Bool(_) => Some(T::Boolean),
        Value::Text(_) => Some(T::non_empty(T::String)),
        Value::Seq(items) => {
            let first = infer_value_type(items.first()?)?;
            Some(T::non_empty(T::list(first)))
        }
        Value::Map(map) => {
            let (key, value) = map.first()?;
            let key = infer_value_type(&key.to_value())?;
            let value = infer_value_type(value)?;
            Some(T::non_empty(T::map(key, value)))
        }
        Value::Number(_) | Value::Null => None,
    }
}

/// A type with its whole ancestry merged in.
pub struct ResolvedType {
    pub name: String,
    /// Parent first, root last.
    pub ancestors: Vec<String>,
    pub is_abstract: bool,
    pub kind: Option<KindInfo>,
    pub identifier: Option<String>,
    pub namespaced: bool,
    pub has_metadata: bool,
    pub output_order: u32,
    pub always_regenerate: bool,
    /// The resolved schema. The identifier field, if any, comes first.
    pub fields: IndexMap<String, TypeDescriptor>,
    pub defaults: IndexMap<String, DefaultValue>,
    /// Alias to canonical field name.
    pub aliases: BTreeMap<String, String>,
    pub transforms: BTreeMap<String, TransformHook>,
    pub early: Option<EarlyHook>,
    pub validate: Option<ValidateHook>,
    pub render: Option<RenderFn>,
    pub doc: Option<String>,
}

impl ResolvedType {
    /// Top-level kinds carry an api version and kind and produce whole documents.
    pub fn is_top_level(&self) -> bool {
        self.kind.is_some()
    }

    /// Maps a field or alias name to the canonical field name.
    pub fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.fields.contains_key(name) {
            Some(name)
        } else {
            self.aliases.get(name).map(String::as_str)
        }
    }

    /// Names that are accepted as storage keys: schema fields and aliases.
    pub fn accepts(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.aliases.contains_key(name)
    }

    pub fn aliases_of(&self, field: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, canonical)| *canonical == field)
            .map(|(alias, _)| alias.as_str())
            .collect()
    }

    /// The transform hook that applies to the stored key `key`: its own hook,
    /// the hook of its canonical field, or the hook declared under one of its
    /// aliases.
    pub fn transform_for(&self, key: &str) -> Option<TransformHook> {
        self.transforms
            .get(key)
            .or_else(|| {
                self.aliases
                    .get(key)
                    .and_then(|canonical| self.transforms.get(canonical))
            })
            .or_else(|| {
                self.aliases_of(key)
                    .into_iter()
                    .find_map(|alias| self.transforms.get(alias))
            })
            .copied()
    }

    pub fn has_transform(&self, field: &str) -> bool {
        self.transform_for(field).is_some()
    }

    /// Whether this type is `name` or derives from it.
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors.iter().any(|a| a == name)
    }
}

impl fmt::Debug for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedType")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ResolvedType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Collects type definitions until the type universe is complete.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    defs: IndexMap<String, TypeDef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: TypeDef) -> Result<&mut Self> {
        ensure!(
            !self.defs.contains_key(&def.name),
            DuplicateTypeSnafu {
                type_name: def.name.clone()
            }
        );
        debug!(type_name = %def.name, parent = ?def.parent, "registering type");
        self.defs.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn register_all(&mut self, defs: impl IntoIterator<Item = TypeDef>) -> Result<&mut Self> {
        for def in defs {
            self.register(def)?;
        }
        Ok(self)
    }

    /// Closes the type universe and resolves every registered type.
    pub fn build(self) -> Result<Catalog> {
        let mut types = IndexMap::with_capacity(self.defs.len());
        for name in self.defs.keys() {
            let resolved = self.resolve(name)?;
            types.insert(name.clone(), Arc::new(resolved));
        }

        let mut children = BTreeMap::<String, Vec<String>>::new();
        for def in self.defs.values() {
            if let Some(parent) = &def.parent {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(def.name.clone());
            }
        }

        for ty in types.values() {
            check_references(ty, &types)?;
        }

        debug!(types = types.len(), "catalog built");
        Ok(Catalog(Arc::new(CatalogInner {
            types,
            children,
            parent_index: OnceLock::new(),
        })))
    }

    /// Returns the chain of definitions from the root down to `name`.
    fn chain(&self, name: &str) -> Result<Vec<&TypeDef>> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.defs.get(name).context(UnknownTypeSnafu { type_name: name })?;
        loop {
            ensure!(
                seen.insert(current.name.as_str()),
                InheritanceCycleSnafu { type_name: name }
            );
            chain.push(current);
            let Some(parent) = &current.parent else {
                break;
            };
            current = self.defs.get(parent).context(UnknownParentSnafu {
                type_name: current.name.clone(),
                parent: parent.clone(),
            })?;
        }
        chain.reverse();
        Ok(chain)
    }

    fn resolve(&self, name: &str) -> Result<ResolvedType> {
        let chain = self.chain(name)?;

        let mut defaults = IndexMap::new();
        let mut declared = IndexMap::new();
        let mut aliases = BTreeMap::new();
        let mut transforms = BTreeMap::new();
        let (mut kind, mut identifier, mut namespaced, mut has_metadata) = (None, None, None, None);
        let (mut output_order, mut always_regenerate) = (None, None);
        let (mut early, mut validate, mut render) = (None, None, None);

        // Most-derived wins: later (more derived) definitions overwrite.
        for def in &chain {
            defaults.extend(def.defaults.clone());
            declared.extend(def.types.clone());
            aliases.extend(def.aliases.clone());
            transforms.extend(def.transforms.clone());
            kind = def.kind.clone().or(kind);
            identifier = def.identifier.clone().or(identifier);
            namespaced = def.namespaced.or(namespaced);
            has_metadata = def.has_metadata.or(has_metadata);
            output_order = def.output_order.or(output_order);
            always_regenerate = def.always_regenerate.or(always_regenerate);
            early = def.early.or(early);
            validate = def.validate.or(validate);
            render = def.render.or(render);
        }

        let mut fields = IndexMap::new();
        if let Some(id) = &identifier {
            let ty = match declared.shift_remove(id) {
                Some(declared) => self.descriptor(name, id, &declared)?,
                None => TypeDescriptor::Identifier,
            };
            fields.insert(id.clone(), ty);
            defaults.entry(id.clone()).or_insert(DefaultValue::Value(Value::Null));
        }
        for (field, declared) in &declared {
            fields.insert(field.clone(), self.descriptor(name, field, declared)?);
        }
        for (field, default) in &defaults {
            if !fields.contains_key(field) {
                let ty = infer_type(default).context(InferFieldSnafu {
                    type_name: name,
                    field: field.clone(),
                    representative: default.to_string(),
                })?;
                fields.insert(field.clone(), ty);
            }
        }
        for field in fields.keys() {
            defaults
                .entry(field.clone())
                .or_insert(DefaultValue::Value(Value::Null));
        }

        for (alias, canonical) in &aliases {
            ensure!(
                fields.contains_key(canonical),
                AliasTargetSnafu {
                    type_name: name,
                    alias: alias.clone(),
                    canonical: canonical.clone(),
                }
            );
        }
        for field in transforms.keys() {
            ensure!(
                fields.contains_key(field) || aliases.contains_key(field),
                TransformTargetSnafu {
                    type_name: name,
                    field: field.clone(),
                }
            );
        }

        let def = *chain.last().context(UnknownTypeSnafu { type_name: name })?;
        let top_level = kind.is_some();
        let ancestors = chain
            .iter()
            .rev()
            .skip(1)
            .map(|def| def.name.clone())
            .collect();
        trace!(type_name = name, fields = fields.len(), "resolved schema");

        Ok(ResolvedType {
            name: name.to_owned(),
            ancestors,
            is_abstract: def.is_abstract,
            kind,
            identifier,
            namespaced: namespaced.unwrap_or(top_level) && top_level,
            has_metadata: has_metadata.unwrap_or(top_level),
            output_order: output_order.unwrap_or(100),
            always_regenerate: always_regenerate.unwrap_or(false),
            fields,
            defaults,
            aliases,
            transforms,
            early,
            validate,
            render,
            doc: def.doc.clone(),
        })
    }

    fn descriptor(&self, type_name: &str, field: &str, declared: &FieldType) -> Result<TypeDescriptor> {
        match declared {
            FieldType::Descriptor(ty) => Ok(ty.clone()),
            FieldType::Representative(representative) => {
                infer_type(representative).context(InferFieldSnafu {
                    type_name,
                    field,
                    representative: representative.to_string(),
                })
            }
        }
    }
}

/// Every object type named in a schema or default has to be registered.
fn check_references(ty: &ResolvedType, types: &IndexMap<String, Arc<ResolvedType>>) -> Result<()> {
    fn referenced(descriptor: &TypeDescriptor, out: &mut Vec<String>) {
        match descriptor {
            TypeDescriptor::Object(name) => out.push(name.clone()),
            TypeDescriptor::Nullable(inner)
            | TypeDescriptor::Positive(inner)
            | TypeDescriptor::NonZero(inner)
            | TypeDescriptor::NonEmpty(inner)
            | TypeDescriptor::List(inner) => referenced(inner, out),
            TypeDescriptor::Map(key, value) => {
                referenced(key, out);
                referenced(value, out);
            }
            TypeDescriptor::OneOf(candidates) => {
                candidates.iter().for_each(|c| referenced(c, out));
            }
            _ => {}
        }
    }

    for (field, descriptor) in &ty.fields {
        let mut names = Vec::new();
        referenced(descriptor, &mut names);
        if let Some(DefaultValue::Object { type_name, .. }) = ty.defaults.get(field) {
            names.push(type_name.clone());
        }
        for target in names {
            ensure!(
                types.contains_key(&target),
                UnknownObjectTypeSnafu {
                    type_name: ty.name.clone(),
                    field: field.clone(),
                    referenced: target,
                }
            );
        }
    }
    Ok(())
}

struct CatalogInner {
    types: IndexMap<String, Arc<ResolvedType>>,
    /// Direct subtypes, in registration order.
    children: BTreeMap<String, Vec<String>>,
    parent_index: OnceLock<ParentIndex>,
}

/// The closed universe of resolved types.
///
/// This is a cheap handle, every [`Instance`] keeps one to reach its schema.
#[derive(Clone)]
pub struct Catalog(Arc<CatalogInner>);

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ResolvedType>> {
        self.0
            .types
            .get(name)
            .context(UnknownTypeSnafu { type_name: name })
    }

    /// The resolved schema of `name`: field name to type.
    pub fn resolve(&self, name: &str) -> Result<&IndexMap<String, TypeDescriptor>> {
        self.get(name).map(|ty| &ty.fields)
    }

    /// Looks up a type by name, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<&Arc<ResolvedType>> {
        self.0
            .types
            .values()
            .find(|ty| ty.name.eq_ignore_ascii_case(name))
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<ResolvedType>> {
        self.0.types.values()
    }

    pub fn direct_subtypes(&self, name: &str) -> &[String] {
        self.0
            .children
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All transitive subtypes of `name`, depth first, not including `name`.
    pub fn subtypes(&self, name: &str) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_subtypes(name, &mut out);
        out
    }

    fn collect_subtypes<'a>(&'a self, name: &str, out: &mut Vec<&'a str>) {
        for child in self.direct_subtypes(name) {
            out.push(child);
            self.collect_subtypes(child, out);
        }
    }

    pub fn concrete_subtypes(&self, name: &str) -> Vec<&str> {
        let mut subtypes = Vec::new();
        subtypes.extend(
            self.get(name)
                .ok()
                .filter(|ty| !ty.is_abstract)
                .map(|ty| ty.name.as_str()),
        );
        subtypes.extend(
            self.subtypes(name)
                .into_iter()
                .filter(|sub| self.get(sub).is_ok_and(|ty| !ty.is_abstract)),
        );
        subtypes
    }

    /// Whether `child` is `ancestor` or derives from it.
    pub fn is_subtype(&self, child: &str, ancestor: &str) -> bool {
        self.get(child).is_ok_and(|ty| ty.is_a(ancestor))
    }

    /// The parent/child type index, built on first use.
    pub fn parent_index(&self) -> &ParentIndex {
        self.0.parent_index.get_or_init(|| ParentIndex::build(self))
    }

    /// Creates an instance outside of any namespace or cluster context.
    #[track_caller]
    pub fn create(&self, type_name: &str, args: Args) -> instance::Result<Instance> {
        Instance::construct(
            self,
            type_name,
            args,
            Some(instance::Provenance::caller()),
            instance::Binding::default(),
        )
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("types", &self.0.types.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::types::{FieldPath, TypeDescriptor as T};

    #[rstest]
    #[case(Value::Int(5), Some(T::count()))]
    #[case(Value::Int(-3), Some(T::non_zero(T::Integer)))]
    #[case(Value::Int(0), Some(T::Integer))]
    #[case(Value::Number(0.5), Some(T::positive(T::Number)))]
    #[case(Value::Number(-0.5), None)]
    #[case(Value::Bool(false), Some(T::Boolean))]
    #[case(Value::from("x"), Some(T::non_empty(T::String)))]
    #[case(Value::from(vec![1]), Some(T::non_empty(T::list(T::count()))))]
    #[case(Value::from([("a", "b")]), Some(T::non_empty(T::map(T::non_empty(T::String), T::non_empty(T::String)))))]
    #[case(Value::empty_seq(), None)]
    #[case(Value::empty_map(), None)]
    #[case(Value::Null, None)]
    fn inference(#[case] representative: Value, #[case] expected: Option<TypeDescriptor>) {
        assert_eq!(infer_type(&representative.into()), expected);
    }

    #[test]
    fn object_defaults_infer_object_types() {
        assert_eq!(
            infer_type(&DefaultValue::object("RoleRef")),
            Some(T::object("RoleRef"))
        );
    }

    #[test]
    fn inferred_integer_types_follow_the_sign_of_the_default() {
        let ty = infer_type(&Value::Int(5).into()).expect("5 has a type");
        assert!(ty.check(&Value::Int(0), &FieldPath::root()).is_err());
        assert!(ty.check(&Value::Int(5), &FieldPath::root()).is_ok());
        assert!(ty.check(&Value::Int(-1), &FieldPath::root()).is_err());

        let ty = infer_type(&Value::Int(-3).into()).expect("-3 has a type");
        assert!(ty.check(&Value::Int(-3), &FieldPath::root()).is_ok());
        assert!(ty.check(&Value::Int(7), &FieldPath::root()).is_ok());
        assert!(ty.check(&Value::Int(0), &FieldPath::root()).is_err());
    }

    fn small_catalog() -> Catalog {
        let mut builder = Catalog::builder();
        builder
            .register_all([
                TypeDef::new("Base")
                    .field("replicas", T::count(), 1)
                    .field("note", T::nullable(T::String), Value::Null)
                    .abstract_type(),
                TypeDef::new("Child")
                    .parent("Base")
                    .kind("v1", "Child", "child")
                    .default("replicas", 3)
                    .infer("weight", -2)
                    .alias("size", "replicas"),
                TypeDef::new("GrandChild").parent("Child"),
            ])
            .expect("types are unique");
        builder.build().expect("catalog is consistent")
    }

    #[test]
    fn resolution_merges_ancestry() {
        let catalog = small_catalog();
        let child = catalog.get("Child").expect("Child is registered");

        let fields = child.fields.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(fields, ["name", "replicas", "note", "weight"]);
        assert_eq!(child.fields["name"], T::Identifier);
        assert_eq!(child.fields["weight"], T::non_zero(T::Integer));
        assert_eq!(child.defaults["replicas"], DefaultValue::Value(Value::Int(3)));
        assert_eq!(child.ancestors, ["Base"]);
        assert!(!child.is_abstract);
        assert!(child.namespaced);
        assert!(child.has_metadata);
        assert_eq!(child.canonical("size"), Some("replicas"));

        let grandchild = catalog.get("GrandChild").expect("GrandChild is registered");
        assert_eq!(grandchild.ancestors, ["Child", "Base"]);
        assert_eq!(grandchild.kind, child.kind);
    }

    #[test]
    fn subtypes_are_transitive() {
        let catalog = small_catalog();
        assert_eq!(catalog.subtypes("Base"), ["Child", "GrandChild"]);
        assert_eq!(catalog.concrete_subtypes("Base"), ["Child", "GrandChild"]);
        assert_eq!(catalog.concrete_subtypes("Child"), ["Child", "GrandChild"]);
        assert_eq!(catalog.concrete_subtypes("GrandChild"), ["GrandChild"]);
        assert!(catalog.is_subtype("GrandChild", "Base"));
        assert!(!catalog.is_subtype("Base", "Child"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut builder = Catalog::builder();
        builder.register(TypeDef::new("A")).expect("first registration");
        assert!(matches!(
            builder.register(TypeDef::new("A")),
            Err(Error::DuplicateType { .. })
        ));
    }

    #[rstest]
    #[case(TypeDef::new("A").parent("Missing"))]
    #[case(TypeDef::new("A").default("x", Value::empty_seq()))]
    #[case(TypeDef::new("A").typed("x", T::list(T::object("Missing"))))]
    #[case(TypeDef::new("A").alias("old", "missing"))]
    fn inconsistent_catalogs_fail_to_build(#[case] def: TypeDef) {
        let mut builder = Catalog::builder();
        builder.register(def).expect("registration");
        assert!(builder.build().is_err());
    }

    #[test]
    fn cycles_are_detected() {
        let mut builder = Catalog::builder();
        builder
            .register_all([TypeDef::new("A").parent("B"), TypeDef::new("B").parent("A")])
            .expect("registration");
        assert!(matches!(
            builder.build(),
            Err(Error::InheritanceCycle { .. })
        ));
    }
}
