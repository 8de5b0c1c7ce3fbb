//! The construction context: the current namespace and cluster, the names of
//! all namespaces seen so far and the registration seam towards the object
//! registry.
//!
//! Entering a namespace or cluster returns a guard. The previous context is
//! restored when the guard is dropped, on every exit path.
use std::{
    collections::BTreeSet,
    ops::{Deref, DerefMut},
};

use tracing::debug;

use crate::{
    instance::{Args, Binding, Instance, Provenance, Result},
    schema::Catalog,
};

/// The type constructed for every known namespace by [`Scope::namespace_instances`].
pub const NAMESPACE_TYPE: &str = "Namespace";

/// Receives every top-level instance a [`Scope`] creates.
pub trait Registrar {
    fn register(&mut self, instance: &Instance);
}

impl<T: Registrar + ?Sized> Registrar for &mut T {
    fn register(&mut self, instance: &Instance) {
        (**self).register(instance);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Also seeds the `openshift-infra` namespace.
    pub openshift: bool,

    /// The namespace bound to instances created outside of any
    /// [`Scope::enter_namespace`] block.
    pub default_namespace: Option<String>,
}

pub struct Scope<'c> {
    catalog: &'c Catalog,
    options: ScopeOptions,
    namespaces: Vec<String>,
    clusters: Vec<String>,
    known_namespaces: BTreeSet<String>,
    registrar: Option<&'c mut dyn Registrar>,
}

impl<'c> Scope<'c> {
    pub fn new(catalog: &'c Catalog, options: ScopeOptions) -> Self {
        let mut known_namespaces = BTreeSet::from(["default".to_owned(), "kube-system".to_owned()]);
        if options.openshift {
            known_namespaces.insert("openshift-infra".to_owned());
        }
        known_namespaces.extend(options.default_namespace.clone());

        Self {
            catalog,
            options,
            namespaces: Vec::new(),
            clusters: Vec::new(),
            known_namespaces,
            registrar: None,
        }
    }

    /// Hands every created top-level instance to `registrar`.
    pub fn with_registrar(mut self, registrar: &'c mut dyn Registrar) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.options
    }

    /// The namespace new instances are bound to.
    pub fn current_namespace(&self) -> Option<&str> {
        self.namespaces
            .last()
            .or(self.options.default_namespace.as_ref())
            .map(String::as_str)
    }

    pub fn current_cluster(&self) -> Option<&str> {
        self.clusters.last().map(String::as_str)
    }

    /// Makes `namespace` the current namespace until the guard is dropped.
    pub fn enter_namespace(&mut self, namespace: impl Into<String>) -> NamespaceGuard<'_, 'c> {
        let namespace = namespace.into();
        debug!(namespace = %namespace, "entering namespace");
        self.known_namespaces.insert(namespace.clone());
        self.namespaces.push(namespace);
        NamespaceGuard { scope: self }
    }

    /// Makes `cluster` the current cluster until the guard is dropped.
    pub fn enter_cluster(&mut self, cluster: impl Into<String>) -> ClusterGuard<'_, 'c> {
        let cluster = cluster.into();
        debug!(cluster = %cluster, "entering cluster");
        self.clusters.push(cluster);
        ClusterGuard { scope: self }
    }

    /// Every namespace name bound so far, including the seeded ones.
    pub fn known_namespaces(&self) -> &BTreeSet<String> {
        &self.known_namespaces
    }

    /// Creates an instance bound to the current context, recording the
    /// caller as its provenance.
    #[track_caller]
    pub fn create(&mut self, type_name: &str, args: Args) -> Result<Instance> {
        self.create_at(type_name, args, Provenance::caller())
    }

    /// Creates an instance bound to the current context with a provenance
    /// supplied by the loader, such as a location in an authored source file.
    pub fn create_at(
        &mut self,
        type_name: &str,
        args: Args,
        provenance: Provenance,
    ) -> Result<Instance> {
        let binding = Binding {
            namespace: self.current_namespace().map(ToOwned::to_owned),
            cluster: self.current_cluster().map(ToOwned::to_owned),
        };
        let instance = Instance::construct(self.catalog, type_name, args, Some(provenance), binding)?;
        self.register(&instance);
        Ok(instance)
    }

    /// Clones `instance` with `args` applied, see [`Instance::clone_with`]. The
    /// copy keeps the bindings of the original.
    #[track_caller]
    pub fn clone_of(&mut self, instance: &Instance, args: Args) -> Result<Instance> {
        let copy = instance.clone_with(args)?;
        self.register(&copy);
        Ok(copy)
    }

    /// Builds a namespace object for every known namespace name.
    pub fn namespace_instances(&self) -> Result<Vec<Instance>> {
        self.known_namespaces
            .iter()
            .map(|name| {
                Instance::construct(
                    self.catalog,
                    NAMESPACE_TYPE,
                    Args::with_id(name.as_str()),
                    None,
                    Binding::default(),
                )
            })
            .collect()
    }

    fn register(&mut self, instance: &Instance) {
        if let Some(namespace) = instance.namespace() {
            self.known_namespaces.insert(namespace.to_owned());
        }
        if !instance.resolved().is_top_level() {
            return;
        }
        if let Some(registrar) = self.registrar.as_mut() {
            registrar.register(instance);
        }
    }
}

/// Restores the previous namespace when dropped.
pub struct NamespaceGuard<'s, 'c> {
    scope: &'s mut Scope<'c>,
}

impl Drop for NamespaceGuard<'_, '_> {
    fn drop(&mut self) {
        self.scope.namespaces.pop();
    }
}

impl<'c> Deref for NamespaceGuard<'_, 'c> {
    type Target = Scope<'c>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for NamespaceGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

/// Restores the previous cluster when dropped.
pub struct ClusterGuard<'s, 'c> {
    scope: &'s mut Scope<'c>,
}

impl Drop for ClusterGuard<'_, '_> {
    fn drop(&mut self) {
        self.scope.clusters.pop();
    }
}

impl<'c> Deref for ClusterGuard<'_, 'c> {
    type Target = Scope<'c>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for ClusterGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}
