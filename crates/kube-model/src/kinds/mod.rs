//! The built-in Kubernetes and OpenShift resource kinds.
//!
//! [`catalog`] builds a closed catalog of every kind in this module. Loaders
//! that add their own types register [`definitions`] together with theirs.
use serde_json::{Value as JsonValue, json};

use crate::{
    render::RenderContext,
    schema::{self, Catalog, TypeDef},
};

mod config;
mod deployment;
mod job;
mod namespace;
mod pod;
mod rbac;
mod selectors;
mod service;
mod volumes;

/// Every built-in type definition.
pub fn definitions() -> Vec<TypeDef> {
    [
        namespace::definitions(),
        config::definitions(),
        rbac::definitions(),
        selectors::definitions(),
        service::definitions(),
        volumes::definitions(),
        pod::definitions(),
        deployment::definitions(),
        job::definitions(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// A catalog holding only the built-in kinds.
pub fn catalog() -> schema::Result<Catalog> {
    let mut builder = Catalog::builder();
    builder.register_all(definitions())?;
    builder.build()
}

/// The `metadata` fragment most kinds start from.
fn name_metadata(context: &RenderContext<'_>) -> JsonValue {
    json!({ "name": context.name() })
}
