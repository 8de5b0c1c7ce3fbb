//! A typed object model for compiling Kubernetes and OpenShift resource
//! documents.
//!
//! Types are declared as [`schema::TypeDef`]s and resolved into a closed
//! [`schema::Catalog`]. Loaders build [`instance::Instance`]s against the
//! catalog, usually through a [`scope::Scope`] that carries the current
//! namespace and cluster, and render them into ordered documents with
//! [`instance::Instance::render`]. The built-in resource kinds live in
//! [`kinds`].
//!
//! ```
//! use kube_model::{instance::Args, kinds};
//!
//! let catalog = kinds::catalog().unwrap();
//! let config = catalog
//!     .create("ConfigMap", Args::with_id("settings").set("files", [("mode", "fast")]))
//!     .unwrap();
//!
//! let document = config.render().unwrap().unwrap();
//! assert_eq!(document["kind"], "ConfigMap");
//! assert_eq!(document["data"]["mode"], "fast");
//! ```

pub mod help;
pub mod index;
pub mod instance;
pub mod kinds;
pub mod render;
pub mod schema;
pub mod scope;
pub mod transform;
pub mod types;
pub mod validation;
pub mod value;
pub mod yaml;
