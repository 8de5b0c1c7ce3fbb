use serde_json::json;

use crate::{
    render::{self, Document, RenderContext},
    schema::TypeDef,
};

/// Namespaces every cluster has, which are never written out.
const BUILT_IN_NAMESPACES: [&str; 2] = ["default", "kube-system"];

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("Namespace")
            .kind("v1", "Namespace", "namespace")
            .cluster_scoped()
            .output_order(10)
            .render(render_namespace),
    ]
}

fn render_namespace(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let name = context.name().unwrap_or_default();
    if BUILT_IN_NAMESPACES.contains(&name) {
        return Ok(None);
    }
    Ok(Some(render::document(
        "metadata",
        json!({ "name": name, "labels": { "name": name } }),
    )))
}
