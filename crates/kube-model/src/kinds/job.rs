//! Run-to-completion jobs.
use serde_json::Value as JsonValue;

use super::name_metadata;
use crate::{
    instance::Args,
    render::{self, Document, RenderContext},
    schema::TypeDef,
    types::TypeDescriptor as T,
    value::Value,
};

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("Job")
            .kind("batch/v1", "Job", "job")
            .field(
                "activeDeadlineSeconds",
                T::nullable(T::positive(T::Integer)),
                Value::Null,
            )
            .field("parallelism", T::nullable(T::count()), 1)
            .field("completions", T::nullable(T::count()), 1)
            .field("manualSelector", T::nullable(T::Boolean), Value::Null)
            .field(
                "selector",
                T::nullable(T::object("BaseSelector")),
                Value::Null,
            )
            // pods of a job are never restarted in place
            .default_object_with(
                "pod_template",
                "PodTemplateSpec",
                Args::new().set("restartPolicy", "Never"),
            )
            .render(render_job),
    ]
}

fn render_job(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let spec = context
        .fields()
        .rename("pod_template", "template")
        .skip(["name"])
        .render()?
        .unwrap_or_default();
    let mut document = render::document("metadata", name_metadata(context));
    document.insert("spec".to_owned(), JsonValue::Object(spec));
    Ok(Some(document))
}
