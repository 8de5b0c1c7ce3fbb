//! Services and their ports.
use serde_json::{Map, Value as JsonValue};

use super::name_metadata;
use crate::{
    render::{self, Document, RenderContext},
    schema::TypeDef,
    types::TypeDescriptor as T,
    value::Value,
};

const AWS_FIELD_PREFIX: &str = "aws-";
const AWS_ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/";

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("ServicePort")
            .field("name", T::nullable(T::Identifier), Value::Null)
            .field("protocol", T::enumeration(["TCP", "UDP"]), "TCP")
            .typed("port", T::count())
            .typed("targetPort", T::count())
            .render(render_service_port),
        TypeDef::new("Service")
            .abstract_type()
            .kind("v1", "Service", "service")
            .output_order(70)
            .field("sessionAffinity", T::nullable(T::Boolean), Value::Null)
            .field(
                "ports",
                T::non_empty(T::list(T::object("ServicePort"))),
                Value::empty_seq(),
            )
            .field("selector", T::non_empty(T::string_map()), Value::empty_map()),
        TypeDef::new("ClusterIPService")
            .parent("Service")
            .field("clusterIP", T::nullable(T::Ipv4), Value::Null)
            .render(render_cluster_ip_service),
        TypeDef::new("LoadBalancerService")
            .parent("Service")
            .field(
                "aws-load-balancer-backend-protocol",
                T::nullable(T::Identifier),
                Value::Null,
            )
            .field("aws-load-balancer-ssl-cert", T::nullable(T::Arn), Value::Null)
            .field(
                "externalTrafficPolicy",
                T::nullable(T::enumeration(["Cluster", "Local"])),
                Value::Null,
            )
            .render(render_load_balancer_service),
    ]
}

fn render_service_port(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["name", "protocol", "port"])
        .render()
}

fn render_cluster_ip_service(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let spec = context
        .fields()
        .order(["selector", "ports"])
        .skip(["name"])
        .render()?
        .unwrap_or_default();
    Ok(Some(service_document(context, "ClusterIP", spec)))
}

/// AWS specific fields become service annotations instead of spec entries.
fn render_load_balancer_service(
    context: &mut RenderContext<'_>,
) -> render::Result<Option<Document>> {
    let aws_fields = context
        .view()
        .keys()
        .filter(|field| field.starts_with(AWS_FIELD_PREFIX))
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();

    let spec = context
        .fields()
        .order(["selector", "ports"])
        .skip(aws_fields.iter().map(String::as_str).chain(["name"]))
        .render()?
        .unwrap_or_default();

    for field in &aws_fields {
        if let Some(value) = context.str(field).map(ToOwned::to_owned) {
            context.add_annotation(format!("{AWS_ANNOTATION_PREFIX}{field}"), value);
        }
    }
    Ok(Some(service_document(context, "LoadBalancer", spec)))
}

fn service_document(context: &RenderContext<'_>, service_type: &str, spec: Document) -> Document {
    let mut full_spec = Map::new();
    full_spec.insert("type".to_owned(), service_type.into());
    full_spec.extend(spec);

    let mut document = render::document("metadata", name_metadata(context));
    document.insert("spec".to_owned(), JsonValue::Object(full_spec));
    document
}
