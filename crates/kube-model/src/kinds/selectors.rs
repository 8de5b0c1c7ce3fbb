//! Label selectors.
use crate::{
    render::{self, Document, RenderContext},
    schema::TypeDef,
    types::TypeDescriptor as T,
    value::Value,
};

const OPERATORS: [&str; 4] = ["In", "NotIn", "Exists", "DoesNotExist"];

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("BaseSelector").abstract_type(),
        TypeDef::new("MatchLabelsSelector")
            .parent("BaseSelector")
            .field("matchLabels", T::string_map(), Value::empty_map())
            .render(render_non_empty),
        TypeDef::new("MatchExpression")
            .field("key", T::non_empty(T::String), Value::Null)
            .field("operator", T::enumeration(OPERATORS), "In")
            .field("values", T::nullable(T::list(T::String)), Value::empty_seq())
            .render(render_match_expression),
        TypeDef::new("MatchExpressionsSelector")
            .parent("BaseSelector")
            .field(
                "matchExpressions",
                T::non_empty(T::list(T::object("MatchExpression"))),
                Value::empty_seq(),
            )
            .render(render_non_empty),
    ]
}

/// Selectors without any label or expression render to nothing.
fn render_non_empty(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context.fields().none_if_empty().render()
}

fn render_match_expression(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["key", "operator", "values"])
        .render()
}
