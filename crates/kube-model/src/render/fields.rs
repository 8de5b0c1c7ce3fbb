use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as JsonValue;

use super::{Document, RenderContext, Result, to_json};

/// Renders the schema fields of a view into a document fragment.
///
/// Fields that are absent, null or render to a zero-length string, list or
/// object are dropped unless listed in [`Self::keep_empty`]. Fields named in
/// [`Self::order`] come first in that order, the rest follow sorted by their
/// output name. Keys that aren't schema fields are never rendered.
pub struct FieldRenderer<'c> {
    context: &'c RenderContext<'c>,
    order: Vec<String>,
    rename: BTreeMap<String, String>,
    skip: BTreeSet<String>,
    keep_empty: BTreeSet<String>,
    none_if_empty: bool,
}

impl<'c> FieldRenderer<'c> {
    pub(super) fn new(context: &'c RenderContext<'c>) -> Self {
        Self {
            context,
            order: Vec::new(),
            rename: BTreeMap::new(),
            skip: BTreeSet::new(),
            keep_empty: BTreeSet::new(),
            none_if_empty: false,
        }
    }

    pub fn order<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Renders `field` under the key `to`.
    pub fn rename(mut self, field: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(field.into(), to.into());
        self
    }

    pub fn skip<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn keep_empty<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_empty.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Produce no fragment at all if no field survives.
    pub fn none_if_empty(mut self) -> Self {
        self.none_if_empty = true;
        self
    }

    pub fn render(self) -> Result<Option<Document>> {
        let schema = &self.context.instance().resolved().fields;

        let mut rendered = Vec::new();
        for (field, value) in self.context.view().iter() {
            if !schema.contains_key(field) || self.skip.contains(field) {
                continue;
            }
            let Some(json) = to_json(value)? else {
                continue;
            };
            if is_zero_length(&json) && !self.keep_empty.contains(field) {
                continue;
            }

            let position = self
                .order
                .iter()
                .position(|ordered| ordered == field)
                .unwrap_or(usize::MAX);
            let output = self
                .rename
                .get(field)
                .cloned()
                .unwrap_or_else(|| field.to_owned());
            rendered.push((position, output, json));
        }

        if rendered.is_empty() && self.none_if_empty {
            return Ok(None);
        }
        rendered.sort_by(|(a_pos, a_key, _), (b_pos, b_key, _)| {
            a_pos.cmp(b_pos).then_with(|| a_key.cmp(b_key))
        });
        Ok(Some(
            rendered
                .into_iter()
                .map(|(_, key, json)| (key, json))
                .collect(),
        ))
    }
}

fn is_zero_length(json: &JsonValue) -> bool {
    match json {
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        instance::Args,
        schema::{Catalog, TypeDef},
        types::TypeDescriptor as T,
        value::Value,
    };

    fn catalog() -> Catalog {
        let mut builder = Catalog::builder();
        builder
            .register_all([TypeDef::new("Port")
                .field("name", T::nullable(T::String), Value::Null)
                .field("protocol", T::String, "TCP")
                .field("port", T::count(), 80)
                .field("extra", T::list(T::String), Value::empty_seq())
                .alias("portNumber", "port")])
            .expect("types are unique");
        builder.build().expect("catalog is consistent")
    }

    fn render_with(
        args: Args,
        configure: impl FnOnce(FieldRenderer<'_>) -> FieldRenderer<'_>,
    ) -> Option<Document> {
        let catalog = catalog();
        let instance = catalog.create("Port", args).unwrap();
        let view = crate::transform::view(&instance).unwrap();
        let context = RenderContext {
            instance: &instance,
            view: &view,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        };
        configure(context.fields()).render().unwrap()
    }

    #[rstest]
    #[case::sorted(Args::new(), json!({"port": 80, "protocol": "TCP"}))]
    #[case::alias(Args::new().set("portNumber", 8080), json!({"port": 8080, "protocol": "TCP"}))]
    #[case::named(Args::new().set("name", "http"), json!({"name": "http", "port": 80, "protocol": "TCP"}))]
    fn default_rendering(#[case] args: Args, #[case] expected: JsonValue) {
        let rendered = render_with(args, |fields| fields);
        assert_eq!(rendered.map(JsonValue::Object), Some(expected));
    }

    #[test]
    fn options_shape_the_fragment() {
        let rendered = render_with(Args::new().set("name", "http"), |fields| {
            fields
                .order(["name", "protocol"])
                .rename("port", "containerPort")
                .keep_empty(["extra"])
        })
        .unwrap();
        let keys = rendered.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["name", "protocol", "containerPort", "extra"]);
    }

    #[test]
    fn empty_fragments_can_be_dropped() {
        let rendered = render_with(Args::new(), |fields| {
            fields.skip(["port", "protocol"]).none_if_empty()
        });
        assert_eq!(rendered, None);

        let rendered = render_with(Args::new(), |fields| fields.skip(["port", "protocol"]));
        assert_eq!(rendered, Some(Document::new()));
    }
}
