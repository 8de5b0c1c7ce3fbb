use kube_model::{
    instance::{self, Args, Instance},
    render::{self, Document, RenderContext},
    schema::{Catalog, TypeDef},
    scope::{Registrar, Scope, ScopeOptions},
    types::TypeDescriptor as T,
    value::Value,
};
use serde_json::json;

fn render_panel(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let spec = context.fields().skip(["name"]).render()?.unwrap_or_default();
    let mut document = render::document(
        "metadata",
        json!({ "labels": { "tier": "front" }, "name": context.name() }),
    );
    document.insert("spec".to_owned(), spec.into());
    Ok(Some(document))
}

fn catalog() -> Catalog {
    let mut builder = Catalog::builder();
    builder
        .register_all([
            TypeDef::new("Widget").field("size", T::count(), 1),
            TypeDef::new("Button").parent("Widget"),
            TypeDef::new("Tagged")
                .field("tags", T::list(T::String), Value::empty_seq())
                .field("labels", T::string_map(), [("a", "1")]),
            TypeDef::new("Panel")
                .kind("v1", "Panel", "panel")
                .field("widgets", T::list(T::object("Widget")), Value::empty_seq())
                .field("child", T::nullable(T::object("Widget")), Value::Null)
                .render(render_panel),
        ])
        .expect("type names are unique");
    builder.build().expect("catalog is consistent")
}

#[test]
fn sequences_replace_and_mappings_merge() {
    let catalog = catalog();

    let tagged = catalog
        .create("Tagged", Args::new().set("tags", vec!["x", "y"]))
        .unwrap();
    assert_eq!(tagged.get("tags").unwrap(), &Value::from(vec!["x", "y"]));
    assert_eq!(tagged.get("labels").unwrap(), &Value::from([("a", "1")]));

    let tagged = catalog
        .create("Tagged", Args::new().set("labels", [("b", "2")]))
        .unwrap();
    assert_eq!(
        tagged.get("labels").unwrap(),
        &Value::from([("a", "1"), ("b", "2")])
    );
    assert_eq!(tagged.get("tags").unwrap(), &Value::empty_seq());

    // cloning follows the same rules
    let copy = tagged
        .clone_with(
            Args::new()
                .set("tags", vec!["z"])
                .set("labels", [("c", "3")]),
        )
        .unwrap();
    assert_eq!(copy.get("tags").unwrap(), &Value::from(vec!["z"]));
    assert_eq!(
        copy.get("labels").unwrap(),
        &Value::from([("a", "1"), ("b", "2"), ("c", "3")])
    );
}

#[test]
fn defaults_are_not_shared() {
    let catalog = catalog();
    let mut first = catalog.create("Tagged", Args::new()).unwrap();
    let second = catalog.create("Tagged", Args::new()).unwrap();

    first
        .get_mut("tags")
        .unwrap()
        .as_seq_mut()
        .unwrap()
        .push("mine".into());
    assert_eq!(first.get("tags").unwrap().len(), Some(1));
    assert_eq!(second.get("tags").unwrap().len(), Some(0));
}

#[test]
fn clones_are_independent() {
    let catalog = catalog();
    let mut panel = catalog.create("Panel", Args::with_id("main")).unwrap();
    panel.new_child("child", Args::new().set("size", 3)).unwrap();

    let mut copy = panel.clone();
    assert_eq!(copy, panel);
    assert_ne!(copy.uid(), panel.uid());

    copy.get_mut("child")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .set("size", 4)
        .unwrap();

    let size_of_child = |instance: &Instance| {
        let child = instance.get("child").unwrap().as_object().unwrap();
        child.get("size").unwrap().as_i64()
    };
    assert_eq!(size_of_child(&panel), Some(3));
    assert_eq!(size_of_child(&copy), Some(4));
    assert_ne!(copy, panel);
    assert!(panel.holds(panel.get("child").unwrap().as_object().unwrap()));
    assert!(!panel.holds(copy.get("child").unwrap().as_object().unwrap()));
}

#[test]
fn rendering_is_deterministic_and_merges_metadata() {
    let catalog = catalog();
    let mut panel = catalog.create("Panel", Args::with_id("x")).unwrap();
    panel.label("team", "a");
    panel.new_child("widgets", Args::new().set("size", 2)).unwrap();
    panel
        .new_child(instance::Target::field("widgets").subtype("Button"), Args::new())
        .unwrap();

    let first = panel.render().unwrap().unwrap();
    let second = panel.render().unwrap().unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        json!({
            "apiVersion": "v1",
            "kind": "Panel",
            "metadata": {
                "name": "x",
                "labels": { "team": "a", "tier": "front" },
            },
            "spec": {
                "widgets": [{ "size": 2 }, { "size": 1 }],
            },
        })
        .to_string()
    );
}

#[test]
fn instance_labels_win_over_rendered_ones() {
    let catalog = catalog();
    let mut panel = catalog.create("Panel", Args::with_id("x")).unwrap();
    panel.label("tier", "back");

    let document = panel.render().unwrap().unwrap();
    assert_eq!(document["metadata"]["labels"], json!({ "tier": "back" }));
}

#[test]
fn errors_point_at_the_construction_site() {
    let catalog = catalog();

    let err = catalog.create("Panel", Args::new()).unwrap_err();
    assert!(matches!(err, instance::Error::MissingIdentifier { .. }));
    assert!(err.to_string().contains("model.rs"), "{err}");

    let mut panel = catalog.create("Panel", Args::with_id("x")).unwrap();
    panel.set("widgets", vec!["not a widget"]).unwrap();
    let err = panel.render().unwrap_err();
    let render::Error::Prepare { source, .. } = &err else {
        unreachable!("unexpected error: {err}")
    };
    assert!(source.to_string().contains("model.rs"), "{source}");

    assert!(matches!(
        catalog.create("Widget", Args::new().set("colour", "red")),
        Err(instance::Error::UnknownField { .. })
    ));
    assert!(matches!(
        panel.new_child(instance::Target::field("widgets").subtype("Tagged"), Args::new()),
        Err(instance::Error::NotASubtype { .. })
    ));
}

#[test]
fn parent_index_links_children_and_their_subtypes() {
    let catalog = catalog();
    let index = catalog.parent_index();

    assert_eq!(index.parents_of("Widget").collect::<Vec<_>>(), ["Panel"]);
    assert_eq!(index.parents_of("Button").collect::<Vec<_>>(), ["Panel"]);
    assert_eq!(index.parents_of("Panel").count(), 0);
}

#[derive(Default)]
struct Collected(Vec<String>);

impl Registrar for Collected {
    fn register(&mut self, instance: &Instance) {
        let namespace = instance.namespace().unwrap_or("-");
        self.0.push(format!("{namespace}/{}", instance.type_name()));
    }
}

#[test]
fn scopes_bind_and_register_top_level_instances() {
    let catalog = catalog();
    let mut collected = Collected::default();
    let known_namespaces = {
        let mut scope =
            Scope::new(&catalog, ScopeOptions::default()).with_registrar(&mut collected);
        {
            let mut outer = scope.enter_namespace("outer");
            {
                let mut inner = outer.enter_namespace("inner");
                inner.create("Panel", Args::with_id("a")).unwrap();
            }
            assert_eq!(outer.current_namespace(), Some("outer"));
            outer.create("Panel", Args::with_id("b")).unwrap();
            outer.create("Widget", Args::new()).unwrap();
        }
        assert_eq!(scope.current_namespace(), None);
        scope.known_namespaces().clone()
    };

    assert_eq!(collected.0, ["inner/Panel", "outer/Panel"]);
    assert_eq!(
        known_namespaces.into_iter().collect::<Vec<_>>(),
        ["default", "inner", "kube-system", "outer"]
    );
}
