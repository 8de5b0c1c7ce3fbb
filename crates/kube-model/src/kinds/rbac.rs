//! Service accounts, users, groups, roles and their bindings.
use serde_json::Value as JsonValue;

use super::name_metadata;
use crate::{
    instance::{self, Args, Instance},
    render::{self, Document, RenderContext},
    schema::TypeDef,
    transform::TransformContext,
    types::TypeDescriptor as T,
    value::Value,
};

const VERBS: [&str; 7] = [
    "get",
    "list",
    "create",
    "update",
    "delete",
    "deletecollection",
    "watch",
];

const SYSTEM_GROUP_PREFIX: &str = "system:serviceaccounts:";
const SYSTEM_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

pub(super) fn definitions() -> Vec<TypeDef> {
    vec![
        TypeDef::new("ServiceAccount")
            .kind("v1", "ServiceAccount", "serviceaccount")
            .output_order(30)
            .field(
                "imagePullSecrets",
                T::nullable(T::list(T::Identifier)),
                Value::Null,
            )
            .field("secrets", T::nullable(T::list(T::Identifier)), Value::Null)
            .render(render_service_account),
        TypeDef::new("User")
            .kind("v1", "User", "user")
            .cluster_scoped()
            .output_order(20)
            .field("fullName", T::nullable(T::String), Value::Null)
            .field(
                "identities",
                T::non_empty(T::list(T::non_empty(T::String))),
                Value::empty_seq(),
            )
            .render(render_user),
        TypeDef::new("Group")
            .kind("v1", "Group", "group")
            .cluster_scoped()
            .output_order(20)
            .field("users", T::non_empty(T::list(T::Identifier)), Value::empty_seq())
            .render(render_group),
        TypeDef::new("PolicyRule")
            .field("resourceNames", T::nullable(T::list(T::String)), Value::empty_seq())
            .field(
                "resources",
                T::non_empty(T::list(T::non_empty(T::String))),
                Value::empty_seq(),
            )
            .field(
                "verbs",
                T::non_empty(T::list(T::enumeration(VERBS))),
                Value::empty_seq(),
            )
            .field("apiGroups", T::non_empty(T::list(T::String)), vec![""])
            .field("attributeRestrictions", T::nullable(T::String), Value::Null)
            .field("nonResourceURLs", T::nullable(T::list(T::String)), Value::empty_seq())
            .render(render_policy_rule),
        TypeDef::new("RoleBase")
            .abstract_type()
            .output_order(50)
            .field(
                "rules",
                T::non_empty(T::list(T::object("PolicyRule"))),
                Value::empty_seq(),
            )
            .render(render_role),
        TypeDef::new("Role")
            .parent("RoleBase")
            .kind("v1", "Role", "role"),
        TypeDef::new("ClusterRole")
            .parent("RoleBase")
            .kind("v1", "ClusterRole", "clusterrole")
            .cluster_scoped(),
        TypeDef::new("RoleSubject")
            .field("name", T::nullable(T::SystemIdentifier), Value::Null)
            .field("kind", T::nullable(T::CaseIdentifier), Value::Null)
            .field("ns", T::nullable(T::Identifier), Value::Null)
            .render(render_role_subject),
        TypeDef::new("RoleRef").field("name", T::nullable(T::SystemIdentifier), Value::Null),
        TypeDef::new("RoleBindingBase")
            .abstract_type()
            .always_regenerate()
            .output_order(60)
            .default_object("roleRef", "RoleRef")
            .field(
                "subjects",
                T::non_empty(T::list(T::object("RoleSubject"))),
                Value::empty_seq(),
            )
            .transform("roleRef", role_ref)
            .transform("subjects", subjects)
            .render(render_role_binding),
        TypeDef::new("RoleBinding")
            .parent("RoleBindingBase")
            .kind("v1", "RoleBinding", "rolebinding"),
        TypeDef::new("ClusterRoleBinding")
            .parent("RoleBindingBase")
            .kind("v1", "ClusterRoleBinding", "clusterrolebinding")
            .cluster_scoped(),
    ]
}

fn render_service_account(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = context.fields().skip(["name"]).render()?.unwrap_or_default();
    document.insert("metadata".to_owned(), name_metadata(context));
    Ok(Some(document))
}

fn render_user(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = render::document("metadata", name_metadata(context));
    for field in ["fullName", "identities"] {
        let value = context.render_field(field)?.unwrap_or(JsonValue::Null);
        document.insert(field.to_owned(), value);
    }
    document.insert("groups".to_owned(), JsonValue::Null);
    Ok(Some(document))
}

fn render_group(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = render::document("metadata", name_metadata(context));
    let users = context.render_field("users")?.unwrap_or(JsonValue::Null);
    document.insert("users".to_owned(), users);
    Ok(Some(document))
}

fn render_policy_rule(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut rule = context
        .fields()
        .keep_empty(["attributeRestrictions"])
        .render()?
        .unwrap_or_default();
    let restrictions = rule
        .entry("attributeRestrictions")
        .or_insert(JsonValue::Null);
    if restrictions.as_str() == Some("") {
        *restrictions = JsonValue::Null;
    }
    Ok(Some(rule))
}

fn render_role(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = render::document("metadata", name_metadata(context));
    let rules = context.render_field("rules")?.unwrap_or(JsonValue::Null);
    document.insert("rules".to_owned(), rules);
    Ok(Some(document))
}

fn render_role_subject(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    context
        .fields()
        .order(["name", "kind", "ns"])
        .rename("ns", "namespace")
        .render()
}

fn render_role_binding(context: &mut RenderContext<'_>) -> render::Result<Option<Document>> {
    let mut document = render::document("metadata", name_metadata(context));
    for field in ["roleRef", "subjects"] {
        let value = context.render_field(field)?.unwrap_or(JsonValue::Null);
        document.insert(field.to_owned(), value);
    }
    document.insert("userNames".to_owned(), JsonValue::Null);
    document.insert("groupNames".to_owned(), JsonValue::Null);
    Ok(Some(document))
}

/// Accepts a role in the binding's namespace, a cluster role or a role name.
fn role_ref(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    let name = match value {
        Value::Object(role) if role.is_a("ClusterRole") => role.name(),
        Value::Object(role)
            if role.is_a("Role") && role.namespace() == context.instance().namespace() =>
        {
            role.name()
        }
        Value::Text(name) => Some(name.as_str()),
        other => return Ok(other.clone()),
    };
    let role_ref = context.create("RoleRef", Args::new().set("name", name))?;
    Ok(role_ref.into())
}

/// Accepts a single subject or a list of them. Subjects can be service
/// accounts, users and groups, or names: `system:serviceaccounts:<ns>` is a
/// system group, `system:serviceaccount:<ns>:<name>` a service account and
/// anything else a user.
fn subjects(context: &TransformContext<'_>, value: &Value) -> instance::Result<Value> {
    let items = match value {
        Value::Seq(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(_) | Value::Text(_) => vec![value],
        other => return Ok(other.clone()),
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(subject) if is_subject_kind(subject) => {
                let kind = subject.resolved().kind.as_ref().map(|kind| kind.kind.as_str());
                let namespace = if subject.is_namespaced() {
                    subject.namespace()
                } else {
                    None
                };
                role_subject(context, subject.name(), kind, namespace)
            }
            Value::Text(name) if name.starts_with(SYSTEM_GROUP_PREFIX) => {
                role_subject(context, Some(name.as_str()), Some("SystemGroup"), None)
            }
            Value::Text(name) => match name.strip_prefix(SYSTEM_ACCOUNT_PREFIX) {
                Some(account) => {
                    let (namespace, account) = account.split_once(':').unwrap_or(("", account));
                    role_subject(context, Some(account), Some("ServiceAccount"), Some(namespace))
                }
                None => role_subject(context, Some(name.as_str()), Some("User"), None),
            },
            other => Ok(other.clone()),
        })
        .collect::<instance::Result<Vec<_>>>()
        .map(Value::Seq)
}

fn is_subject_kind(instance: &Instance) -> bool {
    ["ServiceAccount", "User", "Group"]
        .iter()
        .any(|kind| instance.is_a(kind))
}

fn role_subject(
    context: &TransformContext<'_>,
    name: Option<&str>,
    kind: Option<&str>,
    namespace: Option<&str>,
) -> instance::Result<Value> {
    let args = Args::new()
        .set("name", name)
        .set("kind", kind)
        .set("ns", namespace);
    context.create("RoleSubject", args).map(Value::from)
}
