//! Writes rendered documents as YAML, keeping their key order.
use std::io::Write;

use snafu::{ResultExt, Snafu};

use crate::render::Document;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },

    #[snafu(display("serialized YAML is not valid UTF-8"))]
    NonUtf8Yaml { source: std::string::FromUtf8Error },
}

/// Serializes a rendered document as an explicit YAML document and writes it
/// to a [`Write`].
///
/// # Example
///
/// ```
/// use kube_model::{render::Document, yaml};
///
/// let mut document = Document::new();
/// document.insert("kind".into(), "ConfigMap".into());
/// document.insert("data".into(), serde_json::json!({"b": "2", "a": "1"}));
///
/// let mut buf = Vec::new();
/// yaml::serialize_to_explicit_document(&mut buf, &document).unwrap();
/// let actual_yaml = std::str::from_utf8(&buf).unwrap();
///
/// let expected_yaml = "---
/// kind: ConfigMap
/// data:
///   b: '2'
///   a: '1'
/// ";
///
/// assert_eq!(expected_yaml, actual_yaml);
/// ```
pub fn serialize_to_explicit_document<W>(mut writer: W, document: &Document) -> Result<()>
where
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;
    let mut serializer = serde_yaml::Serializer::new(writer);
    serde::Serialize::serialize(document, &mut serializer).context(SerializeYamlSnafu)?;
    Ok(())
}

/// Writes every document as its own explicit YAML document, in order.
pub fn serialize_all<'a, W>(mut writer: W, documents: impl IntoIterator<Item = &'a Document>) -> Result<()>
where
    W: Write,
{
    for document in documents {
        serialize_to_explicit_document(&mut writer, document)?;
    }
    Ok(())
}

/// Serializes a rendered document into a YAML string, starting with `---`.
pub fn to_explicit_document_string(document: &Document) -> Result<String> {
    let mut buf = Vec::new();
    serialize_to_explicit_document(&mut buf, document)?;
    String::from_utf8(buf).context(NonUtf8YamlSnafu)
}
