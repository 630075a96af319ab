//! Translation between file content and a document tree.

use serde_json::Value as Json;

use super::node::{ConfigNode, JsonObject};
use crate::error::{Error, Result};
use crate::reactive::Property;

/// Turns a property holding raw file content into a [`ConfigNode`].
///
/// Implementations link the returned node to `content` in both directions,
/// so edits made through the node are written back as text.
pub trait ConfigTransformer: Send + Sync {
    fn transform(&self, content: &Property<String>) -> ConfigNode;
}

/// JSON documents whose root is an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonTransformer {
    pretty: bool,
}

impl JsonTransformer {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Two-space indented output.
    pub fn pretty() -> Self {
        Self::new(true)
    }

    /// Single-line output.
    pub fn compact() -> Self {
        Self::new(false)
    }

    /// Parse `text` as a JSON object. Blank text is an empty object.
    pub fn parse(&self, text: &str) -> Result<JsonObject> {
        if text.trim().is_empty() {
            return Ok(JsonObject::new());
        }

        let document: Json = serde_json::from_str(text)?;
        match document {
            Json::Object(object) => Ok(object),
            other => Err(Error::NotAnObject {
                found: kind(&other),
            }),
        }
    }

    pub fn render(&self, object: &JsonObject) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(object)
        } else {
            serde_json::to_string(object)
        };

        rendered.unwrap_or_else(|error| {
            tracing::error!(%error, "failed to render config document");
            String::from("{}")
        })
    }
}

impl Default for JsonTransformer {
    fn default() -> Self {
        Self::pretty()
    }
}

impl ConfigTransformer for JsonTransformer {
    fn transform(&self, content: &Property<String>) -> ConfigNode {
        let format = *self;

        let object = content.bimap(
            move |text: &String| {
                // Hand-edited files are often briefly invalid; read them as
                // empty rather than failing the whole tree.
                format.parse(text).unwrap_or_else(|error| {
                    tracing::debug!(%error, "config content is not a JSON object; reading it as empty");
                    JsonObject::new()
                })
            },
            move |object: &JsonObject| format.render(object),
        );

        ConfigNode::new(object)
    }
}

fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_empty_object() {
        let format = JsonTransformer::pretty();

        assert!(format.parse("").unwrap().is_empty());
        assert!(format.parse("  \n").unwrap().is_empty());
    }

    #[test]
    fn non_object_root_is_rejected() {
        let error = JsonTransformer::pretty().parse("[1, 2]").unwrap_err();
        assert!(matches!(error, Error::NotAnObject { found: "an array" }));
    }

    #[test]
    fn invalid_text_is_a_json_error() {
        let error = JsonTransformer::pretty().parse("{ oops").unwrap_err();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn pretty_rendering_uses_two_space_indent() {
        let format = JsonTransformer::pretty();
        let object = format.parse(r#"{"test":"Hello, world!"}"#).unwrap();

        assert_eq!(format.render(&object), "{\n  \"test\": \"Hello, world!\"\n}");
        assert_eq!(JsonTransformer::compact().render(&object), r#"{"test":"Hello, world!"}"#);
    }

    #[test]
    fn transform_links_text_and_tree() {
        let content = Property::of(String::from(r#"{"name":"tether"}"#));
        let node = JsonTransformer::compact().transform(&content);

        let name = node.get_string("name");
        assert_eq!(name.get().as_deref(), Some("tether"));

        name.set(Some(String::from("rope")));
        assert_eq!(content.get(), r#"{"name":"rope"}"#);

        content.set(String::from("not json at all"));
        assert_eq!(name.get(), None);
    }
}
