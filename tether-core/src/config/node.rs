//! Reactive view of a JSON document.
//!
//! Each accessor returns a property linked to the node's object in both
//! directions: reading follows the document, writing inserts (or removes)
//! the key and writes the whole object back.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

use crate::reactive::{CellValue, Property};

/// A JSON object.
pub type JsonObject = serde_json::Map<String, Json>;

/// One object in a configuration tree.
#[derive(Clone, Debug)]
pub struct ConfigNode {
    object: Property<JsonObject>,
}

impl ConfigNode {
    pub fn new(object: Property<JsonObject>) -> Self {
        Self { object }
    }

    /// The property holding this node's object.
    pub fn object(&self) -> &Property<JsonObject> {
        &self.object
    }

    /// Typed view of `key`.
    ///
    /// Reads as `None` when the key is missing or does not deserialize into
    /// `T`. Writing `None` removes the key.
    pub fn get<T>(&self, key: &str) -> Property<Option<T>>
    where
        T: CellValue + Serialize + DeserializeOwned,
    {
        let key: Arc<str> = Arc::from(key);
        let read_key = Arc::clone(&key);
        let parent = self.object.clone();

        self.object.bimap(
            move |object: &JsonObject| {
                object
                    .get(&*read_key)
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
            },
            move |value: &Option<T>| {
                let mut object = parent.get();
                match value {
                    None => {
                        object.remove(&*key);
                    }
                    Some(value) => match serde_json::to_value(value) {
                        Ok(json) => {
                            object.insert(key.to_string(), json);
                        }
                        Err(error) => {
                            tracing::warn!(key = &*key, %error, "value does not serialize to JSON; key left unchanged");
                        }
                    },
                }
                object
            },
        )
    }

    pub fn get_string(&self, key: &str) -> Property<Option<String>> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Property<Option<bool>> {
        self.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Property<Option<i64>> {
        self.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Property<Option<u64>> {
        self.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Property<Option<f64>> {
        self.get(key)
    }

    /// The whole node as one typed value.
    ///
    /// An empty object, or one that does not deserialize into `T`, reads as
    /// `None`. Writing `None` clears the node.
    pub fn get_as<T>(&self) -> Property<Option<T>>
    where
        T: CellValue + Serialize + DeserializeOwned,
    {
        self.object.bimap(
            |object: &JsonObject| {
                if object.is_empty() {
                    return None;
                }
                serde_json::from_value(Json::Object(object.clone())).ok()
            },
            |value: &Option<T>| match value.as_ref().map(serde_json::to_value) {
                None => JsonObject::new(),
                Some(Ok(Json::Object(object))) => object,
                Some(Ok(_)) => {
                    tracing::warn!("value does not serialize to a JSON object; clearing node");
                    JsonObject::new()
                }
                Some(Err(error)) => {
                    tracing::warn!(%error, "value does not serialize to JSON; clearing node");
                    JsonObject::new()
                }
            },
        )
    }

    /// Child node under `key`.
    ///
    /// A missing or non-object entry reads as an empty object; writes through
    /// the child re-insert it into this node.
    pub fn node(&self, key: &str) -> ConfigNode {
        let key: Arc<str> = Arc::from(key);
        let read_key = Arc::clone(&key);
        let parent = self.object.clone();

        ConfigNode::new(self.object.bimap(
            move |object: &JsonObject| {
                object
                    .get(&*read_key)
                    .and_then(Json::as_object)
                    .cloned()
                    .unwrap_or_default()
            },
            move |child: &JsonObject| {
                let mut object = parent.get();
                object.insert(key.to_string(), Json::Object(child.clone()));
                object
            },
        ))
    }

    /// Whether this node currently has `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.object.get().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn node_of(value: Json) -> ConfigNode {
        let object = match value {
            Json::Object(object) => object,
            _ => JsonObject::new(),
        };
        ConfigNode::new(Property::of(object))
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Server {
        host: String,
        port: u16,
    }

    #[test]
    fn scalar_keys_read_typed_values() {
        let node = node_of(json!({ "name": "tether", "debug": true, "workers": 4, "ratio": 0.5 }));

        assert_eq!(node.get_string("name").get().as_deref(), Some("tether"));
        assert_eq!(node.get_bool("debug").get(), Some(true));
        assert_eq!(node.get_i64("workers").get(), Some(4));
        assert_eq!(node.get_u64("workers").get(), Some(4));
        assert_eq!(node.get_f64("ratio").get(), Some(0.5));
    }

    #[test]
    fn missing_or_mistyped_keys_read_none() {
        let node = node_of(json!({ "workers": "many" }));

        assert_eq!(node.get_i64("workers").get(), None);
        assert_eq!(node.get_string("absent").get(), None);
    }

    #[test]
    fn writes_update_the_object() {
        let node = node_of(json!({}));
        let name = node.get_string("name");

        name.set(Some(String::from("rope")));
        assert_eq!(node.object().get().get("name"), Some(&json!("rope")));
        assert!(node.exists("name"));

        name.set(None);
        assert!(!node.exists("name"));
    }

    #[test]
    fn get_or_materializes_default() {
        let node = node_of(json!({}));
        let port = node.get_u64("port");

        assert_eq!(port.get_or(8080), 8080);
        assert_eq!(node.object().get().get("port"), Some(&json!(8080)));
    }

    #[test]
    fn sibling_properties_see_each_other() {
        let node = node_of(json!({ "a": 1 }));
        let writer = node.get_i64("a");
        let reader = node.get_i64("a");

        writer.set(Some(2));
        assert_eq!(reader.get(), Some(2));
    }

    #[test]
    fn nested_nodes_write_through() {
        let root = node_of(json!({ "server": { "host": "localhost" } }));
        let server = root.node("server");
        let host = server.get_string("host");

        assert_eq!(host.get().as_deref(), Some("localhost"));

        server.get_u64("port").set(Some(9000));
        assert_eq!(root.object().get().get("server"), Some(&json!({ "host": "localhost", "port": 9000 })));

        let fresh = root.node("missing");
        assert!(fresh.object().get().is_empty());
        fresh.get_bool("enabled").set(Some(false));
        assert_eq!(root.object().get().get("missing"), Some(&json!({ "enabled": false })));
    }

    #[test]
    fn whole_node_as_struct() {
        let node = node_of(json!({ "host": "example.org", "port": 443 }));
        let server = node.get_as::<Server>();

        assert_eq!(
            server.get(),
            Some(Server {
                host: String::from("example.org"),
                port: 443,
            })
        );

        server.set(Some(Server {
            host: String::from("localhost"),
            port: 80,
        }));
        assert_eq!(node.get_u64("port").get(), Some(80));

        assert_eq!(node_of(json!({})).get_as::<Server>().get(), None);
    }
}
