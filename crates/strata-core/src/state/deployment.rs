use serde_json::{Map, Value};

/// Versioned deployment snapshot.
///
/// `deployment` is the snapshot body; the codec treats it as an opaque,
/// order-preserving tree apart from the few envelope fields it validates.
/// `extra` carries unknown top-level fields verbatim, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deployment {
    pub version: Option<i64>,
    pub deployment: Option<Value>,
    pub extra: Map<String, Value>,
}

impl Deployment {
    pub fn new(version: i64, body: Value) -> Self {
        Self {
            version: Some(version),
            deployment: Some(body),
            extra: Map::new(),
        }
    }

    /// Body as an object, if it is one
    pub fn body(&self) -> Option<&Map<String, Value>> {
        self.deployment.as_ref().and_then(Value::as_object)
    }

    /// Mutable body object, creating an empty one when absent
    pub fn body_mut(&mut self) -> &mut Map<String, Value> {
        let body = self
            .deployment
            .get_or_insert_with(|| Value::Object(Map::new()));
        if !body.is_object() {
            *body = Value::Object(Map::new());
        }
        match body {
            Value::Object(map) => map,
            _ => unreachable!("body was just replaced with an object"),
        }
    }
}
