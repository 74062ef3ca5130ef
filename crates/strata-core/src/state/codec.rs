//! StateCodec - Deployment <-> JSON document
//!
//! Validates the envelope (`version`, `deployment`) and routes the body to
//! the rule for its version. Resources are never interpreted.

use super::deployment::Deployment;
use crate::error::{Result, StrataError};
use serde_json::{Map, Value};

/// Oldest document version this build reads or writes
pub const MIN_SUPPORTED_VERSION: i64 = 1;

/// Newest document version this build understands
pub const CURRENT_VERSION: i64 = 3;

const VERSION_KEY: &str = "version";
const DEPLOYMENT_KEY: &str = "deployment";
const MANIFEST_KEY: &str = "manifest";
const SECRETS_PROVIDERS_KEY: &str = "secrets_providers";

/// Stateless codec for deployment documents
pub struct StateCodec;

impl StateCodec {
    /// Encode a deployment as pretty-printed JSON
    pub fn encode(deployment: &Deployment) -> Result<Vec<u8>> {
        let version = deployment
            .version
            .ok_or_else(|| StrataError::encode("deployment has no version"))?;
        check_supported(version).map_err(StrataError::encode)?;

        let body = deployment
            .deployment
            .as_ref()
            .ok_or_else(|| StrataError::encode(format!("version {} set but deployment is missing", version)))?;
        check_body(version, body).map_err(StrataError::encode)?;

        let mut document = Map::new();
        document.insert(VERSION_KEY.to_string(), Value::from(version));
        document.insert(DEPLOYMENT_KEY.to_string(), body.clone());
        for (key, value) in &deployment.extra {
            if key == VERSION_KEY || key == DEPLOYMENT_KEY {
                return Err(StrataError::encode(format!(
                    "extra field '{}' collides with an envelope field",
                    key
                )));
            }
            document.insert(key.clone(), value.clone());
        }

        serde_json::to_vec_pretty(&Value::Object(document))
            .map_err(|e| StrataError::encode(e.to_string()))
    }

    /// Decode a JSON document into a deployment
    pub fn decode(bytes: &[u8]) -> Result<Deployment> {
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| StrataError::decode(format!("malformed document: {}", e)))?;
        let Value::Object(document) = document else {
            return Err(StrataError::decode("document is not a JSON object"));
        };

        let version = match document.get(VERSION_KEY) {
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StrataError::decode(format!("version must be an integer, got {}", value)))?,
            None => return Err(StrataError::decode("document has no version")),
        };
        if version > CURRENT_VERSION {
            return Err(StrataError::decode(format!(
                "document version {} is newer than the newest supported version {}; upgrade strata to read it",
                version, CURRENT_VERSION
            )));
        }
        check_supported(version).map_err(StrataError::decode)?;

        let body = document
            .get(DEPLOYMENT_KEY)
            .cloned()
            .ok_or_else(|| StrataError::decode(format!("version {} set but deployment is missing", version)))?;
        check_body(version, &body).map_err(StrataError::decode)?;

        // Unknown fields keep document order
        let extra = document
            .into_iter()
            .filter(|(key, _)| key != VERSION_KEY && key != DEPLOYMENT_KEY)
            .collect();

        Ok(Deployment {
            version: Some(version),
            deployment: Some(body),
            extra,
        })
    }

    /// Migrate a v1 or v2 deployment to the current version
    pub fn upgrade(mut deployment: Deployment) -> Result<Deployment> {
        let version = deployment
            .version
            .ok_or_else(|| StrataError::decode("deployment has no version"))?;
        check_supported(version).map_err(StrataError::decode)?;
        if version == CURRENT_VERSION {
            return Ok(deployment);
        }

        let body = deployment.body_mut();
        if version < 2 {
            body.entry(MANIFEST_KEY.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        body.entry(SECRETS_PROVIDERS_KEY.to_string())
            .or_insert(Value::Null);

        tracing::debug!(from = version, to = CURRENT_VERSION, "upgraded deployment");
        deployment.version = Some(CURRENT_VERSION);
        Ok(deployment)
    }
}

fn check_supported(version: i64) -> std::result::Result<(), String> {
    if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(format!(
            "unsupported version {} (supported {}..={})",
            version, MIN_SUPPORTED_VERSION, CURRENT_VERSION
        ));
    }
    Ok(())
}

/// Per-version body rules; each version includes the rules before it
fn check_body(version: i64, body: &Value) -> std::result::Result<(), String> {
    let Value::Object(map) = body else {
        return Err("deployment body must be an object".to_string());
    };

    if version >= 2 {
        match map.get(MANIFEST_KEY) {
            Some(Value::Object(_)) => {}
            Some(_) => return Err("manifest must be an object".to_string()),
            None => return Err(format!("version {} requires a manifest", version)),
        }
    }

    if version >= 3 {
        match map.get(SECRETS_PROVIDERS_KEY) {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => return Err("secrets_providers must be an object or null".to_string()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn v3_body() -> Value {
        json!({
            "manifest": { "time": "2026-01-01T00:00:00Z" },
            "secrets_providers": null,
            "resources": [{ "urn": "a", "type": "x:y" }],
        })
    }

    #[test]
    fn test_roundtrip_preserves_unknown_fields() {
        let mut deployment = Deployment::new(3, v3_body());
        deployment.extra.insert("zeta".into(), json!(1));
        deployment.extra.insert("alpha".into(), json!({ "nested": [true] }));

        let bytes = StateCodec::encode(&deployment).unwrap();
        let decoded = StateCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, deployment);

        let keys: Vec<_> = decoded.extra.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta".to_string(), "alpha".to_string()]);
        assert_eq!(StateCodec::encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_encode_rejects() {
        let unversioned = Deployment {
            version: None,
            deployment: Some(v3_body()),
            extra: Map::new(),
        };
        let too_old = Deployment::new(0, json!({}));
        let too_new = Deployment::new(4, v3_body());
        let no_body = Deployment {
            version: Some(3),
            deployment: None,
            extra: Map::new(),
        };
        let no_manifest = Deployment::new(2, json!({}));

        for deployment in [unversioned, too_old, too_new, no_body, no_manifest] {
            assert!(matches!(
                StateCodec::encode(&deployment),
                Err(StrataError::Encode(_))
            ));
        }
    }

    #[test]
    fn test_encode_rejects_colliding_extra() {
        let mut deployment = Deployment::new(1, json!({}));
        deployment.extra.insert("version".into(), json!(9));
        assert!(StateCodec::encode(&deployment).is_err());
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let doc = br#"{"version": 4, "deployment": {"manifest": {}}}"#;
        let err = StateCodec::decode(doc).unwrap_err();
        assert!(matches!(err, StrataError::Decode(ref msg) if msg.contains("newer")));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: [&[u8]; 7] = [
            b"not json",
            b"[1, 2]",
            br#"{"deployment": {}}"#,
            br#"{"version": "3", "deployment": {}}"#,
            br#"{"version": 3}"#,
            br#"{"version": 1, "deployment": []}"#,
            br#"{"version": 3, "deployment": {"manifest": {}, "secrets_providers": "x"}}"#,
        ];
        for doc in cases {
            assert!(matches!(
                StateCodec::decode(doc),
                Err(StrataError::Decode(_))
            ));
        }
    }

    #[test]
    fn test_upgrade_v1() {
        let v1 = Deployment::new(1, json!({ "resources": [] }));
        let upgraded = StateCodec::upgrade(v1).unwrap();

        assert_eq!(upgraded.version, Some(3));
        let body = upgraded.body().unwrap();
        assert_eq!(body["manifest"], json!({}));
        assert_eq!(body["secrets_providers"], Value::Null);
        assert!(StateCodec::encode(&upgraded).is_ok());
    }

    #[test]
    fn test_upgrade_current_is_identity() {
        let v3 = Deployment::new(3, v3_body());
        assert_eq!(StateCodec::upgrade(v3.clone()).unwrap(), v3);
    }
}
