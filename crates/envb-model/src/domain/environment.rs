use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment properties as stored in `properties.json`.
///
/// Every field is optional at this level; [`EnvironmentProperties::validate`] turns the
/// raw document into an [`EnvironmentSpec`]. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// Reason a properties document cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecViolation {
    #[error("base_image not found in environment properties")]
    MissingBaseImage,
    #[error("uuid not found in environment properties")]
    MissingUuid,
    #[error("environment properties uuid {declared} differs from requested {requested}")]
    UuidMismatch { declared: String, requested: String },
}

/// Validated environment: what the build is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub base_image: String,
    pub uuid: String,
}

impl EnvironmentProperties {
    /// Check the document against the environment the build was requested for.
    ///
    /// A uuid that disagrees with `environment_id` is rejected, never corrected.
    pub fn validate(&self, environment_id: &str) -> Result<EnvironmentSpec, SpecViolation> {
        let base_image = self
            .base_image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SpecViolation::MissingBaseImage)?;
        let uuid = self
            .uuid
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SpecViolation::MissingUuid)?;

        if uuid != environment_id {
            return Err(SpecViolation::UuidMismatch {
                declared: uuid.to_string(),
                requested: environment_id.to_string(),
            });
        }

        Ok(EnvironmentSpec {
            base_image: base_image.to_string(),
            uuid: uuid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> EnvironmentProperties {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn valid_properties_pass() {
        let props = parse(r#"{"base_image": "python:3.9", "uuid": "e1", "gpu_support": false}"#);
        let spec = props.validate("e1").unwrap();
        assert_eq!(spec.base_image, "python:3.9");
        assert_eq!(spec.uuid, "e1");
    }

    #[test]
    fn missing_fields_are_reported() {
        assert_eq!(
            parse(r#"{"uuid": "e1"}"#).validate("e1"),
            Err(SpecViolation::MissingBaseImage)
        );
        assert_eq!(
            parse(r#"{"base_image": "python:3.9"}"#).validate("e1"),
            Err(SpecViolation::MissingUuid)
        );
    }

    #[test]
    fn uuid_mismatch_is_not_corrected() {
        let err = parse(r#"{"base_image": "python:3.9", "uuid": "other"}"#)
            .validate("e1")
            .unwrap_err();
        assert_eq!(
            err,
            SpecViolation::UuidMismatch {
                declared: "other".into(),
                requested: "e1".into()
            }
        );
    }
}
