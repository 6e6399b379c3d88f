//! Declarative index requirements per model.
//!
//! The policy is a pure function of the model name. Backends translate each
//! [`IndexSpec`] into whatever their native index DDL is.

use crate::model::{GRANT_ID_FIELD, ModelName, UID_FIELD, USER_CODE_FIELD};

/// Field an index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    /// The record-level `expiresAt` timestamp.
    ExpiresAt,
    /// A top-level string field inside the payload.
    Payload(&'static str),
}

impl IndexField {
    /// Dotted path as the engine sees it, e.g. `payload.grantId`.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::ExpiresAt => "expiresAt".to_string(),
            Self::Payload(field) => format!("payload.{field}"),
        }
    }
}

/// A single ascending index a model requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub field: IndexField,
    /// Reject a second live record with the same value.
    pub unique: bool,
    /// Records are removed by the store once the indexed instant passes.
    pub expire_after: bool,
}

impl IndexSpec {
    /// The automatic-expiry index every model carries.
    #[must_use]
    pub const fn expiry() -> Self {
        Self {
            field: IndexField::ExpiresAt,
            unique: false,
            expire_after: true,
        }
    }

    /// Non-unique lookup index on a payload field.
    #[must_use]
    pub const fn lookup(field: &'static str) -> Self {
        Self {
            field: IndexField::Payload(field),
            unique: false,
            expire_after: false,
        }
    }

    /// Unique index on a payload field.
    #[must_use]
    pub const fn unique(field: &'static str) -> Self {
        Self {
            field: IndexField::Payload(field),
            unique: true,
            expire_after: false,
        }
    }

    /// Short suffix used when naming the index in the store.
    #[must_use]
    pub fn name_suffix(&self) -> String {
        match self.field {
            IndexField::ExpiresAt => "expires_at".to_string(),
            IndexField::Payload(field) => to_snake_case(field),
        }
    }
}

/// Ordered list of indexes `model` requires.
///
/// Grantable models get a `payload.grantId` lookup index, `device_code`
/// a unique `payload.userCode`, `session` a unique `payload.uid`; every
/// model gets the `expiresAt` expiry index.
#[must_use]
pub fn indexes_for(model: ModelName) -> Vec<IndexSpec> {
    let mut specs = Vec::with_capacity(3);
    if model.is_grantable() {
        specs.push(IndexSpec::lookup(GRANT_ID_FIELD));
    }
    match model {
        ModelName::DeviceCode => specs.push(IndexSpec::unique(USER_CODE_FIELD)),
        ModelName::Session => specs.push(IndexSpec::unique(UID_FIELD)),
        _ => {}
    }
    specs.push(IndexSpec::expiry());
    specs
}

/// Payload fields guarded by a unique index for `model`.
#[must_use]
pub fn unique_fields(model: ModelName) -> Vec<&'static str> {
    indexes_for(model)
        .into_iter()
        .filter(|spec| spec.unique)
        .filter_map(|spec| match spec.field {
            IndexField::Payload(field) => Some(field),
            IndexField::ExpiresAt => None,
        })
        .collect()
}

fn to_snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for (i, ch) in field.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_model_has_expiry_index() {
        for model in ModelName::ALL {
            let specs = indexes_for(model);
            assert!(
                specs.contains(&IndexSpec::expiry()),
                "{model} is missing the expiry index"
            );
        }
    }

    #[test]
    fn test_device_code_indexes() {
        assert_eq!(
            indexes_for(ModelName::DeviceCode),
            vec![
                IndexSpec::lookup("grantId"),
                IndexSpec::unique("userCode"),
                IndexSpec::expiry(),
            ]
        );
    }

    #[test]
    fn test_session_indexes() {
        assert_eq!(
            indexes_for(ModelName::Session),
            vec![IndexSpec::unique("uid"), IndexSpec::expiry()]
        );
    }

    #[test]
    fn test_plain_model_only_expiry() {
        assert_eq!(indexes_for(ModelName::Client), vec![IndexSpec::expiry()]);
        assert_eq!(
            indexes_for(ModelName::Interaction),
            vec![IndexSpec::expiry()]
        );
    }

    #[test]
    fn test_grantable_models_get_grant_index() {
        for model in ModelName::ALL {
            let has_grant = indexes_for(model).contains(&IndexSpec::lookup("grantId"));
            assert_eq!(has_grant, model.is_grantable(), "{model}");
        }
    }

    #[test]
    fn test_unique_fields() {
        assert_eq!(unique_fields(ModelName::DeviceCode), vec!["userCode"]);
        assert_eq!(unique_fields(ModelName::Session), vec!["uid"]);
        assert!(unique_fields(ModelName::AccessToken).is_empty());
    }

    #[test]
    fn test_name_suffix() {
        assert_eq!(IndexSpec::expiry().name_suffix(), "expires_at");
        assert_eq!(IndexSpec::lookup("grantId").name_suffix(), "grant_id");
        assert_eq!(IndexSpec::unique("userCode").name_suffix(), "user_code");
        assert_eq!(IndexSpec::unique("uid").name_suffix(), "uid");
        assert_eq!(IndexField::Payload("uid").path(), "payload.uid");
    }
}
