//! In-memory identity: anonymous id, user id and accumulated traits

use contracts::{new_message_id, Properties};
use parking_lot::RwLock;
use serde_json::Value;

const ANONYMOUS_ID_KEY: &str = "anonymousId";
const USER_ID_KEY: &str = "userId";

#[derive(Debug)]
struct Identity {
    anonymous_id: String,
    user_id: Option<String>,
    traits: Properties,
}

impl Identity {
    fn anonymous() -> Self {
        Self {
            anonymous_id: new_message_id(),
            user_id: None,
            traits: Properties::new(),
        }
    }
}

/// 用户身份存储，不落盘
#[derive(Debug)]
pub struct IdentityStore {
    inner: RwLock<Identity>,
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore {
    /// Fresh identity with a random anonymous id
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Identity::anonymous()),
        }
    }

    pub fn anonymous_id(&self) -> String {
        self.inner.read().anonymous_id.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.read().user_id.clone()
    }

    /// Traits as copied into `context.traits`, including both ids
    pub fn traits(&self) -> Properties {
        let identity = self.inner.read();
        let mut traits = identity.traits.clone();
        traits.insert(
            ANONYMOUS_ID_KEY.into(),
            Value::String(identity.anonymous_id.clone()),
        );
        if let Some(user_id) = &identity.user_id {
            traits.insert(USER_ID_KEY.into(), Value::String(user_id.clone()));
        }
        traits
    }

    /// Record `user_id` (when given) and merge `traits` over the stored ones
    pub fn identify(&self, user_id: Option<&str>, traits: &Properties) {
        let mut identity = self.inner.write();
        if let Some(user_id) = user_id.filter(|id| !id.trim().is_empty()) {
            identity.user_id = Some(user_id.to_string());
        }
        for (key, value) in traits {
            identity.traits.insert(key.clone(), value.clone());
        }
    }

    /// Forget the user and start over with a new anonymous id
    pub fn reset(&self) {
        *self.inner.write() = Identity::anonymous();
    }
}
