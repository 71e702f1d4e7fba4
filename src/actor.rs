//! The acting principal, as resolved by the upstream auth layer.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    /// Role names the auth layer attached to this session. Roles are looked up by
    /// name in the catalog on every check; the names alone grant nothing.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>, roles: Vec<String>) -> Self {
        Actor {
            id,
            name: name.into(),
            roles,
        }
    }

    /// Lower-cased, de-duplicated role names for catalog lookup.
    pub fn role_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .roles
            .iter()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_keys_normalized() {
        let actor = Actor::new(
            1,
            "Ana",
            vec!["Nurse".into(), " nurse ".into(), "".into(), "Administrator".into()],
        );
        assert_eq!(actor.role_keys(), vec!["administrator".to_string(), "nurse".to_string()]);
    }
}
