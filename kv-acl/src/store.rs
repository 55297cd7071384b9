//! # ACL store and authorization
//!
//! Holds every configured user and implements the per-call authorization
//! algorithm from §4.5.

use std::collections::HashMap;
use std::sync::RwLock;

use kv_common::{KvError, KvResult};
use tracing::trace;

use crate::user::AclUser;

/// Everything the authorization check needs about the call being made.
pub struct AuthRequest<'a> {
    pub username: &'a str,
    pub command: &'a str,
    pub sub_command: Option<&'a str>,
    pub categories: &'a [&'a str],
    pub read_keys: &'a [Vec<u8>],
    pub write_keys: &'a [Vec<u8>],
}

/// All configured ACL users, keyed by username.
pub struct AclStore {
    users: RwLock<HashMap<String, AclUser>>,
}

impl AclStore {
    pub fn new() -> Self {
        AclStore { users: RwLock::new(HashMap::new()) }
    }

    pub fn insert_user(&self, user: AclUser) {
        self.users.write().expect("acl lock poisoned").insert(user.name.clone(), user);
    }

    pub fn remove_user(&self, name: &str) -> bool {
        self.users.write().expect("acl lock poisoned").remove(name).is_some()
    }

    pub fn user_exists(&self, name: &str) -> bool {
        self.users.read().expect("acl lock poisoned").contains_key(name)
    }

    /// `AUTH <password>` for a known username, or `AUTH <user> <password>`.
    pub fn authenticate(&self, username: &str, password: &str) -> KvResult<()> {
        let users = self.users.read().expect("acl lock poisoned");
        let user = users.get(username).ok_or(KvError::Unauthorized)?;
        if !user.enabled || !user.verify_password(password) {
            return Err(KvError::Unauthorized);
        }
        Ok(())
    }

    /// Implements the authorization algorithm from §4.5. Denies if the user
    /// is disabled, permits unconditionally for root-equivalent users, else
    /// requires the command (or one of its categories) to be included and
    /// not excluded, and every accessed key to match an allowed pattern and
    /// no denied pattern.
    pub fn authorize(&self, req: &AuthRequest<'_>) -> KvResult<()> {
        let users = self.users.read().expect("acl lock poisoned");
        let user = users.get(req.username).ok_or(KvError::Unauthorized)?;

        if !user.enabled {
            trace!(user = req.username, "acl: user disabled");
            return Err(KvError::Unauthorized);
        }
        if user.is_root {
            return Ok(());
        }

        let command_permitted = user.allows_command(req.command)
            || req.sub_command.map(|s| user.allows_command(s)).unwrap_or(false)
            || req.categories.iter().any(|c| user.allows_category(c));
        if !command_permitted {
            trace!(user = req.username, command = req.command, "acl: command not permitted");
            return Err(KvError::Unauthorized);
        }

        let all_keys = req.read_keys.iter().chain(req.write_keys.iter());
        for key in all_keys {
            if !user.allows_key(key) {
                trace!(user = req.username, "acl: key not permitted");
                return Err(KvError::Unauthorized);
            }
        }

        Ok(())
    }
}

impl Default for AclStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::AclUserBuilder;

    #[test]
    fn root_user_bypasses_every_check() {
        let store = AclStore::new();
        store.insert_user(AclUserBuilder::new("default").root().nopass().build());
        let req = AuthRequest {
            username: "default",
            command: "flushall",
            sub_command: None,
            categories: &["admin"],
            read_keys: &[],
            write_keys: &[b"anything".to_vec()],
        };
        assert!(store.authorize(&req).is_ok());
    }

    #[test]
    fn disabled_user_is_always_denied() {
        let store = AclStore::new();
        store.insert_user(AclUserBuilder::new("bob").disabled().build());
        let req = AuthRequest {
            username: "bob",
            command: "get",
            sub_command: None,
            categories: &["read"],
            read_keys: &[],
            write_keys: &[],
        };
        assert!(matches!(store.authorize(&req), Err(KvError::Unauthorized)));
    }

    #[test]
    fn restricted_user_must_match_command_and_keys() {
        let store = AclStore::new();
        store.insert_user(
            AclUserBuilder::new("reader")
                .include_category("read")
                .allow_key_pattern("public:*")
                .build(),
        );
        let allowed = AuthRequest {
            username: "reader",
            command: "get",
            sub_command: None,
            categories: &["read"],
            read_keys: &[b"public:1".to_vec()],
            write_keys: &[],
        };
        assert!(store.authorize(&allowed).is_ok());

        let wrong_key = AuthRequest {
            username: "reader",
            command: "get",
            sub_command: None,
            categories: &["read"],
            read_keys: &[b"private:1".to_vec()],
            write_keys: &[],
        };
        assert!(matches!(store.authorize(&wrong_key), Err(KvError::Unauthorized)));

        let wrong_command = AuthRequest {
            username: "reader",
            command: "set",
            sub_command: None,
            categories: &["write"],
            read_keys: &[],
            write_keys: &[b"public:1".to_vec()],
        };
        assert!(matches!(store.authorize(&wrong_command), Err(KvError::Unauthorized)));
    }

    #[test]
    fn authenticate_checks_password_and_enabled() {
        let store = AclStore::new();
        store.insert_user(AclUserBuilder::new("alice").password("s3cret").build());
        assert!(store.authenticate("alice", "s3cret").is_ok());
        assert!(store.authenticate("alice", "wrong").is_err());
        assert!(store.authenticate("nobody", "x").is_err());
    }
}
