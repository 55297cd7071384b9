//! # ACL user
//!
//! One user record: credentials, command/category allow-lists, and key and
//! channel glob patterns (§4.5).

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};

/// A SHA-256 digest, stored as lowercase hex, matching the `#`-prefixed
/// wire format for pre-hashed passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PasswordHash(String);

impl PasswordHash {
    fn of_plaintext(plain: &str) -> Self {
        let digest = Sha256::digest(plain.as_bytes());
        PasswordHash(hex_encode(&digest))
    }

    fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(PasswordHash(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).expect("writing to a String never fails");
    }
    out
}

/// One configured ACL user.
pub struct AclUser {
    pub name: String,
    pub enabled: bool,
    /// Root-equivalent users bypass every other check (the default user,
    /// typically).
    pub is_root: bool,
    pub nopass: bool,
    pub nokeys: bool,
    passwords: Vec<PasswordHash>,
    included_commands: HashSet<String>,
    excluded_commands: HashSet<String>,
    included_categories: HashSet<String>,
    excluded_categories: HashSet<String>,
    allowed_keys: GlobSet,
    allowed_key_patterns: Vec<String>,
    denied_keys: GlobSet,
    denied_key_patterns: Vec<String>,
    allowed_channels: GlobSet,
    allowed_channel_patterns: Vec<String>,
}

/// Builder-style constructor; mirrors how an `ACL SETUSER` style command
/// would accumulate rules one token at a time.
pub struct AclUserBuilder {
    name: String,
    enabled: bool,
    is_root: bool,
    nopass: bool,
    nokeys: bool,
    passwords: Vec<PasswordHash>,
    included_commands: HashSet<String>,
    excluded_commands: HashSet<String>,
    included_categories: HashSet<String>,
    excluded_categories: HashSet<String>,
    allowed_key_patterns: Vec<String>,
    denied_key_patterns: Vec<String>,
    allowed_channel_patterns: Vec<String>,
}

impl AclUserBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        AclUserBuilder {
            name: name.into(),
            enabled: true,
            is_root: false,
            nopass: false,
            nokeys: false,
            passwords: Vec::new(),
            included_commands: HashSet::new(),
            excluded_commands: HashSet::new(),
            included_categories: HashSet::new(),
            excluded_categories: HashSet::new(),
            allowed_key_patterns: Vec::new(),
            denied_key_patterns: Vec::new(),
            allowed_channel_patterns: Vec::new(),
        }
    }

    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn nopass(mut self) -> Self {
        self.nopass = true;
        self
    }

    pub fn nokeys(mut self) -> Self {
        self.nokeys = true;
        self
    }

    /// Accepts either a plaintext password or a `#`-prefixed SHA-256 hex
    /// digest, per the wire convention in §4.5.
    pub fn password(mut self, spec: &str) -> Self {
        let hash = match spec.strip_prefix('#') {
            Some(hex) => PasswordHash::from_hex(hex).unwrap_or_else(|| PasswordHash::of_plaintext(spec)),
            None => PasswordHash::of_plaintext(spec),
        };
        self.passwords.push(hash);
        self
    }

    pub fn include_command(mut self, name: impl Into<String>) -> Self {
        self.included_commands.insert(normalize(&name.into()));
        self
    }

    pub fn exclude_command(mut self, name: impl Into<String>) -> Self {
        self.excluded_commands.insert(normalize(&name.into()));
        self
    }

    pub fn include_category(mut self, name: impl Into<String>) -> Self {
        self.included_categories.insert(normalize(&name.into()));
        self
    }

    pub fn exclude_category(mut self, name: impl Into<String>) -> Self {
        self.excluded_categories.insert(normalize(&name.into()));
        self
    }

    pub fn allow_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_key_patterns.push(pattern.into());
        self
    }

    pub fn deny_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.denied_key_patterns.push(pattern.into());
        self
    }

    pub fn allow_channel_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_channel_patterns.push(pattern.into());
        self
    }

    pub fn build(self) -> AclUser {
        AclUser {
            name: self.name,
            enabled: self.enabled,
            is_root: self.is_root,
            nopass: self.nopass,
            nokeys: self.nokeys,
            passwords: self.passwords,
            included_commands: self.included_commands,
            excluded_commands: self.excluded_commands,
            included_categories: self.included_categories,
            excluded_categories: self.excluded_categories,
            allowed_keys: build_globset(&self.allowed_key_patterns),
            allowed_key_patterns: self.allowed_key_patterns,
            denied_keys: build_globset(&self.denied_key_patterns),
            denied_key_patterns: self.denied_key_patterns,
            allowed_channels: build_globset(&self.allowed_channel_patterns),
            allowed_channel_patterns: self.allowed_channel_patterns,
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim_start_matches('@').to_ascii_lowercase()
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

impl AclUser {
    /// Checks a candidate password against this user's stored credentials.
    /// Always true for `nopass` users.
    pub fn verify_password(&self, candidate: &str) -> bool {
        if self.nopass {
            return true;
        }
        let candidate_hash = PasswordHash::of_plaintext(candidate);
        self.passwords.iter().any(|h| h == &candidate_hash)
    }

    /// True if `name` (lowercase, no leading `@`) is in the included set and
    /// not in the excluded set.
    pub fn allows_command(&self, name: &str) -> bool {
        let name = normalize(name);
        self.included_commands.contains(&name) && !self.excluded_commands.contains(&name)
    }

    pub fn allows_category(&self, category: &str) -> bool {
        let category = normalize(category);
        self.included_categories.contains(&category) && !self.excluded_categories.contains(&category)
    }

    /// True if no command or category excludes the key, and no command or
    /// category rule blanket-denies everything, i.e. `nokeys`.
    pub fn allows_key(&self, key: &[u8]) -> bool {
        if self.nokeys {
            return false;
        }
        let key = String::from_utf8_lossy(key);
        if !self.denied_key_patterns.is_empty() && self.denied_keys.is_match(key.as_ref()) {
            return false;
        }
        if self.allowed_key_patterns.is_empty() {
            return false;
        }
        self.allowed_keys.is_match(key.as_ref())
    }

    pub fn allows_channel(&self, channel: &[u8]) -> bool {
        if self.allowed_channel_patterns.is_empty() {
            return false;
        }
        let channel = String::from_utf8_lossy(channel);
        self.allowed_channels.is_match(channel.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_password_round_trips_through_hash() {
        let user = AclUserBuilder::new("alice").password("hunter2").build();
        assert!(user.verify_password("hunter2"));
        assert!(!user.verify_password("wrong"));
    }

    #[test]
    fn prehashed_password_accepted_directly() {
        let digest = hex_encode(&Sha256::digest(b"hunter2"));
        let spec = format!("#{digest}");
        let user = AclUserBuilder::new("alice").password(&spec).build();
        assert!(user.verify_password("hunter2"));
    }

    #[test]
    fn nopass_accepts_anything() {
        let user = AclUserBuilder::new("anon").nopass().build();
        assert!(user.verify_password("whatever"));
    }

    #[test]
    fn command_must_be_included_and_not_excluded() {
        let user = AclUserBuilder::new("u")
            .include_category("read")
            .include_command("get")
            .exclude_command("flushall")
            .build();
        assert!(user.allows_command("get"));
        assert!(user.allows_category("read"));
        assert!(!user.allows_command("flushall"));
        assert!(!user.allows_command("set"));
    }

    #[test]
    fn key_pattern_allow_and_deny() {
        let user = AclUserBuilder::new("u")
            .allow_key_pattern("user:*")
            .deny_key_pattern("user:secret*")
            .build();
        assert!(user.allows_key(b"user:42"));
        assert!(!user.allows_key(b"user:secret-token"));
        assert!(!user.allows_key(b"other:1"));
    }

    #[test]
    fn nokeys_forbids_every_key() {
        let user = AclUserBuilder::new("u").allow_key_pattern("*").nokeys().build();
        assert!(!user.allows_key(b"anything"));
    }
}
