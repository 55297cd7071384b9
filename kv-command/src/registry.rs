//! # Command registry
//!
//! Declarative metadata for every command: its ACL categories, whether it
//! must pass through Raft when clustered (`sync`), which of its arguments
//! are keys, and which handler executes it (§3 `Command`, §4.4).

use kv_common::{KvError, KvResult};

use crate::handlers::HandlerId;

/// Which of a command's arguments are keys, split by read/write intent, so
/// ACL key-pattern checks (§4.5) and write classification (§4.4 step 4) can
/// both use it.
pub type KeyExtractFn = fn(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)>;

/// One declarative command record.
pub struct Command {
    pub name: &'static str,
    pub categories: &'static [&'static str],
    pub sync: bool,
    pub key_extract: KeyExtractFn,
    pub handler: HandlerId,
    pub sub_commands: &'static [Command],
}

impl Command {
    /// True if `handler` appears in a write category, per §4.4 step 4's
    /// write/read classification.
    pub fn is_write(&self) -> bool {
        self.categories.contains(&"write")
    }
}

fn no_keys(_args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    Ok((Vec::new(), Vec::new()))
}

fn single_read_key(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    let key = args.get(1).cloned().ok_or_else(|| KvError::WrongArgs("command".into()))?;
    Ok((vec![key], Vec::new()))
}

fn single_write_key(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    let key = args.get(1).cloned().ok_or_else(|| KvError::WrongArgs("command".into()))?;
    Ok((Vec::new(), vec![key]))
}

/// `GET key`, `MGET key...`, and similar: every argument after the command
/// name is a read key.
fn all_args_as_read_keys(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    Ok((args[1..].to_vec(), Vec::new()))
}

/// `DEL key...`: every argument after the command name is a write key.
fn all_args_as_write_keys(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    Ok((Vec::new(), args[1..].to_vec()))
}

/// `MSET key value key value ...`: even-indexed arguments (1-based after
/// the command name) are keys.
fn mset_keys(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    if args.len() < 3 || args.len() % 2 != 1 {
        return Err(KvError::WrongArgs("mset".into()));
    }
    let keys = args[1..].iter().step_by(2).cloned().collect();
    Ok((Vec::new(), keys))
}

const READ: &[&str] = &["read", "fast"];
const WRITE: &[&str] = &["write", "keyspace"];
const WRITE_SLOW: &[&str] = &["write", "keyspace", "slow"];
const ADMIN: &[&str] = &["admin", "dangerous"];
const CONNECTION: &[&str] = &["connection", "fast"];

macro_rules! cmd {
    ($name:expr, $categories:expr, $sync:expr, $keys:expr, $handler:expr) => {
        Command {
            name: $name,
            categories: $categories,
            sync: $sync,
            key_extract: $keys,
            handler: $handler,
            sub_commands: &[],
        }
    };
}

/// The full built-in command table (§6's "representative, not exhaustive"
/// surface, plus the admin and ambient additions).
pub fn builtin_commands() -> Vec<Command> {
    vec![
        cmd!("get", READ, false, single_read_key, HandlerId::Get),
        cmd!("set", WRITE, true, single_write_key, HandlerId::Set),
        cmd!("mget", READ, false, all_args_as_read_keys, HandlerId::Mget),
        cmd!("mset", WRITE, true, mset_keys, HandlerId::Mset),
        cmd!("del", WRITE, true, all_args_as_write_keys, HandlerId::Del),
        cmd!("lpush", WRITE, true, single_write_key, HandlerId::LPush),
        cmd!("rpush", WRITE, true, single_write_key, HandlerId::RPush),
        cmd!("lpop", WRITE, true, single_write_key, HandlerId::LPop),
        cmd!("rpop", WRITE, true, single_write_key, HandlerId::RPop),
        cmd!("llen", READ, false, single_read_key, HandlerId::LLen),
        cmd!("lrange", READ, false, single_read_key, HandlerId::LRange),
        cmd!("lindex", READ, false, single_read_key, HandlerId::LIndex),
        cmd!("lset", WRITE, true, single_write_key, HandlerId::LSet),
        cmd!("ltrim", WRITE, true, single_write_key, HandlerId::LTrim),
        cmd!("lrem", WRITE, true, single_write_key, HandlerId::LRem),
        cmd!("lmove", WRITE_SLOW, true, lmove_keys, HandlerId::LMove),
        cmd!("hset", WRITE, true, single_write_key, HandlerId::HSet),
        cmd!("hsetnx", WRITE, true, single_write_key, HandlerId::HSetNx),
        cmd!("hget", READ, false, single_read_key, HandlerId::HGet),
        cmd!("hdel", WRITE, true, single_write_key, HandlerId::HDel),
        cmd!("hexists", READ, false, single_read_key, HandlerId::HExists),
        cmd!("hgetall", READ, false, single_read_key, HandlerId::HGetAll),
        cmd!("hkeys", READ, false, single_read_key, HandlerId::HKeys),
        cmd!("hvals", READ, false, single_read_key, HandlerId::HVals),
        cmd!("hlen", READ, false, single_read_key, HandlerId::HLen),
        cmd!("hstrlen", READ, false, single_read_key, HandlerId::HStrlen),
        cmd!("hincrby", WRITE, true, single_write_key, HandlerId::HIncrBy),
        cmd!("hincrbyfloat", WRITE, true, single_write_key, HandlerId::HIncrByFloat),
        cmd!("sadd", WRITE, true, single_write_key, HandlerId::SAdd),
        cmd!("scard", READ, false, single_read_key, HandlerId::SCard),
        cmd!("sismember", READ, false, single_read_key, HandlerId::SIsMember),
        cmd!("smismember", READ, false, single_read_key, HandlerId::SMIsMember),
        cmd!("smembers", READ, false, single_read_key, HandlerId::SMembers),
        cmd!("srem", WRITE, true, single_write_key, HandlerId::SRem),
        cmd!("spop", WRITE, true, single_write_key, HandlerId::SPop),
        cmd!("srandmember", READ, false, single_read_key, HandlerId::SRandMember),
        cmd!("smove", WRITE_SLOW, true, smove_keys, HandlerId::SMove),
        cmd!("sunion", READ, false, all_args_as_read_keys, HandlerId::SUnion),
        cmd!("sinter", READ, false, all_args_as_read_keys, HandlerId::SInter),
        cmd!("sdiff", READ, false, all_args_as_read_keys, HandlerId::SDiff),
        cmd!("ping", CONNECTION, false, no_keys, HandlerId::Ping),
        cmd!("auth", CONNECTION, false, no_keys, HandlerId::Auth),
        cmd!("save", ADMIN, false, no_keys, HandlerId::Save),
        cmd!("lastsave", ADMIN, false, no_keys, HandlerId::LastSave),
        cmd!("rewriteaof", ADMIN, false, no_keys, HandlerId::RewriteAof),
        cmd!("commands", ADMIN, false, no_keys, HandlerId::CommandsCatalog),
        cmd!("dbsize", READ, false, no_keys, HandlerId::DbSize),
        cmd!("flushall", ADMIN, true, no_keys, HandlerId::FlushAll),
        cmd!("cluster", ADMIN, false, no_keys, HandlerId::ClusterInfo),
    ]
}

fn lmove_keys(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    if args.len() < 3 {
        return Err(KvError::WrongArgs("lmove".into()));
    }
    Ok((Vec::new(), vec![args[1].clone(), args[2].clone()]))
}

fn smove_keys(args: &[Vec<u8>]) -> KvResult<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    if args.len() < 3 {
        return Err(KvError::WrongArgs("smove".into()));
    }
    Ok((Vec::new(), vec![args[1].clone(), args[2].clone()]))
}

/// The full command catalog: `Lookup(name)` and sub-command resolution
/// (§4.4 steps 1-2).
pub struct CommandRegistry {
    commands: std::collections::HashMap<&'static str, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let commands = builtin_commands().into_iter().map(|c| (c.name, c)).collect();
        CommandRegistry { commands }
    }

    /// `Lookup(name) -> Command|err`, case-insensitive.
    pub fn lookup(&self, name: &[u8]) -> KvResult<&Command> {
        let lower = String::from_utf8_lossy(name).to_ascii_lowercase();
        self.commands
            .get(lower.as_str())
            .ok_or_else(|| KvError::UnknownCommand(lower))
    }

    /// `GetSubCommand(cmd, argv) -> SubCommand|None`: if `cmd` declares
    /// sub-commands and `argv[1]` names one, returns it.
    pub fn sub_command<'a>(&self, command: &'a Command, argv: &[Vec<u8>]) -> Option<&'a Command> {
        let candidate = argv.get(1)?;
        let lower = String::from_utf8_lossy(candidate).to_ascii_lowercase();
        command.sub_commands.iter().find(|sc| sc.name == lower)
    }

    pub fn catalog(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = CommandRegistry::new();
        assert!(registry.lookup(b"GET").is_ok());
        assert!(registry.lookup(b"get").is_ok());
    }

    #[test]
    fn unknown_command_is_an_error() {
        let registry = CommandRegistry::new();
        let err = registry.lookup(b"nosuchcommand").unwrap_err();
        assert!(matches!(err, KvError::UnknownCommand(_)));
    }

    #[test]
    fn write_commands_are_classified_write() {
        let registry = CommandRegistry::new();
        assert!(registry.lookup(b"set").unwrap().is_write());
        assert!(!registry.lookup(b"get").unwrap().is_write());
    }

    #[test]
    fn mset_extracts_alternating_keys() {
        let args: Vec<Vec<u8>> =
            vec![b"mset".to_vec(), b"a".to_vec(), b"1".to_vec(), b"b".to_vec(), b"2".to_vec()];
        let (_, write_keys) = mset_keys(&args).unwrap();
        assert_eq!(write_keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
