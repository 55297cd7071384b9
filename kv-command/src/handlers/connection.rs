//! `PING` and `AUTH`.

use kv_common::{KvError, KvResult};

use super::HandlerEnv;
use crate::resp::{encode_bulk, encode_simple};

pub async fn ping(_env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    match argv.len() {
        1 => Ok(encode_simple("PONG")),
        2 => Ok(encode_bulk(&argv[1])),
        _ => Err(KvError::WrongArgs("ping".into())),
    }
}

/// `AUTH <password>` against the `default` user, or `AUTH <user> <password>`.
/// Authentication is performed here rather than during ACL authorization
/// (§4.5) since an unauthenticated connection must be able to call `AUTH` in
/// the first place.
pub async fn auth(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    let (username, password) = match argv.len() {
        2 => ("default", std::str::from_utf8(&argv[1]).map_err(|_| KvError::ProtocolError)?),
        3 => (
            std::str::from_utf8(&argv[1]).map_err(|_| KvError::ProtocolError)?,
            std::str::from_utf8(&argv[2]).map_err(|_| KvError::ProtocolError)?,
        ),
        _ => return Err(KvError::WrongArgs("auth".into())),
    };
    env.acl.authenticate(username, password)?;
    Ok(encode_simple("OK"))
}
