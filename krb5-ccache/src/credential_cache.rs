mod codec;
mod credential;
mod file_cache;
mod file_data;

pub use self::{
    credential::{
        Address, AuthData, CacheEntry, ConfigEntry, Credentials, KerberosTime, LoginOptions,
        TicketFlags,
    },
    file_cache::{FileCredentialCache, ResolvedCredentials},
    file_data::{FileFormatVersion, Tag},
};
use crate::Context;
use std::{env, path::PathBuf};

const KRB5_ENV_CCNAME: &str = "KRB5CCNAME";
const DEFCCNAME: &str = "FILE:/tmp/krb5cc_%{uid}";
const FILE_PREFIX: &str = "FILE";

/// Works out which FILE cache to use: `explicit` if given, then
/// `KRB5CCNAME`, then `default_ccache_name` from the profile, then
/// `/tmp/krb5cc_<uid>`. Returns `None` when the chosen name refers to a
/// cache type other than FILE.
pub fn resolve_cache_path(
    context: &mut Context,
    explicit: Option<&str>,
) -> anyhow::Result<Option<PathBuf>> {
    let name = match explicit {
        Some(name) => name.to_owned(),
        None => default_name(context)?,
    };
    Ok(file_residual(&name).map(PathBuf::from))
}

fn default_name(context: &mut Context) -> anyhow::Result<String> {
    if let Some(name) = context.default_ccname.to_owned() {
        return Ok(name);
    }
    if let Ok(name) = env::var(KRB5_ENV_CCNAME) {
        context.set_default_ccname(&name);
        return Ok(name);
    }
    let name = Context::expand_path_tokens(
        context
            .default_ccache_name()
            .as_deref()
            .unwrap_or(DEFCCNAME),
    )?;
    context.set_default_ccname(&name);
    Ok(name)
}

fn file_residual(name: &str) -> Option<&str> {
    match name.split_once(':') {
        None => Some(name),
        // A drive letter, not a cache type
        Some((p, _)) if p.len() == 1 && p.as_bytes()[0].is_ascii_alphabetic() => Some(name),
        Some((prefix, residual)) if prefix.eq_ignore_ascii_case(FILE_PREFIX) => Some(residual),
        Some(_) => None,
    }
}
