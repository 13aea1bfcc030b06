//! Kerberos FILE credential cache (ccache): a byte-exact reader and writer
//! for the four on-disk format versions, and an in-memory cache manager on
//! top of it.

mod context;
mod credential_cache;
mod error;
mod keyblock;
mod principal;
mod ticket;

pub use self::{
    context::{Conf, Context, ImpersonationPolicy, Profile},
    credential_cache::{
        resolve_cache_path, Address, AuthData, CacheEntry, ConfigEntry, Credentials,
        FileCredentialCache, FileFormatVersion, KerberosTime, LoginOptions, ResolvedCredentials, Tag,
        TicketFlags,
    },
    error::{Error, ErrorCode},
    keyblock::{Enctype, Keyblock},
    principal::{NameType, Principal},
    ticket::{EncData, Kvno, Ticket},
};
use std::process::ExitCode;

pub type Flags = i32;

/// Maps a command result to an exit code, printing the error prefixed by the
/// program name. `quiet` suppresses the message.
pub fn prefix_progname_to_error_if_needed(
    progname: &str,
    result: anyhow::Result<()>,
    quiet: bool,
) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) if quiet => ExitCode::FAILURE,
        Err(err) if err.to_string().starts_with("Usage:") => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
        Err(err) if err.to_string().is_empty() => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{}: {:#}", progname, err);
            ExitCode::FAILURE
        }
    }
}
