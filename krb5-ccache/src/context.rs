mod profile;

pub use self::profile::Profile;
use crate::Error;
use nix::unistd::{Uid, User};

pub struct Conf;

macro_rules! conf {
    ($name:ident, $value:expr) => {
        pub const $name: &'static str = $value;
    };
}

impl Conf {
    conf!(DEFAULT_CCACHE_NAME, "default_ccache_name");
    conf!(DEFAULT_INITIATE_CREDENTIAL, "default_initiate_credential");
    conf!(DEFAULT_REALM, "default_realm");
    conf!(LIBDEFAULTS, "libdefaults");
}

/// Whether `get_initial_creds` may hand out impersonated (S4U2Self-style)
/// credentials when the cache carries a `proxy_impersonator` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImpersonationPolicy {
    /// `no-impersonate`: always return the plain TGT.
    Never,
    /// `try-impersonate`: fall back to the plain TGT when evidence is missing.
    BestEffort,
    /// `always-impersonate`: fail when evidence is missing.
    #[default]
    Mandatory,
}

impl TryFrom<&str> for ImpersonationPolicy {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "no-impersonate" => Ok(Self::Never),
            "try-impersonate" => Ok(Self::BestEffort),
            "always-impersonate" => Ok(Self::Mandatory),
            _ => Err(Error::KRB5_CONFIG_BADIMPERSONATE)?,
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub profile: Profile,
    pub default_realm: Option<String>,
    pub default_ccname: Option<String>,
    pub impersonation: ImpersonationPolicy,
}

impl Context {
    pub fn init() -> anyhow::Result<Self> {
        Self::from_profile(Profile::new(false)?)
    }

    pub fn init_secure() -> anyhow::Result<Self> {
        Self::from_profile(Profile::new(true)?)
    }

    pub fn from_profile(profile: Profile) -> anyhow::Result<Self> {
        let default_realm = Self::get_string(&profile, Conf::DEFAULT_REALM);
        let impersonation = match Self::get_string(&profile, Conf::DEFAULT_INITIATE_CREDENTIAL) {
            Some(value) => ImpersonationPolicy::try_from(value.as_str())?,
            None => ImpersonationPolicy::default(),
        };
        Ok(Self {
            profile,
            default_realm,
            default_ccname: None,
            impersonation,
        })
    }

    fn get_string(profile: &Profile, name: &str) -> Option<String> {
        profile.get_string(&format!("{}.{}", Conf::LIBDEFAULTS, name))
    }

    pub fn default_ccache_name(&self) -> Option<String> {
        Self::get_string(&self.profile, Conf::DEFAULT_CCACHE_NAME)
    }

    pub fn set_default_ccname(&mut self, name: &str) {
        self.default_ccname = Some(name.to_owned())
    }

    pub fn set_default_realm(&mut self, realm: &str) {
        self.default_realm = Some(realm.to_owned())
    }

    pub fn get_default_realm(&self) -> anyhow::Result<String> {
        match &self.default_realm {
            Some(realm) if !realm.is_empty() => Ok(realm.to_owned()),
            _ => Err(Error::KRB5_CONFIG_NODEFREALM)?,
        }
    }

    pub fn expand_path_tokens(path: &str) -> anyhow::Result<String> {
        let mut buf = String::new();
        let mut path_remained = path;
        while !path_remained.is_empty() {
            let token_begin = match path_remained.find("%{") {
                Some(token_begin) => token_begin,
                None => {
                    buf.push_str(path_remained);
                    break;
                }
            };
            buf.push_str(&path_remained[..token_begin]);
            let token_end = match path_remained[token_begin..].find('}') {
                Some(token_end) => token_begin + token_end,
                None => Err(anyhow::anyhow!("Invalid argument"))?,
            };
            buf.push_str(&Self::expand_token(
                &path_remained[token_begin + 2..token_end],
            )?);
            path_remained = &path_remained[token_end + 1..];
        }
        Ok(buf)
    }

    fn expand_token(token: &str) -> anyhow::Result<String> {
        let token_value = match token {
            "euid" => Uid::effective().to_string(),
            "username" => User::from_uid(Uid::effective())?
                .map(|u| u.name)
                .unwrap_or_else(|| Uid::effective().to_string()),
            "uid" | "USERID" => Uid::current().to_string(),
            _ => Err(anyhow::anyhow!("Invalid argument"))?,
        };
        Ok(token_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_realm_and_policy_from_profile() {
        let profile = Profile::from_str(
            "[libdefaults]\ndefault_realm = EXAMPLE.COM\ndefault_initiate_credential = try-impersonate\n",
        )
        .unwrap();
        let context = Context::from_profile(profile).unwrap();
        assert_eq!(context.get_default_realm().unwrap(), "EXAMPLE.COM");
        assert_eq!(context.impersonation, ImpersonationPolicy::BestEffort);
    }

    #[test]
    fn missing_default_realm_is_an_error() {
        let context = Context::from_profile(Profile::empty()).unwrap();
        let err = context.get_default_realm().unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CONFIG_NODEFREALM));
        assert_eq!(context.impersonation, ImpersonationPolicy::Mandatory);
    }

    #[test]
    fn rejects_unknown_impersonation_policy() {
        let profile =
            Profile::from_str("[libdefaults]\ndefault_initiate_credential = sometimes\n").unwrap();
        let err = Context::from_profile(profile).unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CONFIG_BADIMPERSONATE));
    }

    #[test]
    fn expands_uid_token() {
        let expanded = Context::expand_path_tokens("/tmp/krb5cc_%{uid}").unwrap();
        assert_eq!(expanded, format!("/tmp/krb5cc_{}", Uid::current()));
        assert_eq!(Context::expand_path_tokens("/plain").unwrap(), "/plain");
        assert!(Context::expand_path_tokens("/tmp/%{uid").is_err());
    }
}
