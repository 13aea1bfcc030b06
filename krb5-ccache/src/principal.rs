use crate::{Error, Flags};
use std::fmt;

const REALM_SEP: char = '@';
const COMPONENT_SEP: char = '/';
pub(crate) const KRB5_TGS_NAME: &str = "krbtgt";
const KRB5_WELLKNOWN_NAMESTR: &str = "WELLKNOWN";

/// A Kerberos identity: a realm plus an ordered list of name components.
///
/// Strings hold ISO-8859-1 text, one `char` per byte as stored on disk.
/// Equality is exact on realm and components and ignores the name type,
/// which is only a hint.
#[derive(Debug, Clone)]
pub struct Principal {
    pub realm: String,
    pub components: Vec<String>,
    pub name_type: NameType,
}

macro_rules! principal_flag {
    ($name:ident, $value:expr) => {
        pub const $name: Flags = $value;
    };
}

impl Principal {
    principal_flag!(PARSE_NO_REALM, 0x1);
    principal_flag!(PARSE_REQUIRE_REALM, 0x2);
    principal_flag!(PARSE_ENTERPRISE, 0x4);

    principal_flag!(UNPARSE_NO_REALM, 0x2);

    pub fn new(name_type: NameType, components: Vec<String>, realm: &str) -> Self {
        Self {
            realm: realm.to_owned(),
            components,
            name_type,
        }
    }

    /// Parses `comp1/comp2@REALM`, falling back to `default_realm` when the
    /// name carries no realm.
    pub fn parse_name(name: &str, flags: Flags, default_realm: Option<&str>) -> anyhow::Result<Self> {
        if name.is_empty() || name.ends_with('\\') {
            Err(Error::KRB5_PARSE_MALFORMED)?
        }
        let enterprise = flags & Self::PARSE_ENTERPRISE != 0;
        let require_realm = flags & Self::PARSE_REQUIRE_REALM != 0;
        let no_realm = flags & Self::PARSE_NO_REALM != 0;

        let find_realm_from = if enterprise {
            name.find(REALM_SEP).map(|i| i + 1).unwrap_or_default()
        } else {
            0
        };
        let (components, realm) = match name[find_realm_from..].find(REALM_SEP) {
            None => (name, None),
            Some(i) => (
                &name[..find_realm_from + i],
                Some(&name[find_realm_from + i + 1..]),
            ),
        };

        let components: Vec<String> = if enterprise {
            vec![components.to_owned()]
        } else {
            components.split(COMPONENT_SEP).map(str::to_owned).collect()
        };
        if components.iter().any(String::is_empty) {
            Err(Error::KRB5_PARSE_MALFORMED)?
        }

        let realm = match realm {
            Some(realm) => {
                if no_realm || !Self::is_valid_realm(realm) || realm.contains(REALM_SEP) {
                    Err(Error::KRB5_PARSE_MALFORMED)?
                }
                realm.to_owned()
            }
            None if require_realm => Err(Error::KRB5_PARSE_MALFORMED)?,
            None if no_realm => String::new(),
            None => default_realm
                .filter(|realm| !realm.is_empty())
                .ok_or(Error::KRB5_CONFIG_NODEFREALM)?
                .to_owned(),
        };

        let name_type = if enterprise {
            NameType::ENTERPRISE_PRINCIPAL
        } else {
            Self::infer_principal_type(&components)
        };

        Ok(Principal {
            realm,
            components,
            name_type,
        })
    }

    fn infer_principal_type(components: &[String]) -> NameType {
        if components.len() == 2 && components[0] == KRB5_TGS_NAME {
            NameType::SRV_INST
        } else if components.len() >= 2 && components[0] == KRB5_WELLKNOWN_NAMESTR {
            NameType::WELLKNOWN
        } else {
            NameType::PRINCIPAL
        }
    }

    /// A realm is usable when it is non-empty and holds no component
    /// separator or NUL.
    pub fn is_valid_realm(realm: &str) -> bool {
        !realm.is_empty() && !realm.contains(COMPONENT_SEP) && !realm.contains('\0')
    }

    /// Loose comparison used for cache lookups: realm and components are
    /// compared ignoring case.
    pub fn matches(&self, other: &Self) -> bool {
        eq_ignore_case(&self.realm, &other.realm) && self.components_match(other)
    }

    /// Component-wise comparison ignoring case, realm not considered.
    pub fn components_match(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| eq_ignore_case(a, b))
    }

    /// `krbtgt/REALM@REALM`, ticket granting service of its own realm.
    pub fn is_local_tgt(&self) -> bool {
        self.to_string().starts_with(KRB5_TGS_NAME)
            && self
                .components
                .get(1)
                .is_some_and(|instance| *instance == self.realm)
    }

    pub fn unparse_name(&self, flags: Flags) -> String {
        let name = self.components.join(&COMPONENT_SEP.to_string());
        if flags & Self::UNPARSE_NO_REALM != 0 || self.realm.is_empty() {
            name
        } else {
            format!("{}{}{}", name, REALM_SEP, self.realm)
        }
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.realm == other.realm && self.components == other.components
    }
}

impl Eq for Principal {}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unparse_name(0))
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars().count() == b.chars().count()
        && a.chars().zip(b.chars()).all(|(x, y)| {
            x == y || x.to_uppercase().eq(y.to_uppercase()) || x.to_lowercase().eq(y.to_lowercase())
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameType(pub i32);

macro_rules! name_type {
    ($name_type:ident, $int:expr) => {
        pub const $name_type: NameType = NameType($int);
    };
}

impl NameType {
    // Name type not known
    name_type!(UNKNOWN, 0);
    // Just the name of the principal as in DCE, or for users
    name_type!(PRINCIPAL, 1);
    // Service and other unique instance (krbtgt)
    name_type!(SRV_INST, 2);
    // Service with host name as instance (telnet, rcommands)
    name_type!(SRV_HST, 3);
    // Service with host as remaining components
    name_type!(SRV_XHST, 4);
    // Unique ID
    name_type!(UID, 5);
    // Windows 2000 UPN
    name_type!(ENTERPRISE_PRINCIPAL, 10);
    // Well-known (special) principal
    name_type!(WELLKNOWN, 11);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_unparse() {
        let principal = Principal::parse_name("host/a.example.com@EXAMPLE.COM", 0, None).unwrap();
        assert_eq!(principal.realm, "EXAMPLE.COM");
        assert_eq!(principal.components, vec!["host", "a.example.com"]);
        assert_eq!(principal.name_type, NameType::PRINCIPAL);
        assert_eq!(principal.to_string(), "host/a.example.com@EXAMPLE.COM");

        let tgt = Principal::parse_name("krbtgt/EXAMPLE.COM@EXAMPLE.COM", 0, None).unwrap();
        assert_eq!(tgt.name_type, NameType::SRV_INST);
    }

    #[test]
    fn parse_uses_default_realm() {
        let principal = Principal::parse_name("alice", 0, Some("EXAMPLE.COM")).unwrap();
        assert_eq!(principal.to_string(), "alice@EXAMPLE.COM");

        let err = Principal::parse_name("alice", 0, None).unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CONFIG_NODEFREALM));

        let err = Principal::parse_name("alice", Principal::PARSE_REQUIRE_REALM, Some("X")).unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_PARSE_MALFORMED));
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["", "alice\\", "a//b@R", "alice@", "alice@A/B"] {
            let err = Principal::parse_name(name, 0, Some("R")).unwrap_err();
            assert_eq!(Error::find(&err), Some(Error::KRB5_PARSE_MALFORMED), "{}", name);
        }
    }

    #[test]
    fn equality_ignores_name_type_but_not_case() {
        let a = Principal::new(NameType::PRINCIPAL, vec!["alice".into()], "EXAMPLE.COM");
        let b = Principal::new(NameType::UNKNOWN, vec!["alice".into()], "EXAMPLE.COM");
        let c = Principal::new(NameType::PRINCIPAL, vec!["ALICE".into()], "example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.matches(&c));
        assert!(!a.matches(&Principal::new(
            NameType::PRINCIPAL,
            vec!["alice".into(), "admin".into()],
            "EXAMPLE.COM"
        )));
    }

    #[test]
    fn case_folding_covers_latin1() {
        assert!(eq_ignore_case("Ærø", "æRØ"));
        assert!(!eq_ignore_case("abc", "abd"));
    }

    #[test]
    fn local_tgt_detection() {
        let local = Principal::parse_name("krbtgt/EXAMPLE.COM@EXAMPLE.COM", 0, None).unwrap();
        let cross = Principal::parse_name("krbtgt/OTHER.COM@EXAMPLE.COM", 0, None).unwrap();
        let lone = Principal::parse_name("krbtgt@EXAMPLE.COM", 0, None).unwrap();
        assert!(local.is_local_tgt());
        assert!(!cross.is_local_tgt());
        assert!(!lone.is_local_tgt());
    }

    #[test]
    fn realm_validation() {
        assert!(Principal::is_valid_realm("EXAMPLE.COM"));
        assert!(Principal::is_valid_realm("X-CACHECONF:"));
        assert!(!Principal::is_valid_realm(""));
        assert!(!Principal::is_valid_realm("A/B"));
        assert!(!Principal::is_valid_realm("A\0B"));
    }
}
