use crate::{Keyblock, NameType, Principal, Ticket};
use chrono::{DateTime, Utc};

pub(super) const CONF_REALM: &str = "X-CACHECONF:";
pub(super) const CONF_NAME: &str = "krb5_ccache_conf_data";
const TKT_OPTS_MAX: usize = 11;

pub type KerberosTime = DateTime<Utc>;
type AddressType = u16;
type AuthDataType = u16;

/// One ticket held by the cache, together with its session key and the
/// metadata the KDC returned for it.
///
/// `starttime` and `renew_till` are optional; the cache encodes a missing
/// value as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client: Principal,
    pub server: Principal,
    pub keyblock: Keyblock,
    pub authtime: KerberosTime,
    pub starttime: Option<KerberosTime>,
    pub endtime: KerberosTime,
    pub renew_till: Option<KerberosTime>,
    pub is_skey: bool,
    pub ticket_flags: TicketFlags,
    pub addresses: Option<Vec<Address>>,
    pub authdata: Option<Vec<AuthData>>,
    pub ticket: Ticket,
    pub second_ticket: Option<Ticket>,
}

impl Credentials {
    pub fn new(
        client: Principal,
        server: Principal,
        keyblock: Keyblock,
        authtime: KerberosTime,
        endtime: KerberosTime,
        ticket: Ticket,
    ) -> Self {
        Self {
            client,
            server,
            keyblock,
            authtime,
            starttime: None,
            endtime,
            renew_till: None,
            is_skey: false,
            ticket_flags: TicketFlags::default(),
            addresses: None,
            authdata: None,
            ticket,
            second_ticket: None,
        }
    }

    pub fn is_current(&self, now: KerberosTime) -> bool {
        self.endtime > now
    }
}

/// Ticket flags as kept by the cache: indices 1 to 11 of the KDC flag word,
/// index 0 is reserved. Any other bit is dropped on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TicketFlags([bool; TKT_OPTS_MAX + 1]);

macro_rules! ticket_flag {
    ($name:ident, $value:expr) => {
        pub const $name: u32 = $value;
    };
}

macro_rules! ticket_opt {
    ($name:ident, $index:expr) => {
        pub const $name: usize = $index;
    };
}

impl TicketFlags {
    ticket_flag!(TKT_FLG_FORWARDABLE, 0x40000000);
    ticket_flag!(TKT_FLG_FORWARDED, 0x20000000);
    ticket_flag!(TKT_FLG_PROXIABLE, 0x10000000);
    ticket_flag!(TKT_FLG_PROXY, 0x08000000);
    ticket_flag!(TKT_FLG_MAY_POSTDATE, 0x04000000);
    ticket_flag!(TKT_FLG_POSTDATED, 0x02000000);
    ticket_flag!(TKT_FLG_INVALID, 0x01000000);
    ticket_flag!(TKT_FLG_RENEWABLE, 0x00800000);
    ticket_flag!(TKT_FLG_INITIAL, 0x00400000);
    ticket_flag!(TKT_FLG_PRE_AUTH, 0x00200000);
    ticket_flag!(TKT_FLG_HW_AUTH, 0x00100000);

    ticket_opt!(FORWARDABLE, 1);
    ticket_opt!(FORWARDED, 2);
    ticket_opt!(PROXIABLE, 3);
    ticket_opt!(PROXY, 4);
    ticket_opt!(MAY_POSTDATE, 5);
    ticket_opt!(POSTDATED, 6);
    ticket_opt!(INVALID, 7);
    ticket_opt!(RENEWABLE, 8);
    ticket_opt!(INITIAL, 9);
    ticket_opt!(PRE_AUTHENT, 10);
    ticket_opt!(HW_AUTHENT, 11);

    const MASKS: [(u32, usize); TKT_OPTS_MAX] = [
        (Self::TKT_FLG_FORWARDABLE, Self::FORWARDABLE),
        (Self::TKT_FLG_FORWARDED, Self::FORWARDED),
        (Self::TKT_FLG_PROXIABLE, Self::PROXIABLE),
        (Self::TKT_FLG_PROXY, Self::PROXY),
        (Self::TKT_FLG_MAY_POSTDATE, Self::MAY_POSTDATE),
        (Self::TKT_FLG_POSTDATED, Self::POSTDATED),
        (Self::TKT_FLG_INVALID, Self::INVALID),
        (Self::TKT_FLG_RENEWABLE, Self::RENEWABLE),
        (Self::TKT_FLG_INITIAL, Self::INITIAL),
        (Self::TKT_FLG_PRE_AUTH, Self::PRE_AUTHENT),
        (Self::TKT_FLG_HW_AUTH, Self::HW_AUTHENT),
    ];

    pub fn from_bits(bits: u32) -> Self {
        let mut flags = Self::default();
        for (mask, index) in Self::MASKS {
            flags.0[index] = bits & mask == mask;
        }
        flags
    }

    pub fn bits(&self) -> u32 {
        Self::MASKS
            .iter()
            .filter(|(_, index)| self.0[*index])
            .fold(0, |bits, (mask, _)| bits | mask)
    }

    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Indices outside 1..=11 are ignored.
    pub fn set(&mut self, index: usize, value: bool) {
        if (1..=TKT_OPTS_MAX).contains(&index) {
            self.0[index] = value;
        }
    }

    pub fn with(mut self, index: usize, value: bool) -> Self {
        self.set(index, value);
        self
    }

    pub fn matches(&self, options: &LoginOptions) -> bool {
        self.get(Self::FORWARDABLE) == options.forwardable
            && self.get(Self::PROXIABLE) == options.proxiable
            && self.get(Self::RENEWABLE) == options.renewable
    }
}

/// Ticket options a caller asked for when looking up a cached ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoginOptions {
    pub forwardable: bool,
    pub proxiable: bool,
    pub renewable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub addrtype: AddressType,
    pub contents: Vec<u8>,
}

macro_rules! address_type {
    ($name:ident, $value:expr) => {
        pub const $name: AddressType = $value;
    };
}

impl Address {
    address_type!(ADDRTYPE_INET, 0x0002);
    address_type!(ADDRTYPE_CHAOS, 0x0005);
    address_type!(ADDRTYPE_XNS, 0x0006);
    address_type!(ADDRTYPE_ISO, 0x0007);
    address_type!(ADDRTYPE_DDP, 0x0010);
    address_type!(ADDRTYPE_INET6, 0x0018);
    address_type!(ADDRTYPE_ADDRPORT, 0x0100);
    address_type!(ADDRTYPE_IPPORT, 0x0101);

    pub fn new(addrtype: AddressType, contents: &[u8]) -> Self {
        Self {
            addrtype,
            contents: contents.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub ad_type: AuthDataType,
    pub contents: Vec<u8>,
}

impl AuthData {
    pub fn new(ad_type: AuthDataType, contents: &[u8]) -> Self {
        Self {
            ad_type,
            contents: contents.to_vec(),
        }
    }
}

// Configuration entries are encoded as credential entries. The client
// principal of the entry is the default principal of the cache. The server
// principal has the realm X-CACHECONF: and two or three components, the
// first of which is krb5_ccache_conf_data. The second component is the
// configuration key and the optional third one names a principal the key is
// associated with. The value is stored in the ticket field of the entry. All
// other fields are zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub principal: Option<Principal>,
    pub data: Vec<u8>,
}

impl ConfigEntry {
    pub const PROXY_IMPERSONATOR: &'static str = "proxy_impersonator";
    pub const PA_TYPE: &'static str = "pa_type";
    pub const FAST_AVAIL: &'static str = "fast_avail";

    pub fn new(name: &str, principal: Option<Principal>, data: &[u8]) -> Self {
        Self {
            name: name.to_owned(),
            principal,
            data: data.to_vec(),
        }
    }

    pub fn server_principal(&self) -> Principal {
        let mut components = vec![CONF_NAME.to_owned(), self.name.to_owned()];
        if let Some(principal) = &self.principal {
            components.push(principal.to_string());
        }
        Principal::new(NameType::UNKNOWN, components, CONF_REALM)
    }

    pub fn is_config_principal(server: &Principal) -> bool {
        server.realm == CONF_REALM
            && server
                .components
                .first()
                .is_some_and(|component| component == CONF_NAME)
    }
}

/// A decoded cache record: a real credential or a disguised config entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Credentials(Credentials),
    Config(ConfigEntry),
}
