use super::{
    credential::{Address, AuthData, CacheEntry, ConfigEntry, Credentials, KerberosTime, TicketFlags},
    file_data::{CCacheReader, CCacheWriter, FileFormatVersion},
};
use crate::{Enctype, Error, Keyblock, NameType, Principal, Ticket};
use chrono::DateTime;
use std::io::{BufRead, Write};
use tracing::debug;

const INET_ADDR_LEN: u32 = 4;
const INET6_ADDR_LEN: u32 = 16;
const REALM_CHAR_LIMIT: char = '\u{8d}';

// The first string of a principal is only taken as its realm when it looks
// like one. Otherwise the default realm applies and every string is a
// component.
fn looks_like_realm(value: &str) -> bool {
    Principal::is_valid_realm(value)
        && value
            .split('.')
            .all(|segment| segment.chars().all(|c| c < REALM_CHAR_LIMIT))
}

fn to_time(seconds: u32) -> KerberosTime {
    DateTime::from_timestamp(seconds.into(), 0).unwrap_or_default()
}

fn to_optional_time(seconds: u32) -> Option<KerberosTime> {
    match seconds {
        0 => None,
        seconds => Some(to_time(seconds)),
    }
}

// Times outside the unsigned 32-bit range have no encoding.
fn to_seconds(time: &KerberosTime) -> anyhow::Result<u32> {
    Ok(u32::try_from(time.timestamp()).or(Err(Error::KRB5_CC_FORMAT))?)
}

impl<R: BufRead> CCacheReader<R> {
    // principal ::=
    //     name type (32 bits) [omitted in version 1]
    //     count of components (32 bits) [includes realm in version 1]
    //     realm (data)
    //     component1 (data)
    //     component2 (data)
    //     ...
    //
    // The outer result fails only on stream errors. A malformed principal is
    // reported through the inner result once all of its strings are read.
    pub(super) fn read_principal(
        &mut self,
        version: FileFormatVersion,
    ) -> anyhow::Result<anyhow::Result<Principal>> {
        let name_type = match version {
            FileFormatVersion::V1 => NameType::UNKNOWN,
            _ => NameType(self.read_i32()?),
        };
        let mut count = i64::from(self.read_length()?);
        if version == FileFormatVersion::V1 {
            count -= 1;
        }
        let mut strings = vec![];
        for _ in 0..=count {
            strings.push(self.read_string()?);
        }
        Ok(self.principal_from_strings(name_type, strings))
    }

    fn principal_from_strings(
        &self,
        name_type: NameType,
        mut strings: Vec<String>,
    ) -> anyhow::Result<Principal> {
        let realm = match strings.first().map(|first| looks_like_realm(first)) {
            None => Err(Error::KRB5_PARSE_MALFORMED)?,
            Some(true) => strings.remove(0),
            Some(false) => self
                .default_realm
                .to_owned()
                .ok_or(Error::KRB5_CONFIG_NODEFREALM)?,
        };
        if strings.is_empty() {
            Err(Error::KRB5_PARSE_MALFORMED)?
        }
        Ok(Principal::new(name_type, strings, &realm))
    }

    // keyblock ::=
    //     enctype (16 bits) [repeated twice in version 3]
    //     data
    pub(super) fn read_keyblock(&mut self, version: FileFormatVersion) -> anyhow::Result<Keyblock> {
        let enctype = self.read_u16()?;
        if version == FileFormatVersion::V3 {
            self.read_u16()?;
        }
        let length = self.read_length()?;
        let contents = self.read_exact_bytes(length)?;
        Ok(Keyblock::new(Enctype(enctype.into()), &contents))
    }

    pub(super) fn read_flags(&mut self) -> anyhow::Result<TicketFlags> {
        Ok(TicketFlags::from_bits(self.read_u32()?))
    }

    // A list holding an address that is neither IPv4 nor IPv6 sized is
    // dropped as a whole. Every entry is still read.
    pub(super) fn read_addresses(&mut self) -> anyhow::Result<Option<Vec<Address>>> {
        let count = self.read_length()?;
        if count == 0 {
            return Ok(None);
        }
        let mut addresses = vec![];
        let mut malformed = false;
        for _ in 0..count {
            let addrtype = self.read_u16()?;
            let length = self.read_length()?;
            let contents = self.read_exact_bytes(length)?;
            if length != INET_ADDR_LEN && length != INET6_ADDR_LEN {
                debug!(addrtype, length, "{}", Error::KRB5_CC_BADADDR);
                malformed = true;
            }
            addresses.push(Address::new(addrtype, &contents));
        }
        Ok(if malformed { None } else { Some(addresses) })
    }

    pub(super) fn read_authdata(&mut self) -> anyhow::Result<Option<Vec<AuthData>>> {
        let count = self.read_length()?;
        if count == 0 {
            return Ok(None);
        }
        let mut authdata = vec![];
        for _ in 0..count {
            let ad_type = self.read_u16()?;
            let length = self.read_length()?;
            authdata.push(AuthData::new(ad_type, &self.read_exact_bytes(length)?));
        }
        Ok(Some(authdata))
    }

    // credential ::=
    //     client (principal)
    //     server (principal)
    //     keyblock (keyblock)
    //     authtime (32 bits)
    //     starttime (32 bits)
    //     endtime (32 bits)
    //     renew_till (32 bits)
    //     is_skey (1 byte, 0 or 1)
    //     ticket_flags (32 bits)
    //     addresses (addresses)
    //     authdata (authdata)
    //     ticket (data)
    //     second_ticket (data)
    //
    // Returns `None` for a record that is well framed but unusable, after
    // consuming all of it so the next record starts in the right place.
    pub(super) fn read_entry(
        &mut self,
        version: FileFormatVersion,
    ) -> anyhow::Result<Option<CacheEntry>> {
        let client = self.read_principal(version)?;
        let server = self.read_principal(version)?;
        let keyblock = self.read_keyblock(version)?;
        let authtime = to_time(self.read_u32()?);
        let starttime = to_optional_time(self.read_u32()?);
        let endtime = to_time(self.read_u32()?);
        let renew_till = to_optional_time(self.read_u32()?);
        let is_skey = self.read_u8()? != 0;
        let ticket_flags = self.read_flags()?;
        let addresses = self.read_addresses()?;
        let authdata = self.read_authdata()?;
        let ticket = self.read_data()?;
        let second_ticket = self.read_data()?;

        let (client, server) = match (client, server) {
            (Ok(client), Ok(server)) => (client, server),
            (Err(err), _) | (_, Err(err)) => {
                debug!(error = ?err, "{}", Error::KRB5_CC_MALFORMED_RECORD);
                return Ok(None);
            }
        };

        if ConfigEntry::is_config_principal(&server) {
            return Ok(self.config_entry(server, ticket).map(CacheEntry::Config));
        }

        let ticket = match ticket.as_deref().map(Ticket::decode_from) {
            Some(Ok(ticket)) => ticket,
            Some(Err(err)) => {
                debug!(server = %server, error = ?err, "{}", Error::KRB5_CC_MALFORMED_RECORD);
                return Ok(None);
            }
            None => {
                debug!(server = %server, "Cache entry has no ticket");
                return Ok(None);
            }
        };
        let second_ticket = match second_ticket.as_deref().map(Ticket::decode_from).transpose() {
            Ok(second_ticket) => second_ticket,
            Err(err) => {
                debug!(server = %server, error = ?err, "{}", Error::KRB5_CC_MALFORMED_RECORD);
                return Ok(None);
            }
        };

        Ok(Some(CacheEntry::Credentials(Credentials {
            client,
            server,
            keyblock,
            authtime,
            starttime,
            endtime,
            renew_till,
            is_skey,
            ticket_flags,
            addresses,
            authdata,
            ticket,
            second_ticket,
        })))
    }

    fn config_entry(&self, server: Principal, data: Option<Vec<u8>>) -> Option<ConfigEntry> {
        let Some(name) = server.components.get(1) else {
            debug!(server = %server, "Config entry has no key name");
            return None;
        };
        let principal = match server.components.get(2) {
            Some(principal) => {
                match Principal::parse_name(principal, 0, self.default_realm.as_deref()) {
                    Ok(principal) => Some(principal),
                    Err(err) => {
                        debug!(server = %server, error = ?err, "Config entry has a bad principal");
                        return None;
                    }
                }
            }
            None => None,
        };
        Some(ConfigEntry::new(name, principal, &data.unwrap_or_default()))
    }
}

impl<W: Write> CCacheWriter<W> {
    pub(super) fn write_header(&mut self, version: FileFormatVersion) -> anyhow::Result<()> {
        self.write_u16(version.tag())
    }

    pub(super) fn write_principal(&mut self, principal: &Principal) -> anyhow::Result<()> {
        self.write_i32(principal.name_type.0)?;
        self.write_length(principal.components.len())?;
        self.write_string(&principal.realm)?;
        for component in &principal.components {
            self.write_string(component)?;
        }
        Ok(())
    }

    // Always the version 3 layout, enctype written twice.
    pub(super) fn write_keyblock(&mut self, keyblock: &Keyblock) -> anyhow::Result<()> {
        let enctype = u16::try_from(keyblock.enctype.0).or(Err(Error::KRB5_CC_FORMAT))?;
        self.write_u16(enctype)?;
        self.write_u16(enctype)?;
        self.write_data(&keyblock.contents)
    }

    fn write_time(&mut self, time: Option<&KerberosTime>) -> anyhow::Result<()> {
        self.write_u32(time.map(to_seconds).transpose()?.unwrap_or(0))
    }

    fn write_addresses(&mut self, addresses: Option<&[Address]>) -> anyhow::Result<()> {
        let addresses = addresses.unwrap_or_default();
        self.write_length(addresses.len())?;
        for address in addresses {
            self.write_u16(address.addrtype)?;
            self.write_data(&address.contents)?;
        }
        Ok(())
    }

    fn write_authdata(&mut self, authdata: Option<&[AuthData]>) -> anyhow::Result<()> {
        let authdata = authdata.unwrap_or_default();
        self.write_length(authdata.len())?;
        for entry in authdata {
            self.write_u16(entry.ad_type)?;
            self.write_data(&entry.contents)?;
        }
        Ok(())
    }

    fn write_ticket(&mut self, ticket: Option<&Ticket>) -> anyhow::Result<()> {
        match ticket {
            Some(ticket) => self.write_data(ticket.encode()),
            None => self.write_u32(0),
        }
    }

    pub(super) fn write_credentials(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
        self.write_principal(&credentials.client)?;
        self.write_principal(&credentials.server)?;
        self.write_keyblock(&credentials.keyblock)?;
        self.write_time(Some(&credentials.authtime))?;
        self.write_time(credentials.starttime.as_ref())?;
        self.write_time(Some(&credentials.endtime))?;
        self.write_time(credentials.renew_till.as_ref())?;
        self.write_u8(credentials.is_skey.into())?;
        self.write_u32(credentials.ticket_flags.bits())?;
        self.write_addresses(credentials.addresses.as_deref())?;
        self.write_authdata(credentials.authdata.as_deref())?;
        self.write_ticket(Some(&credentials.ticket))?;
        self.write_ticket(credentials.second_ticket.as_ref())
    }

    // The client is the cache's primary principal and the value travels in
    // the ticket slot. Everything else is zero.
    pub(super) fn write_config_entry(
        &mut self,
        primary_principal: &Principal,
        entry: &ConfigEntry,
    ) -> anyhow::Result<()> {
        self.write_principal(primary_principal)?;
        self.write_principal(&entry.server_principal())?;
        self.write_keyblock(&Keyblock::default())?;
        for _ in 0..4 {
            self.write_time(None)?;
        }
        self.write_u8(0)?;
        self.write_u32(0)?;
        self.write_addresses(None)?;
        self.write_authdata(None)?;
        self.write_data(&entry.data)?;
        self.write_ticket(None)
    }
}
