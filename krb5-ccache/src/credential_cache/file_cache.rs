use super::{
    credential::{CacheEntry, ConfigEntry, Credentials, LoginOptions},
    file_data::{CCacheReader, CCacheWriter, FileFormatVersion, Tag},
    resolve_cache_path,
};
use crate::{Context, Error, ImpersonationPolicy, Principal};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    iter,
    path::{Path, PathBuf},
    str,
};
use tracing::{debug, warn};

/// Result of `get_initial_creds`: the TGT to use, plus the evidence ticket
/// when the cache holds credentials obtained by impersonation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub tgt: Credentials,
    pub evidence: Option<Credentials>,
}

/// A FILE credential cache held in memory.
///
/// The file is read once by `load` and rewritten as a whole by `save`.
/// Callers that share a cache must serialize access themselves; every
/// mutating method takes `&mut self`.
#[derive(Debug, Clone)]
pub struct FileCredentialCache {
    name: PathBuf,
    version: FileFormatVersion,
    tag: Option<Tag>,
    primary_principal: Principal,
    credentials: Vec<Credentials>,
    config_entries: Vec<ConfigEntry>,
}

impl FileCredentialCache {
    /// An empty version 3 cache. Nothing is written until `save`.
    pub fn new(name: impl Into<PathBuf>, primary_principal: Principal) -> Self {
        Self {
            name: name.into(),
            version: FileFormatVersion::V3,
            tag: None,
            primary_principal,
            credentials: vec![],
            config_entries: vec![],
        }
    }

    pub fn create(name: impl Into<PathBuf>, primary_principal: Principal) -> anyhow::Result<Self> {
        let cache = Self::new(name, primary_principal);
        cache.save()?;
        Ok(cache)
    }

    pub fn exists(name: impl AsRef<Path>) -> bool {
        name.as_ref().is_file()
    }

    pub fn load(
        context: &Context,
        name: impl Into<PathBuf>,
        expected_principal: Option<&Principal>,
    ) -> anyhow::Result<Self> {
        let name = name.into();
        let file = File::open(&name).map_err(|e| match e.kind() {
            ErrorKind::NotFound => anyhow::Error::from(Error::KRB5_FCC_NOFILE),
            _ => e.into(),
        })?;
        Self::read_from(context, name, BufReader::new(file), expected_principal)
    }

    /// Loads the cache named by the context, `KRB5CCNAME` or the profile.
    pub fn load_default(
        context: &mut Context,
        expected_principal: Option<&Principal>,
    ) -> anyhow::Result<Self> {
        let name = resolve_cache_path(context, None)?.ok_or(Error::KRB5_CC_UNKNOWN_TYPE)?;
        Self::load(context, name, expected_principal)
    }

    // After the two-byte version indicator, the file has three parts:
    // - the header (in version 4 only),
    // - the default principal name,
    // - and a sequence of credentials.
    pub fn read_from<R: BufRead>(
        context: &Context,
        name: impl Into<PathBuf>,
        reader: R,
        expected_principal: Option<&Principal>,
    ) -> anyhow::Result<Self> {
        let name = name.into();
        let mut reader = CCacheReader::new(reader, context.default_realm.to_owned());
        let version = reader.read_version()?;
        let tag = match version {
            FileFormatVersion::V4 => reader.read_tag()?,
            _ => None,
        };
        let primary_principal = reader.read_principal(version)??;
        if let Some(expected) = expected_principal {
            if !expected.matches(&primary_principal) {
                debug!(expected = %expected, found = %primary_principal, name = ?name, "Primary principal mismatch");
                Err(Error::KRB5_CC_PRINC_MISMATCH)?
            }
        }

        let mut cache = Self {
            name,
            version,
            tag,
            primary_principal,
            credentials: vec![],
            config_entries: vec![],
        };
        while !reader.is_exhausted()? {
            match reader.read_entry(version)? {
                Some(CacheEntry::Credentials(credentials)) => cache.credentials.push(credentials),
                Some(CacheEntry::Config(entry)) => cache.add_config_entry(entry),
                None => (),
            }
        }
        debug!(
            name = ?cache.name,
            version = ?cache.version,
            credentials = cache.credentials.len(),
            config_entries = cache.config_entries.len(),
            "Loaded credential cache"
        );
        Ok(cache)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let file = File::create(&self.name)?;
        self.write_to(BufWriter::new(file))?;
        debug!(name = ?self.name, credentials = self.credentials.len(), "Saved credential cache");
        Ok(())
    }

    /// Writes the cache in the version 3 layout, whatever version it was
    /// loaded from. Credentials come first, then config entries.
    pub fn write_to<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut writer = CCacheWriter::new(writer);
        writer.write_header(FileFormatVersion::V3)?;
        writer.write_principal(&self.primary_principal)?;
        for credentials in &self.credentials {
            writer.write_credentials(credentials)?;
        }
        for entry in &self.config_entries {
            writer.write_config_entry(&self.primary_principal, entry)?;
        }
        writer.flush()
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn version(&self) -> FileFormatVersion {
        self.version
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn primary_principal(&self) -> &Principal {
        &self.primary_principal
    }

    pub fn credentials(&self) -> &[Credentials] {
        &self.credentials
    }

    pub fn config_entries(&self) -> &[ConfigEntry] {
        &self.config_entries
    }

    /// Stores newly obtained credentials.
    ///
    /// Every cached ticket for the same service (case-insensitive) that does
    /// not outlive the new one is removed, and the new one is appended once
    /// per removal. An older ticket for the same service leaves the cache
    /// unchanged. A new service is appended.
    pub fn update(&mut self, credentials: Credentials) {
        let mut matched = false;
        let mut replaced = 0;
        self.credentials.retain(|old| {
            if !old.server.matches(&credentials.server) {
                return true;
            }
            matched = true;
            if credentials.endtime >= old.endtime {
                replaced += 1;
                false
            } else {
                true
            }
        });
        if !matched {
            self.credentials.push(credentials);
            return;
        }
        if replaced == 0 {
            debug!(server = %credentials.server, "Keeping newer cached ticket");
            return;
        }
        debug!(server = %credentials.server, replaced, "Updating cached ticket");
        self.credentials.extend(iter::repeat(credentials).take(replaced));
    }

    pub fn add_config_entry(&mut self, entry: ConfigEntry) {
        self.config_entries.push(entry);
    }

    pub fn get_config_entry(&self, name: &str) -> Option<&ConfigEntry> {
        self.config_entries.iter().find(|entry| entry.name == name)
    }

    pub fn get_creds(&self, service: &Principal) -> Option<&Credentials> {
        self.credentials
            .iter()
            .find(|credentials| credentials.server.matches(service))
    }

    pub fn get_creds_with_options(
        &self,
        options: &LoginOptions,
        service: &Principal,
    ) -> Option<&Credentials> {
        self.credentials.iter().find(|credentials| {
            credentials.server.matches(service) && credentials.ticket_flags.matches(options)
        })
    }

    /// The most recently stored TGT for a principal's own realm.
    pub fn get_default_creds(&self) -> Option<&Credentials> {
        self.credentials
            .iter()
            .rev()
            .find(|credentials| credentials.server.is_local_tgt())
    }

    /// Picks the credentials a client should start from.
    ///
    /// When the cache has a `proxy_impersonator` entry, the TGT belongs to
    /// the impersonating service and the primary principal is the user it
    /// acts for. The evidence ticket is then the one issued to the user for
    /// that service. The context's impersonation policy decides what
    /// happens when it cannot be found.
    pub fn get_initial_creds(&self, context: &Context) -> anyhow::Result<Option<ResolvedCredentials>> {
        let Some(tgt) = self.get_default_creds() else {
            return Ok(None);
        };
        let plain = || -> anyhow::Result<Option<ResolvedCredentials>> {
            Ok(Some(ResolvedCredentials {
                tgt: tgt.clone(),
                evidence: None,
            }))
        };
        let Some(entry) = self.get_config_entry(ConfigEntry::PROXY_IMPERSONATOR) else {
            return plain();
        };
        if context.impersonation == ImpersonationPolicy::Never {
            debug!(name = ?self.name, "Impersonation disabled, using plain TGT");
            return plain();
        }
        match self.find_evidence(context, tgt, entry) {
            Ok(evidence) => Ok(Some(ResolvedCredentials {
                tgt: tgt.clone(),
                evidence: Some(evidence.clone()),
            })),
            Err(err) if context.impersonation == ImpersonationPolicy::BestEffort => {
                debug!(error = ?err, "No impersonation evidence, using plain TGT");
                plain()
            }
            Err(err) => {
                warn!(error = ?err, name = ?self.name, "No impersonation evidence");
                Err(Error::KRB5_CC_NOIMPERSONATION)?
            }
        }
    }

    fn find_evidence(
        &self,
        context: &Context,
        tgt: &Credentials,
        entry: &ConfigEntry,
    ) -> anyhow::Result<&Credentials> {
        let service = Principal::parse_name(
            str::from_utf8(&entry.data)?,
            0,
            context.default_realm.as_deref(),
        )?;
        if tgt.client != service {
            Err(anyhow::anyhow!(
                "TGT client {} is not the impersonator {}",
                tgt.client,
                service
            ))?
        }
        Ok(self
            .credentials
            .iter()
            .find(|credentials| {
                credentials.client == self.primary_principal && credentials.server == service
            })
            .ok_or(Error::KRB5_CC_NOTFOUND)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ticket::testing::der_ticket, Enctype, Keyblock, Profile, Ticket};
    use chrono::DateTime;

    const REALM: &str = "EXAMPLE.COM";

    fn principal(name: &str) -> Principal {
        Principal::parse_name(name, 0, Some(REALM)).unwrap()
    }

    fn creds(client: &str, server: &str, endtime: i64) -> Credentials {
        let server = principal(server);
        let components: Vec<&str> = server.components.iter().map(String::as_str).collect();
        let ticket = Ticket::decode_from(&der_ticket(&server.realm, &components, b"ct")).unwrap();
        Credentials::new(
            principal(client),
            server,
            Keyblock::new(Enctype::AES256_CTS_HMAC_SHA1_96, &[1; 32]),
            DateTime::from_timestamp(1, 0).unwrap(),
            DateTime::from_timestamp(endtime, 0).unwrap(),
            ticket,
        )
    }

    fn context(policy: ImpersonationPolicy) -> Context {
        let mut context = Context::from_profile(Profile::empty()).unwrap();
        context.set_default_realm(REALM);
        context.impersonation = policy;
        context
    }

    fn endtimes(cache: &FileCredentialCache) -> Vec<(String, i64)> {
        cache
            .credentials()
            .iter()
            .map(|c| (c.server.to_string(), c.endtime.timestamp()))
            .collect()
    }

    #[test]
    fn update_keeps_newest_ticket_per_service() {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.update(creds("alice", "HTTP/web", 100));
        cache.update(creds("alice", "HTTP/web", 50));
        assert_eq!(endtimes(&cache), vec![("HTTP/web@EXAMPLE.COM".into(), 100)]);

        cache.update(creds("alice", "http/WEB@example.com", 150));
        assert_eq!(endtimes(&cache), vec![("http/WEB@example.com".into(), 150)]);

        cache.update(creds("alice", "ldap/dir", 10));
        assert_eq!(
            endtimes(&cache),
            vec![
                ("http/WEB@example.com".into(), 150),
                ("ldap/dir@EXAMPLE.COM".into(), 10)
            ]
        );
    }

    // Existing duplicates each make room for a copy of the new ticket.
    #[test]
    fn update_replaces_every_duplicate() {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.credentials.push(creds("alice", "HTTP/web", 100));
        cache.credentials.push(creds("alice", "HTTP/web", 100));
        cache.update(creds("alice", "HTTP/web", 150));
        assert_eq!(
            endtimes(&cache),
            vec![
                ("HTTP/web@EXAMPLE.COM".into(), 150),
                ("HTTP/web@EXAMPLE.COM".into(), 150)
            ]
        );
    }

    #[test]
    fn older_update_keeps_cached_tickets() {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.credentials.push(creds("alice", "HTTP/web", 100));
        cache.credentials.push(creds("alice", "ldap/dir", 10));
        let before = cache.credentials.clone();
        cache.update(creds("alice", "HTTP/web", 50));
        assert_eq!(cache.credentials, before);
    }

    #[test]
    fn default_creds_is_last_local_tgt() {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.update(creds("alice", "krbtgt/OTHER.COM@OTHER.COM", 100));
        cache.update(creds("alice", "krbtgt/EXAMPLE.COM", 100));
        cache.update(creds("alice", "krbtgt/OTHER.COM", 100));
        cache.update(creds("alice", "HTTP/web", 100));
        let tgt = cache.get_default_creds().unwrap();
        assert_eq!(tgt.server.to_string(), "krbtgt/EXAMPLE.COM@EXAMPLE.COM");

        let empty = FileCredentialCache::new("/tmp/unused", principal("alice"));
        assert_eq!(empty.get_default_creds(), None);
    }

    #[test]
    fn get_creds_matches_service_and_options() {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        let mut forwardable = creds("alice", "HTTP/web", 100);
        forwardable.ticket_flags.set(crate::TicketFlags::FORWARDABLE, true);
        cache.update(forwardable);

        let service = principal("http/WEB@example.com");
        assert!(cache.get_creds(&service).is_some());
        assert!(cache.get_creds(&principal("HTTP/other")).is_none());

        let options = LoginOptions {
            forwardable: true,
            ..Default::default()
        };
        assert!(cache.get_creds_with_options(&options, &service).is_some());
        assert!(cache
            .get_creds_with_options(&LoginOptions::default(), &service)
            .is_none());
    }

    fn impersonation_cache(with_evidence: bool) -> FileCredentialCache {
        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.update(creds("HTTP/web", "krbtgt/EXAMPLE.COM", 100));
        if with_evidence {
            cache.update(creds("alice", "HTTP/web", 100));
        }
        cache.add_config_entry(ConfigEntry::new(
            ConfigEntry::PROXY_IMPERSONATOR,
            None,
            b"HTTP/web@EXAMPLE.COM",
        ));
        cache
    }

    #[test]
    fn initial_creds_without_impersonation() {
        let policy = ImpersonationPolicy::Mandatory;
        let empty = FileCredentialCache::new("/tmp/unused", principal("alice"));
        assert_eq!(empty.get_initial_creds(&context(policy)).unwrap(), None);

        let mut cache = FileCredentialCache::new("/tmp/unused", principal("alice"));
        cache.update(creds("alice", "krbtgt/EXAMPLE.COM", 100));
        let resolved = cache.get_initial_creds(&context(policy)).unwrap().unwrap();
        assert_eq!(resolved.tgt.client.to_string(), "alice@EXAMPLE.COM");
        assert_eq!(resolved.evidence, None);
    }

    #[test]
    fn initial_creds_with_evidence() {
        let cache = impersonation_cache(true);
        let resolved = cache
            .get_initial_creds(&context(ImpersonationPolicy::Mandatory))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.tgt.client.to_string(), "HTTP/web@EXAMPLE.COM");
        let evidence = resolved.evidence.unwrap();
        assert_eq!(evidence.client.to_string(), "alice@EXAMPLE.COM");
        assert_eq!(evidence.server.to_string(), "HTTP/web@EXAMPLE.COM");

        let resolved = cache
            .get_initial_creds(&context(ImpersonationPolicy::Never))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.evidence, None);
    }

    #[test]
    fn missing_evidence_follows_policy() {
        let cache = impersonation_cache(false);
        let resolved = cache
            .get_initial_creds(&context(ImpersonationPolicy::BestEffort))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.evidence, None);

        let err = cache
            .get_initial_creds(&context(ImpersonationPolicy::Mandatory))
            .unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CC_NOIMPERSONATION));
    }

    #[test]
    fn impersonator_must_own_the_tgt() {
        let mut cache = impersonation_cache(true);
        cache.config_entries.clear();
        cache.add_config_entry(ConfigEntry::new(
            ConfigEntry::PROXY_IMPERSONATOR,
            None,
            b"ldap/dir@EXAMPLE.COM",
        ));
        let err = cache
            .get_initial_creds(&context(ImpersonationPolicy::Mandatory))
            .unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CC_NOIMPERSONATION));
    }

    #[test]
    fn write_then_read_keeps_entries_apart() {
        let mut cache = impersonation_cache(true);
        cache.add_config_entry(ConfigEntry::new(
            ConfigEntry::PA_TYPE,
            Some(principal("krbtgt/EXAMPLE.COM")),
            b"2",
        ));
        let mut buf = vec![];
        cache.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x05, 0x03]);

        let context = context(ImpersonationPolicy::Mandatory);
        let loaded = FileCredentialCache::read_from(&context, "/tmp/unused", buf.as_slice(), None).unwrap();
        assert_eq!(loaded.version(), FileFormatVersion::V3);
        assert_eq!(loaded.tag(), None);
        assert_eq!(loaded.primary_principal(), cache.primary_principal());
        assert_eq!(loaded.credentials(), cache.credentials());
        assert_eq!(loaded.config_entries(), cache.config_entries());
        assert_eq!(
            loaded.get_config_entry(ConfigEntry::PA_TYPE).map(|e| e.data.as_slice()),
            Some(b"2".as_slice())
        );
    }

    #[test]
    fn version_4_header_is_read_and_not_written() {
        let mut bytes = vec![
            0x05, 0x04, // version
            0x00, 0x0c, 0x00, 0x01, 0x00, 0x08, // delta-time
            0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut body = vec![];
        FileCredentialCache::new("/tmp/unused", principal("alice"))
            .write_to(&mut body)
            .unwrap();
        bytes.extend(&body[2..]);

        let context = context(ImpersonationPolicy::Mandatory);
        let cache = FileCredentialCache::read_from(&context, "/tmp/unused", bytes.as_slice(), None).unwrap();
        assert_eq!(cache.version(), FileFormatVersion::V4);
        assert_eq!(cache.tag().and_then(|tag| tag.time_offset), Some((5, 0)));

        let mut out = vec![];
        cache.write_to(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn expected_principal_must_match() {
        let mut buf = vec![];
        FileCredentialCache::new("/tmp/unused", principal("alice"))
            .write_to(&mut buf)
            .unwrap();
        let context = context(ImpersonationPolicy::Mandatory);

        let loaded = FileCredentialCache::read_from(
            &context,
            "/tmp/unused",
            buf.as_slice(),
            Some(&principal("ALICE@example.com")),
        );
        assert!(loaded.is_ok());

        let err = FileCredentialCache::read_from(
            &context,
            "/tmp/unused",
            buf.as_slice(),
            Some(&principal("bob")),
        )
        .unwrap_err();
        assert_eq!(Error::find(&err), Some(Error::KRB5_CC_PRINC_MISMATCH));
    }
}
