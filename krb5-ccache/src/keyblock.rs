use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Enctype(pub i32);

macro_rules! enctypes {
    ($(($enctype:ident, $int:literal, $name:expr, $deprecated:expr)),* $(,)?) => {
        impl Enctype {
            $(pub const $enctype: Enctype = Enctype($int);)*

            fn lookup(self) -> Option<(&'static str, bool)> {
                match self.0 {
                    $($int => Some(($name, $deprecated)),)*
                    _ => None,
                }
            }
        }
    };
}

enctypes!(
    (NULL, 0x0000, "null", true),
    (DES_CBC_CRC, 0x0001, "des-cbc-crc", true),
    (DES_CBC_MD4, 0x0002, "des-cbc-md4", true),
    (DES_CBC_MD5, 0x0003, "des-cbc-md5", true),
    (DES_CBC_RAW, 0x0004, "des-cbc-raw", true),
    (DES3_CBC_RAW, 0x0006, "des3-cbc-raw", true),
    (DES_HMAC_SHA1, 0x0008, "des-hmac-sha1", true),
    (DES3_CBC_SHA1, 0x0010, "des3-cbc-sha1", true),
    // RFC 3962
    (AES128_CTS_HMAC_SHA1_96, 0x0011, "aes128-cts-hmac-sha1-96", false),
    (AES256_CTS_HMAC_SHA1_96, 0x0012, "aes256-cts-hmac-sha1-96", false),
    // RFC 8009
    (AES128_CTS_HMAC_SHA256_128, 0x0013, "aes128-cts-hmac-sha256-128", false),
    (AES256_CTS_HMAC_SHA384_192, 0x0014, "aes256-cts-hmac-sha384-192", false),
    // RFC 4757
    (ARCFOUR_HMAC, 0x0017, "arcfour-hmac", true),
    (ARCFOUR_HMAC_EXP, 0x0018, "arcfour-hmac-exp", true),
    // RFC 6803
    (CAMELLIA128_CTS_CMAC, 0x0019, "camellia128-cts-cmac", false),
    (CAMELLIA256_CTS_CMAC, 0x001a, "camellia256-cts-cmac", false),
);

impl Enctype {
    pub fn name(self) -> Option<&'static str> {
        self.lookup().map(|(name, _)| name)
    }

    /// Unknown enctypes count as deprecated.
    pub fn is_deprecated(self) -> bool {
        self.lookup().map_or(true, |(_, deprecated)| deprecated)
    }
}

impl fmt::Display for Enctype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.is_deprecated()) {
            (Some(name), true) => write!(f, "DEPRECATED:{}", name),
            (Some(name), false) => write!(f, "{}", name),
            (None, _) => write!(f, "etype {}", self.0),
        }
    }
}

/// Session key of a credential. The cache stores the enctype in 16 bits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyblock {
    pub enctype: Enctype,
    pub contents: Vec<u8>,
}

impl Keyblock {
    pub fn new(enctype: Enctype, contents: &[u8]) -> Self {
        Self {
            enctype,
            contents: contents.to_vec(),
        }
    }
}
