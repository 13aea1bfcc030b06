use crate::{Enctype, NameType, Principal};
use der_parser::{
    asn1_rs::{self, Any, CheckDerConstraints, DerAutoDerive, FromDer},
    ber::{BerObject, BerObjectContent},
    der::{
        parse_der_generalstring, parse_der_i32, parse_der_octetstring, parse_der_sequence,
        parse_der_u32, Tag,
    },
};

pub type Kvno = u32;

/// A Kerberos ticket as carried in a credential cache.
///
/// Only the unencrypted header is decoded. The original DER bytes are kept
/// so the ticket is written back exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub server: Principal,
    pub enc_part: EncData,
    encoded: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncData {
    pub enctype: Enctype,
    pub kvno: Option<Kvno>,
    pub ciphertext: Vec<u8>,
}

fn explicit<'a>(object: &BerObject<'a>) -> Result<&'a [u8], asn1_rs::Error> {
    match &object.content {
        BerObjectContent::Unknown(content) => Ok(content.data),
        _ => Err(asn1_rs::Error::BerValueError),
    }
}

impl<'a> TryFrom<Any<'a>> for Ticket {
    type Error = asn1_rs::Error;

    // Ticket ::= [APPLICATION 1] SEQUENCE {
    //     tkt-vno  [0] INTEGER (5),
    //     realm    [1] Realm,
    //     sname    [2] PrincipalName,
    //     enc-part [3] EncryptedData
    // }
    fn try_from(any: Any<'a>) -> Result<Self, Self::Error> {
        let (_, seq) = parse_der_sequence(any.data)?;
        let seq = seq.as_sequence()?;
        if seq.len() != 4 {
            Err(asn1_rs::Error::BerValueError)?
        }

        let (_, _version) = parse_der_i32(explicit(&seq[0])?)?;

        let (_, realm) = parse_der_generalstring(explicit(&seq[1])?)?;
        let realm = realm.as_str()?;

        // PrincipalName ::= SEQUENCE {
        //     name-type   [0] Int32,
        //     name-string [1] SEQUENCE OF KerberosString
        // }
        let (_, principal) = parse_der_sequence(explicit(&seq[2])?)?;
        let principal = principal.as_sequence()?;
        if principal.len() != 2 {
            Err(asn1_rs::Error::BerValueError)?
        }
        let (_, name_type) = parse_der_i32(explicit(&principal[0])?)?;
        let (_, components) = parse_der_sequence(explicit(&principal[1])?)?;
        let mut principal_components = vec![];
        for component in components.as_sequence()? {
            principal_components.push(component.as_str()?.to_owned());
        }

        // EncryptedData ::= SEQUENCE {
        //     etype  [0] Int32,
        //     kvno   [1] UInt32 OPTIONAL,
        //     cipher [2] OCTET STRING
        // }
        let (_, encrypted_data) = parse_der_sequence(explicit(&seq[3])?)?;
        let encrypted_data = encrypted_data.as_sequence()?;
        let (enctype, kvno, cipher) = match encrypted_data.as_slice() {
            [enctype, cipher] => (enctype, None, cipher),
            [enctype, kvno, cipher] => (enctype, Some(kvno), cipher),
            _ => Err(asn1_rs::Error::BerValueError)?,
        };
        let (_, enctype) = parse_der_i32(explicit(enctype)?)?;
        let kvno = match kvno {
            Some(kvno) => Some(parse_der_u32(explicit(kvno)?)?.1),
            None => None,
        };
        let (_, ciphertext) = parse_der_octetstring(explicit(cipher)?)?;

        Ok(Ticket {
            server: Principal::new(NameType(name_type), principal_components, realm),
            enc_part: EncData {
                enctype: Enctype(enctype),
                kvno,
                ciphertext: ciphertext.as_slice()?.to_vec(),
            },
            encoded: vec![],
        })
    }
}

impl CheckDerConstraints for Ticket {
    fn check_constraints(any: &Any) -> asn1_rs::Result<()> {
        any.header.assert_class(asn1_rs::Class::Application)?;
        any.header.assert_constructed()?;
        any.header.assert_tag(Tag(1))?;
        Ok(())
    }
}

impl DerAutoDerive for Ticket {}

impl Ticket {
    pub fn decode_from(data: &[u8]) -> anyhow::Result<Self> {
        let (_, mut ticket) =
            Self::from_der(data).map_err(|e| anyhow::anyhow!("{} while decoding ticket", e))?;
        ticket.encoded = data.to_vec();
        Ok(ticket)
    }

    pub fn encode(&self) -> &[u8] {
        &self.encoded
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::der_ticket, *};

    #[test]
    fn decodes_ticket_header() {
        let data = der_ticket("EXAMPLE.COM", &["krbtgt", "EXAMPLE.COM"], &[0xaa; 200]);
        let ticket = Ticket::decode_from(&data).unwrap();
        assert_eq!(ticket.server.to_string(), "krbtgt/EXAMPLE.COM@EXAMPLE.COM");
        assert_eq!(ticket.server.name_type, NameType::SRV_INST);
        assert_eq!(ticket.enc_part.enctype, Enctype::AES256_CTS_HMAC_SHA1_96);
        assert_eq!(ticket.enc_part.kvno, Some(2));
        assert_eq!(ticket.enc_part.ciphertext, vec![0xaa; 200]);
        assert_eq!(ticket.encode(), data.as_slice());
    }

    #[test]
    fn rejects_non_ticket_bytes() {
        assert!(Ticket::decode_from(b"svc@EXAMPLE.COM").is_err());
        assert!(Ticket::decode_from(&[]).is_err());
        // A bare SEQUENCE lacks the [APPLICATION 1] wrapper.
        let data = der_ticket("R", &["a"], b"x");
        assert!(Ticket::decode_from(&data[2..]).is_err());
    }
}
