//! Common helpers for credential cache integration tests.

#![allow(dead_code)]

use chrono::DateTime;
use krb5_ccache::{
    Context, Credentials, Enctype, Keyblock, KerberosTime, Principal, Profile, Ticket,
};

pub const REALM: &str = "EXAMPLE.COM";

pub fn context() -> Context {
    let mut context = Context::from_profile(Profile::empty()).unwrap();
    context.set_default_realm(REALM);
    context
}

pub fn principal(name: &str) -> Principal {
    Principal::parse_name(name, 0, Some(REALM)).unwrap()
}

pub fn time(seconds: i64) -> KerberosTime {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    match content.len() {
        len if len < 0x80 => out.push(len as u8),
        len if len < 0x100 => out.extend([0x81, len as u8]),
        len => out.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    out.extend_from_slice(content);
    out
}

// Small non-negative values only.
fn integer(value: u8) -> Vec<u8> {
    if value < 0x80 {
        tlv(0x02, &[value])
    } else {
        tlv(0x02, &[0x00, value])
    }
}

/// DER `[APPLICATION 1]` ticket for the given service, enctype 18, kvno 1.
pub fn der_ticket(service: &Principal, ciphertext: &[u8]) -> Vec<u8> {
    let names: Vec<u8> = service
        .components
        .iter()
        .flat_map(|c| tlv(0x1b, c.as_bytes()))
        .collect();
    let sname = tlv(
        0x30,
        &[tlv(0xa0, &integer(1)), tlv(0xa1, &tlv(0x30, &names))].concat(),
    );
    let enc_part = tlv(
        0x30,
        &[
            tlv(0xa0, &integer(18)),
            tlv(0xa1, &integer(1)),
            tlv(0xa2, &tlv(0x04, ciphertext)),
        ]
        .concat(),
    );
    let body = [
        tlv(0xa0, &integer(5)),
        tlv(0xa1, &tlv(0x1b, service.realm.as_bytes())),
        tlv(0xa2, &sname),
        tlv(0xa3, &enc_part),
    ]
    .concat();
    tlv(0x61, &tlv(0x30, &body))
}

pub fn ticket(service: &Principal) -> Ticket {
    Ticket::decode_from(&der_ticket(service, &[0x5a; 64])).unwrap()
}

pub fn credentials(client: &str, server: &str, endtime: i64) -> Credentials {
    let server = principal(server);
    let ticket = ticket(&server);
    Credentials::new(
        principal(client),
        server,
        Keyblock::new(Enctype::AES256_CTS_HMAC_SHA1_96, &[0x42; 32]),
        time(1_700_000_000),
        time(endtime),
        ticket,
    )
}
