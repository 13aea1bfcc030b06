use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use dns_lookup::lookup_addr;
use krb5_ccache::{
    prefix_progname_to_error_if_needed, resolve_cache_path, Address, ConfigEntry, Context,
    Credentials, Error, FileCredentialCache, KerberosTime, TicketFlags,
};
use once_cell::sync::Lazy;
use std::{io, net::IpAddr, process::ExitCode};
use tracing_subscriber::EnvFilter;

const PROGNAME: &str = "klist";

static ARGS: Lazy<Args> = Lazy::new(Args::parse);
static NOW: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);
static TIMESTAMP_WIDTH: Lazy<usize> = Lazy::new(|| timestamp_to_sfstring(*NOW).len());

#[derive(Parser)]
#[command(name = PROGNAME, version)]
struct Args {
    /// shows the encryption type
    #[arg(short = 'e', default_value_t = false)]
    show_etype: bool,
    /// shows the submitted authorization data types
    #[arg(short = 'd', default_value_t = false)]
    show_adtype: bool,
    /// shows credentials flags
    #[arg(short = 'f', default_value_t = false)]
    show_flags: bool,
    /// sets exit status based on valid tgt existence
    #[arg(short = 's', default_value_t = false)]
    status_only: bool,
    /// displays the address list
    #[arg(short = 'a', default_value_t = false)]
    show_addresses: bool,
    /// do not reverse-resolve
    #[arg(short = 'n', default_value_t = false)]
    no_resolve: bool,
    /// includes configuration data entries
    #[arg(short = 'C', default_value_t = false)]
    show_config: bool,

    name: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    prefix_progname_to_error_if_needed(PROGNAME, run(), ARGS.status_only)
}

fn run() -> anyhow::Result<()> {
    if ARGS.no_resolve && !ARGS.show_addresses {
        return usage();
    }

    // Forces the evaluation of lazy static value `NOW` to use current time
    let _ = *NOW;

    let mut context =
        Context::init().map_err(|e| anyhow::anyhow!("{} while initializing krb5", e))?;
    let path = resolve_cache_path(&mut context, ARGS.name.as_deref())
        .map_err(|e| anyhow::anyhow!("{} while resolving ccache", e))?
        .ok_or(Error::KRB5_CC_UNKNOWN_TYPE)?;
    let cache = FileCredentialCache::load(&context, path, None)
        .map_err(|e| anyhow::anyhow!("{} while retrieving principal name", e))?;

    if ARGS.status_only {
        check_ccache(&cache)
    } else {
        show_ccache(&cache)
    }
}

fn usage() -> anyhow::Result<()> {
    Err(anyhow::anyhow!(Args::command().render_help()))
}

fn check_ccache(cache: &FileCredentialCache) -> anyhow::Result<()> {
    let mut found_tgt = false;
    let mut found_current_tgt = false;
    let mut found_current_cred = false;
    for credentials in cache.credentials() {
        if credentials.server.is_local_tgt() {
            found_tgt = true;
            if credentials.is_current(*NOW) {
                found_current_tgt = true;
            }
        } else if credentials.is_current(*NOW) {
            found_current_cred = true;
        }
    }
    if (found_tgt && found_current_tgt) || (!found_tgt && found_current_cred) {
        Ok(())
    } else {
        Err(anyhow::anyhow!(""))
    }
}

fn show_ccache(cache: &FileCredentialCache) -> anyhow::Result<()> {
    let default_name = cache.primary_principal().to_string();
    println!("Ticket cache: FILE:{}", cache.name().display());
    println!("Default principal: {}\n", default_name);
    println!(
        "Valid starting{}  Expires{}  Service principal",
        " ".repeat(*TIMESTAMP_WIDTH - "Valid starting".len()),
        " ".repeat(*TIMESTAMP_WIDTH - "Expires".len())
    );
    for credentials in cache.credentials() {
        show_credentials(credentials, &default_name);
    }
    if ARGS.show_config {
        for entry in cache.config_entries() {
            show_config_entry(entry);
        }
    }
    Ok(())
}

fn show_config_entry(entry: &ConfigEntry) {
    let mut output = format!("config: {}", entry.name);
    if let Some(principal) = &entry.principal {
        output.push_str(&format!("({})", principal));
    }
    output.push_str(" = ");
    print!("{}", output);
    let mut config_row_length = output.len();

    for byte in &entry.data {
        if config_row_length < 8 {
            print!("{}", " ".repeat(8 - config_row_length));
            config_row_length = 8;
        }
        if *byte > 0x20 && *byte < 0x7f {
            print!("{}", char::from(*byte));
            config_row_length += 1;
        } else {
            print!("\\{:0>3o}", byte);
            config_row_length += 4;
        }
        if config_row_length > 72 {
            println!();
            config_row_length = 0;
        }
    }
    if config_row_length > 0 {
        println!();
    }
}

fn show_credentials(credentials: &Credentials, default_name: &str) {
    let name = credentials.client.to_string();
    let starttime = credentials.starttime.unwrap_or(credentials.authtime);
    println!(
        "{}  {}  {}",
        timestamp_to_sfstring(starttime),
        timestamp_to_sfstring(credentials.endtime),
        credentials.server
    );

    let mut extra_field = 0;
    let prefix = |extra_field: i32| if extra_field == 0 { "\t" } else { ", " };
    if name != default_name {
        print!("{}for client {}", prefix(extra_field), name);
        extra_field += 1;
    }
    if let Some(renew_till) = credentials.renew_till {
        print!(
            "{}renew until {}",
            prefix(extra_field),
            timestamp_to_sfstring(renew_till)
        );
        extra_field += 2;
    }
    if ARGS.show_flags {
        let flags = flags_string(&credentials.ticket_flags);
        if !flags.is_empty() {
            print!("{}Flags: {}", prefix(extra_field), flags);
            extra_field += 1;
        }
    }
    if extra_field > 2 {
        println!();
        extra_field = 0;
    }
    if ARGS.show_etype {
        print!(
            "{}Etype (skey, tkt): {}, {} ",
            prefix(extra_field),
            credentials.keyblock.enctype,
            credentials.ticket.enc_part.enctype
        );
        extra_field += 1;
    }
    if ARGS.show_adtype {
        let ad_types: Vec<String> = credentials
            .authdata
            .iter()
            .flatten()
            .map(|ad| ad.ad_type.to_string())
            .collect();
        print!("{}AD types: {}", prefix(extra_field), ad_types.join(", "));
        extra_field += 1;
    }
    if extra_field > 0 {
        println!();
    }
    if ARGS.show_addresses {
        match &credentials.addresses {
            None => println!("\tAddresses: (none)"),
            Some(addresses) => {
                let addresses: Vec<String> = addresses.iter().map(one_addr).collect();
                println!("\tAddresses: {}", addresses.join(", "));
            }
        }
    }
    if credentials.server != credentials.ticket.server {
        println!("\tTicket server: {}", credentials.ticket.server);
    }
}

fn timestamp_to_sfstring(timestamp: KerberosTime) -> String {
    timestamp.format("%x %X").to_string()
}

macro_rules! add_flag {
    ($flags:expr, $buf:expr, $flag:ident, $name:expr) => {
        if $flags.get(TicketFlags::$flag) {
            $buf.push($name);
        }
    };
}

fn flags_string(flags: &TicketFlags) -> String {
    let mut buf = vec![];
    add_flag!(flags, buf, FORWARDABLE, "F");
    add_flag!(flags, buf, FORWARDED, "f");
    add_flag!(flags, buf, PROXIABLE, "P");
    add_flag!(flags, buf, PROXY, "p");
    add_flag!(flags, buf, MAY_POSTDATE, "D");
    add_flag!(flags, buf, POSTDATED, "d");
    add_flag!(flags, buf, INVALID, "i");
    add_flag!(flags, buf, RENEWABLE, "R");
    add_flag!(flags, buf, INITIAL, "I");
    add_flag!(flags, buf, HW_AUTHENT, "H");
    add_flag!(flags, buf, PRE_AUTHENT, "A");
    buf.join("")
}

fn one_addr(address: &Address) -> String {
    let ip_addr = match address.addrtype {
        Address::ADDRTYPE_INET => {
            <[u8; 4]>::try_from(address.contents.as_slice()).map(IpAddr::from)
        }
        Address::ADDRTYPE_INET6 => {
            <[u8; 16]>::try_from(address.contents.as_slice()).map(IpAddr::from)
        }
        addrtype => return format!("unknown addrtype {}", addrtype),
    };
    let Ok(ip_addr) = ip_addr else {
        return format!(
            "broken address (type {} length {})",
            address.addrtype,
            address.contents.len()
        );
    };
    if ARGS.no_resolve {
        ip_addr.to_string()
    } else {
        lookup_addr(&ip_addr).unwrap_or_else(|_| ip_addr.to_string())
    }
}
