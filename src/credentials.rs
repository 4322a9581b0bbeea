//! # Credential Encoder
//!
//! Turns a user's Kerberos principals and certificate DNs into the single
//! password string stored on the target platform.
//!
//! The lists are joined with `|` and every whitespace character is replaced
//! by a backslash followed by its two-digit lowercase hex code point, the
//! same escaping LDAP uses for DNs:
//!
//! ```
//! use metacloud_export::credentials::{decode, encode};
//!
//! let krb = vec!["alice@EXAMPLE.ORG".to_string()];
//! let dns = vec!["/CN=Alice Doe".to_string()];
//!
//! let password = encode(&krb, &dns);
//! assert_eq!(password, "alice@EXAMPLE.ORG|/CN=Alice\\20Doe");
//! assert_eq!(decode(&password), "alice@EXAMPLE.ORG|/CN=Alice Doe");
//! ```
//!
//! Only whitespace in the Latin-1 range is escaped, since the escape is fixed
//! at two hex digits.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Separator between individual credentials in the encoded password.
pub const SEPARATOR: &str = "|";

/// Encodes credential lists into a password string.
pub fn encode(krb_principals: &[String], cert_dns: &[String]) -> String {
    escape(&join(krb_principals, cert_dns))
}

/// Joins both credential lists without escaping.
pub fn join(krb_principals: &[String], cert_dns: &[String]) -> String {
    [krb_principals.join(SEPARATOR), cert_dns.join(SEPARATOR)].join(SEPARATOR)
}

/// Escapes whitespace as `\hh`.
pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_whitespace() && (ch as u32) <= 0xff {
            escaped.push_str(&format!("\\{:02x}", ch as u32));
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

/// Reverses [`escape`], turning every `\hh` back into its character.
pub fn decode(password: &str) -> String {
    escape_sequence()
        .replace_all(password, |caps: &Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn escape_sequence() -> &'static Regex {
    static ESCAPE: OnceLock<Regex> = OnceLock::new();
    ESCAPE.get_or_init(|| Regex::new(r"\\([0-9a-fA-F]{2})").expect("escape pattern is valid"))
}
