//! Wire codec for the two L402 header values.
//!
//! - `Authorization: L402 <macaroon>:<preimage>`
//! - `WWW-Authenticate: L402 macaroon="<macaroon>", invoice="<invoice>"`
//!
//! The codec is stateless. Parsing returns `None` for anything that does not
//! carry the `L402` scheme or is missing a required separator or attribute;
//! callers decide whether that is a protocol error.
//!
//! # Example
//!
//! ```
//! use l402_kit::header;
//!
//! let value = header::format_authorization("mac", "pre");
//! assert_eq!(value, "L402 mac:pre");
//!
//! let parts = header::parse_authorization("L402 a:b:c").unwrap();
//! assert_eq!(parts.macaroon, "a:b");
//! assert_eq!(parts.preimage, "c");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{AuthorizationParts, Challenge};

/// The authentication scheme literal.
pub const L402_SCHEME: &str = "L402";

/// Header carrying the client credential.
pub const AUTHORIZATION: &str = "authorization";

/// Header carrying the server challenge.
pub const WWW_AUTHENTICATE: &str = "www-authenticate";

static MACAROON_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s,])macaroon\s*=\s*"([^"]+)""#).expect("static regex is valid")
});

static INVOICE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s,])invoice\s*=\s*"([^"]+)""#).expect("static regex is valid")
});

/// Strips `"L402 "` from the front of a header value.
fn strip_scheme(header: &str) -> Option<&str> {
    header
        .strip_prefix(L402_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
}

/// Returns `true` if the header value uses the L402 scheme.
pub fn has_l402_scheme(header: &str) -> bool {
    strip_scheme(header).is_some()
}

/// Parses an `Authorization` header value.
///
/// The remainder after the scheme is split on the *last* colon, so macaroons
/// containing colons survive. Returns `None` only if the scheme is wrong or
/// there is no colon; either side of the split may be empty.
pub fn parse_authorization(header: &str) -> Option<AuthorizationParts> {
    let token = strip_scheme(header)?;
    let (macaroon, preimage) = token.rsplit_once(':')?;
    Some(AuthorizationParts {
        macaroon: macaroon.to_string(),
        preimage: preimage.to_string(),
    })
}

/// Parses a `WWW-Authenticate` header value.
///
/// Attribute order and the whitespace around commas and `=` are not
/// significant. Both `macaroon` and `invoice` must be present.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let attrs = strip_scheme(header)?;
    let macaroon = MACAROON_ATTR.captures(attrs)?.get(1)?.as_str();
    let invoice = INVOICE_ATTR.captures(attrs)?.get(1)?.as_str();
    Some(Challenge {
        macaroon: macaroon.to_string(),
        invoice: invoice.to_string(),
    })
}

/// Formats an `Authorization` header value.
pub fn format_authorization(macaroon: &str, preimage: &str) -> String {
    format!("{L402_SCHEME} {macaroon}:{preimage}")
}

/// Formats a `WWW-Authenticate` header value.
pub fn format_challenge(macaroon: &str, invoice: &str) -> String {
    format!(r#"{L402_SCHEME} macaroon="{macaroon}", invoice="{invoice}""#)
}
