//! Identifier codec (C2): a total, bijective mapping from a user-supplied
//! dataset id to a single filesystem-safe path segment.
//!
//! `percent_encoding`'s standard `NON_ALPHANUMERIC` set already escapes
//! everything unsafe in a path segment; we additionally escape `_` so an
//! encoded name never collides with the `<name>.json`/`<name>.json.tmp`
//! extension scheme chosen by the store, and so two distinct ids can never
//! encode to filenames that differ only by an escaped-vs-literal underscore.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').add(b'_');

pub fn encode(id: &str) -> String {
    utf8_percent_encode(id, ENCODE_SET).to_string()
}

pub fn decode(fname: &str) -> Result<String, std::str::Utf8Error> {
    Ok(percent_decode_str(fname).decode_utf8()?.into_owned())
}
