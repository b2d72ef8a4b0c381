//! One-time link tokens.
//!
//! 21 symbols from a 64-symbol URL-safe alphabet, i.e. 126 bits of entropy
//! drawn from the operating system CSPRNG.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

use super::LinkError;

pub const TOKEN_LEN: usize = 21;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// A freshly generated token. `Display` prints the full value (it goes into links);
/// `Debug` only shows a prefix so tokens don't end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkToken({}…)", prefix(&self.0))
    }
}

/// First four characters, for log lines.
pub fn prefix(token: &str) -> &str {
    match token.char_indices().nth(4) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

/// Generate a token from the OS entropy source. Never falls back to a weaker RNG.
pub fn issue() -> Result<LinkToken, LinkError> {
    issue_from(&mut OsRng)
}

pub(crate) fn issue_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<LinkToken, LinkError> {
    let mut bytes = [0u8; TOKEN_LEN];
    rng.try_fill_bytes(&mut bytes)
        .map_err(LinkError::GeneratorFailure)?;
    // 256 is a multiple of 64, so masking keeps the distribution uniform.
    let token = bytes
        .iter()
        .map(|b| ALPHABET[(b & 63) as usize] as char)
        .collect();
    Ok(LinkToken(token))
}
