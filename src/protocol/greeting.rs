//! Parsing of the 128-byte server welcome banner.
//!
//! The first 64 bytes are an ASCII version line (`Tarantool 2.11.2
//! (Binary) <uuid>`); bytes 64..108 hold a base64-encoded salt used by
//! authentication; the rest is reserved padding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};

use super::constant::{GREETING_LINE_SIZE, GREETING_SALT_CHARS, GREETING_SIZE, SCRAMBLE_SIZE};

#[derive(Debug, Clone)]
pub struct Greeting {
    /// Packed `(major << 16) | (minor << 8) | patch`.
    pub version_id: u32,
    /// Decoded salt, at least `SCRAMBLE_SIZE` bytes.
    pub salt: Vec<u8>,
}

impl Greeting {
    pub fn version(&self) -> (u8, u8, u8) {
        (
            (self.version_id >> 16) as u8,
            (self.version_id >> 8) as u8,
            self.version_id as u8,
        )
    }
}

/// Parse the full 128-byte banner. Tolerates trailing whitespace in the
/// version line and padding after the salt.
pub fn parse_greeting(raw: &[u8; GREETING_SIZE]) -> Result<Greeting> {
    let line = &raw[..GREETING_LINE_SIZE];
    let line = std::str::from_utf8(line).map_err(|_| Error::GreetingError)?;
    let line = line.trim_end();

    let mut words = line.split_whitespace();
    if words.next() != Some("Tarantool") {
        return Err(Error::GreetingError);
    }
    let version = words.next().ok_or(Error::GreetingError)?;
    let version_id = parse_version(version).ok_or(Error::GreetingError)?;

    let salt_region = &raw[GREETING_LINE_SIZE..GREETING_LINE_SIZE + GREETING_SALT_CHARS];
    let salt = BASE64
        .decode(salt_region)
        .map_err(|_| Error::GreetingError)?;
    if salt.len() < SCRAMBLE_SIZE {
        return Err(Error::GreetingError);
    }

    Ok(Greeting { version_id, salt })
}

fn parse_version(version: &str) -> Option<u32> {
    let mut parts = version.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    // The patch component may carry a build suffix ("0-entrypoint").
    let patch = parts
        .next()
        .map(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);
    Some((major << 16) | (minor << 8) | patch)
}
