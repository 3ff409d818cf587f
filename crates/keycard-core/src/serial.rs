//! Pass serial generation.
//!
//! A serial is a fixed-length token over `[A-Za-z0-9]`. Uniqueness is not a
//! property of the generator; it is established by the enrollment retry loop
//! and the store's unique constraint.

use rand_core::{OsRng, RngCore};

/// Length of every generated serial.
pub const SERIAL_LEN: usize = 12;

const ALPHABET: &[u8; 62] =
  b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are discarded so every symbol is equally likely.
const REJECT_FROM: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// A source of candidate serials.
pub trait SerialSource: Send + Sync {
  fn draw(&self) -> String;
}

/// Draws serials from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSerials;

impl SerialSource for RandomSerials {
  fn draw(&self) -> String {
    let mut out = String::with_capacity(SERIAL_LEN);
    let mut buf = [0u8; SERIAL_LEN * 2];
    while out.len() < SERIAL_LEN {
      OsRng.fill_bytes(&mut buf);
      out.extend(
        buf
          .iter()
          .filter(|b| **b < REJECT_FROM)
          .map(|b| char::from(ALPHABET[usize::from(*b) % ALPHABET.len()]))
          .take(SERIAL_LEN - out.len()),
      );
    }
    out
  }
}

/// Whether `s` has the shape of a generated serial.
pub fn is_well_formed(s: &str) -> bool {
  s.len() == SERIAL_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}
