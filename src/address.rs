//! 64-bit hardware addresses and their allocation.

use std::cell::Cell;
use std::str::FromStr;

use crate::error::BridgeError;

/// An 8-byte hardware address, displayed as colon-separated lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Mac64Address([u8; 8]);

impl Mac64Address {
    pub const BROADCAST: Mac64Address = Mac64Address([0xff; 8]);

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Mac64Address(bytes)
    }

    pub const fn from_u64(value: u64) -> Self {
        Mac64Address(value.to_be_bytes())
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    pub fn to_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl std::fmt::Display for Mac64Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Mac64Address {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| BridgeError::InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(BridgeError::InvalidAddress(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| BridgeError::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(BridgeError::InvalidAddress(s.to_string()));
        }
        Ok(Mac64Address(bytes))
    }
}

/// Hands out sequential addresses starting at `00:00:00:00:00:00:00:01`.
///
/// One allocator is shared by every link of a network through an `Rc`.
#[derive(Debug)]
pub struct AddressAllocator {
    next: Cell<u64>,
}

impl AddressAllocator {
    pub fn new() -> Self {
        AddressAllocator { next: Cell::new(1) }
    }

    pub fn allocate(&self) -> Mac64Address {
        let value = self.next.get();
        self.next.set(value.wrapping_add(1));
        Mac64Address::from_u64(value)
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new()
    }
}
