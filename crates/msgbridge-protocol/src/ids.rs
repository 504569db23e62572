//! Wire message identifiers.

use serde::{Deserialize, Serialize};

/// A message identifier that fits a signed 32-bit protocol field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireId(i32);

impl WireId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message reference as supplied by a wire client.
///
/// Values inside the signed 32-bit range are wire ids minted by the registry.
/// Anything wider is a long-form native id passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRef {
    Wire(WireId),
    Long(i64),
}

impl MessageRef {
    pub fn from_raw(raw: i64) -> Self {
        match i32::try_from(raw) {
            Ok(value) => Self::Wire(WireId::new(value)),
            Err(_) => Self::Long(raw),
        }
    }
}
