use std::fmt;
use std::hash::Hasher;

use crate::Command;

/// A deterministic FNV-1a 64-bit hasher.
///
/// `DefaultHasher` is randomized per process, which would make signatures
/// differ between two bots looking at the same mailbox content.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Content fingerprint of a command's canonical encoding.
///
/// Equal commands always produce equal signatures. It says nothing about
/// *when* a command was published: republishing an identical command yields
/// the same signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandSignature(pub u64);

impl CommandSignature {
    pub fn of(command: &Command) -> Result<Self, serde_json::Error> {
        let canonical = command.to_json_compact()?;
        Ok(Self::of_bytes(canonical.as_bytes()))
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = FnvHasher::new();
        hasher.write(bytes);
        Self(hasher.finish())
    }
}

impl fmt::Display for CommandSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildWallParams, CommandKind};

    #[test]
    fn fnv_matches_reference_vector() {
        // FNV-1a("a")
        assert_eq!(CommandSignature::of_bytes(b"a").0, 0xaf63dc4c8601ec8c);
        assert_eq!(CommandSignature::of_bytes(b"").0, FnvHasher::OFFSET_BASIS);
    }

    #[test]
    fn equal_commands_share_a_signature() {
        let a = Command::targeted("wall_builder_01", CommandKind::BuildWall(BuildWallParams::default()));
        let b = a.clone();
        assert_eq!(
            CommandSignature::of(&a).expect("encode"),
            CommandSignature::of(&b).expect("encode")
        );
    }

    #[test]
    fn target_changes_the_signature() {
        let a = Command::targeted("farmer_01", CommandKind::Ping);
        let b = Command::targeted("farmer_02", CommandKind::Ping);
        assert_ne!(
            CommandSignature::of(&a).expect("encode"),
            CommandSignature::of(&b).expect("encode")
        );
    }
}
