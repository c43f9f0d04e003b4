//! The closed set of backend operations.
//!
//! [`Command`] names every operation a [`Backend`](crate) can perform. It
//! drives the disable-control scope (see [`crate::disable`]) and is recorded
//! alongside keys by cache-detect (see [`crate::detect`]).

use std::fmt;

/// A single backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Command {
    Get,
    GetMany,
    GetMatch,
    GetRaw,
    Set,
    SetMany,
    SetRaw,
    Delete,
    DeleteMany,
    DeleteMatch,
    Exists,
    Scan,
    Incr,
    Expire,
    GetExpire,
    GetBits,
    IncrBits,
    SliceIncr,
    SetAdd,
    SetRemove,
    SetPop,
    Ping,
    Clear,
    GetSize,
    GetKeysCount,
    SetLock,
    Unlock,
    IsLocked,
}

impl Command {
    /// All commands, in declaration order. Used by the disable-control scope
    /// to expand a "disable everything" request.
    pub const ALL: &'static [Command] = &[
        Command::Get,
        Command::GetMany,
        Command::GetMatch,
        Command::GetRaw,
        Command::Set,
        Command::SetMany,
        Command::SetRaw,
        Command::Delete,
        Command::DeleteMany,
        Command::DeleteMatch,
        Command::Exists,
        Command::Scan,
        Command::Incr,
        Command::Expire,
        Command::GetExpire,
        Command::GetBits,
        Command::IncrBits,
        Command::SliceIncr,
        Command::SetAdd,
        Command::SetRemove,
        Command::SetPop,
        Command::Ping,
        Command::Clear,
        Command::GetSize,
        Command::GetKeysCount,
        Command::SetLock,
        Command::Unlock,
        Command::IsLocked,
    ];

    /// The command's lowercase snake_case name, as used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::GetMany => "get_many",
            Command::GetMatch => "get_match",
            Command::GetRaw => "get_raw",
            Command::Set => "set",
            Command::SetMany => "set_many",
            Command::SetRaw => "set_raw",
            Command::Delete => "delete",
            Command::DeleteMany => "delete_many",
            Command::DeleteMatch => "delete_match",
            Command::Exists => "exists",
            Command::Scan => "scan",
            Command::Incr => "incr",
            Command::Expire => "expire",
            Command::GetExpire => "get_expire",
            Command::GetBits => "get_bits",
            Command::IncrBits => "incr_bits",
            Command::SliceIncr => "slice_incr",
            Command::SetAdd => "set_add",
            Command::SetRemove => "set_remove",
            Command::SetPop => "set_pop",
            Command::Ping => "ping",
            Command::Clear => "clear",
            Command::GetSize => "get_size",
            Command::GetKeysCount => "get_keys_count",
            Command::SetLock => "set_lock",
            Command::Unlock => "unlock",
            Command::IsLocked => "is_locked",
        }
    }

    /// True for commands that only read state and never mutate a backend.
    pub const fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Get
                | Command::GetMany
                | Command::GetMatch
                | Command::GetRaw
                | Command::Exists
                | Command::Scan
                | Command::GetExpire
                | Command::GetBits
                | Command::Ping
                | Command::GetSize
                | Command::GetKeysCount
                | Command::IsLocked
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_every_variant_once() {
        assert_eq!(Command::ALL.len(), 27);
        let mut seen: Vec<&str> = Command::ALL.iter().map(|c| c.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), Command::ALL.len());
    }

    #[test]
    fn read_only_excludes_mutators() {
        assert!(Command::Get.is_read_only());
        assert!(!Command::Set.is_read_only());
        assert!(!Command::Delete.is_read_only());
        assert!(!Command::IncrBits.is_read_only());
    }
}
