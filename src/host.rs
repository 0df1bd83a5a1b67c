//! Host collaborator contracts (spec §6.1). The engine is embedded in a server process that
//! owns networking, command dispatch, replication, and key-space lifecycle; these traits are
//! the seam between this crate's core logic and that process. Command-registration mechanics,
//! replication/AOF emission, and config-registration plumbing are explicitly out of scope
//! (spec §1) — only the *contracts* a host must satisfy are modeled here.
//!
//! Grounded on the teacher's pattern of keeping host-facing integration behind narrow traits
//! at the crate boundary rather than threading a concrete server type through core logic.

use crate::error::Result;

/// Command flags a registered command declares to the host (spec §6.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFlags {
    pub read: bool,
    pub write: bool,
    pub deny_oom: bool,
    pub fast: bool,
}

/// Declared key access mode for a command's key-specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAccess {
    ReadOnly,
    ReadWrite,
    Access,
    Update,
    Insert,
    Delete,
}

/// Facility for registering a command with the host (spec §6.1). The engine calls this once
/// per command at module load; the host owns argument parsing and dispatch thereafter.
pub trait CommandRegistry {
    fn register(
        &mut self,
        name: &str,
        flags: CommandFlags,
        key_specs: &[KeyAccess],
        acl_categories: &[&str],
        arity: i32,
    ) -> Result<()>;
}

/// Facility for registering a numeric or boolean configuration parameter with the host
/// (spec §6.1/§6.4). `get`/`set` are called by the host in response to `CONFIG GET`/`SET`;
/// the parameter's own validity rules live in [`crate::config::Config`].
pub trait ConfigRegistry {
    fn register_numeric(
        &mut self,
        name: &str,
        get: Box<dyn Fn() -> i64 + Send + Sync>,
        set: Box<dyn Fn(i64) -> Result<()> + Send + Sync>,
    ) -> Result<()>;

    fn register_bool(
        &mut self,
        name: &str,
        get: Box<dyn Fn() -> bool + Send + Sync>,
        set: Box<dyn Fn(bool) -> Result<()> + Send + Sync>,
    ) -> Result<()>;
}

/// Snapshot IO primitives supplied by the host (spec §6.1/§4.7). A concrete implementation
/// wraps the host's RDB/AOF IO context; [`crate::persist`] calls only through this trait.
pub trait SnapshotIo {
    fn save_unsigned(&mut self, v: u64) -> Result<()>;
    fn save_signed(&mut self, v: i64) -> Result<()>;
    fn save_double(&mut self, v: f64) -> Result<()>;
    fn save_string(&mut self, bytes: &[u8]) -> Result<()>;

    fn load_unsigned(&mut self) -> Result<u64>;
    fn load_signed(&mut self) -> Result<i64>;
    fn load_double(&mut self) -> Result<f64>;
    fn load_string(&mut self) -> Result<Vec<u8>>;

    /// Emit a verbatim command for AOF rewrite/replication, given the engine already decided
    /// propagation is needed. Replication glue itself lives entirely in the host.
    fn emit_aof(&mut self, command: &str, args: &[&[u8]]) -> Result<()>;

    fn update_digest(&mut self, bytes: &[u8]);
}

/// A key the host has opened on the engine's behalf for the duration of one command.
pub trait KeyHandle {
    fn exists(&self) -> bool;
}

/// Key-space facilities the engine needs beyond the single key passed to a command: opening
/// other keys (e.g. `MGET`), deleting a key outright, and notifying listeners (spec §6.1).
pub trait KeySpace {
    type Key: KeyHandle;

    fn open_key(&mut self, key: &[u8]) -> Option<Self::Key>;
    fn delete_key(&mut self, key: &[u8]) -> bool;
    fn notify_keyspace_event(&mut self, event: &str, key: &[u8]);
    fn replicate_verbatim(&mut self);
}

/// Reply primitives for the command protocol (spec §6.1): simple string, bulk string,
/// integer, array with a length declared up front, and null.
pub trait Reply {
    fn simple_string(&mut self, s: &str);
    fn bulk_string(&mut self, bytes: &[u8]);
    fn integer(&mut self, n: i64);
    fn array(&mut self, len: usize);
    fn null(&mut self);
    fn error(&mut self, tag: &str, message: &str);
}
