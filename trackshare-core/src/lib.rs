//! trackshare protocol reference implementation.
//! Host-driven: no sockets; hosts feed command lines and write back replies.

pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod registry;
pub mod tracker;
pub mod transfer;

pub use error::{ParseError, StoreError};
pub use protocol::{
    format_listing, format_own_listing, parse_listing, Command, ListingEntry, Reply,
    FILE_SERVER_PORT, READ_BUF_SIZE, TRACKER_PORT,
};
pub use reconcile::{plan_reconcile, ReconcilePlan};
pub use registry::{FileRecord, JsonFileStore, MemoryStore, PeerId, Registry, RegistryStore};
pub use tracker::{SessionState, Tracker};
pub use transfer::{is_plain_file_name, is_wire_file_name, GetRequest};
