//! Reconcile: one-way sync from a peer's local inventory into its tracker file set.

use std::collections::HashSet;

use crate::protocol::Command;
use crate::registry::FileRecord;

/// Commands needed to make the remote set match the local inventory.
/// Files are compared by name only; a size change is not re-announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Local files missing remotely, in inventory order.
    pub create: Vec<FileRecord>,
    /// Remote files missing locally, in remote order.
    pub delete: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }

    /// CREATEFILE commands first, then DELETEFILE.
    pub fn commands(&self) -> Vec<Command> {
        let creates = self.create.iter().map(|r| Command::CreateFile {
            filename: r.filename.clone(),
            size: r.size,
        });
        let deletes = self.delete.iter().map(|name| Command::DeleteFile {
            filename: name.clone(),
        });
        creates.chain(deletes).collect()
    }
}

pub fn plan_reconcile(local: &[FileRecord], remote: &[String]) -> ReconcilePlan {
    let remote_names: HashSet<&str> = remote.iter().map(String::as_str).collect();
    let local_names: HashSet<&str> = local.iter().map(|r| r.filename.as_str()).collect();
    let create = local
        .iter()
        .filter(|r| !remote_names.contains(r.filename.as_str()))
        .cloned()
        .collect();
    let mut delete: Vec<String> = Vec::new();
    for name in remote {
        if !local_names.contains(name.as_str()) && !delete.contains(name) {
            delete.push(name.clone());
        }
    }
    ReconcilePlan { create, delete }
}
