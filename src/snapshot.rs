//! Snapshot and rollback of pending additions.

use crate::dict::CtfDict;
use crate::error::{CtfError, Result};

/// Opaque marker for a point in a container's mutation history: the
/// type-id high-water mark and the snapshot counter at the time it was
/// taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtfSnapshot {
    pub(crate) type_hwm: u32,
    pub(crate) snap: u32,
}

impl CtfDict {
    /// Record the current state so a later [`CtfDict::rollback`] can
    /// return to it.
    pub fn snapshot(&mut self) -> CtfSnapshot {
        let id = CtfSnapshot {
            type_hwm: self.next_id - 1,
            snap: self.snapshots,
        };
        self.snapshots += 1;
        id
    }

    /// Delete every type and variable added after `id` was taken. A
    /// rollback can never cross a committed update.
    pub fn rollback(&mut self, id: CtfSnapshot) -> Result<()> {
        if self.old_id > id.type_hwm || self.last_committed >= id.snap {
            return Err(CtfError::OverRollback);
        }

        let doomed: Vec<_> = self
            .types
            .keys()
            .copied()
            .filter(|type_id| type_id.index() > id.type_hwm)
            .collect();
        for type_id in doomed {
            self.dtd_delete(type_id);
        }

        let mut removed = Vec::new();
        self.vars.retain(|var| {
            if var.snapshots > id.snap {
                removed.push(var.name.clone());
                false
            } else {
                true
            }
        });
        for name in removed {
            self.var_names.remove(&name);
            self.str_growth -= name.len() + 1;
        }

        self.next_id = id.type_hwm + 1;
        self.snapshots = id.snap;
        if self.snapshots == self.last_committed {
            self.dirty = false;
        }
        Ok(())
    }

    /// Revert every addition since the last successful update.
    pub fn discard(&mut self) -> Result<()> {
        self.rollback(CtfSnapshot {
            type_hwm: self.old_id,
            snap: self.last_committed + 1,
        })
    }
}
