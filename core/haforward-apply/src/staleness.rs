//! Decides whether local change state is recent enough to re-index.
//!
//! Delivery is asynchronous and multi-path, so a forwarded re-index can
//! arrive before this node has received the data the sender indexed. The
//! checker compares the fingerprint carried by the command with the local
//! one; the handler re-indexes only once local state is at least as new.

use crate::error::HostResult;
use crate::host::ChangeStateReader;
use haforward_types::{ChangeId, IndexEvent};
use std::cell::OnceCell;

/// The decision rule.
///
/// `local` is this node's fingerprint, `inbound` the one carried by the
/// command. A command without a fingerprint was not raised by a peer's
/// index event and is always accepted.
pub fn is_current(local: &IndexEvent, inbound: Option<&IndexEvent>) -> bool {
    let Some(inbound) = inbound else {
        return true;
    };
    let Some(local_target) = local.target_sha.as_deref() else {
        return true;
    };
    match inbound.target_sha.as_deref() {
        None => local.ts >= inbound.ts,
        Some(inbound_target) => {
            local.ts > inbound.ts || (local.ts == inbound.ts && local_target == inbound_target)
        }
    }
}

/// One staleness check for one change.
///
/// The local fingerprint is read lazily and kept for the life of the
/// checker; create a new checker to observe newer local state.
pub struct StalenessChecker<'a> {
    reader: &'a dyn ChangeStateReader,
    change: &'a ChangeId,
    local: OnceCell<IndexEvent>,
}

impl<'a> StalenessChecker<'a> {
    pub fn new(reader: &'a dyn ChangeStateReader, change: &'a ChangeId) -> Self {
        Self {
            reader,
            change,
            local: OnceCell::new(),
        }
    }

    /// The local fingerprint. Fails with `NotFound` for unknown changes.
    pub fn local(&self) -> HostResult<&IndexEvent> {
        if let Some(local) = self.local.get() {
            return Ok(local);
        }
        let computed = IndexEvent {
            ts: self.reader.current_timestamp(self.change)?,
            meta_sha: self.reader.meta_fingerprint(self.change)?,
            target_sha: self.reader.target_fingerprint(self.change)?,
        };
        Ok(self.local.get_or_init(|| computed))
    }

    /// Whether local state is current relative to `inbound`.
    pub fn is_up_to_date(&self, inbound: Option<&IndexEvent>) -> HostResult<bool> {
        if inbound.is_none() {
            return Ok(true);
        }
        Ok(is_current(self.local()?, inbound))
    }
}
