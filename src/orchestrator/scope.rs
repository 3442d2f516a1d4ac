//! Per-scope bookkeeping: the pass in flight and the last content seen

use tokio_util::sync::CancellationToken;

/// Cheap summary of a scope's source content used to detect edits
///
/// The host bumps `revision` on every change; `content_len` catches hosts
/// that reuse revisions across reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    pub revision: u64,
    pub content_len: usize,
}

impl ContentFingerprint {
    pub fn new(revision: u64, content_len: usize) -> Self {
        Self {
            revision,
            content_len,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ActivePass {
    pub id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    pub active: Option<ActivePass>,
    pub fingerprint: Option<ContentFingerprint>,
}

impl ScopeState {
    /// Record `fingerprint` and report whether the content differs from the last pass
    ///
    /// The first fingerprint ever recorded is not a change, and neither is a
    /// pass that carries no fingerprint.
    pub fn observe(&mut self, fingerprint: Option<ContentFingerprint>) -> bool {
        let Some(fingerprint) = fingerprint else {
            return false;
        };
        let changed = self
            .fingerprint
            .is_some_and(|previous| previous != fingerprint);
        self.fingerprint = Some(fingerprint);
        changed
    }

    /// Cancel the pass in flight, if any, and install a new one
    pub fn replace_pass(&mut self, id: u64, cancel: CancellationToken) {
        if let Some(previous) = self.active.replace(ActivePass { id, cancel }) {
            previous.cancel.cancel();
        }
    }

    /// Forget the pass `id` once it has settled, unless a newer pass replaced it
    pub fn finish_pass(&mut self, id: u64) {
        if self.active.as_ref().is_some_and(|pass| pass.id == id) {
            self.active = None;
        }
    }

    pub fn cancel_active(&mut self) {
        if let Some(pass) = self.active.take() {
            pass.cancel.cancel();
        }
    }
}
