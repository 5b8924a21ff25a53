//! Per-(state, guest-PC) translation metadata.

use rustc_hash::FxHashMap;

use crate::identity::HostStateId;

/// Key into the [`TranslationCache`]: a host state together with a guest
/// program counter.
pub type TranslationKey = (HostStateId, u64);

/// Metadata captured for one (state, guest-PC) translation.
#[derive(Debug, Clone, Default)]
pub struct TranslationBlockRecord {
    /// Incremented on each re-translation of the same key; distinguishes
    /// physically distinct code snapshots at the same address.
    pub generation: u64,
    /// Module-relative offset; 0 if the block's module could not be resolved.
    pub elf_vaddr: u64,
    /// Snapshot of the guest basic block's concrete bytes at translation
    /// time. Empty if the guest memory read failed.
    pub bytes: Vec<u8>,
}

/// Caches [`TranslationBlockRecord`]s keyed by (state, guest-PC). Lives for
/// the plugin's lifetime; compaction is deliberately unspecified.
#[derive(Default)]
pub struct TranslationCache {
    records: FxHashMap<TranslationKey, TranslationBlockRecord>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self {
            records: FxHashMap::default(),
        }
    }

    /// Record a (re-)translation. Generation starts at 1 for a new key and
    /// increments on every subsequent call for the same key; `elf_vaddr`
    /// and `bytes` are always overwritten with the latest values.
    pub fn record_translation(
        &mut self,
        state_id: HostStateId,
        pc: u64,
        elf_vaddr: u64,
        bytes: Vec<u8>,
    ) {
        let key = (state_id, pc);
        match self.records.get_mut(&key) {
            Some(record) => {
                record.generation += 1;
                record.elf_vaddr = elf_vaddr;
                record.bytes = bytes;
            }
            None => {
                self.records.insert(
                    key,
                    TranslationBlockRecord {
                        generation: 1,
                        elf_vaddr,
                        bytes,
                    },
                );
            }
        }
    }

    /// Look up the record for (state, pc), creating a defensive
    /// generation-0 placeholder if translate-block-start has not yet been
    /// observed for this key (out-of-order callbacks must not crash).
    pub fn lookup(&mut self, state_id: HostStateId, pc: u64) -> &TranslationBlockRecord {
        self.records
            .entry((state_id, pc))
            .or_insert_with(TranslationBlockRecord::default)
    }
}
