//! Watcher lists for the two-literal watching scheme.

use super::clause::ClauseRef;
use super::Lit;

/// An entry in a watcher list: the watched clause and a cached blocker
/// literal from the same clause. If the blocker is already true, the
/// clause is satisfied and propagation skips it without touching clause
/// memory.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Watcher {
    pub(crate) cref: ClauseRef,
    pub(crate) blocker: Lit,
}

/// Per-literal watcher lists. A clause in which `!lit` is watched appears
/// in the list of `lit` exactly once.
pub(crate) struct WatchLists {
    lists: Vec<Vec<Watcher>>,
}

impl WatchLists {
    pub(crate) fn new() -> Self {
        Self { lists: Vec::new() }
    }

    /// Extends the lists to cover all literals of `n_vars` variables.
    pub(crate) fn grow(&mut self, n_vars: usize) {
        self.lists.resize_with(2 * n_vars, Vec::new);
    }

    pub(crate) fn push(&mut self, lit: Lit, watcher: Watcher) {
        self.lists[lit.code() as usize].push(watcher);
    }

    /// Removes the watcher for `cref` from the list of `lit`. Linear in the
    /// list length; only used when deleting clauses, never during
    /// propagation.
    pub(crate) fn remove(&mut self, lit: Lit, cref: ClauseRef) {
        let list = &mut self.lists[lit.code() as usize];
        let pos = list
            .iter()
            .position(|w| w.cref == cref)
            .expect("clause is watched");
        list.swap_remove(pos);
    }

    /// Detaches the list of `lit` for in-place rewriting by propagation.
    /// The caller must put the (possibly truncated) list back.
    pub(crate) fn take(&mut self, lit: Lit) -> Vec<Watcher> {
        std::mem::take(&mut self.lists[lit.code() as usize])
    }

    pub(crate) fn put_back(&mut self, lit: Lit, list: Vec<Watcher>) {
        self.lists[lit.code() as usize] = list;
    }

    pub(crate) fn get(&self, lit: Lit) -> &[Watcher] {
        &self.lists[lit.code() as usize]
    }

    /// Iterates over all lists mutably; used to rewrite handles during
    /// clause-memory compaction.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vec<Watcher>> {
        self.lists.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_remove() {
        let mut watches = WatchLists::new();
        watches.grow(2);
        let lit = Lit::from_code(1);
        let c1 = {
            let mut ca = crate::sat::clause::ClauseAllocator::new();
            ca.alloc(&[Lit::from_code(0), Lit::from_code(2)], false)
        };
        watches.push(
            lit,
            Watcher {
                cref: c1,
                blocker: Lit::from_code(2),
            },
        );
        assert_eq!(watches.get(lit).len(), 1);
        watches.remove(lit, c1);
        assert!(watches.get(lit).is_empty());
    }
}
