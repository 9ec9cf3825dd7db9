//! Administrator selection of codes across batches.

use std::collections::{BTreeSet, HashSet};

use crate::ids::CodeId;

/// Set of selected code ids, independent of which batches are expanded.
///
/// Batch-wide and all-visible selection are toggle-complement operations:
/// when every target is already selected they deselect the targets,
/// otherwise they select the union. Repeating one alternates between two
/// states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStore {
    ids: BTreeSet<CodeId>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: &CodeId) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    /// Toggles the visible part of one batch. Codes of the batch hidden by
    /// the current filter are never touched.
    pub fn select_batch(&mut self, batch_ids: &[CodeId], visible_ids: &[CodeId]) {
        let visible: HashSet<&CodeId> = visible_ids.iter().collect();
        let targets: Vec<&CodeId> = batch_ids.iter().filter(|id| visible.contains(id)).collect();
        self.toggle_complement(&targets);
    }

    /// Toggles every code visible across all expanded batches.
    pub fn select_all_visible(&mut self, all_visible_ids: &[CodeId]) {
        let targets: Vec<&CodeId> = all_visible_ids.iter().collect();
        self.toggle_complement(&targets);
    }

    fn toggle_complement(&mut self, targets: &[&CodeId]) {
        if targets.is_empty() {
            return;
        }
        if targets.iter().all(|id| self.ids.contains(*id)) {
            for id in targets {
                self.ids.remove(*id);
            }
        } else {
            self.ids.extend(targets.iter().map(|id| (*id).clone()));
        }
    }

    /// True when `targets` is non-empty and fully selected.
    pub fn all_selected(&self, targets: &[CodeId]) -> bool {
        !targets.is_empty() && targets.iter().all(|id| self.ids.contains(id))
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drops every id not in `valid_ids`. Returns how many were dropped.
    pub fn prune(&mut self, valid_ids: &HashSet<CodeId>) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| valid_ids.contains(id));
        before - self.ids.len()
    }

    pub fn contains(&self, id: &CodeId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in a stable order.
    pub fn ids(&self) -> Vec<CodeId> {
        self.ids.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<CodeId> {
        raw.iter().map(|s| CodeId::from(*s)).collect()
    }

    fn store(raw: &[&str]) -> SelectionStore {
        let mut s = SelectionStore::new();
        for id in ids(raw) {
            s.toggle(&id);
        }
        s
    }

    fn selected(s: &SelectionStore) -> Vec<String> {
        s.ids().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut s = SelectionStore::new();
        let a = CodeId::from("A");
        assert!(s.toggle(&a));
        assert!(s.contains(&a));
        assert!(!s.toggle(&a));
        assert!(s.is_empty());
    }

    #[test]
    fn test_select_batch_twice_restores_original() {
        let batch = ids(&["A", "B", "C"]);
        for initial in [&[][..], &["A"][..], &["A", "B", "C"][..], &["Z"][..]] {
            let original = store(initial);
            let mut s = original.clone();
            s.select_batch(&batch, &batch);
            s.select_batch(&batch, &batch);
            if original.all_selected(&batch) {
                // Fully selected: first call clears, second restores.
                assert_eq!(s, original);
            } else {
                // Partially selected: first call fills, second clears the batch.
                assert!(batch.iter().all(|id| !s.contains(id)));
                assert_eq!(s.len(), original.ids().iter().filter(|id| !batch.contains(id)).count());
            }
        }
    }

    #[test]
    fn test_select_batch_pair_is_idempotent_from_full_or_empty() {
        let batch = ids(&["A", "B"]);
        let mut s = store(&["Q"]);
        s.select_batch(&batch, &batch);
        assert_eq!(selected(&s), vec!["A", "B", "Q"]);
        let after_first = s.clone();
        s.select_batch(&batch, &batch);
        s.select_batch(&batch, &batch);
        assert_eq!(s, after_first);
    }

    #[test]
    fn test_select_batch_respects_visible_subset() {
        let batch = ids(&["A", "B", "C"]);
        let visible = ids(&["B"]);
        let mut s = SelectionStore::new();
        s.select_batch(&batch, &visible);
        assert_eq!(selected(&s), vec!["B"]);
        s.select_batch(&batch, &visible);
        assert!(s.is_empty());
    }

    #[test]
    fn test_select_all_visible_complement_rule() {
        // X = {A, B}, Y = {C, D}, both expanded, no filter.
        let visible = ids(&["A", "B", "C", "D"]);
        let mut s = store(&["A", "B", "C"]);

        // D is missing, so the first call completes the set.
        s.select_all_visible(&visible);
        assert_eq!(selected(&s), vec!["A", "B", "C", "D"]);

        // Everything visible is selected: the second call deselects all of it.
        s.select_all_visible(&visible);
        assert!(s.is_empty());
    }

    #[test]
    fn test_select_all_visible_keeps_hidden_selection() {
        let mut s = store(&["HIDDEN", "A"]);
        let visible = ids(&["A", "B"]);
        s.select_all_visible(&visible);
        s.select_all_visible(&visible);
        assert_eq!(selected(&s), vec!["HIDDEN"]);
    }

    #[test]
    fn test_empty_targets_are_a_no_op() {
        let mut s = store(&["A"]);
        s.select_all_visible(&[]);
        s.select_batch(&[], &[]);
        assert_eq!(selected(&s), vec!["A"]);
        assert!(!s.all_selected(&[]));
    }

    #[test]
    fn test_prune_drops_deleted_ids() {
        let mut s = store(&["A", "B", "C"]);
        let remaining: HashSet<CodeId> = ids(&["C", "D"]).into_iter().collect();
        assert_eq!(s.prune(&remaining), 2);
        assert_eq!(selected(&s), vec!["C"]);
    }

    #[test]
    fn test_clear() {
        let mut s = store(&["A", "B"]);
        s.clear();
        assert_eq!(s.len(), 0);
    }
}
