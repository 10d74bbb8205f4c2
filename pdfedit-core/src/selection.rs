use std::collections::BTreeSet;

/// Working copy of a page order, edited before being submitted as a reorder.
///
/// `order()[n]` is the original 0-based index of the page shown at slot `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    order: Vec<usize>,
}

impl ReorderPlan {
    pub fn new(page_count: usize) -> Self {
        Self {
            order: (0..page_count).collect(),
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn into_order(self) -> Vec<usize> {
        self.order
    }

    pub fn move_up(&mut self, slot: usize) -> bool {
        if slot == 0 || slot >= self.order.len() {
            return false;
        }
        self.order.swap(slot, slot - 1);
        true
    }

    pub fn move_down(&mut self, slot: usize) -> bool {
        if slot + 1 >= self.order.len() {
            return false;
        }
        self.order.swap(slot, slot + 1);
        true
    }

    /// Removes the page at `from` and reinserts it at `to`, shifting the rest.
    pub fn move_to(&mut self, from: usize, to: usize) -> bool {
        if from == to || from >= self.order.len() || to >= self.order.len() {
            return false;
        }
        let page = self.order.remove(from);
        self.order.insert(to, page);
        true
    }

    pub fn has_changes(&self) -> bool {
        self.order
            .iter()
            .enumerate()
            .any(|(slot, original)| slot != *original)
    }

    pub fn reset(&mut self) {
        let len = self.order.len();
        self.order = (0..len).collect();
    }
}

/// Pages picked for export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    page_count: usize,
    selected: BTreeSet<usize>,
}

impl PageSelection {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            selected: BTreeSet::new(),
        }
    }

    pub fn toggle(&mut self, index: usize) {
        if index >= self.page_count {
            return;
        }
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
    }

    /// Selects every page, or clears the selection when every page is already selected.
    pub fn toggle_all(&mut self) {
        if self.selected.len() == self.page_count {
            self.clear();
        } else {
            self.selected = (0..self.page_count).collect();
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected 0-based indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }
}
