//! Inventory table: item name to signed quantity.

use crate::identity::is_valid_name;

/// Starting capacity for every depot collection.
pub const INITIAL_CAPACITY: usize = 10;

/// One kind of good held by a depot. Quantity may go negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub quantity: i64,
}

/// Goods held by a depot, in first-seen order. Items are never removed.
#[derive(Debug, Clone)]
pub struct Inventory {
    items: Vec<Item>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Add `delta` to `name`, creating the item at zero first if unseen.
    /// Returns false (and changes nothing) if `name` is not a valid name.
    pub fn adjust(&mut self, name: &str, delta: i64) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        let index = match self.items.iter().position(|item| item.name == name) {
            Some(index) => index,
            None => {
                self.items.push(Item {
                    name: name.to_string(),
                    quantity: 0,
                });
                self.items.len() - 1
            }
        };
        let item = &mut self.items[index];
        item.quantity = item.quantity.saturating_add(delta);
        true
    }

    pub fn quantity(&self, name: &str) -> Option<i64> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.quantity)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items with a non-zero quantity, sorted by name.
    pub fn stocked(&self) -> Vec<Item> {
        let mut out: Vec<Item> = self
            .items
            .iter()
            .filter(|item| item.quantity != 0)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
