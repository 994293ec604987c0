//! Deferral table: commands parked under a key until `Execute`.

use crate::inventory::INITIAL_CAPACITY;

/// Lines waiting under one key, oldest first.
#[derive(Debug, Clone)]
struct Deferral {
    key: String,
    pending: Vec<String>,
}

/// All deferral queues of a depot. Entries are never removed, only drained.
#[derive(Debug, Clone)]
pub struct Deferrals {
    entries: Vec<Deferral>,
}

impl Default for Deferrals {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferrals {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    fn find(&self, key: &str) -> Option<&Deferral> {
        self.entries.iter().find(|d| d.key == key)
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut Deferral> {
        self.entries.iter_mut().find(|d| d.key == key)
    }

    /// Append `line` to the queue for `key`, creating it if needed.
    pub fn defer(&mut self, key: &str, line: &str) {
        match self.find_mut(key) {
            Some(deferral) => deferral.pending.push(line.to_string()),
            None => {
                let mut pending = Vec::with_capacity(INITIAL_CAPACITY);
                pending.push(line.to_string());
                self.entries.push(Deferral {
                    key: key.to_string(),
                    pending,
                });
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Queued lines for `key`, or `None` if the key was never deferred.
    pub fn pending(&self, key: &str) -> Option<&[String]> {
        self.find(key).map(|d| d.pending.as_slice())
    }

    /// The line at `index` in the live queue for `key`.
    pub fn line_at(&self, key: &str, index: usize) -> Option<String> {
        self.find(key).and_then(|d| d.pending.get(index).cloned())
    }

    /// Empty the queue for `key`; the key itself stays known.
    pub fn clear(&mut self, key: &str) {
        if let Some(deferral) = self.find_mut(key) {
            deferral.pending.clear();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_in_arrival_order() {
        let mut d = Deferrals::new();
        d.defer("7", "Deliver:3:gadget");
        d.defer("8", "Withdraw:1:gadget");
        d.defer("7", "Deliver:2:gadget");
        assert_eq!(
            d.pending("7").unwrap(),
            ["Deliver:3:gadget", "Deliver:2:gadget"]
        );
        assert_eq!(d.line_at("7", 1).as_deref(), Some("Deliver:2:gadget"));
        assert_eq!(d.line_at("7", 2), None);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn clear_keeps_the_key() {
        let mut d = Deferrals::new();
        d.defer("1", "Deliver:1:x");
        d.clear("1");
        assert!(d.contains("1"));
        assert!(d.pending("1").unwrap().is_empty());
        d.clear("unknown");
        assert!(!d.contains("unknown"));
    }
}
