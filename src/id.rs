use serde::{Deserialize, Serialize};

/// Monotonic ID generator for units created while the game runs.
///
/// Ids are never reused, so removing and re-creating units keeps the journal
/// unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn starting_from(start: u64) -> Self {
        Self { next: start }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Reserve `count` consecutive ids.
    pub fn take(&mut self, count: usize) -> Vec<u64> {
        (0..count).map(|_| self.next_id()).collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids() {
        let mut id_gen = IdGenerator::new();
        assert_eq!(id_gen.next_id(), 1);
        assert_eq!(id_gen.next_id(), 2);
    }

    #[test]
    fn take_reserves_a_block() {
        let mut id_gen = IdGenerator::starting_from(40);
        assert_eq!(id_gen.take(3), vec![40, 41, 42]);
        assert_eq!(id_gen.next_id(), 43);
    }
}
