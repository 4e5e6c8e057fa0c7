//! Fixed-size bitset over the 256 state slots of a core.

use crate::core::StateId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSet {
    words: [u64; 4],
}

impl StateSet {
    pub const fn new() -> Self {
        Self { words: [0; 4] }
    }

    fn locate(state: StateId) -> (usize, u64) {
        let index = state.index();
        (index / 64, 1u64 << (index % 64))
    }

    /// Returns `true` if the state was not already present.
    pub fn insert(&mut self, state: StateId) -> bool {
        let (word, bit) = Self::locate(state);
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }

    /// Returns `true` if the state was present.
    pub fn remove(&mut self, state: StateId) -> bool {
        let (word, bit) = Self::locate(state);
        let present = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        present
    }

    pub fn contains(&self, state: StateId) -> bool {
        let (word, bit) = Self::locate(state);
        self.words[word] & bit != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = StateId> + '_ {
        StateId::all().filter(move |&s| self.contains(s))
    }
}

impl FromIterator<StateId> for StateSet {
    fn from_iter<I: IntoIterator<Item = StateId>>(iter: I) -> Self {
        let mut set = StateSet::new();
        for state in iter {
            set.insert(state);
        }
        set
    }
}
