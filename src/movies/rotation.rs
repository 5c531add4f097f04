//! Tracks which movie is up next.

use std::path::Path;

use rand::{rngs::StdRng, Rng};

use super::registry::{self, MovieEntry};
use crate::settings::OpeningMovie;

pub struct RotationState {
    entries: Vec<MovieEntry>,
    index: usize,
    shuffle_order: bool,
    rng: StdRng,
}

impl RotationState {
    /// Builds a new rotation from the configured slots. The rotation starts at the first entry.
    pub fn build(
        slots: &[OpeningMovie],
        shuffle_order: bool,
        path_exists: impl Fn(&Path) -> bool,
        movies_dir: &Path,
        mut rng: StdRng,
    ) -> RotationState {
        let entries = registry::build(slots, shuffle_order, path_exists, movies_dir, &mut rng);

        RotationState {
            entries,
            index: 0,
            shuffle_order,
            rng,
        }
    }

    /// Moves the starting point to a random entry. Used once when the game starts so that the
    /// first movie isn't always the head of the list.
    pub fn randomise_start(&mut self) {
        self.index = self.rng.gen_range(0..self.entries.len());
        log::debug!("Spinning the wheel: landed on movie index {}", self.index);
    }

    /// The entry that will be played next.
    pub fn current(&self) -> &MovieEntry {
        &self.entries[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[MovieEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub(crate) fn entries_mut(&mut self) -> &mut Vec<MovieEntry> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Moves on to the next movie. When every movie has been played, the list is shuffled again
    /// if shuffling is enabled.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.entries.len();

        if self.index == 0 && self.shuffle_order && self.entries.len() > 1 {
            registry::shuffle(&mut self.entries, &mut self.rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const ALL: [OpeningMovie; 4] = [
        OpeningMovie::FullMoonFullLife,
        OpeningMovie::BurnMyDread,
        OpeningMovie::P3Fes,
        OpeningMovie::SoulPhrase,
    ];

    fn rotation(slots: &[OpeningMovie], shuffle_order: bool, seed: u64) -> RotationState {
        RotationState::build(
            slots,
            shuffle_order,
            |_| true,
            Path::new("Movies"),
            StdRng::seed_from_u64(seed),
        )
    }

    fn order(state: &RotationState) -> Vec<OpeningMovie> {
        state.entries().iter().map(|entry| entry.movie).collect()
    }

    #[test]
    fn cycles_in_order() {
        let mut state = rotation(&ALL[..3], false, 0);
        let mut played = vec![];

        for _ in 0..7 {
            played.push(state.index());
            state.advance();
        }

        assert_eq!(played, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn returns_to_start_after_a_full_cycle() {
        for shuffle_order in [false, true] {
            let mut state = rotation(&ALL, shuffle_order, 11);
            state.randomise_start();

            let start = state.index();

            for _ in 0..state.len() {
                state.advance();
            }

            assert_eq!(state.index(), start);
            assert_eq!(state.len(), 4);
        }
    }

    #[test]
    fn order_is_stable_across_wraps_without_shuffle() {
        let mut state = rotation(&ALL, false, 0);
        let before = order(&state);

        for _ in 0..(state.len() * 5) {
            state.advance();
            assert_eq!(order(&state), before);
        }
    }

    #[test]
    fn wrapping_reshuffles_when_enabled() {
        let mut state = rotation(&ALL, true, 5);
        let mut seen = std::collections::HashSet::new();
        seen.insert(order(&state));

        for _ in 0..30 {
            let before = order(&state);

            // The order may only change when we wrap back to the start.
            for _ in 0..(state.len() - 1) {
                state.advance();
                assert_eq!(order(&state), before);
            }

            state.advance();
            assert_eq!(state.index(), 0);

            let mut sorted = order(&state);
            let mut expected = before.clone();
            sorted.sort_by_key(|movie| movie.to_string());
            expected.sort_by_key(|movie| movie.to_string());
            assert_eq!(sorted, expected);

            seen.insert(order(&state));
        }

        assert!(seen.len() > 1);
    }

    #[test]
    fn single_entry_never_moves() {
        let mut state = rotation(&[OpeningMovie::None; 4], true, 1);
        assert_eq!(state.entries(), &[MovieEntry::builtin()]);

        state.randomise_start();
        assert_eq!(state.index(), 0);

        for _ in 0..3 {
            state.advance();
            assert_eq!(state.index(), 0);
            assert_eq!(state.current(), &MovieEntry::builtin());
        }
    }

    #[test]
    fn random_start_stays_in_range() {
        for seed in 0..32 {
            let mut state = rotation(&ALL[..2], true, seed);
            state.randomise_start();
            assert!(state.index() < state.len());
        }
    }
}
