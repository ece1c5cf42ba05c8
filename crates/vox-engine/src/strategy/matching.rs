//! Matching pairs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Duration;

use super::{Elicitation, ExerciseStrategy, Frame, RenderContext, Subscriptions};
use crate::content::{Exercise, ExerciseKind, Pairs};
use crate::view::{Control, ListenerId, MountPoint, Tile, TileState, View, ViewBody};

/// One item of a column.
#[derive(Debug)]
struct Item {
    label: String,
    matched: bool,
    listener: Option<ListenerId>,
}

/// Two independently shuffled columns.
///
/// Selecting one item on each side is an attempt. A correct pair is locked
/// and its controls are released. A wrong pair is marked until the revert
/// timer fires, and no new attempt can start before that.
#[derive(Debug)]
pub struct MatchingStrategy {
    frame: Frame,
    pairs: Pairs,
    left: Vec<Item>,
    right: Vec<Item>,
    selected_left: Option<usize>,
    selected_right: Option<usize>,
    mismatch: Option<(usize, usize)>,
    revert_after: Duration,
    subs: Subscriptions,
}

impl MatchingStrategy {
    /// Mounts a matching exercise, shuffling both columns with `rng`.
    pub fn mount(
        exercise: &Exercise,
        ctx: &RenderContext,
        mount: &mut dyn MountPoint,
        rng: &mut StdRng,
    ) -> Self {
        let pairs = exercise.pairs.clone().unwrap_or_default();

        let mut left: Vec<String> = pairs.0.iter().map(|p| p.left.clone()).collect();
        let mut right: Vec<String> = pairs.0.iter().map(|p| p.right.clone()).collect();
        left.shuffle(rng);
        right.shuffle(rng);

        let mut subs = Subscriptions::default();
        let left = left
            .into_iter()
            .enumerate()
            .map(|(i, label)| Item {
                label,
                matched: false,
                listener: Some(subs.listen(mount, Control::Left(i))),
            })
            .collect();
        let right = right
            .into_iter()
            .enumerate()
            .map(|(i, label)| Item {
                label,
                matched: false,
                listener: Some(subs.listen(mount, Control::Right(i))),
            })
            .collect();

        let strategy = Self {
            frame: Frame::new(exercise, ExerciseKind::Matching, ctx),
            pairs,
            left,
            right,
            selected_left: None,
            selected_right: None,
            mismatch: None,
            revert_after: ctx.mismatch_revert,
            subs,
        };
        mount.present(strategy.view());
        strategy
    }

    fn all_matched(&self) -> bool {
        self.left.iter().all(|i| i.matched)
    }

    fn attempt(&mut self, mount: &mut dyn MountPoint) -> Elicitation {
        let (Some(l), Some(r)) = (self.selected_left, self.selected_right) else {
            mount.present(self.view());
            return Elicitation::Pending;
        };

        if self.pairs.matches(&self.left[l].label, &self.right[r].label) {
            self.selected_left = None;
            self.selected_right = None;
            for item in [&mut self.left[l], &mut self.right[r]] {
                item.matched = true;
                if let Some(id) = item.listener.take() {
                    self.subs.release(mount, id);
                }
            }
            mount.present(self.view());
            if self.all_matched() {
                Elicitation::SelfJudged(true)
            } else {
                Elicitation::Pending
            }
        } else {
            self.mismatch = Some((l, r));
            mount.present(self.view());
            Elicitation::Defer(self.revert_after)
        }
    }

    fn tiles(&self, items: &[Item], selected: Option<usize>, mismatched: Option<usize>) -> Vec<Tile> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let state = if item.matched {
                    TileState::Matched
                } else if mismatched == Some(i) {
                    TileState::Mismatched
                } else if selected == Some(i) {
                    TileState::Selected
                } else {
                    TileState::Idle
                };
                Tile::with_state(item.label.clone(), state)
            })
            .collect()
    }

    fn view(&self) -> View {
        let (mis_left, mis_right) = self.mismatch.map_or((None, None), |(l, r)| (Some(l), Some(r)));
        self.frame.view(
            ViewBody::Matching {
                left: self.tiles(&self.left, self.selected_left, mis_left),
                right: self.tiles(&self.right, self.selected_right, mis_right),
            },
            None,
        )
    }
}

impl ExerciseStrategy for MatchingStrategy {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Matching
    }

    fn on_action(&mut self, control: Control, mount: &mut dyn MountPoint) -> Elicitation {
        if self.mismatch.is_some() {
            return Elicitation::Pending;
        }
        match control {
            Control::Left(i) if self.left.get(i).is_some_and(|item| !item.matched) => {
                self.selected_left = Some(i);
                self.attempt(mount)
            }
            Control::Right(i) if self.right.get(i).is_some_and(|item| !item.matched) => {
                self.selected_right = Some(i);
                self.attempt(mount)
            }
            _ => Elicitation::Pending,
        }
    }

    fn on_timer(&mut self, mount: &mut dyn MountPoint) -> Elicitation {
        if self.mismatch.take().is_some() {
            self.selected_left = None;
            self.selected_right = None;
            mount.present(self.view());
        }
        Elicitation::Pending
    }

    fn teardown(&mut self, mount: &mut dyn MountPoint) {
        self.subs.release_all(mount);
        for item in self.left.iter_mut().chain(self.right.iter_mut()) {
            item.listener = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::content::Pair;
    use crate::view::RecordingMount;

    fn exercise() -> Exercise {
        Exercise::new("x1", ExerciseKind::Matching, "Match the animals").with_pairs(vec![
            Pair::new("perro", "dog"),
            Pair::new("gato", "cat"),
            Pair::new("pájaro", "bird"),
        ])
    }

    fn columns(mount: &RecordingMount) -> (Vec<Tile>, Vec<Tile>) {
        match exercise_view(mount).body {
            ViewBody::Matching { left, right } => (left, right),
            other => unreachable!("unexpected body {other:?}"),
        }
    }

    fn index_of(tiles: &[Tile], label: &str) -> usize {
        tiles.iter().position(|t| t.label == label).unwrap()
    }

    #[test]
    fn test_correct_pair_locks_and_releases_controls() {
        let mut mount = RecordingMount::new();
        let mut strategy = MatchingStrategy::mount(&exercise(), &ctx(), &mut mount, &mut rng());
        assert_eq!(mount.listeners().len(), 6);

        let (left, right) = columns(&mount);
        let l = index_of(&left, "perro");
        let r = index_of(&right, "dog");

        assert_eq!(strategy.on_action(Control::Left(l), &mut mount), Elicitation::Pending);
        assert_eq!(strategy.on_action(Control::Right(r), &mut mount), Elicitation::Pending);

        let (left, right) = columns(&mount);
        assert_eq!(left[l].state, TileState::Matched);
        assert_eq!(right[r].state, TileState::Matched);
        assert_eq!(mount.listeners().len(), 4);
        assert!(!mount.listeners().contains(Control::Left(l)));
    }

    #[test]
    fn test_mismatch_defers_and_blocks_until_revert() {
        let mut mount = RecordingMount::new();
        let mut strategy = MatchingStrategy::mount(&exercise(), &ctx(), &mut mount, &mut rng());

        let (left, right) = columns(&mount);
        let l = index_of(&left, "perro");
        let r = index_of(&right, "cat");
        strategy.on_action(Control::Left(l), &mut mount);
        assert_eq!(
            strategy.on_action(Control::Right(r), &mut mount),
            Elicitation::Defer(Duration::from_millis(600))
        );

        let (left, right) = columns(&mount);
        assert_eq!(left[l].state, TileState::Mismatched);
        assert_eq!(right[r].state, TileState::Mismatched);

        let other = index_of(&left, "gato");
        assert_eq!(strategy.on_action(Control::Left(other), &mut mount), Elicitation::Pending);
        assert_eq!(columns(&mount).0[other].state, TileState::Idle);

        strategy.on_timer(&mut mount);
        let (left, right) = columns(&mount);
        assert!(left.iter().chain(right.iter()).all(|t| t.state == TileState::Idle));
    }

    #[test]
    fn test_all_pairs_matched_self_judges() {
        let mut mount = RecordingMount::new();
        let mut strategy = MatchingStrategy::mount(&exercise(), &ctx(), &mut mount, &mut rng());

        let mut last = Elicitation::Pending;
        for (es, en) in [("perro", "dog"), ("gato", "cat"), ("pájaro", "bird")] {
            let (left, right) = columns(&mount);
            strategy.on_action(Control::Right(index_of(&right, en)), &mut mount);
            last = strategy.on_action(Control::Left(index_of(&left, es)), &mut mount);
        }
        assert_eq!(last, Elicitation::SelfJudged(true));
        assert!(mount.listeners().is_empty());
    }

    #[test]
    fn test_teardown_releases_remaining() {
        let mut mount = RecordingMount::new();
        let mut strategy = MatchingStrategy::mount(&exercise(), &ctx(), &mut mount, &mut rng());
        strategy.teardown(&mut mount);
        strategy.teardown(&mut mount);
        assert!(mount.listeners().is_empty());
    }
}
