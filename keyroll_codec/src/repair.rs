// Consistency repair for symbol sequences that did not come from real data.
//
// A decoded note sequence from an external predictor can release keys that
// are not held or press keys that already are, and its speed symbols need
// not match the number of presses. The repairer walks the sequence once with
// one hold counter per key and fixes both problems:
//
// 1. `counter[k] += action[k]`
// 2. counter < 0: the release hit an unheld key, so it is cancelled.
// 3. counter > 1: the press hit a held key, so it is cancelled.
// 4. The counter is clamped back to {0, 1}. Only the binary held flag is
//    tracked here; hold duration is the business of `held.rs`.
// 5. Velocities: if the decoded velocity list has exactly one entry per
//    surviving press, entries are assigned in ascending key order.
//    Otherwise every press gets the list's rounded mean (0 if empty).
//
// Repair never fails. Every input, however implausible, yields a roll in
// which every counter stays in {0, 1} and every press carries exactly one
// velocity. Running repair over its own output changes nothing.

use crate::roll::{Cell, KeyAction, NUM_KEYS, NoteVector, PianoRoll, Row, SpeedVector};
use tracing::debug;

/// What a repair pass had to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub cancelled_releases: usize,
    pub cancelled_presses: usize,
    /// Steps with presses whose velocity list length did not match the
    /// press count.
    pub mean_fallbacks: usize,
}

/// Output of a repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedRoll {
    pub roll: PianoRoll,
    pub stats: RepairStats,
}

/// The per-key hold-counter state machine.
#[derive(Debug, Clone)]
pub struct Repairer {
    counters: [i32; NUM_KEYS],
    stats: RepairStats,
}

impl Default for Repairer {
    fn default() -> Self {
        Self::new()
    }
}

impl Repairer {
    /// All keys start released.
    pub fn new() -> Self {
        Self {
            counters: [0; NUM_KEYS],
            stats: RepairStats::default(),
        }
    }

    /// Current hold flags, each 0 or 1.
    pub fn counters(&self) -> &[i32; NUM_KEYS] {
        &self.counters
    }

    pub fn stats(&self) -> RepairStats {
        self.stats
    }

    /// Correct one timestep and advance the counters.
    pub fn step(&mut self, notes: &NoteVector, speeds: &SpeedVector) -> Row {
        let mut actions = *notes.actions();

        for (action, counter) in actions.iter_mut().zip(self.counters.iter_mut()) {
            *counter += i32::from(action.as_i8());
            if *counter < 0 {
                *action = KeyAction::Idle;
                *counter = 0;
                self.stats.cancelled_releases += 1;
            } else if *counter > 1 {
                *action = KeyAction::Idle;
                *counter = 1;
                self.stats.cancelled_presses += 1;
            }
        }

        let pressed = actions.iter().filter(|&&a| a == KeyAction::Press).count();
        let positional = speeds.len() == pressed;
        let mean = if positional {
            0
        } else {
            if pressed > 0 {
                self.stats.mean_fallbacks += 1;
            }
            speeds.rounded_mean()
        };

        let mut given = speeds.velocities().iter().copied();
        actions.map(|action| match action {
            KeyAction::Press if positional => Cell::press(given.next().unwrap_or(0)),
            KeyAction::Press => Cell::press(mean),
            KeyAction::Release => Cell::release(),
            KeyAction::Idle => Cell::idle(),
        })
    }

    /// Repair a whole decoded sequence with a fresh state machine.
    ///
    /// Steps past the end of `speeds` are treated as having an empty
    /// velocity list.
    pub fn repair(notes: &[NoteVector], speeds: &[SpeedVector]) -> RepairedRoll {
        let mut repairer = Repairer::new();
        let empty = SpeedVector::default();
        let rows = notes
            .iter()
            .enumerate()
            .map(|(t, v)| repairer.step(v, speeds.get(t).unwrap_or(&empty)))
            .collect();
        let stats = repairer.stats();
        debug!(
            steps = notes.len(),
            cancelled_releases = stats.cancelled_releases,
            cancelled_presses = stats.cancelled_presses,
            mean_fallbacks = stats.mean_fallbacks,
            "repaired symbol sequence"
        );
        RepairedRoll {
            roll: PianoRoll::from_rows(rows),
            stats,
        }
    }
}

impl RepairedRoll {
    /// Run repair again over this roll's own projections.
    pub fn repair_again(&self) -> RepairedRoll {
        Repairer::repair(&self.roll.note_vectors(), &self.roll.speed_vectors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::KeyAction::{Idle, Press, Release};

    fn speeds(v: &[u8]) -> SpeedVector {
        SpeedVector::new(v.to_vec())
    }

    /// A deterministic but irregular sequence touching the first 12 keys.
    fn scrambled_sequence(len: usize) -> (Vec<NoteVector>, Vec<SpeedVector>) {
        let mut notes = Vec::new();
        let mut vels = Vec::new();
        for t in 0..len {
            let mut v = NoteVector::idle();
            for k in 0..12 {
                let action = match (t * 7 + k * 3 + t * k) % 5 {
                    0 => Press,
                    1 => Release,
                    _ => Idle,
                };
                v.set(k, action);
            }
            notes.push(v);
            let n = (t * 5) % 4;
            vels.push(speeds(&(0..n).map(|i| 30 + (i * 17 + t) as u8 % 90).collect::<Vec<_>>()));
        }
        (notes, vels)
    }

    #[test]
    fn release_of_unheld_key_is_cancelled() {
        let notes = [NoteVector::with(&[(40, Release)])];
        let out = Repairer::repair(&notes, &[speeds(&[])]);
        assert_eq!(out.roll.cell(0, 40), Cell::idle());
        assert_eq!(out.stats.cancelled_releases, 1);
    }

    #[test]
    fn second_press_without_release_is_cancelled() {
        let notes = [
            NoteVector::with(&[(10, Press)]),
            NoteVector::with(&[(10, Press)]),
        ];
        let mut repairer = Repairer::new();
        let first = repairer.step(&notes[0], &speeds(&[64]));
        assert_eq!(first[10], Cell::press(64));
        assert_eq!(repairer.counters()[10], 1);

        let second = repairer.step(&notes[1], &speeds(&[64]));
        assert_eq!(second[10], Cell::idle());
        assert_eq!(repairer.counters()[10], 1);
        assert_eq!(repairer.stats().cancelled_presses, 1);
    }

    #[test]
    fn velocity_count_mismatch_falls_back_to_rounded_mean() {
        let notes = [NoteVector::with(&[(3, Press), (9, Press)])];
        let out = Repairer::repair(&notes, &[speeds(&[60, 70, 81])]);
        assert_eq!(out.roll.cell(0, 3), Cell::press(70));
        assert_eq!(out.roll.cell(0, 9), Cell::press(70));
        assert_eq!(out.stats.mean_fallbacks, 1);

        // Too few velocities falls back the same way.
        let out = Repairer::repair(&notes, &[speeds(&[51])]);
        assert_eq!(out.roll.cell(0, 3), Cell::press(51));
        assert_eq!(out.roll.cell(0, 9), Cell::press(51));
    }

    #[test]
    fn matching_velocity_count_assigns_in_key_order() {
        let notes = [NoteVector::with(&[(50, Press), (2, Press), (20, Press)])];
        let out = Repairer::repair(&notes, &[speeds(&[11, 22, 33])]);
        assert_eq!(out.roll.cell(0, 2).velocity, 11);
        assert_eq!(out.roll.cell(0, 20).velocity, 22);
        assert_eq!(out.roll.cell(0, 50).velocity, 33);
        assert_eq!(out.stats.mean_fallbacks, 0);
    }

    #[test]
    fn cancelled_press_shrinks_the_press_count() {
        // Key 5 is held, so its press is cancelled and only key 6 remains:
        // two velocities for one press means the mean is used.
        let notes = [
            NoteVector::with(&[(5, Press)]),
            NoteVector::with(&[(5, Press), (6, Press)]),
        ];
        let out = Repairer::repair(&notes, &[speeds(&[90]), speeds(&[40, 80])]);
        assert_eq!(out.roll.cell(1, 5), Cell::idle());
        assert_eq!(out.roll.cell(1, 6), Cell::press(60));
    }

    #[test]
    fn empty_velocity_list_gives_zero() {
        let notes = [NoteVector::with(&[(0, Press)])];
        let out = Repairer::repair(&notes, &[]);
        assert_eq!(out.roll.cell(0, 0), Cell::press(0));
    }

    #[test]
    fn counters_stay_binary_and_presses_match_velocities() {
        let (notes, vels) = scrambled_sequence(200);
        let mut repairer = Repairer::new();
        for (v, s) in notes.iter().zip(&vels) {
            let row = repairer.step(v, s);
            assert!(repairer.counters().iter().all(|&c| c == 0 || c == 1));

            let pressed = row.iter().filter(|c| c.action == Press).count();
            let with_velocity = row.iter().filter(|c| c.velocity != 0).count();
            if !s.is_empty() {
                assert_eq!(pressed, with_velocity);
            }
            assert!(row.iter().all(|c| c.action == Press || c.velocity == 0));
        }
    }

    #[test]
    fn repaired_roll_never_releases_unheld_or_repeats_presses() {
        let (notes, vels) = scrambled_sequence(300);
        let out = Repairer::repair(&notes, &vels);
        let mut held = [false; NUM_KEYS];
        for row in out.roll.rows() {
            for (k, cell) in row.iter().enumerate() {
                match cell.action {
                    Press => {
                        assert!(!held[k]);
                        held[k] = true;
                    }
                    Release => {
                        assert!(held[k]);
                        held[k] = false;
                    }
                    Idle => {}
                }
            }
        }
    }

    #[test]
    fn repair_is_idempotent() {
        let (notes, vels) = scrambled_sequence(300);
        let once = Repairer::repair(&notes, &vels);
        let twice = once.repair_again();
        assert_eq!(twice.roll, once.roll);
        assert_eq!(twice.stats.cancelled_presses, 0);
        assert_eq!(twice.stats.cancelled_releases, 0);
    }

    #[test]
    fn same_press_count_and_speeds_give_same_velocities() {
        let s = speeds(&[20, 100]);
        let a = Repairer::new().step(&NoteVector::with(&[(1, Press), (2, Press), (3, Press)]), &s);
        let b = Repairer::new().step(&NoteVector::with(&[(7, Press), (8, Press), (9, Press)]), &s);
        let va: Vec<u8> = a.iter().map(|c| c.velocity).filter(|&v| v != 0).collect();
        let vb: Vec<u8> = b.iter().map(|c| c.velocity).filter(|&v| v != 0).collect();
        assert_eq!(va, vec![60, 60, 60]);
        assert_eq!(va, vb);
    }
}
