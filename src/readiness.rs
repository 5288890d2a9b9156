//! Readiness state machine: emit an event only after a file has stopped
//! changing for the configured stability window.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::model::FileObservationSnapshot;

/// Outcome of a readiness check for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

/// Decide readiness for the current observation given the previous
/// snapshot (if any) and the stability window.
///
/// | previous | window | size/mtime change | decision |
/// |----------|--------|--------------------|----------|
/// | none     | 0      | —                  | ready |
/// | none     | >0     | —                  | not ready (need baseline) |
/// | some     | any    | yes                | not ready; reset baseline = now |
/// | some     | W      | no, aged < W       | not ready; keep baseline |
/// | some     | W      | no, aged ≥ W       | ready |
///
/// Returns the decision plus the snapshot to store for next cycle. The
/// snapshot's `last_observed_utc` is the baseline: preserved when content is
/// unchanged so stable duration accumulates, reset to `now` on any change.
pub fn check_readiness(
    current_size: u64,
    current_mtime: DateTime<Utc>,
    previous: Option<&FileObservationSnapshot>,
    window: ChronoDuration,
    now: DateTime<Utc>,
) -> (Readiness, FileObservationSnapshot) {
    match previous {
        None => {
            let snapshot = FileObservationSnapshot {
                size: current_size,
                last_write_utc: current_mtime,
                first_observed_utc: now,
                last_observed_utc: now,
            };
            let readiness = if window <= ChronoDuration::zero() {
                Readiness::Ready
            } else {
                Readiness::NotReady
            };
            (readiness, snapshot)
        }
        Some(prev) => {
            let changed = prev.size != current_size || prev.last_write_utc != current_mtime;
            if changed {
                let snapshot = FileObservationSnapshot {
                    size: current_size,
                    last_write_utc: current_mtime,
                    first_observed_utc: prev.first_observed_utc,
                    last_observed_utc: now,
                };
                (Readiness::NotReady, snapshot)
            } else {
                let aged = now - prev.last_observed_utc;
                let snapshot = prev.clone();
                if aged >= window {
                    (Readiness::Ready, snapshot)
                } else {
                    (Readiness::NotReady, snapshot)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_with_zero_window_is_ready() {
        let now = Utc::now();
        let (readiness, _) = check_readiness(100, now, None, ChronoDuration::zero(), now);
        assert_eq!(readiness, Readiness::Ready);
    }

    #[test]
    fn first_observation_with_positive_window_is_not_ready() {
        let now = Utc::now();
        let (readiness, _) = check_readiness(100, now, None, ChronoDuration::seconds(2), now);
        assert_eq!(readiness, Readiness::NotReady);
    }

    #[test]
    fn size_change_resets_baseline_to_now() {
        let t0 = Utc::now();
        let previous = FileObservationSnapshot {
            size: 0,
            last_write_utc: t0,
            first_observed_utc: t0,
            last_observed_utc: t0,
        };
        let t1 = t0 + ChronoDuration::seconds(1);
        let (readiness, snapshot) =
            check_readiness(100, t1, Some(&previous), ChronoDuration::seconds(2), t1);
        assert_eq!(readiness, Readiness::NotReady);
        assert_eq!(snapshot.last_observed_utc, t1);
    }

    #[test]
    fn stable_for_full_window_becomes_ready() {
        let t0 = Utc::now();
        let previous = FileObservationSnapshot {
            size: 100,
            last_write_utc: t0,
            first_observed_utc: t0,
            last_observed_utc: t0,
        };
        let t1 = t0 + ChronoDuration::seconds(2);
        let (readiness, _) =
            check_readiness(100, t0, Some(&previous), ChronoDuration::seconds(2), t1);
        assert_eq!(readiness, Readiness::Ready);
    }

    #[test]
    fn stable_but_not_aged_enough_stays_not_ready() {
        let t0 = Utc::now();
        let previous = FileObservationSnapshot {
            size: 100,
            last_write_utc: t0,
            first_observed_utc: t0,
            last_observed_utc: t0,
        };
        let t1 = t0 + ChronoDuration::milliseconds(500);
        let (readiness, snapshot) =
            check_readiness(100, t0, Some(&previous), ChronoDuration::seconds(2), t1);
        assert_eq!(readiness, Readiness::NotReady);
        // baseline preserved, not reset to t1
        assert_eq!(snapshot.last_observed_utc, t0);
    }
}
