use core::fmt;
use std::fmt::{Display, Formatter};

/// Stage of the thermal profile, by elapsed share of the task duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the start time.
    Pending,
    /// [0, 1/8)
    Beginning,
    /// [1/8, 1/4)
    ConsiderCooling,
    /// [1/4, 3/4)
    ConsiderAdjusting,
    /// [3/4, 1)
    Adjusting,
    /// [1, 5/4]
    Finishing,
    /// Past 5/4.
    Overrun,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Pending => "pending",
            Phase::Beginning => "beginning",
            Phase::ConsiderCooling => "consider cooling",
            Phase::ConsiderAdjusting => "consider adjusting",
            Phase::Adjusting => "adjusting",
            Phase::Finishing => "finishing",
            Phase::Overrun => "overrun",
        };
        f.write_str(name)
    }
}

/// Phase of a task that started at `start` and lasts `duration` seconds.
pub fn phase_at(start: i64, duration: i64, now: i64) -> Phase {
    let elapsed = i128::from(now) - i128::from(start);
    let duration = i128::from(duration);
    if elapsed < 0 {
        Phase::Pending
    } else if 8 * elapsed < duration {
        Phase::Beginning
    } else if 4 * elapsed < duration {
        Phase::ConsiderCooling
    } else if 4 * elapsed < 3 * duration {
        Phase::ConsiderAdjusting
    } else if elapsed < duration {
        Phase::Adjusting
    } else if 4 * elapsed <= 5 * duration {
        Phase::Finishing
    } else {
        Phase::Overrun
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fraction_maps_to_one_phase() {
        let duration = 1000;
        let cases = [
            (0, Phase::Beginning),
            (124, Phase::Beginning),
            (125, Phase::ConsiderCooling),
            (260, Phase::ConsiderAdjusting),
            (760, Phase::Adjusting),
            (1000, Phase::Finishing),
            (1240, Phase::Finishing),
            (1250, Phase::Finishing),
            (1260, Phase::Overrun),
        ];
        for (elapsed, expected) in cases {
            assert_eq!(phase_at(5_000, duration, 5_000 + elapsed), expected, "elapsed {elapsed}");
        }
    }

    #[test]
    fn boundaries_belong_to_the_later_phase() {
        assert_eq!(phase_at(0, 800, 100), Phase::ConsiderCooling);
        assert_eq!(phase_at(0, 800, 200), Phase::ConsiderAdjusting);
        assert_eq!(phase_at(0, 800, 600), Phase::Adjusting);
        assert_eq!(phase_at(0, 800, 799), Phase::Adjusting);
    }

    #[test]
    fn before_start_is_pending() {
        assert_eq!(phase_at(100, 1000, 99), Phase::Pending);
    }

    #[test]
    fn whole_timeline_is_covered_in_order() {
        let mut last = Phase::Pending;
        let order = |p: Phase| p as u8;
        for now in -10..1400 {
            let p = phase_at(0, 1000, now);
            assert!(order(p) >= order(last), "phase went back at {now}");
            last = p;
        }
        assert_eq!(last, Phase::Overrun);
    }
}
