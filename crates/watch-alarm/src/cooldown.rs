use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

/// Last dispatch time plus the minimum gap between dispatches.
/// `last_fired == None` means the alarm has never fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmState {
    pub last_fired: Option<Instant>,
    pub cooldown: Duration,
}

impl AlarmState {
    pub fn new(cooldown: Duration) -> Self {
        Self { last_fired: None, cooldown }
    }
}

impl Default for AlarmState {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Decides whether this frame raises the alarm.
///
/// Fires when a drowning detection is present and strictly more than `cooldown`
/// has elapsed since the last dispatch (or nothing was ever dispatched). A
/// detection exactly at the boundary is suppressed. On fire the returned state
/// carries `last_fired = now`; otherwise the input state comes back unchanged.
pub fn maybe_alarm(has_drowning: bool, now: Instant, state: AlarmState) -> (bool, AlarmState) {
    if !has_drowning {
        return (false, state);
    }
    let elapsed_ok = match state.last_fired {
        None => true,
        // checked_duration_since is None when `now` precedes the last fire
        Some(t) => now.checked_duration_since(t).is_some_and(|d| d > state.cooldown),
    };
    if !elapsed_ok {
        return (false, state);
    }
    (true, AlarmState { last_fired: Some(now), ..state })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    fn run(cooldown: Duration, calls: &[(bool, f64)]) -> Vec<bool> {
        let base = Instant::now();
        let mut st = AlarmState::new(cooldown);
        calls
            .iter()
            .map(|&(det, t)| {
                let (fires, next) = maybe_alarm(det, at(base, t), st);
                st = next;
                fires
            })
            .collect()
    }

    #[test]
    fn first_detection_fires() {
        let base = Instant::now();
        let (fires, st) = maybe_alarm(true, base, AlarmState::default());
        assert!(fires);
        assert_eq!(st.last_fired, Some(base));
        assert_eq!(st.cooldown, DEFAULT_COOLDOWN);
    }

    #[test]
    fn cooldown_boundary() {
        let fired = run(DEFAULT_COOLDOWN, &[(true, 0.0), (true, 1.9), (true, 2.1)]);
        assert_eq!(fired, vec![true, false, true]);
    }

    #[test]
    fn exact_boundary_is_suppressed() {
        let fired = run(DEFAULT_COOLDOWN, &[(true, 0.0), (true, 2.0), (true, 2.0001)]);
        assert_eq!(fired, vec![true, false, true]);
    }

    #[test]
    fn no_detection_never_fires_or_mutates() {
        let base = Instant::now();
        let mut st = AlarmState::default();
        for i in 0..50 {
            let (fires, next) = maybe_alarm(false, at(base, i as f64 * 0.7), st);
            assert!(!fires);
            assert_eq!(next, st);
            st = next;
        }
        assert_eq!(st.last_fired, None);
    }

    #[test]
    fn fire_gaps_exceed_cooldown() {
        let base = Instant::now();
        let cooldown = Duration::from_millis(2000);
        let mut st = AlarmState::new(cooldown);
        let mut fired_at = Vec::new();
        // 30 fps for 10 s, every frame a detection
        for frame in 0..300u64 {
            let now = base + Duration::from_millis(frame * 33);
            let (fires, next) = maybe_alarm(true, now, st);
            assert!(next.last_fired >= st.last_fired);
            st = next;
            if fires {
                fired_at.push(now);
            }
        }
        assert!(fired_at.len() >= 4);
        for w in fired_at.windows(2) {
            assert!(w[1] - w[0] > cooldown);
        }
    }

    #[test]
    fn mixed_sequence_only_detections_count() {
        let fired = run(
            DEFAULT_COOLDOWN,
            &[(false, 0.0), (true, 0.5), (false, 1.0), (true, 2.4), (true, 2.6)],
        );
        assert_eq!(fired, vec![false, true, false, false, true]);
    }

    #[test]
    fn zero_cooldown_fires_on_any_later_instant() {
        let fired = run(Duration::ZERO, &[(true, 0.0), (true, 0.0), (true, 0.001)]);
        assert_eq!(fired, vec![true, false, true]);
    }

    #[test]
    fn clock_going_backwards_never_fires() {
        let base = Instant::now() + Duration::from_secs(10);
        let (_, st) = maybe_alarm(true, base, AlarmState::default());
        let (fires, after) = maybe_alarm(true, base - Duration::from_secs(5), st);
        assert!(!fires);
        assert_eq!(after, st);
    }
}
