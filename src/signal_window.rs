// =============================================================================
// Signal Window Gate — scheduled time-of-day windows for new entries
// =============================================================================
//
// New signals may only open inside one of six 60-minute UTC windows, each
// starting 30 minutes after a 4-hour boundary:
//
//   00:30–01:30, 04:30–05:30, 08:30–09:30,
//   12:30–13:30, 16:30–17:30, 20:30–21:30
//
// Lower bounds are inclusive, upper bounds exclusive.  The gate is evaluated
// against the instant it is called with; callers must not reuse a timestamp
// taken at the start of a long evaluation cycle.
// =============================================================================

use chrono::{DateTime, Timelike, Utc};

/// `[start, end)` windows expressed in minutes since UTC midnight.
pub const SIGNAL_WINDOWS: [(u32, u32); 6] = [
    (30, 90),
    (270, 330),
    (510, 570),
    (750, 810),
    (990, 1050),
    (1230, 1290),
];

/// Whether `minute_of_day` falls inside one of the signal windows.
pub fn minute_in_window(minute_of_day: u32) -> bool {
    SIGNAL_WINDOWS
        .iter()
        .any(|&(start, end)| (start..end).contains(&minute_of_day))
}

/// Whether `at` falls inside one of the signal windows.
pub fn is_signal_window(at: DateTime<Utc>) -> bool {
    minute_in_window(at.hour() * 60 + at.minute())
}

/// Gate check against the current wall clock.
pub fn in_signal_window_now() -> bool {
    is_signal_window(Utc::now())
}
