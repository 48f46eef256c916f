//! Inbound anti-abuse: per-subscriber command rate limiting.
//!
//! Protects the bot identity from command floods before any handler runs:
//! a burst cap per minute, an hourly cap, a short cooldown between
//! commands, and a soft warning once the same command repeats enough times
//! in a row.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Commands allowed per rolling minute.
const MAX_PER_MINUTE: usize = 10;
/// Commands allowed per rolling hour.
const MAX_PER_HOUR: usize = 50;
/// Minimum gap between two commands.
const COOLDOWN: Duration = Duration::from_secs(2);
/// Identical commands in a row that trigger the soft warning.
const IDENTICAL_STREAK_WARN: u32 = 5;

/// Limiter verdict for one inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Handle the command.
    Allow,
    /// Handle it, but attach a soft warning about repetition.
    AllowWithWarning(String),
    /// Reject with a short explanation for the user.
    Reject(String),
}

#[derive(Default)]
struct UserState {
    timestamps: VecDeque<Instant>,
    last_command: Option<(String, Instant)>,
    identical_streak: u32,
}

/// Per-subscriber inbound rate limiter. One instance per process.
#[derive(Default)]
pub struct InboundLimiter {
    users: Mutex<HashMap<i64, UserState>>,
}

impl InboundLimiter {
    /// Fresh limiter with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Judge one command from one user.
    pub fn check(&self, user_id: i64, command: &str) -> Verdict {
        self.check_at(user_id, command, Instant::now())
    }

    fn check_at(&self, user_id: i64, command: &str, now: Instant) -> Verdict {
        let Ok(mut users) = self.users.lock() else {
            return Verdict::Allow;
        };
        let state = users.entry(user_id).or_default();

        if let Some((last_cmd, last_at)) = &state.last_command {
            let since = now.duration_since(*last_at);
            if since < COOLDOWN {
                let wait = (COOLDOWN - since).as_secs().max(1);
                tracing::warn!(user_id, command, "command cooldown hit");
                return Verdict::Reject(format!(
                    "⏳ Пожалуйста, подождите {wait} сек. перед следующей командой."
                ));
            }
            if last_cmd == command {
                state.identical_streak += 1;
            } else {
                state.identical_streak = 0;
            }
        }

        // Drop entries older than an hour, then apply both caps.
        while let Some(front) = state.timestamps.front() {
            if now.duration_since(*front) > Duration::from_secs(3600) {
                state.timestamps.pop_front();
            } else {
                break;
            }
        }
        if state.timestamps.len() >= MAX_PER_HOUR {
            tracing::warn!(user_id, "hourly command limit hit");
            return Verdict::Reject(
                "⚠️ Вы превысили лимит запросов. Попробуйте позже.".to_string(),
            );
        }
        let last_minute = state
            .timestamps
            .iter()
            .filter(|t| now.duration_since(**t) <= Duration::from_secs(60))
            .count();
        if last_minute >= MAX_PER_MINUTE {
            tracing::warn!(user_id, "per-minute command limit hit");
            return Verdict::Reject("⏳ Слишком много запросов. Подождите минуту.".to_string());
        }

        state.timestamps.push_back(now);
        state.last_command = Some((command.to_string(), now));

        if state.identical_streak + 1 >= IDENTICAL_STREAK_WARN {
            return Verdict::AllowWithWarning(
                "🤖 Похоже, вы повторяете одну и ту же команду. Нужна помощь — /filters."
                    .to_string(),
            );
        }
        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn cooldown_rejects_rapid_commands() {
        let limiter = InboundLimiter::new();
        let t0 = Instant::now();
        assert_eq!(limiter.check_at(1, "/check", t0), Verdict::Allow);
        assert!(matches!(
            limiter.check_at(1, "/check", t0 + Duration::from_millis(500)),
            Verdict::Reject(_)
        ));
        assert_eq!(limiter.check_at(1, "/filters", advance(t0, 3)), Verdict::Allow);
    }

    #[test]
    fn eleventh_command_in_a_minute_is_rejected() {
        let limiter = InboundLimiter::new();
        let t0 = Instant::now();
        for i in 0..10 {
            let verdict = limiter.check_at(1, &format!("/cmd{i}"), advance(t0, i * 3));
            assert!(matches!(verdict, Verdict::Allow | Verdict::AllowWithWarning(_)));
        }
        assert!(matches!(
            limiter.check_at(1, "/cmd10", advance(t0, 32)),
            Verdict::Reject(_)
        ));
    }

    #[test]
    fn identical_streak_triggers_warning() {
        let limiter = InboundLimiter::new();
        let t0 = Instant::now();
        let mut warned = false;
        for i in 0..5 {
            match limiter.check_at(7, "/check", advance(t0, i * 5)) {
                Verdict::AllowWithWarning(_) => warned = true,
                Verdict::Allow => {}
                Verdict::Reject(r) => panic!("unexpected reject: {r}"),
            }
        }
        assert!(warned);
    }

    #[test]
    fn users_are_limited_independently() {
        let limiter = InboundLimiter::new();
        let t0 = Instant::now();
        assert_eq!(limiter.check_at(1, "/check", t0), Verdict::Allow);
        assert_eq!(limiter.check_at(2, "/check", t0), Verdict::Allow);
    }
}
