//! Per-user statistics for admin and player queries.

use std::fmt;

use playclock_model::{CurrencyConfig, CurrencyId, UserId, UserState};

/// A user's playtime and reward progress.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    /// The user.
    pub user: UserId,
    /// Name from the host, if it knows one.
    pub display_name: Option<String>,
    /// Lifetime active seconds.
    pub total_active_secs: u64,
    /// Active seconds since the last period reset.
    pub period_active_secs: u64,
    /// Connected right now.
    pub connected: bool,
    /// Progress towards each configured currency.
    pub currencies: Vec<CurrencyProgress>,
}

/// Progress towards the next grant of one currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyProgress {
    /// The currency.
    pub currency: CurrencyId,
    /// Display symbol.
    pub symbol: String,
    /// Total active seconds at the last grant, `None` before the first
    /// evaluation.
    pub checkpoint: Option<u64>,
    /// Active seconds still needed. `None` until the checkpoint exists.
    pub secs_until_next: Option<u64>,
}

impl PlayerStats {
    pub(crate) fn new(
        user: UserId,
        display_name: Option<String>,
        connected: bool,
        state: &UserState,
        currencies: &[CurrencyConfig],
    ) -> Self {
        let currencies = currencies
            .iter()
            .map(|config| CurrencyProgress {
                currency: config.id.clone(),
                symbol: config.symbol.clone(),
                checkpoint: state.checkpoint(config.id.as_str()),
                secs_until_next: state
                    .secs_since_checkpoint(config.id.as_str())
                    .map(|since| config.reward_interval_secs.saturating_sub(since)),
            })
            .collect();

        Self {
            user,
            display_name,
            total_active_secs: state.total_active_secs,
            period_active_secs: state.period_active_secs,
            connected,
            currencies,
        }
    }

    /// Total time as `1d 2h 3m 4s`.
    pub fn formatted_total(&self) -> String {
        format_duration(self.total_active_secs)
    }

    /// Period time as `1d 2h 3m 4s`.
    pub fn formatted_period(&self) -> String {
        format_duration(self.period_active_secs)
    }
}

impl fmt::Display for PlayerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => writeln!(f, "=== Stats for {name} ===")?,
            None => writeln!(f, "=== Stats for {} ===", self.user)?,
        }
        writeln!(f, "Total time: {}", self.formatted_total())?;
        write!(f, "Period time: {}", self.formatted_period())?;
        for progress in &self.currencies {
            match progress.secs_until_next {
                Some(secs) => write!(
                    f,
                    "\nNext {}: in {}",
                    progress.symbol,
                    format_duration(secs)
                )?,
                None => write!(f, "\nNext {}: not started", progress.symbol)?,
            }
        }
        Ok(())
    }
}

/// Formats seconds as `1d 2h 3m 4s`, omitting leading zero units.
///
/// ```rust
/// use playclock::format_duration;
///
/// assert_eq!(format_duration(0), "0s");
/// assert_eq!(format_duration(3_725), "1h 2m 5s");
/// assert_eq!(format_duration(86_400), "1d 0h 0m 0s");
/// ```
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_seconds_only() {
        assert_eq!(format_duration(59), "59s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(754), "12m 34s");
    }

    #[test]
    fn test_format_duration_days() {
        assert_eq!(format_duration(93_784), "1d 2h 3m 4s");
    }

    #[test]
    fn test_stats_time_until_next_reward() {
        let gold = CurrencyConfig::new("gold", 3_600, 5.0).unwrap();
        let gems = CurrencyConfig::new("gems", 600, 1.0).unwrap();
        let mut state = UserState::new();
        state.total_active_secs = 4_000;
        state.reward_checkpoints.insert(CurrencyId::from("gold"), 1_000);

        let user = UserId(uuid::Uuid::from_u128(3));
        let stats = PlayerStats::new(user, None, true, &state, &[gold, gems]);

        assert_eq!(stats.currencies[0].secs_until_next, Some(600));
        assert_eq!(stats.currencies[1].checkpoint, None);
        assert_eq!(stats.currencies[1].secs_until_next, None);
    }

    #[test]
    fn test_stats_overdue_currency_reads_zero() {
        let gold = CurrencyConfig::new("gold", 60, 5.0).unwrap();
        let mut state = UserState::new();
        state.total_active_secs = 500;
        state.reward_checkpoints.insert(CurrencyId::from("gold"), 0);

        let stats = PlayerStats::new(UserId(uuid::Uuid::from_u128(3)), None, false, &state, &[gold]);

        assert_eq!(stats.currencies[0].secs_until_next, Some(0));
    }

    #[test]
    fn test_stats_display_lists_name_and_times() {
        let gold = CurrencyConfig::new("gold", 60, 5.0).unwrap().with_symbol("⛁");
        let mut state = UserState::new();
        state.total_active_secs = 3_725;
        state.period_active_secs = 65;

        let stats = PlayerStats::new(
            UserId(uuid::Uuid::from_u128(3)),
            Some("alex".into()),
            true,
            &state,
            &[gold],
        );
        let text = stats.to_string();

        assert!(text.contains("Stats for alex"));
        assert!(text.contains("Total time: 1h 2m 5s"));
        assert!(text.contains("Period time: 1m 5s"));
        assert!(text.contains("Next ⛁: not started"));
    }
}
