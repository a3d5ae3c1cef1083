use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a session for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub has_refresh_token: bool,
    pub renewal_active: bool,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_renewed_at: Option<DateTime<Utc>>,
    pub consecutive_refresh_failures: u32,
}

impl SessionSnapshot {
    /// Minutes since the access token was last renewed, if it ever was
    pub fn minutes_since_renewal(&self) -> Option<i64> {
        self.last_renewed_at
            .map(|at| (Utc::now() - at).num_minutes().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(last_renewed_at: Option<DateTime<Utc>>) -> SessionSnapshot {
        SessionSnapshot {
            authenticated: true,
            has_refresh_token: true,
            renewal_active: true,
            last_renewed_at,
            consecutive_refresh_failures: 0,
        }
    }

    #[test]
    fn test_minutes_since_renewal() {
        assert_eq!(snapshot(None).minutes_since_renewal(), None);

        let renewed = snapshot(Some(Utc::now() - Duration::minutes(9)));
        assert!(matches!(renewed.minutes_since_renewal(), Some(9) | Some(10)));

        // Clock skew never yields a negative age
        let future = snapshot(Some(Utc::now() + Duration::minutes(5)));
        assert_eq!(future.minutes_since_renewal(), Some(0));
    }
}
