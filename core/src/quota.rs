/// Ledger entries a user may create per calendar day.
pub const DAILY_ENTRY_LIMIT: i64 = 40;

/// Once this many entries exist, each new one carries a warning.
pub const WARN_THRESHOLD: i64 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    Allowed,
    /// `remaining` counts the entry being made.
    Warn { remaining: i64 },
    Denied,
}

impl QuotaStatus {
    /// Classifies an attempt given the number of entries already made today.
    #[must_use]
    pub const fn for_count(count_before: i64) -> Self {
        if count_before >= DAILY_ENTRY_LIMIT {
            Self::Denied
        } else if count_before >= WARN_THRESHOLD {
            Self::Warn {
                remaining: DAILY_ENTRY_LIMIT - count_before,
            }
        } else {
            Self::Allowed
        }
    }

    #[must_use]
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }

    #[must_use]
    pub fn warning_text(self) -> Option<String> {
        match self {
            Self::Warn { remaining } => Some(format!(
                "⚠️ You have {remaining} of {DAILY_ENTRY_LIMIT} daily entries left."
            )),
            Self::Allowed | Self::Denied => None,
        }
    }
}

pub const QUOTA_EXCEEDED_TEXT: &str =
    "🚫 You have reached the daily limit of 40 entries. Try again tomorrow.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_allowed() {
        assert_eq!(QuotaStatus::for_count(0), QuotaStatus::Allowed);
        assert_eq!(QuotaStatus::for_count(34), QuotaStatus::Allowed);
        assert!(QuotaStatus::for_count(34).warning_text().is_none());
    }

    #[test]
    fn test_warn_band() {
        assert_eq!(
            QuotaStatus::for_count(35),
            QuotaStatus::Warn { remaining: 5 }
        );
        assert_eq!(
            QuotaStatus::for_count(39),
            QuotaStatus::Warn { remaining: 1 }
        );
        let text = QuotaStatus::for_count(37).warning_text().unwrap();
        assert!(text.contains('3'));
    }

    #[test]
    fn test_denied_at_limit() {
        assert!(QuotaStatus::for_count(40).is_denied());
        assert!(QuotaStatus::for_count(41).is_denied());
        assert!(!QuotaStatus::for_count(39).is_denied());
    }

    #[test]
    fn test_exceeded_text_matches_limit() {
        assert!(QUOTA_EXCEEDED_TEXT.contains(&DAILY_ENTRY_LIMIT.to_string()));
    }
}
