//! Usage alerting thresholds over a [`UsageStats`] snapshot.

use serde::Serialize;

use super::UsageStats;

/// R$200,00 in cents. At or above this the alert is critical.
const CRITICAL_COST: i64 = 20_000;
/// R$100,00 in cents. At or above this (below critical) the alert warns.
const WARNING_COST: i64 = 10_000;
/// Prepaid balance below this many units triggers a warning.
const LOW_PREPAID_UNITS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAlert {
    pub level: AlertLevel,
    pub message: String,
}

/// Decide whether the current usage warrants an alert.
///
/// Cost thresholds are checked before the prepaid balance, so a tenant
/// over the critical cost line gets the critical alert even when their
/// prepaid balance is also low.
pub fn should_send_usage_alert(stats: &UsageStats) -> Option<UsageAlert> {
    if stats.estimated_cost >= CRITICAL_COST {
        return Some(UsageAlert {
            level: AlertLevel::Critical,
            message: format!(
                "Digitization spend reached R$ {},{:02} this cycle",
                stats.estimated_cost / 100,
                stats.estimated_cost % 100
            ),
        });
    }

    if stats.estimated_cost >= WARNING_COST {
        return Some(UsageAlert {
            level: AlertLevel::Warning,
            message: format!(
                "Digitization spend reached R$ {},{:02} this cycle",
                stats.estimated_cost / 100,
                stats.estimated_cost % 100
            ),
        });
    }

    if let Some(remaining) = stats.remaining_prepaid {
        if remaining > 0 && remaining < LOW_PREPAID_UNITS {
            return Some(UsageAlert {
                level: AlertLevel::Warning,
                message: format!("Only {remaining} prepaid digitization units left"),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillingMode;
    use chrono::Utc;

    fn stats(estimated_cost: i64, remaining_prepaid: Option<i64>) -> UsageStats {
        UsageStats {
            current_cycle_count: 0,
            total_count: 0,
            billing_mode: if remaining_prepaid.is_some() {
                BillingMode::Prepaid
            } else {
                BillingMode::Monthly
            },
            remaining_prepaid,
            estimated_cost,
            cycle_start: Utc::now(),
            cycle_end: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn below_all_thresholds_is_quiet() {
        assert!(should_send_usage_alert(&stats(9_999, None)).is_none());
        assert!(should_send_usage_alert(&stats(0, None)).is_none());
    }

    #[test]
    fn warning_band_is_half_open() {
        let alert = should_send_usage_alert(&stats(10_000, None)).unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);
        let alert = should_send_usage_alert(&stats(19_999, None)).unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);
    }

    #[test]
    fn critical_at_and_above_two_hundred() {
        let alert = should_send_usage_alert(&stats(20_000, None)).unwrap();
        assert_eq!(alert.level, AlertLevel::Critical);
        let alert = should_send_usage_alert(&stats(55_000, None)).unwrap();
        assert_eq!(alert.level, AlertLevel::Critical);
    }

    #[test]
    fn low_prepaid_balance_warns() {
        let alert = should_send_usage_alert(&stats(0, Some(99))).unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);
        assert!(alert.message.contains("99"));
    }

    #[test]
    fn exhausted_or_healthy_prepaid_is_quiet() {
        assert!(should_send_usage_alert(&stats(0, Some(0))).is_none());
        assert!(should_send_usage_alert(&stats(0, Some(100))).is_none());
        assert!(should_send_usage_alert(&stats(0, Some(5_000))).is_none());
    }

    #[test]
    fn cost_thresholds_win_over_prepaid_balance() {
        let alert = should_send_usage_alert(&stats(25_000, Some(50))).unwrap();
        assert_eq!(alert.level, AlertLevel::Critical);
    }

    #[test]
    fn alert_serializes_lowercase_level() {
        let alert = should_send_usage_alert(&stats(20_000, None)).unwrap();
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["level"], "critical");
    }
}
