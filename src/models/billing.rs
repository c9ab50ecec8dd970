use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(BillingMode {
    Monthly => "monthly",
    Prepaid => "prepaid",
});

str_enum!(InvoiceStatus {
    Pending => "pending",
    Paid => "paid",
    Refunded => "refunded",
});

str_enum!(ImportType {
    Images => "images",
    Xlsx => "xlsx",
});

/// Per-tenant usage accounting, one row per tenant.
///
/// `current_cycle_*` covers the open accounting period; `usage_count` and
/// `total_spent` are lifetime totals that survive cycle rollover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCycle {
    pub tenant_id: i64,
    pub usage_count: i64,
    pub current_cycle_start: DateTime<Utc>,
    pub current_cycle_end: DateTime<Utc>,
    pub current_cycle_count: i64,
    pub paid_units: i64,
    pub remaining_units: i64,
    pub price_per_thousand: i64,
    pub total_spent: i64,
    pub is_active: bool,
    pub billing_mode: BillingMode,
    pub last_used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only row per import batch. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub id: i64,
    pub tenant_id: i64,
    pub user_id: Option<i64>,
    pub image_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub ocr_confidence: Option<f64>,
    pub ai_model: Option<String>,
    pub processing_time_ms: Option<i64>,
    /// Cost in cents.
    pub cost: i64,
    pub import_type: ImportType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Billing invoice. Created when a monthly cycle closes with nonzero usage,
/// or immediately (pre-marked paid) when a prepaid package is purchased.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub tenant_id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub units_used: i64,
    /// Amount in cents.
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn billing_mode_round_trip() {
        assert_eq!(BillingMode::Monthly.as_str(), "monthly");
        assert_eq!(BillingMode::from_str("prepaid").unwrap(), BillingMode::Prepaid);
    }

    #[test]
    fn invoice_status_round_trip() {
        for s in ["pending", "paid", "refunded"] {
            assert_eq!(InvoiceStatus::from_str(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        assert!(ImportType::from_str("pdf").is_err());
    }
}
