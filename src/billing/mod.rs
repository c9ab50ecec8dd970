pub mod alerts;
pub mod ledger;

pub use alerts::*;
pub use ledger::*;

use thiserror::Error;

use crate::db::DatabaseError;

/// Default price in cents per 1000 digitization units.
pub const PRICE_PER_THOUSAND: i64 = 3000;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Digitization is disabled for this account")]
    ServiceDisabled,

    #[error("Insufficient prepaid units: the whole batch needs {requested} up front, {remaining} remaining")]
    InsufficientPrepaidUnits { remaining: i64, requested: i64 },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Cost in cents for a number of units at a per-thousand price, rounded up.
pub fn cost_for_units(units: i64, price_per_thousand: i64) -> i64 {
    if units <= 0 {
        return 0;
    }
    (units * price_per_thousand + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_rounds_up_to_the_cent() {
        assert_eq!(cost_for_units(0, PRICE_PER_THOUSAND), 0);
        assert_eq!(cost_for_units(1, PRICE_PER_THOUSAND), 3);
        assert_eq!(cost_for_units(10, PRICE_PER_THOUSAND), 30);
        assert_eq!(cost_for_units(333, PRICE_PER_THOUSAND), 999);
        assert_eq!(cost_for_units(1000, PRICE_PER_THOUSAND), 3000);
        assert_eq!(cost_for_units(1001, PRICE_PER_THOUSAND), 3003);
    }

    #[test]
    fn cost_rounds_up_at_odd_prices() {
        // 7 units at 19.99 per thousand is 13.993 cents, billed as 14
        assert_eq!(cost_for_units(7, 1999), 14);
        assert_eq!(cost_for_units(1, 1), 1);
    }
}
