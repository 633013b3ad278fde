use chrono::{Months, NaiveDate};

use crate::models::HoldingPeriod;

/// A lot is long-term once one calendar year has elapsed since purchase,
/// inclusive of the anniversary itself. A Feb 29 purchase reaches its
/// anniversary on Feb 28 of the following year.
pub fn is_long_term(purchase_date: NaiveDate, sale_date: NaiveDate) -> bool {
    match purchase_date.checked_add_months(Months::new(12)) {
        Some(anniversary) => sale_date >= anniversary,
        None => false,
    }
}

pub fn classify(purchase_date: NaiveDate, sale_date: NaiveDate) -> HoldingPeriod {
    if is_long_term(purchase_date, sale_date) {
        HoldingPeriod::Long
    } else {
        HoldingPeriod::Short
    }
}

pub fn days_held(purchase_date: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - purchase_date).num_days().max(0)
}
