use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::accounts::BalanceAnchor;
use crate::errors::{MaterializationError, Result};
use crate::utils::time_utils::get_days_between;

/// Per-day net balance deltas, keyed by date.
pub type DailyDeltas = BTreeMap<NaiveDate, Decimal>;

fn delta_on(deltas: &DailyDeltas, date: NaiveDate) -> Decimal {
    deltas.get(&date).copied().unwrap_or(Decimal::ZERO)
}

fn checked(
    value: Option<Decimal>,
    account_id: &str,
    date: NaiveDate,
) -> std::result::Result<Decimal, MaterializationError> {
    value.ok_or_else(|| MaterializationError::Overflow {
        account_id: account_id.to_string(),
        date,
    })
}

/// Walks forward from the opening anchor and returns one balance per day in
/// `start..=end`.
///
/// The anchor balance is the balance at the start of `anchor.date`, so the
/// balance on day `d` is `anchor.balance + Σ delta(anchor.date..=d)`. Deltas
/// dated before the anchor are ignored. `start` must not precede the anchor.
///
/// # Arguments
///
/// * `account_id` - Used for error reporting only.
/// * `anchor` - Opening balance and its date.
/// * `deltas` - Net balance change per day.
/// * `start` - First day to emit.
/// * `end` - Last day to emit (inclusive).
pub fn calculate_forward_balances(
    account_id: &str,
    anchor: BalanceAnchor,
    deltas: &DailyDeltas,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(NaiveDate, Decimal)>> {
    if start < anchor.date || start > end {
        return Err(MaterializationError::InvalidWindow {
            account_id: account_id.to_string(),
            start,
            end,
        }
        .into());
    }

    // Carry the anchor forward to the day before `start`.
    let mut running = anchor.balance;
    for (date, delta) in deltas.range(anchor.date..start) {
        running = checked(running.checked_add(*delta), account_id, *date)?;
    }

    let mut balances = Vec::with_capacity(get_days_between(start, end).len());
    for date in get_days_between(start, end) {
        running = checked(
            running.checked_add(delta_on(deltas, date)),
            account_id,
            date,
        )?;
        balances.push((date, running));
    }
    Ok(balances)
}

/// Unwinds deltas backward from a provider-reported balance and returns one
/// balance per day in `origin..=end`.
///
/// The reported balance is the end-of-day balance on `reported.date`; the day
/// before is `balance(d) - delta(d)`. Days after the reported date are rolled
/// forward with their own deltas so the series stays continuous up to `end`.
pub fn calculate_reverse_balances(
    account_id: &str,
    reported: BalanceAnchor,
    deltas: &DailyDeltas,
    origin: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(NaiveDate, Decimal)>> {
    if origin > end {
        return Err(MaterializationError::InvalidWindow {
            account_id: account_id.to_string(),
            start: origin,
            end,
        }
        .into());
    }

    let mut balances: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();

    // Backward from the reported date.
    let mut running = reported.balance;
    let mut day = reported.date;
    loop {
        if day >= origin && day <= end {
            balances.insert(day, running);
        }
        if day <= origin {
            break;
        }
        running = checked(running.checked_sub(delta_on(deltas, day)), account_id, day)?;
        day = match day.pred_opt() {
            Some(previous) => previous,
            None => break,
        };
    }

    // Forward past the reported date, when the window reaches beyond it.
    let mut running = reported.balance;
    for date in get_days_between(reported.date, end).into_iter().skip(1) {
        running = checked(
            running.checked_add(delta_on(deltas, date)),
            account_id,
            date,
        )?;
        if date >= origin {
            balances.insert(date, running);
        }
    }

    Ok(balances.into_iter().collect())
}
