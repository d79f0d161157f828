use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::models::{Period, Ratio, Report};

/// Total assets. A report without it cannot anchor a capital-return ratio.
pub const TOTAL_ASSETS: &str = "1XXX";
/// Net cash flow from operating activities.
pub const OPERATING_CASH_FLOW: &str = "AAAA";
/// Capital-expenditure adjustment folded into the free-cash-flow figure.
pub const CAPEX_ADJUSTMENT: &str = "B02700";
/// Total equity, the non-debt half of the capital base. Required.
pub const TOTAL_EQUITY: &str = "3XXX";
/// Interest-bearing debt lines summed into the capital base. Each defaults
/// to zero when the company does not carry the line.
pub const DEBT_ACCOUNTS: [&str; 7] = ["2100", "2110", "2280", "2320", "2530", "2540", "2580"];

#[derive(Debug, Error)]
pub enum RatioError {
    #[error("{company_id} / {year_quarter}: capital base is zero")]
    ZeroCapital { company_id: String, year_quarter: Period },
}

/// Computes the single-period capital-return ratio from three aligned
/// reports: the current quarter, the prior year's quarter-end (`beg`) and
/// the prior year's same quarter (`last`).
///
/// The cash-flow figures are cumulative within a fiscal year, so
/// `curr + beg - last` is the trailing-twelve-month movement. Returns `None`
/// when any report, any total-assets figure, or the current equity figure is
/// missing; a complete input with a zero capital base is an arithmetic
/// failure, not absence.
pub fn compute_ratio(
    curr: Option<&Report>,
    beg: Option<&Report>,
    last: Option<&Report>,
) -> Result<Option<Ratio>, RatioError> {
    let (Some(curr), Some(beg), Some(last)) = (curr, beg, last) else {
        return Ok(None);
    };
    if curr.account(TOTAL_ASSETS).is_none()
        || beg.account(TOTAL_ASSETS).is_none()
        || last.account(TOTAL_ASSETS).is_none()
    {
        return Ok(None);
    }
    let Some(equity) = curr.account(TOTAL_EQUITY) else {
        return Ok(None);
    };

    let curr_fcf = free_cash_flow(curr);
    let beg_fcf = free_cash_flow(beg);
    let last_fcf = free_cash_flow(last);
    let move_fcf = curr_fcf + beg_fcf - last_fcf;

    let debt: Decimal = DEBT_ACCOUNTS
        .iter()
        .map(|code| curr.account_or_zero(code))
        .sum();
    let capital = debt + equity;
    if capital.is_zero() {
        return Err(RatioError::ZeroCapital {
            company_id: curr.company_id.clone(),
            year_quarter: curr.year_quarter,
        });
    }

    Ok(Some(Ratio {
        company_id: curr.company_id.clone(),
        year_quarter: curr.year_quarter,
        curr_fcf,
        beg_fcf,
        last_fcf,
        move_fcf,
        capital,
        return_of_capital: move_fcf * Decimal::ONE_HUNDRED / capital,
        last_return_of_capital: None,
        last2_return_of_capital: None,
        avg3_return_of_capital: None,
    }))
}

fn free_cash_flow(report: &Report) -> Decimal {
    report.account_or_zero(OPERATING_CASH_FLOW) + report.account_or_zero(CAPEX_ADJUSTMENT)
}

/// Augments the current ratio with the two historical returns and their
/// compounded three-year average. Returns across periods multiply rather
/// than add, so the average is geometric. `None` when either historical
/// ratio is unavailable; a partial history is not reported.
pub fn compute_three_year_average(
    curr: &Ratio,
    prior: Option<&Ratio>,
    prior2: Option<&Ratio>,
) -> Option<Ratio> {
    let (Some(prior), Some(prior2)) = (prior, prior2) else {
        return None;
    };

    let growth = |ratio: &Ratio| ratio.return_of_capital.to_f64().map(|pct| 1.0 + pct / 100.0);
    let compounded = growth(curr)? * growth(prior)? * growth(prior2)?;
    let avg3 = Decimal::from_f64((compounded.cbrt() - 1.0) * 100.0)?;

    Some(Ratio {
        last_return_of_capital: Some(prior.return_of_capital),
        last2_return_of_capital: Some(prior2.return_of_capital),
        avg3_return_of_capital: Some(avg3),
        ..curr.clone()
    })
}

/// Derives the latest ratio for a company from its full report history.
///
/// Pure over the supplied reports: the period-to-report index is built in
/// memory, and each of the three anchor years resolves its own
/// (current, prior quarter-end, prior same-quarter) triple against it. The
/// single-period ratio is produced whenever the current chain is complete;
/// the three-year figures are added only when both prior chains also
/// resolve. An arithmetic failure in a prior chain degrades to missing
/// history instead of discarding the current ratio.
pub fn latest_ratio(
    company_id: &str,
    reports: &[Report],
    as_of: NaiveDate,
) -> Result<Option<Ratio>, RatioError> {
    let index: HashMap<Period, &Report> = reports
        .iter()
        .map(|report| (report.year_quarter, report))
        .collect();
    let anchor = Period::latest_completed(as_of);

    let Some(curr) = single_period(&index, anchor)? else {
        return Ok(None);
    };
    let prior = degrade_to_absent(single_period(&index, anchor.years_back(1)), company_id);
    let prior2 = degrade_to_absent(single_period(&index, anchor.years_back(2)), company_id);

    Ok(Some(
        compute_three_year_average(&curr, prior.as_ref(), prior2.as_ref()).unwrap_or(curr),
    ))
}

fn single_period(
    index: &HashMap<Period, &Report>,
    anchor: Period,
) -> Result<Option<Ratio>, RatioError> {
    compute_ratio(
        index.get(&anchor).copied(),
        index.get(&anchor.prior_year_end()).copied(),
        index.get(&anchor.years_back(1)).copied(),
    )
}

fn degrade_to_absent(
    result: Result<Option<Ratio>, RatioError>,
    company_id: &str,
) -> Option<Ratio> {
    match result {
        Ok(ratio) => ratio,
        Err(e) => {
            warn!("{}: prior-period ratio failed, three-year history unavailable: {}", company_id, e);
            None
        }
    }
}
