use std::collections::HashSet;

use tracing::debug;

use crate::models::{AvailablePeriod, Period, EARLIEST_CANONICAL_YEAR};

/// Upper bound on periods ingested in a single cycle. Later periods are
/// picked up by subsequent cycles, which revisit the same company once it is
/// again the least recently processed one.
pub const MAX_PERIODS_PER_RUN: usize = 5;

/// A period selected for ingestion, paired with the reference of the source
/// document to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPeriod {
    pub year_quarter: Period,
    pub doc_ref: String,
}

/// Decides which of the source's available periods still need ingestion.
///
/// Malformed listing entries and periods before the supported year range are
/// skipped silently; already-ingested periods are never re-selected. Earlier
/// entries in `available` are preferred when the per-run cap is reached, and
/// the input order is preserved in the result.
pub fn select_new_periods(
    existing: &HashSet<Period>,
    available: &[AvailablePeriod],
) -> Vec<NewPeriod> {
    let mut selected: Vec<NewPeriod> = Vec::new();

    for entry in available {
        if selected.len() == MAX_PERIODS_PER_RUN {
            break;
        }

        let Some(period) = Period::from_minguo(&entry.minguo_year_quarter) else {
            debug!("skipping unrecognizable period listing {:?}", entry.minguo_year_quarter);
            continue;
        };
        if period.year() < EARLIEST_CANONICAL_YEAR {
            continue;
        }
        if existing.contains(&period) {
            continue;
        }
        if selected.iter().any(|s| s.year_quarter == period) {
            continue;
        }

        selected.push(NewPeriod {
            year_quarter: period,
            doc_ref: entry.doc_path.clone(),
        });
    }

    selected
}
