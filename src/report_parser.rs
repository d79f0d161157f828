use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Period, Report, SectionRows, StatementSection};

/// Longest first-cell text still treated as a leaf account code; longer
/// texts are section headers or subtotal labels.
pub const MAX_ACCOUNT_CODE_LEN: usize = 6;

/// Failures while normalizing one period's statement sections into a report.
/// Any of these aborts ingestion of the affected period only.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{company_id} / {year_quarter}: unparsable value {value:?} for account {account_code} in {section}")]
    Value {
        company_id: String,
        year_quarter: Period,
        section: StatementSection,
        account_code: String,
        value: String,
        #[source]
        source: rust_decimal::Error,
    },
    #[error("{company_id} / {year_quarter}: value cell missing for account {account_code} in {section}")]
    MissingValueCell {
        company_id: String,
        year_quarter: Period,
        section: StatementSection,
        account_code: String,
    },
    #[error("{company_id} / {year_quarter}: empty report")]
    Empty { company_id: String, year_quarter: Period },
}

/// Builds a normalized report from the tabularized statement sections of one
/// report document.
///
/// The first cell of each row is the candidate account code; rows whose
/// trimmed code is empty or longer than [`MAX_ACCOUNT_CODE_LEN`] are header
/// or subtotal rows and are skipped. The third cell is the account value.
/// A value that does not parse as a decimal fails the whole report rather
/// than dropping the row, since a silently missing figure would corrupt the
/// ratio math downstream. Duplicate codes keep the last value seen.
pub fn build_report(
    company_id: &str,
    year_quarter: Period,
    sections: &SectionRows,
) -> Result<Report, ReportError> {
    let mut accounts: BTreeMap<String, Decimal> = BTreeMap::new();

    for section in StatementSection::ALL {
        let Some(rows) = sections.get(&section) else {
            continue;
        };
        for row in rows {
            let code = match row.cell(0) {
                Some(cell) => cell.trim(),
                None => continue,
            };
            if code.is_empty() || code.chars().count() > MAX_ACCOUNT_CODE_LEN {
                continue;
            }

            let raw_value = row.cell(2).ok_or_else(|| ReportError::MissingValueCell {
                company_id: company_id.to_string(),
                year_quarter,
                section,
                account_code: code.to_string(),
            })?;
            let value =
                parse_account_value(raw_value).map_err(|source| ReportError::Value {
                    company_id: company_id.to_string(),
                    year_quarter,
                    section,
                    account_code: code.to_string(),
                    value: raw_value.to_string(),
                    source,
                })?;

            accounts.insert(code.to_string(), value);
        }
    }

    if accounts.is_empty() {
        return Err(ReportError::Empty {
            company_id: company_id.to_string(),
            year_quarter,
        });
    }

    Ok(Report {
        company_id: company_id.to_string(),
        year_quarter,
        accounts,
    })
}

/// Normalizes one raw value cell: trims, strips thousands separators, and
/// maps the accounting negative form `(v)` to `-v` before parsing.
fn parse_account_value(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    let cleaned = raw.trim().replace(',', "");
    let normalized = match cleaned
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => format!("-{inner}"),
        None => cleaned,
    };
    normalized.parse::<Decimal>()
}
