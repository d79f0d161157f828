use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offset between the Minguo calendar used by the disclosure site and the
/// Gregorian calendar.
pub const MINGUO_YEAR_OFFSET: i32 = 1911;

/// Reports filed for earlier years use a different taxonomy and are ignored.
pub const EARLIEST_CANONICAL_YEAR: i32 = 2020;

/// A listed company tracked by the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub company_name: String,
    pub industry: String,
    /// Unix epoch milliseconds of the last completed processing cycle.
    /// Companies are picked for processing in ascending order of this value.
    pub process_time: i64,
}

/// A reporting period, rendered canonically as `YYYYQn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    quarter: u8,
}

#[derive(Debug, Error)]
#[error("invalid period string {0:?}; expected YYYYQn")]
pub struct PeriodParseError(String);

impl Period {
    pub fn new(year: i32, quarter: u8) -> Self {
        debug_assert!((1..=4).contains(&quarter), "quarter out of range: {quarter}");
        Self { year, quarter }
    }

    /// Parses a Minguo-calendar period string such as `112Q4`: a 3-digit
    /// local year followed by a 2-character quarter code. Returns `None` for
    /// strings too short or otherwise unrecognizable.
    pub fn from_minguo(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() < 5 {
            return None;
        }
        let year = raw.get(0..3)?.parse::<i32>().ok()? + MINGUO_YEAR_OFFSET;
        let quarter = raw.get(3..5)?.strip_prefix('Q')?.parse::<u8>().ok()?;
        if !(1..=4).contains(&quarter) {
            return None;
        }
        Some(Self { year, quarter })
    }

    /// The most recent reporting quarter whose filing window has passed as of
    /// the given date. Quarterly filings lag by roughly two months, so the
    /// first two calendar months still point at Q4 of the prior year.
    pub fn latest_completed(as_of: NaiveDate) -> Self {
        let quarter = as_of.month() / 3;
        if quarter == 0 {
            Self { year: as_of.year() - 1, quarter: 4 }
        } else {
            Self { year: as_of.year(), quarter: quarter as u8 }
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn quarter(self) -> u8 {
        self.quarter
    }

    /// Same fiscal quarter, `years` years earlier.
    pub fn years_back(self, years: i32) -> Self {
        Self { year: self.year - years, quarter: self.quarter }
    }

    /// The quarter-end (Q4) period of the preceding year.
    pub fn prior_year_end(self) -> Self {
        Self { year: self.year - 1, quarter: 4 }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodParseError(s.to_string());
        let year = s
            .get(0..4)
            .and_then(|y| y.parse::<i32>().ok())
            .ok_or_else(err)?;
        let quarter = s
            .get(4..)
            .and_then(|q| q.strip_prefix('Q'))
            .and_then(|q| q.parse::<u8>().ok())
            .filter(|q| (1..=4).contains(q))
            .ok_or_else(err)?;
        Ok(Self { year, quarter })
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A normalized quarterly report: the extracted account-code map for one
/// company and period. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub company_id: String,
    pub year_quarter: Period,
    pub accounts: BTreeMap<String, Decimal>,
}

impl Report {
    pub fn account(&self, code: &str) -> Option<Decimal> {
        self.accounts.get(code).copied()
    }

    pub fn account_or_zero(&self, code: &str) -> Decimal {
        self.account(code).unwrap_or(Decimal::ZERO)
    }
}

/// Derived capital-return figures for one company and period. Always
/// recomputed in full and overwritten; never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub company_id: String,
    pub year_quarter: Period,
    pub curr_fcf: Decimal,
    pub beg_fcf: Decimal,
    pub last_fcf: Decimal,
    pub move_fcf: Decimal,
    pub capital: Decimal,
    pub return_of_capital: Decimal,
    /// Return one year back; only set when the full three-year chain exists.
    pub last_return_of_capital: Option<Decimal>,
    /// Return two years back; only set when the full three-year chain exists.
    pub last2_return_of_capital: Option<Decimal>,
    /// Compounded (geometric) three-year average return, as a percentage.
    pub avg3_return_of_capital: Option<Decimal>,
}

/// The three statement sections extracted from every report document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementSection {
    BalanceSheet,
    ComprehensiveIncome,
    CashFlows,
}

impl StatementSection {
    pub const ALL: [StatementSection; 3] = [
        StatementSection::BalanceSheet,
        StatementSection::ComprehensiveIncome,
        StatementSection::CashFlows,
    ];

    /// Anchor element id marking the section inside a report document.
    pub fn anchor_id(self) -> &'static str {
        match self {
            StatementSection::BalanceSheet => "BalanceSheet",
            StatementSection::ComprehensiveIncome => "StatementOfComprehensiveIncome",
            StatementSection::CashFlows => "StatementsOfCashFlows",
        }
    }
}

impl fmt::Display for StatementSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.anchor_id())
    }
}

/// One already-tabularized table row: the ordered cell texts of a statement
/// line. The parser only ever addresses cells by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    cells: Vec<String>,
}

impl RawRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// Tabularized statement sections as delivered by the document source.
pub type SectionRows = HashMap<StatementSection, Vec<RawRow>>;

/// One entry of the document source's period listing: the raw Minguo period
/// string alongside the path of the report document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePeriod {
    pub minguo_year_quarter: String,
    pub doc_path: String,
}

/// Configuration for the application.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub mops_base_url: String,
    pub isin_base_url: String,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "valuation.db".to_string()),
            mops_base_url: std::env::var("MOPS_BASE_URL")
                .unwrap_or_else(|_| "https://mops.twse.com.tw".to_string()),
            isin_base_url: std::env::var("ISIN_BASE_URL")
                .unwrap_or_else(|_| "https://isin.twse.com.tw".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }
}
