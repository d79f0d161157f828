use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::models::{Company, Period, Ratio, Report};

/// SQLX-based store for companies, reports and ratios.
///
/// Reports are immutable once written: `put_report` is create-only and a
/// duplicate key is a no-op. Ratios are derived data and always overwritten
/// whole. Companies are maintained by the registry sync; the ingestion cycle
/// only advances their `process_time`.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (and if needed create) the database at the given path.
    pub async fn new(database_path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(database_path)
                    .create_if_missing(true),
            )
            .await?;

        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                company_id TEXT PRIMARY KEY,
                company_name TEXT NOT NULL,
                industry TEXT NOT NULL,
                process_time INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                company_id TEXT NOT NULL,
                year_quarter TEXT NOT NULL,
                accounts TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (company_id, year_quarter)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ratios (
                company_id TEXT NOT NULL,
                year_quarter TEXT NOT NULL,
                curr_fcf TEXT NOT NULL,
                beg_fcf TEXT NOT NULL,
                last_fcf TEXT NOT NULL,
                move_fcf TEXT NOT NULL,
                capital TEXT NOT NULL,
                return_of_capital TEXT NOT NULL,
                last_return_of_capital TEXT,
                last2_return_of_capital TEXT,
                avg3_return_of_capital TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (company_id, year_quarter)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        let rows = sqlx::query(
            "SELECT company_id, company_name, industry, process_time FROM companies",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Company {
                company_id: row.get("company_id"),
                company_name: row.get("company_name"),
                industry: row.get("industry"),
                process_time: row.get("process_time"),
            })
            .collect())
    }

    /// Insert a company, or refresh its name and industry if it already
    /// exists. `process_time` is preserved on conflict so that a registry
    /// sync does not disturb the processing order.
    pub async fn upsert_company(&self, company: &Company) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (company_id, company_name, industry, process_time)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(company_id) DO UPDATE SET
                company_name = excluded.company_name,
                industry = excluded.industry
            "#,
        )
        .bind(&company.company_id)
        .bind(&company.company_name)
        .bind(&company.industry)
        .bind(company.process_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove_company(&self, company_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM companies WHERE company_id = ?")
            .bind(company_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn update_last_processed(&self, company_id: &str, timestamp: i64) -> Result<()> {
        sqlx::query("UPDATE companies SET process_time = ? WHERE company_id = ?")
            .bind(timestamp)
            .bind(company_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Periods for which a report has already been ingested.
    pub async fn list_periods(&self, company_id: &str) -> Result<HashSet<Period>> {
        let rows = sqlx::query("SELECT year_quarter FROM reports WHERE company_id = ?")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;

        let mut periods = HashSet::with_capacity(rows.len());
        for row in rows {
            let year_quarter: String = row.get("year_quarter");
            periods.insert(Period::from_str(&year_quarter)?);
        }
        Ok(periods)
    }

    /// All of a company's reports, in no particular order.
    pub async fn get_reports(&self, company_id: &str) -> Result<Vec<Report>> {
        let rows = sqlx::query("SELECT year_quarter, accounts FROM reports WHERE company_id = ?")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            let year_quarter: String = row.get("year_quarter");
            let accounts: String = row.get("accounts");
            reports.push(Report {
                company_id: company_id.to_string(),
                year_quarter: Period::from_str(&year_quarter)?,
                accounts: serde_json::from_str::<BTreeMap<String, Decimal>>(&accounts)?,
            });
        }
        Ok(reports)
    }

    /// Create-only insert. Returns `false` without touching the row when a
    /// report for the same (company, period) already exists.
    pub async fn put_report(&self, report: &Report) -> Result<bool> {
        let accounts = serde_json::to_string(&report.accounts)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO reports (company_id, year_quarter, accounts) VALUES (?, ?, ?)",
        )
        .bind(&report.company_id)
        .bind(report.year_quarter.to_string())
        .bind(accounts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Upsert: a ratio is derived data and is always rewritten whole.
    pub async fn put_ratio(&self, ratio: &Ratio) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO ratios (
                company_id, year_quarter, curr_fcf, beg_fcf, last_fcf,
                move_fcf, capital, return_of_capital,
                last_return_of_capital, last2_return_of_capital, avg3_return_of_capital
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ratio.company_id)
        .bind(ratio.year_quarter.to_string())
        .bind(ratio.curr_fcf.to_string())
        .bind(ratio.beg_fcf.to_string())
        .bind(ratio.last_fcf.to_string())
        .bind(ratio.move_fcf.to_string())
        .bind(ratio.capital.to_string())
        .bind(ratio.return_of_capital.to_string())
        .bind(ratio.last_return_of_capital.map(|d| d.to_string()))
        .bind(ratio.last2_return_of_capital.map(|d| d.to_string()))
        .bind(ratio.avg3_return_of_capital.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read back a stored ratio, mostly useful for inspection and tests.
    pub async fn get_ratio(&self, company_id: &str, year_quarter: Period) -> Result<Option<Ratio>> {
        let row = sqlx::query(
            r#"
            SELECT curr_fcf, beg_fcf, last_fcf, move_fcf, capital, return_of_capital,
                   last_return_of_capital, last2_return_of_capital, avg3_return_of_capital
            FROM ratios WHERE company_id = ? AND year_quarter = ?
            "#,
        )
        .bind(company_id)
        .bind(year_quarter.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Ratio {
            company_id: company_id.to_string(),
            year_quarter,
            curr_fcf: decimal_column(&row, "curr_fcf")?,
            beg_fcf: decimal_column(&row, "beg_fcf")?,
            last_fcf: decimal_column(&row, "last_fcf")?,
            move_fcf: decimal_column(&row, "move_fcf")?,
            capital: decimal_column(&row, "capital")?,
            return_of_capital: decimal_column(&row, "return_of_capital")?,
            last_return_of_capital: optional_decimal_column(&row, "last_return_of_capital")?,
            last2_return_of_capital: optional_decimal_column(&row, "last2_return_of_capital")?,
            avg3_return_of_capital: optional_decimal_column(&row, "avg3_return_of_capital")?,
        }))
    }
}

fn decimal_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Decimal> {
    let text: String = row.get(column);
    Ok(Decimal::from_str(&text)?)
}

fn optional_decimal_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<Decimal>> {
    let text: Option<String> = row.get(column);
    text.map(|t| Decimal::from_str(&t).map_err(Into::into)).transpose()
}
