use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::api::ReportSource;
use crate::database::DatabaseManager;
use crate::models::Company;
use crate::period_selector;
use crate::ratio_calculator;
use crate::report_parser::{self, ReportError};

/// Runs one ingestion cycle: picks the least recently processed company,
/// ingests its missing quarterly reports and refreshes its latest ratio.
pub struct DataCollector {
    source: Arc<dyn ReportSource>,
    database: Arc<DatabaseManager>,
}

/// What one cycle actually did; surfaced to the caller for logging.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub company_id: Option<String>,
    pub periods_selected: usize,
    pub reports_ingested: usize,
    pub reports_empty: usize,
    pub reports_failed: usize,
    pub ratio_written: bool,
}

impl DataCollector {
    pub fn new(source: Arc<dyn ReportSource>, database: Arc<DatabaseManager>) -> Self {
        Self { source, database }
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        self.run_cycle_as_of(Utc::now().date_naive()).await
    }

    /// Like [`run_cycle`](Self::run_cycle) with an explicit "today", which
    /// anchors the ratio's reporting quarter.
    pub async fn run_cycle_as_of(&self, as_of: NaiveDate) -> Result<CycleSummary> {
        let companies = self.database.list_companies().await?;
        let Some(company) = companies.into_iter().min_by_key(|c| c.process_time) else {
            info!("no companies registered; nothing to do");
            return Ok(CycleSummary::default());
        };
        info!(
            "🏢 Processing {} ({})",
            company.company_id, company.company_name
        );

        let outcome = self.process_company(&company, as_of).await;

        // The timestamp moves forward even when the cycle failed or ingested
        // nothing, so the next cycle picks a different company.
        self.database
            .update_last_processed(&company.company_id, Utc::now().timestamp_millis())
            .await?;

        outcome
    }

    async fn process_company(&self, company: &Company, as_of: NaiveDate) -> Result<CycleSummary> {
        let mut summary = CycleSummary {
            company_id: Some(company.company_id.clone()),
            ..CycleSummary::default()
        };

        let existing = self.database.list_periods(&company.company_id).await?;
        let available = self
            .source
            .list_available_periods(&company.company_id)
            .await?;
        let selected = period_selector::select_new_periods(&existing, &available);
        summary.periods_selected = selected.len();

        if selected.is_empty() {
            info!("{}: no new periods to ingest", company.company_id);
            return Ok(summary);
        }
        info!(
            "{}: ingesting {} new period(s)",
            company.company_id,
            selected.len()
        );

        for new_period in &selected {
            let year_quarter = new_period.year_quarter;
            let sections = match self.source.fetch_sections(&new_period.doc_ref).await {
                Ok(sections) => sections,
                Err(e) => {
                    warn!(
                        "{} / {}: failed to fetch report document, skipping period: {}",
                        company.company_id, year_quarter, e
                    );
                    summary.reports_failed += 1;
                    continue;
                }
            };

            match report_parser::build_report(&company.company_id, year_quarter, &sections) {
                Ok(report) => {
                    if self.database.put_report(&report).await? {
                        debug!(
                            "{} / {}: persisted report with {} accounts",
                            company.company_id,
                            year_quarter,
                            report.accounts.len()
                        );
                        summary.reports_ingested += 1;
                    } else {
                        // The selector filters ingested periods, so this only
                        // fires when an overlapping run won the race. The
                        // stored report stays untouched.
                        warn!(
                            "{} / {}: report already present, left as is",
                            company.company_id, year_quarter
                        );
                    }
                }
                Err(e @ ReportError::Empty { .. }) => {
                    warn!("{}", e);
                    summary.reports_empty += 1;
                }
                Err(e) => {
                    warn!("{}; period skipped", e);
                    summary.reports_failed += 1;
                }
            }
        }

        if summary.reports_ingested > 0 {
            summary.ratio_written = self
                .refresh_latest_ratio(&company.company_id, as_of)
                .await?;
        }

        Ok(summary)
    }

    /// Recomputes the company's latest ratio over its full report history
    /// and overwrites the stored row. Absence of the required history and
    /// arithmetic failures both leave the store untouched.
    async fn refresh_latest_ratio(&self, company_id: &str, as_of: NaiveDate) -> Result<bool> {
        let reports = self.database.get_reports(company_id).await?;

        match ratio_calculator::latest_ratio(company_id, &reports, as_of) {
            Ok(Some(ratio)) => {
                info!(
                    "📈 {} / {}: return on capital {}%",
                    company_id, ratio.year_quarter, ratio.return_of_capital
                );
                self.database.put_ratio(&ratio).await?;
                Ok(true)
            }
            Ok(None) => {
                info!("{}: report history incomplete, no ratio produced", company_id);
                Ok(false)
            }
            Err(e) => {
                warn!("{}; ratio not updated", e);
                Ok(false)
            }
        }
    }
}
