use anyhow::Result;

use crate::models::{AvailablePeriod, SectionRows};

pub mod mops_client;
pub use mops_client::MopsClient;

/// Where report documents come from. Listing tells us which periods the
/// source can deliver for a company; fetching turns one document reference
/// into tabularized statement sections for the parser.
#[async_trait::async_trait]
pub trait ReportSource: Send + Sync {
    async fn list_available_periods(&self, company_id: &str) -> Result<Vec<AvailablePeriod>>;
    async fn fetch_sections(&self, doc_ref: &str) -> Result<SectionRows>;
}

/// One row of the exchange's securities registry, before any universe
/// filtering is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyListing {
    pub company_id: String,
    pub company_name: String,
    pub industry: String,
    pub cfi_code: String,
}

/// The authoritative list of securities currently listed on the exchange.
#[async_trait::async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn list_listed_companies(&self) -> Result<Vec<CompanyListing>>;
}
