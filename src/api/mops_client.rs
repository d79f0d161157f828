use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{CompanyDirectory, CompanyListing, ReportSource};
use crate::models::{AvailablePeriod, Config, RawRow, SectionRows, StatementSection};

/// Registry pages to scan for the company universe: listed board and OTC.
const LISTING_MODES: [&str; 2] = ["2", "4"];

/// The document path sits between a fixed 13-character javascript prefix and
/// a fixed 10-character suffix in the listing's onclick payload.
const DOC_PATH_PREFIX_LEN: usize = 13;
const DOC_PATH_SUFFIX_LEN: usize = 10;

static TR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid tr selector"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("valid cell selector"));
static PATH_INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td:nth-child(4) > input").expect("valid path input selector"));
static SECTION_SELECTORS: LazyLock<Vec<(StatementSection, Selector)>> = LazyLock::new(|| {
    StatementSection::ALL
        .iter()
        .map(|&section| {
            let selector = format!("#{} + div + table tr", section.anchor_id());
            (
                section,
                Selector::parse(&selector).expect("valid section selector"),
            )
        })
        .collect()
});

/// Client for the exchange's disclosure site: the report listing and report
/// documents on MOPS, and the securities registry on the ISIN site. All
/// markup traversal lives here; callers only ever see tabularized rows.
pub struct MopsClient {
    client: Client,
    mops_base_url: String,
    isin_base_url: String,
}

impl MopsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent("twse-valuation/0.1")
            .build()?;

        Ok(Self {
            client,
            mops_base_url: config.mops_base_url.trim_end_matches('/').to_string(),
            isin_base_url: config.isin_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReportSource for MopsClient {
    async fn list_available_periods(&self, company_id: &str) -> Result<Vec<AvailablePeriod>> {
        let url = format!("{}/mops/web/ajax_t203sb01", self.mops_base_url);
        // sic: the endpoint expects "inpuType".
        let form = [
            ("encodeURIComponent", "1"),
            ("step", "1"),
            ("firstin", "1"),
            ("off", "1"),
            ("queryName", "co_id"),
            ("inpuType", "co_id"),
            ("TYPEK", "all"),
            ("co_id", company_id),
        ];

        let body = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let listings = parse_period_listing(&body);
        debug!("{}: {} period listings on MOPS", company_id, listings.len());
        Ok(listings)
    }

    async fn fetch_sections(&self, doc_ref: &str) -> Result<SectionRows> {
        let url = format!("{}{}", self.mops_base_url, doc_ref);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(parse_statement_sections(&body))
    }
}

#[async_trait::async_trait]
impl CompanyDirectory for MopsClient {
    async fn list_listed_companies(&self) -> Result<Vec<CompanyListing>> {
        let mut listings = Vec::new();
        for mode in LISTING_MODES {
            let url = format!("{}/isin/C_public.jsp?strMode={}", self.isin_base_url, mode);
            let body = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let page = parse_company_listing(&body);
            debug!("registry mode {}: {} rows", mode, page.len());
            listings.extend(page);
        }
        Ok(listings)
    }
}

fn parse_period_listing(html: &str) -> Vec<AvailablePeriod> {
    let doc = Html::parse_document(html);
    let mut listings = Vec::new();

    for tr in doc.select(&TR_SELECTOR) {
        let Some(input) = tr.select(&PATH_INPUT_SELECTOR).next() else {
            continue;
        };
        let Some(onclick) = input.value().attr("onclick") else {
            continue;
        };
        let Some(doc_path) = extract_document_path(onclick) else {
            continue;
        };
        let Some(first_cell) = tr.select(&CELL_SELECTOR).next() else {
            continue;
        };

        listings.push(AvailablePeriod {
            minguo_year_quarter: collect_text(first_cell),
            doc_path,
        });
    }

    listings
}

fn extract_document_path(onclick: &str) -> Option<String> {
    let chars: Vec<char> = onclick.chars().collect();
    if chars.len() <= DOC_PATH_PREFIX_LEN + DOC_PATH_SUFFIX_LEN {
        return None;
    }
    Some(
        chars[DOC_PATH_PREFIX_LEN..chars.len() - DOC_PATH_SUFFIX_LEN]
            .iter()
            .collect(),
    )
}

fn parse_statement_sections(html: &str) -> SectionRows {
    let doc = Html::parse_document(html);
    let mut sections = SectionRows::new();

    for (section, selector) in SECTION_SELECTORS.iter() {
        let rows: Vec<RawRow> = doc
            .select(selector)
            .map(|tr| RawRow::new(tr.select(&CELL_SELECTOR).map(collect_text).collect()))
            .collect();
        debug!("{}: {} rows", section, rows.len());
        sections.insert(*section, rows);
    }

    sections
}

fn parse_company_listing(html: &str) -> Vec<CompanyListing> {
    let doc = Html::parse_document(html);
    let mut listings = Vec::new();

    for tr in doc.select(&TR_SELECTOR) {
        let cells: Vec<String> = tr.select(&CELL_SELECTOR).map(collect_text).collect();
        if cells.len() != 7 {
            continue;
        }

        // The first cell holds "<id> <name>" separated by whitespace.
        let mut id_name = cells[0].split_whitespace();
        let (Some(company_id), Some(company_name)) = (id_name.next(), id_name.next()) else {
            continue;
        };

        listings.push(CompanyListing {
            company_id: company_id.to_string(),
            company_name: company_name.to_string(),
            industry: cells[4].clone(),
            cfi_code: cells[5].clone(),
        });
    }

    listings
}

fn collect_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
