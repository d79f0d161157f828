use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info};

use crate::api::{CompanyDirectory, CompanyListing};
use crate::database::DatabaseManager;
use crate::models::Company;

/// CFI code of common shares; everything else in the registry (ETFs,
/// preferred shares, depositary receipts) is out of universe.
const COMMON_STOCK_CFI: &str = "ESVUFR";
/// Foreign issuers are listed with a "KY" marker in the name.
const FOREIGN_ISSUER_MARKER: &str = "KY";
/// Financial and insurance companies report under a different account
/// structure and are excluded.
const EXCLUDED_INDUSTRY: &str = "金融保險業";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// Reconciles the tracked companies against the exchange registry.
///
/// New in-universe companies are created with `process_time = 0`, which puts
/// them at the front of the processing order. Renamed or reclassified
/// companies are refreshed in place, keeping their `process_time`. Companies
/// that left the registry (or the universe) are removed.
pub async fn sync_companies(
    directory: &dyn CompanyDirectory,
    database: &DatabaseManager,
) -> Result<SyncSummary> {
    let mut known: HashMap<String, Company> = database
        .list_companies()
        .await?
        .into_iter()
        .map(|company| (company.company_id.clone(), company))
        .collect();

    let listings = directory.list_listed_companies().await?;
    let mut summary = SyncSummary::default();

    for listing in listings {
        if !in_universe(&listing) {
            debug!("skipping out-of-universe listing {}", listing.company_id);
            continue;
        }

        match known.remove(&listing.company_id) {
            None => {
                database
                    .upsert_company(&Company {
                        company_id: listing.company_id,
                        company_name: listing.company_name,
                        industry: listing.industry,
                        process_time: 0,
                    })
                    .await?;
                summary.created += 1;
            }
            Some(existing) => {
                if existing.company_name != listing.company_name
                    || existing.industry != listing.industry
                {
                    database
                        .upsert_company(&Company {
                            company_name: listing.company_name,
                            industry: listing.industry,
                            ..existing
                        })
                        .await?;
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
        }
    }

    // Whatever was not claimed by a registry row is no longer listed.
    for company_id in known.into_keys() {
        database.remove_company(&company_id).await?;
        summary.removed += 1;
    }

    info!(
        "Company sync complete: {} new, {} updated, {} removed, {} unchanged",
        summary.created, summary.updated, summary.removed, summary.unchanged
    );
    Ok(summary)
}

fn in_universe(listing: &CompanyListing) -> bool {
    listing.cfi_code == COMMON_STOCK_CFI
        && !listing.company_name.contains(FOREIGN_ISSUER_MARKER)
        && listing.industry != EXCLUDED_INDUSTRY
}
