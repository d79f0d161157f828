//! End-to-end cycles over a scratch database and a scripted document source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use twse_valuation::data_collector::DataCollector;
use twse_valuation::models::{AvailablePeriod, Period, StatementSection};

use crate::common::{company, report_sections, row, temp_database, FakeReportSource};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 8, 1).unwrap()
}

/// Seven periods back to 2020Q2, newest first as the disclosure site lists
/// them. Enough for a full three-year ratio chain once all are ingested.
fn chain_source() -> FakeReportSource {
    let entries: [(&str, &str, i64); 7] = [
        ("112Q2", "/doc/2023Q2", 100),
        ("111Q4", "/doc/2022Q4", 180),
        ("111Q2", "/doc/2022Q2", 90),
        ("110Q4", "/doc/2021Q4", 160),
        ("110Q2", "/doc/2021Q2", 80),
        ("109Q4", "/doc/2020Q4", 140),
        ("109Q2", "/doc/2020Q2", 70),
    ];

    FakeReportSource {
        listings: entries
            .iter()
            .map(|(minguo, path, _)| AvailablePeriod {
                minguo_year_quarter: minguo.to_string(),
                doc_path: path.to_string(),
            })
            .collect(),
        documents: entries
            .iter()
            .map(|(_, path, fcf)| (path.to_string(), report_sections(*fcf, 5000, 1000)))
            .collect(),
    }
}

#[test_log::test(tokio::test)]
async fn repeated_cycles_drain_the_backlog_and_refresh_the_ratio() {
    let (database, _dir) = temp_database().await;
    database.upsert_company(&company("2330", "台積電", 0)).await.unwrap();
    let database = Arc::new(database);
    let collector = DataCollector::new(Arc::new(chain_source()), database.clone());

    // First cycle caps at five periods; the 2020 chain is still missing, so
    // the ratio carries no three-year figures yet.
    let summary = collector.run_cycle_as_of(as_of()).await.unwrap();
    assert_eq!(summary.periods_selected, 5);
    assert_eq!(summary.reports_ingested, 5);
    assert!(summary.ratio_written);

    let ratio = database
        .get_ratio("2330", Period::new(2023, 2))
        .await
        .unwrap()
        .expect("ratio stored after first cycle");
    assert_eq!(ratio.move_fcf, Decimal::from(100 + 180 - 90));
    assert_eq!(ratio.return_of_capital, Decimal::from(19));
    assert_eq!(ratio.avg3_return_of_capital, None);

    // Second cycle picks up the remaining two periods and completes the
    // three-year history.
    let summary = collector.run_cycle_as_of(as_of()).await.unwrap();
    assert_eq!(summary.periods_selected, 2);
    assert_eq!(summary.reports_ingested, 2);
    assert!(summary.ratio_written);

    let ratio = database
        .get_ratio("2330", Period::new(2023, 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ratio.last_return_of_capital, Some(Decimal::from(17)));
    assert_eq!(ratio.last2_return_of_capital, Some(Decimal::from(15)));
    assert!(ratio.avg3_return_of_capital.is_some());

    // Third cycle is a no-op, but fairness still advances the timestamp.
    let before = database.list_companies().await.unwrap()[0].process_time;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let summary = collector.run_cycle_as_of(as_of()).await.unwrap();
    assert_eq!(summary.periods_selected, 0);
    assert_eq!(summary.reports_ingested, 0);
    assert!(!summary.ratio_written);

    let after = database.list_companies().await.unwrap()[0].process_time;
    assert!(after > before, "no-op cycle must still update process_time");
}

#[test_log::test(tokio::test)]
async fn fairness_rotates_to_the_least_recently_processed_company() {
    let (database, _dir) = temp_database().await;
    database.upsert_company(&company("1101", "台泥", 0)).await.unwrap();
    database.upsert_company(&company("2330", "台積電", 5)).await.unwrap();
    let database = Arc::new(database);
    let collector = DataCollector::new(Arc::new(FakeReportSource::empty()), database.clone());

    let first = collector.run_cycle_as_of(as_of()).await.unwrap();
    assert_eq!(first.company_id.as_deref(), Some("1101"));

    let second = collector.run_cycle_as_of(as_of()).await.unwrap();
    assert_eq!(second.company_id.as_deref(), Some("2330"));
}

#[test_log::test(tokio::test)]
async fn malformed_period_does_not_abort_its_siblings() {
    let (database, _dir) = temp_database().await;
    database.upsert_company(&company("2330", "台積電", 0)).await.unwrap();
    let database = Arc::new(database);

    let mut documents = HashMap::new();
    documents.insert("/doc/good".to_string(), report_sections(100, 5000, 1000));
    let mut bad = report_sections(100, 5000, 1000);
    bad.insert(
        StatementSection::CashFlows,
        vec![row(&["AAAA", "營業活動之淨現金流入", "不適用"])],
    );
    documents.insert("/doc/bad".to_string(), bad);

    let source = FakeReportSource {
        listings: vec![
            AvailablePeriod {
                minguo_year_quarter: "112Q2".to_string(),
                doc_path: "/doc/good".to_string(),
            },
            AvailablePeriod {
                minguo_year_quarter: "112Q1".to_string(),
                doc_path: "/doc/bad".to_string(),
            },
        ],
        documents,
    };

    let collector = DataCollector::new(Arc::new(source), database.clone());
    let summary = collector.run_cycle_as_of(as_of()).await.unwrap();

    assert_eq!(summary.periods_selected, 2);
    assert_eq!(summary.reports_ingested, 1);
    assert_eq!(summary.reports_failed, 1);

    let periods = database.list_periods("2330").await.unwrap();
    assert!(periods.contains(&Period::new(2023, 2)));
    assert!(!periods.contains(&Period::new(2023, 1)));
}

#[test_log::test(tokio::test)]
async fn empty_document_is_reported_not_persisted() {
    let (database, _dir) = temp_database().await;
    database.upsert_company(&company("2330", "台積電", 0)).await.unwrap();
    let database = Arc::new(database);

    let mut sections = twse_valuation::models::SectionRows::new();
    sections.insert(
        StatementSection::BalanceSheet,
        vec![row(&["查無所需要的資料！", "", ""])],
    );

    let source = FakeReportSource {
        listings: vec![AvailablePeriod {
            minguo_year_quarter: "112Q2".to_string(),
            doc_path: "/doc/empty".to_string(),
        }],
        documents: HashMap::from([("/doc/empty".to_string(), sections)]),
    };

    let collector = DataCollector::new(Arc::new(source), database.clone());
    let summary = collector.run_cycle_as_of(as_of()).await.unwrap();

    assert_eq!(summary.reports_empty, 1);
    assert_eq!(summary.reports_ingested, 0);
    assert!(!summary.ratio_written);
    assert!(database.list_periods("2330").await.unwrap().is_empty());
}
