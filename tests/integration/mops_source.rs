//! MOPS and registry scraping against a canned HTTP server.

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use twse_valuation::api::{CompanyDirectory, MopsClient, ReportSource};
use twse_valuation::models::{AvailablePeriod, Config, Period};
use twse_valuation::report_parser;

const LISTING_HTML: &str = r#"
    <table>
      <tr><th>年度/季別</th><th>報表</th><th>核准日</th><th>檔案</th></tr>
      <tr>
        <td>112Q2</td><td>財務報告</td><td>112/08/10</td>
        <td><input type="button" value="查閱" onclick="window.open('/doc/112Q2', 'new');"></td>
      </tr>
      <tr>
        <td>108Q4</td><td>財務報告</td><td>109/03/20</td>
        <td><input type="button" value="查閱" onclick="window.open('/doc/108Q4', 'new');"></td>
      </tr>
      <tr>
        <td>112Q1</td><td>財務報告</td><td>112/05/10</td><td>尚未提供</td>
      </tr>
    </table>
"#;

const REPORT_HTML: &str = r#"
    <span id="BalanceSheet">資產負債表</span>
    <div>單位：新台幣仟元</div>
    <table>
      <tr><th>代號</th><th>會計項目</th><th>金額</th></tr>
      <tr><td>1XXX</td><td>資產總額</td><td>1,234</td></tr>
      <tr><td>3XXX</td><td>權益總額</td><td>1,000</td></tr>
    </table>
    <span id="StatementsOfCashFlows">現金流量表</span>
    <div>單位：新台幣仟元</div>
    <table>
      <tr><td>AAAA</td><td>營業活動之淨現金流入</td><td>(250)</td></tr>
    </table>
"#;

fn config_for(server: &MockServer) -> Config {
    Config {
        database_path: "unused.db".to_string(),
        mops_base_url: server.uri(),
        isin_base_url: server.uri(),
        http_timeout_secs: 5,
    }
}

#[test_log::test(tokio::test)]
async fn period_listing_is_scraped_from_the_disclosure_site() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mops/web/ajax_t203sb01"))
        .and(body_string_contains("co_id=2330"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING_HTML))
        .mount(&server)
        .await;

    let client = MopsClient::new(&config_for(&server)).unwrap();
    let periods = client.list_available_periods("2330").await.unwrap();

    // Rows without a document link are dropped at the scraping boundary;
    // out-of-range years are the period selector's concern, so 108Q4 stays.
    assert_eq!(
        periods,
        vec![
            AvailablePeriod {
                minguo_year_quarter: "112Q2".to_string(),
                doc_path: "/doc/112Q2".to_string(),
            },
            AvailablePeriod {
                minguo_year_quarter: "108Q4".to_string(),
                doc_path: "/doc/108Q4".to_string(),
            },
        ]
    );
}

#[test_log::test(tokio::test)]
async fn fetched_sections_feed_straight_into_the_report_parser() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc/112Q2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REPORT_HTML))
        .mount(&server)
        .await;

    let client = MopsClient::new(&config_for(&server)).unwrap();
    let sections = client.fetch_sections("/doc/112Q2").await.unwrap();

    let report = report_parser::build_report("2330", Period::new(2023, 2), &sections).unwrap();
    assert_eq!(report.account("1XXX"), Some(Decimal::from(1234)));
    assert_eq!(report.account("3XXX"), Some(Decimal::from(1000)));
    assert_eq!(report.account("AAAA"), Some(Decimal::from(-250)));
}

#[test_log::test(tokio::test)]
async fn registry_pages_for_both_boards_are_combined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/isin/C_public.jsp"))
        .and(query_param("strMode", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table><tr>
                <td>2330　台積電</td><td>x</td><td>x</td><td>x</td>
                <td>半導體業</td><td>ESVUFR</td><td>x</td>
            </tr></table>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/isin/C_public.jsp"))
        .and(query_param("strMode", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table><tr>
                <td>5483　中美晶</td><td>x</td><td>x</td><td>x</td>
                <td>半導體業</td><td>ESVUFR</td><td>x</td>
            </tr></table>"#,
        ))
        .mount(&server)
        .await;

    let client = MopsClient::new(&config_for(&server)).unwrap();
    let listings = client.list_listed_companies().await.unwrap();

    let ids: Vec<&str> = listings.iter().map(|l| l.company_id.as_str()).collect();
    assert_eq!(ids, vec!["2330", "5483"]);
}
