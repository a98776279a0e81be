//! Symbol search and provider request shapes, against scripted HTTP.

use histfetch_core::config::Credentials;
use histfetch_core::data::alpha_vantage::BASE_URL;
use histfetch_core::data::{
    AlphaVantageSource, FetchError, HttpResponse, PageRequest, SeriesSource, SymbolSearch,
};
use histfetch_core::domain::{parse_timestamp, BarInterval, FetchWindow};
use histfetch_core::testing::ScriptedTransport;
use std::sync::Arc;

const SEARCH_CSV: &str = "symbol,name,type,region,marketOpen,marketClose,timezone,currency,matchScore\n\
AAPL,Apple Inc,Equity,United States,09:30,16:00,UTC-04,USD,0.8889\n\
AAPL34.SAO,Apple Inc,Equity,Brazil/Sao Paolo,10:00,17:30,UTC-03,BRL,0.6667\n";

fn source(transport: Arc<ScriptedTransport>) -> AlphaVantageSource {
    AlphaVantageSource::new(transport, Credentials::new("demo"))
}

#[test]
fn search_sends_expected_query_and_decodes_matches() {
    let transport = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(SEARCH_CSV))]));
    let matches = source(transport.clone()).search("apple").unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[1].symbol, "AAPL34.SAO");
    assert_eq!(matches[1].region, "Brazil/Sao Paolo");
    assert_eq!(matches[1].currency, "BRL");

    let request = &transport.requests()[0];
    assert_eq!(request.url, BASE_URL);
    assert_eq!(request.param("function"), Some("SYMBOL_SEARCH"));
    assert_eq!(request.param("keywords"), Some("apple"));
    assert_eq!(request.param("apikey"), Some("demo"));
    assert_eq!(request.param("datatype"), Some("csv"));
}

#[test]
fn search_non_200_is_a_hard_failure() {
    let transport = Arc::new(ScriptedTransport::new([Ok(HttpResponse::new(
        502,
        "bad gateway",
    ))]));
    let err = source(transport).search("apple").unwrap_err();
    assert_eq!(
        err,
        FetchError::Http {
            status: 502,
            body: "bad gateway".into()
        }
    );
}

#[test]
fn search_requires_api_key() {
    let transport = Arc::new(ScriptedTransport::default());
    let source = AlphaVantageSource::new(transport.clone(), Credentials::none());
    assert!(matches!(source.search("apple"), Err(FetchError::Config(_))));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn search_with_no_matches_is_empty() {
    let header_only = "symbol,name,type,region,marketOpen,marketClose,timezone,currency,matchScore\n";
    let transport = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(header_only))]));
    assert!(source(transport).search("zzzz").unwrap().is_empty());
}

#[test]
fn intraday_request_carries_month_selector() {
    let transport = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(
        "timestamp,open,high,low,close,volume\n2024-02-29 19:59:00,1,2,0.5,1.5,10\n",
    ))]));
    let source = source(transport.clone()).with_base_url("http://localhost:9/query");
    let window =
        FetchWindow::calendar_month(parse_timestamp("2024-02-10").unwrap().date()).unwrap();

    let page = source
        .fetch_page(&PageRequest {
            symbol: "IBM",
            interval: BarInterval::FiveMinutes,
            window,
            limit: None,
        })
        .unwrap();
    let rows = source.normalize(page).unwrap();
    assert_eq!(rows.len(), 1);

    let request = &transport.requests()[0];
    assert_eq!(request.url, "http://localhost:9/query");
    assert_eq!(request.param("function"), Some("TIME_SERIES_INTRADAY"));
    assert_eq!(request.param("symbol"), Some("IBM"));
    assert_eq!(request.param("interval"), Some("5min"));
    assert_eq!(request.param("outputsize"), Some("full"));
    assert_eq!(request.param("month"), Some("2024-02"));
}

#[test]
fn intraday_page_without_marker_is_malformed() {
    let transport = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(
        "{\"Note\": \"Thank you for using Alpha Vantage!\"}",
    ))]));
    let source = source(transport);
    let window = FetchWindow::calendar_month(parse_timestamp("2024-02-10").unwrap().date()).unwrap();

    let err = source
        .fetch_page(&PageRequest {
            symbol: "IBM",
            interval: BarInterval::OneMinute,
            window,
            limit: None,
        })
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
}
