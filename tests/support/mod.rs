//! Offline engine wiring shared by the integration suites.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ratiolens_core::{Engine, EngineConfig, HttpClient, ScriptedHttpClient};

pub const FMP_URL: &str = "https://fmp.test/api/v3";
pub const YAHOO_URL: &str = "https://yahoo.test";

/// Defaults pointed at scripted hosts, with trend enrichment and peer pacing off.
pub fn offline_config() -> EngineConfig {
    EngineConfig {
        fmp_api_key: String::from("test-key"),
        fmp_base_url: String::from(FMP_URL),
        yahoo_base_url: String::from(YAHOO_URL),
        trend_metrics: Vec::new(),
        peer_spacing: Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub fn engine(config: EngineConfig, http: &Arc<ScriptedHttpClient>) -> Engine {
    let http: Arc<dyn HttpClient> = Arc::clone(http) as Arc<dyn HttpClient>;
    Engine::with_http(config, http).expect("offline config is valid")
}

pub fn fmp_ttm(symbol: &str) -> String {
    format!("/ratios-ttm/{symbol}.TRT")
}

pub fn fmp_quote(symbol: &str) -> String {
    format!("/quote/{symbol}.TRT")
}

pub fn yahoo_summary(symbol: &str) -> String {
    format!("/v10/finance/quoteSummary/{symbol}.TO")
}

pub fn yahoo_chart(symbol: &str) -> String {
    format!("/v8/finance/chart/{symbol}.TO")
}

/// Yahoo summary body with `financialData` and `summaryDetail` members.
pub fn summary_body(financial_data: &str, summary_detail: &str) -> String {
    format!(
        r#"{{"quoteSummary": {{"result": [{{"financialData": {{{financial_data}}}, "summaryDetail": {{{summary_detail}}}}}], "error": null}}}}"#
    )
}

pub const CHART_BODY: &str = r#"{"chart": {"result": [{
    "meta": {"regularMarketPrice": 51.0, "chartPreviousClose": 50.0,
             "fiftyTwoWeekHigh": 60.0, "fiftyTwoWeekLow": 40.0},
    "timestamp": [1717075800, 1717162200, 1717421400],
    "indicators": {"quote": [{
        "open":   [49.0, 49.5, 50.1],
        "high":   [50.5, 50.2, 51.4],
        "low":    [48.8, 49.1, 50.0],
        "close":  [50.0, 49.8, 51.0],
        "volume": [1200, 900, 1500]
    }]}
}], "error": null}}"#;
