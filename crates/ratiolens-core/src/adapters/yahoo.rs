use serde::Deserialize;
use serde_json::{Map, Value};

use crate::data_source::{CapabilitySet, Endpoint, RatioSource, SourceFuture};
use crate::http_client::HttpRequest;
use crate::provider::{Decoded, ProviderCall, ProviderClient};
use crate::provider_policy::ProviderPolicy;
use crate::{
    Bar, BarSeries, HistoryRange, Metric, ProviderId, Quote, RatioSnapshot, Symbol, UtcDateTime,
};

pub const YAHOO_DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const SUMMARY_MODULES: &str = "financialData,defaultKeyStatistics,summaryDetail";

/// `(module, field, metric)` lookups; the first module holding a number wins.
const SUMMARY_FIELDS: &[(Metric, &[(&str, &str)])] = &[
    (Metric::PeRatio, &[("summaryDetail", "trailingPE")]),
    (
        Metric::ForwardPe,
        &[("summaryDetail", "forwardPE"), ("defaultKeyStatistics", "forwardPE")],
    ),
    (Metric::PbRatio, &[("defaultKeyStatistics", "priceToBook")]),
    (Metric::PsRatio, &[("summaryDetail", "priceToSalesTrailing12Months")]),
    (Metric::PegRatio, &[("defaultKeyStatistics", "pegRatio")]),
    (Metric::EvToEbitda, &[("defaultKeyStatistics", "enterpriseToEbitda")]),
    (Metric::Roe, &[("financialData", "returnOnEquity")]),
    (Metric::Roa, &[("financialData", "returnOnAssets")]),
    (Metric::GrossMargin, &[("financialData", "grossMargins")]),
    (Metric::OperatingMargin, &[("financialData", "operatingMargins")]),
    (
        Metric::NetMargin,
        &[("financialData", "profitMargins"), ("defaultKeyStatistics", "profitMargins")],
    ),
    (Metric::CurrentRatio, &[("financialData", "currentRatio")]),
    (Metric::QuickRatio, &[("financialData", "quickRatio")]),
    (Metric::DebtToEquity, &[("financialData", "debtToEquity")]),
];

/// Yahoo Finance adapter: quote summary ratios, daily chart history and a
/// chart-derived quote.
#[derive(Clone)]
pub struct YahooAdapter {
    client: ProviderClient,
    policy: ProviderPolicy,
    base_url: String,
    crumb: Option<String>,
    cookie: Option<String>,
}

impl YahooAdapter {
    pub fn new(client: ProviderClient, policy: ProviderPolicy, base_url: impl Into<String>) -> Self {
        Self {
            client,
            policy,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            crumb: None,
            cookie: None,
        }
    }

    /// Session credentials for deployments where Yahoo demands a crumb.
    pub fn with_session(mut self, crumb: Option<String>, cookie: Option<String>) -> Self {
        self.crumb = crumb.filter(|value| !value.trim().is_empty());
        self.cookie = cookie.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    fn request(&self, path: &str, wire: &str) -> HttpRequest {
        let mut request = HttpRequest::get(format!(
            "{}/{path}/{}",
            self.base_url,
            urlencoding::encode(wire)
        ))
        .with_header("referer", "https://finance.yahoo.com/");
        if let Some(crumb) = &self.crumb {
            request = request.with_query("crumb", crumb.clone());
        }
        if let Some(cookie) = &self.cookie {
            request = request.with_header("cookie", cookie.clone());
        }
        request
    }

    fn chart_request(&self, wire: &str, range: &str) -> HttpRequest {
        self.request("v8/finance/chart", wire)
            .with_query("range", range)
            .with_query("interval", "1d")
    }
}

impl RatioSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, false, true, true)
    }

    fn current_ratios<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, RatioSnapshot> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Yahoo);
            let request = self
                .request("v10/finance/quoteSummary", wire)
                .with_query("modules", SUMMARY_MODULES);
            let call = ProviderCall::new(Endpoint::Ratios.as_str(), symbol.base(), request);
            self.client.fetch(&self.policy, call, decode_quote_summary).await
        })
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Quote> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Yahoo);
            let call = ProviderCall::new(
                Endpoint::Quote.as_str(),
                symbol.base(),
                self.chart_request(wire, "5d"),
            );
            let base = symbol.base().to_owned();
            self.client
                .fetch(&self.policy, call, move |body| decode_chart_quote(body, &base))
                .await
        })
    }

    fn price_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: HistoryRange,
    ) -> SourceFuture<'a, BarSeries> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Yahoo);
            let call = ProviderCall::new(
                Endpoint::PriceHistory.as_str(),
                symbol.base(),
                self.chart_request(wire, range.as_chart_range()),
            );
            let base = symbol.base().to_owned();
            self.client
                .fetch(&self.policy, call, move |body| decode_chart_bars(body, &base))
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryData,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("Yahoo API error {code}: {description}"),
            (None, Some(description)) => format!("Yahoo API error: {description}"),
            (Some(code), None) => format!("Yahoo API error {code}"),
            (None, None) => String::from("Yahoo API error"),
        }
    }
}

/// Yahoo wraps most numbers as `{"raw": 1.2, "fmt": "1.20"}`; `{}` means missing.
fn raw_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Object(object) => object.get("raw").and_then(Value::as_f64),
        _ => None,
    }
    .filter(|number| number.is_finite())
}

/// Why a Yahoo body carries no usable result.
enum Unusable {
    Empty,
    Reported(String),
    Malformed(String),
}

impl Unusable {
    fn decoded<T>(self) -> Decoded<T> {
        match self {
            Self::Empty => Decoded::Empty,
            Self::Reported(message) => Decoded::ProviderReported(message),
            Self::Malformed(message) => Decoded::Malformed(message),
        }
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, Unusable> {
    if body.trim().is_empty() {
        return Err(Unusable::Empty);
    }
    serde_json::from_str(body)
        .map_err(|error| Unusable::Malformed(format!("invalid Yahoo JSON: {error}")))
}

fn first<T>(rows: Option<Vec<T>>) -> Option<T> {
    rows.and_then(|rows| rows.into_iter().next())
}

pub(crate) fn decode_quote_summary(body: &str) -> Decoded<RatioSnapshot> {
    let response: QuoteSummaryResponse = match parse_json(body) {
        Ok(response) => response,
        Err(unusable) => return unusable.decoded(),
    };
    if let Some(error) = response.quote_summary.error {
        return Decoded::ProviderReported(error.message());
    }
    let Some(result) = first(response.quote_summary.result) else {
        return Decoded::Empty;
    };

    let mut snapshot = RatioSnapshot::new();
    for (metric, lookups) in SUMMARY_FIELDS {
        let reported = lookups
            .iter()
            .filter_map(|(module, field)| result.get(*module)?.get(*field))
            .collect::<Vec<_>>();
        if reported.is_empty() {
            continue;
        }
        let mut value = reported.into_iter().find_map(raw_number);
        if *metric == Metric::DebtToEquity {
            // Reported in percent.
            value = value.map(|percent| percent / 100.0);
        }
        snapshot.insert(*metric, value);
    }
    Decoded::Payload(snapshot.with_period("TTM"))
}

fn chart_result(body: &str) -> Result<ChartResult, Unusable> {
    let response: ChartResponse = parse_json(body)?;
    if let Some(error) = response.chart.error {
        return Err(Unusable::Reported(error.message()));
    }
    first(response.chart.result).ok_or(Unusable::Empty)
}

fn bars_from(result: &ChartResult) -> Vec<Bar> {
    let Some(timestamps) = &result.timestamp else {
        return Vec::new();
    };
    let quote = result
        .indicators
        .as_ref()
        .and_then(|indicators| indicators.quote.first());
    let Some(quote) = quote else {
        return Vec::new();
    };

    timestamps
        .iter()
        .enumerate()
        .filter_map(|(index, seconds)| {
            let ts = UtcDateTime::from_unix_seconds(*seconds)?;
            let open = quote.open.get(index).copied().flatten()?;
            let high = quote.high.get(index).copied().flatten()?;
            let low = quote.low.get(index).copied().flatten()?;
            let close = quote.close.get(index).copied().flatten()?;
            let volume = quote
                .volume
                .get(index)
                .copied()
                .flatten()
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64);
            Bar::new(ts, open, high, low, close, volume).ok()
        })
        .collect()
}

/// Zero rows in the window is a valid empty series, not a failure.
pub(crate) fn decode_chart_bars(body: &str, symbol: &str) -> Decoded<BarSeries> {
    match chart_result(body) {
        Ok(result) => Decoded::Payload(BarSeries {
            symbol: symbol.to_owned(),
            bars: bars_from(&result),
        }),
        Err(unusable) => unusable.decoded(),
    }
}

pub(crate) fn decode_chart_quote(body: &str, symbol: &str) -> Decoded<Quote> {
    let result = match chart_result(body) {
        Ok(result) => result,
        Err(unusable) => return unusable.decoded(),
    };
    let bars = bars_from(&result);
    let meta = &result.meta;
    let last = bars.last();

    let Some(price) = meta.regular_market_price.or(last.map(|bar| bar.close)) else {
        return Decoded::Empty;
    };
    let previous_close = meta
        .chart_previous_close
        .or(meta.previous_close)
        .or_else(|| bars.iter().rev().nth(1).map(|bar| bar.close))
        .filter(|close| *close > 0.0);
    let change = previous_close.map(|previous| price - previous);
    let change_percent = previous_close
        .zip(change)
        .map(|(previous, change)| (change / previous * 100.0 * 100.0).round() / 100.0);
    let as_of = meta
        .regular_market_time
        .and_then(UtcDateTime::from_unix_seconds)
        .or(last.map(|bar| bar.ts))
        .unwrap_or_else(UtcDateTime::now);

    Decoded::Payload(Quote {
        symbol: symbol.to_owned(),
        price,
        change,
        change_percent,
        volume: meta
            .regular_market_volume
            .filter(|v| *v >= 0.0)
            .map(|v| v as u64)
            .or(last.and_then(|bar| bar.volume)),
        market_cap: None,
        day_high: meta.regular_market_day_high.or(last.map(|bar| bar.high)),
        day_low: meta.regular_market_day_low.or(last.map(|bar| bar.low)),
        year_high: meta.fifty_two_week_high,
        year_low: meta.fifty_two_week_low,
        as_of,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http_client::{ScriptedHttpClient, ScriptedReply};
    use crate::SymbolNormalizer;

    const SUMMARY: &str = r#"{"quoteSummary": {"result": [{
        "financialData": {"currentRatio": {"raw": 1.6, "fmt": "1.60"},
                          "debtToEquity": {"raw": 85.0, "fmt": "85.00"},
                          "returnOnEquity": {"raw": 0.11}, "quickRatio": {}},
        "summaryDetail": {"trailingPE": {"raw": 13.4}},
        "defaultKeyStatistics": {"priceToBook": {"raw": 1.9}, "profitMargins": {"raw": 0.27}}
    }], "error": null}}"#;

    #[test]
    fn summary_modules_map_to_metrics() {
        let Decoded::Payload(snapshot) = decode_quote_summary(SUMMARY) else {
            panic!("expected payload");
        };

        assert_eq!(snapshot.get(Metric::CurrentRatio), Some(1.6));
        assert_eq!(snapshot.get(Metric::DebtToEquity), Some(0.85));
        assert_eq!(snapshot.get(Metric::PeRatio), Some(13.4));
        assert_eq!(snapshot.get(Metric::PbRatio), Some(1.9));
        assert_eq!(snapshot.get(Metric::NetMargin), Some(0.27));
        assert_eq!(snapshot.get(Metric::QuickRatio), None);
        assert!(snapshot.values.contains_key(&Metric::QuickRatio));
        assert!(!snapshot.values.contains_key(&Metric::PegRatio));
    }

    #[test]
    fn summary_error_is_provider_reported() {
        let body = r#"{"quoteSummary": {"result": null,
            "error": {"code": "Not Found", "description": "Quote not found for ticker symbol: ZZZ.TO"}}}"#;

        assert!(matches!(
            decode_quote_summary(body),
            Decoded::ProviderReported(message) if message.contains("ZZZ.TO")
        ));
        assert_eq!(
            decode_quote_summary(r#"{"quoteSummary": {"result": [], "error": null}}"#),
            Decoded::Empty
        );
        assert!(matches!(decode_quote_summary("{\"x\":1}"), Decoded::Malformed(_)));
    }

    const CHART: &str = r#"{"chart": {"result": [{
        "meta": {"regularMarketPrice": 51.0, "chartPreviousClose": 50.0,
                 "fiftyTwoWeekHigh": 60.0, "fiftyTwoWeekLow": 40.0},
        "timestamp": [1717075800, 1717162200, 1717421400],
        "indicators": {"quote": [{
            "open":   [49.0, 49.5, null],
            "high":   [50.5, 50.2, 51.4],
            "low":    [48.8, 49.1, 50.0],
            "close":  [50.0, 49.8, 51.0],
            "volume": [1200, 900, 1500]
        }]}
    }], "error": null}}"#;

    #[test]
    fn chart_rows_with_gaps_are_skipped() {
        let Decoded::Payload(series) = decode_chart_bars(CHART, "SU") else {
            panic!("expected payload");
        };
        assert_eq!(series.symbol, "SU");
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[1].close, 49.8);
    }

    #[test]
    fn chart_without_rows_is_an_empty_series() {
        let body = r#"{"chart": {"result": [{"meta": {}, "indicators": {"quote": [{}]}}], "error": null}}"#;

        assert_eq!(
            decode_chart_bars(body, "SU"),
            Decoded::Payload(BarSeries {
                symbol: String::from("SU"),
                bars: Vec::new(),
            })
        );
    }

    #[test]
    fn chart_quote_uses_previous_close_for_change() {
        let Decoded::Payload(quote) = decode_chart_quote(CHART, "SU") else {
            panic!("expected payload");
        };

        assert_eq!(quote.price, 51.0);
        assert_eq!(quote.change, Some(1.0));
        assert_eq!(quote.change_percent, Some(2.0));
        assert_eq!(quote.year_high, Some(60.0));
        let position = quote.range_position().expect("range position");
        assert!((position - 55.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn session_crumb_and_cookie_are_sent() {
        let http = Arc::new(ScriptedHttpClient::new().on("quoteSummary/ENB.TO", ScriptedReply::json(SUMMARY)));
        let adapter = YahooAdapter::new(
            ProviderClient::with_budget(http.clone(), 2),
            ProviderPolicy::yahoo_default(),
            "https://yahoo.test",
        )
        .with_session(Some(String::from("abc")), Some(String::from("B=1")));
        let symbol = SymbolNormalizer::default().normalize("ENB.TO");

        let outcome = adapter.current_ratios(&symbol).await;

        assert!(outcome.is_success());
        let url = &http.calls()[0].url;
        assert!(url.starts_with("https://yahoo.test/v10/finance/quoteSummary/ENB.TO?"));
        assert!(url.contains("crumb=abc"));
    }
}
