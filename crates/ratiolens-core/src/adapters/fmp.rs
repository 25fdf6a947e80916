use serde_json::{Map, Value};

use crate::data_source::{CapabilitySet, Endpoint, RatioSource, SourceFuture};
use crate::http_client::HttpRequest;
use crate::provider::{Decoded, ProviderCall, ProviderClient};
use crate::provider_policy::ProviderPolicy;
use crate::{Metric, ProviderId, Quote, RatioSnapshot, Symbol, UtcDateTime};

pub const FMP_DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// Response field names per metric. Trailing-twelve-month rows use the same
/// names with a `TTM` suffix, which [`field_number`] tries as well.
const FMP_FIELDS: &[(Metric, &[&str])] = &[
    (Metric::PeRatio, &["priceEarningsRatio", "peRatio"]),
    (Metric::PbRatio, &["priceToBookRatio", "pbRatio"]),
    (Metric::PsRatio, &["priceToSalesRatio"]),
    (Metric::PegRatio, &["pegRatio", "priceEarningsToGrowthRatio"]),
    (Metric::EvToEbitda, &["enterpriseValueOverEBITDA", "enterpriseValueMultiple"]),
    (Metric::PriceToCashFlow, &["priceCashFlowRatio", "priceToOperatingCashFlowsRatio"]),
    (Metric::Roe, &["returnOnEquity"]),
    (Metric::Roa, &["returnOnAssets"]),
    (Metric::Roic, &["returnOnCapitalEmployed"]),
    (Metric::GrossMargin, &["grossProfitMargin"]),
    (Metric::OperatingMargin, &["operatingProfitMargin"]),
    (Metric::NetMargin, &["netProfitMargin"]),
    (Metric::CurrentRatio, &["currentRatio"]),
    (Metric::QuickRatio, &["quickRatio"]),
    (Metric::CashRatio, &["cashRatio"]),
    (Metric::DebtToEquity, &["debtEquityRatio", "debtToEquity"]),
    (Metric::DebtToAssets, &["debtRatio"]),
    (Metric::InterestCoverage, &["interestCoverage", "timesInterestEarnedRatio"]),
    (Metric::AssetTurnover, &["assetTurnover"]),
    (Metric::InventoryTurnover, &["inventoryTurnover"]),
    (Metric::ReceivablesTurnover, &["receivablesTurnover"]),
    (Metric::PayablesTurnover, &["payablesTurnover"]),
];

/// Financial Modeling Prep adapter: TTM ratios, annual ratios and quotes.
#[derive(Clone)]
pub struct FmpAdapter {
    client: ProviderClient,
    policy: ProviderPolicy,
    base_url: String,
    api_key: String,
}

impl FmpAdapter {
    pub fn new(
        client: ProviderClient,
        policy: ProviderPolicy,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            policy,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        }
    }

    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    fn request(&self, path: &str, wire: &str) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/{path}/{}",
            self.base_url,
            urlencoding::encode(wire)
        ))
        .with_query("apikey", self.api_key.clone())
    }
}

impl RatioSource for FmpAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Fmp
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true, false)
    }

    fn current_ratios<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, RatioSnapshot> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Fmp);
            let call = ProviderCall::new(
                Endpoint::Ratios.as_str(),
                symbol.base(),
                self.request("ratios-ttm", wire),
            );
            self.client.fetch(&self.policy, call, decode_ratios_ttm).await
        })
    }

    fn ratio_history<'a>(
        &'a self,
        symbol: &'a Symbol,
        limit: usize,
    ) -> SourceFuture<'a, Vec<RatioSnapshot>> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Fmp);
            let request = self
                .request("ratios", wire)
                .with_query("limit", limit.max(1).to_string());
            let call = ProviderCall::new(Endpoint::RatioHistory.as_str(), symbol.base(), request);
            self.client.fetch(&self.policy, call, decode_ratio_history).await
        })
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Quote> {
        Box::pin(async move {
            let wire = symbol.wire_form(ProviderId::Fmp);
            let call = ProviderCall::new(
                Endpoint::Quote.as_str(),
                symbol.base(),
                self.request("quote", wire),
            );
            let base = symbol.base().to_owned();
            self.client
                .fetch(&self.policy, call, move |body| decode_quote(body, &base))
                .await
        })
    }
}

/// Splits an FMP body into its row list, its error payload, or nothing.
fn rows(body: &str) -> Decoded<Vec<Map<String, Value>>> {
    if body.trim().is_empty() {
        return Decoded::Empty;
    }
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(error) => return Decoded::Malformed(format!("invalid FMP JSON: {error}")),
    };

    match value {
        Value::Null => Decoded::Empty,
        Value::Object(object) => match object.get("Error Message").and_then(Value::as_str) {
            Some(message) => Decoded::ProviderReported(format!("FMP API error: {message}")),
            None if object.is_empty() => Decoded::Empty,
            None => Decoded::Malformed(String::from("expected a JSON array of rows")),
        },
        Value::Array(items) if items.is_empty() => Decoded::Empty,
        Value::Array(items) => {
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(row) => rows.push(row),
                    other => {
                        return Decoded::Malformed(format!("expected object rows, found {other}"))
                    }
                }
            }
            Decoded::Payload(rows)
        }
        other => Decoded::Malformed(format!("unexpected FMP payload: {other}")),
    }
}

fn field_number(row: &Map<String, Value>, name: &str) -> Option<Option<f64>> {
    row.get(name)
        .or_else(|| row.get(&format!("{name}TTM")))
        .map(Value::as_f64)
}

fn snapshot_from_row(row: &Map<String, Value>) -> RatioSnapshot {
    let mut snapshot = RatioSnapshot::new();
    for (metric, names) in FMP_FIELDS {
        if let Some(value) = names.iter().find_map(|name| field_number(row, name)) {
            snapshot.insert(*metric, value);
        }
    }
    if let Some(date) = row.get("date").and_then(Value::as_str) {
        snapshot.period = Some(date.to_owned());
    }
    snapshot
}

pub(crate) fn decode_ratios_ttm(body: &str) -> Decoded<RatioSnapshot> {
    match rows(body) {
        Decoded::Payload(rows) => match rows.first() {
            Some(row) => {
                let snapshot = snapshot_from_row(row);
                let period = snapshot.period.clone().unwrap_or_else(|| String::from("TTM"));
                Decoded::Payload(snapshot.with_period(period))
            }
            None => Decoded::Empty,
        },
        Decoded::Empty => Decoded::Empty,
        Decoded::ProviderReported(message) => Decoded::ProviderReported(message),
        Decoded::Malformed(message) => Decoded::Malformed(message),
    }
}

pub(crate) fn decode_ratio_history(body: &str) -> Decoded<Vec<RatioSnapshot>> {
    match rows(body) {
        Decoded::Payload(rows) => Decoded::Payload(rows.iter().map(snapshot_from_row).collect()),
        Decoded::Empty => Decoded::Empty,
        Decoded::ProviderReported(message) => Decoded::ProviderReported(message),
        Decoded::Malformed(message) => Decoded::Malformed(message),
    }
}

pub(crate) fn decode_quote(body: &str, symbol: &str) -> Decoded<Quote> {
    let rows = match rows(body) {
        Decoded::Payload(rows) => rows,
        Decoded::Empty => return Decoded::Empty,
        Decoded::ProviderReported(message) => return Decoded::ProviderReported(message),
        Decoded::Malformed(message) => return Decoded::Malformed(message),
    };
    let Some(row) = rows.first() else {
        return Decoded::Empty;
    };
    let number = |name: &str| row.get(name).and_then(Value::as_f64).filter(|v| v.is_finite());

    let Some(price) = number("price") else {
        return Decoded::Malformed(String::from("FMP quote row has no numeric 'price'"));
    };
    let as_of = row
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(UtcDateTime::from_unix_seconds)
        .unwrap_or_else(UtcDateTime::now);

    Decoded::Payload(Quote {
        symbol: symbol.to_owned(),
        price,
        change: number("change"),
        change_percent: number("changesPercentage"),
        volume: number("volume").filter(|v| *v >= 0.0).map(|v| v as u64),
        market_cap: number("marketCap"),
        day_high: number("dayHigh"),
        day_low: number("dayLow"),
        year_high: number("yearHigh"),
        year_low: number("yearLow"),
        as_of,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http_client::{ScriptedHttpClient, ScriptedReply};
    use crate::outcome::{FailureKind, FetchOutcome};
    use crate::SymbolNormalizer;

    #[test]
    fn ttm_row_maps_suffixed_fields() {
        let body = r#"[{"peRatioTTM": 12.5, "priceToBookRatioTTM": 1.8,
            "returnOnEquityTTM": 0.16, "currentRatioTTM": null,
            "debtEquityRatioTTM": 0.4, "netProfitMarginTTM": 0.21}]"#;

        let Decoded::Payload(snapshot) = decode_ratios_ttm(body) else {
            panic!("expected payload");
        };

        assert_eq!(snapshot.get(Metric::PeRatio), Some(12.5));
        assert_eq!(snapshot.get(Metric::PbRatio), Some(1.8));
        assert_eq!(snapshot.get(Metric::Roe), Some(0.16));
        assert_eq!(snapshot.get(Metric::DebtToEquity), Some(0.4));
        assert_eq!(snapshot.get(Metric::CurrentRatio), None);
        assert!(snapshot.values.contains_key(&Metric::CurrentRatio));
        assert_eq!(snapshot.period.as_deref(), Some("TTM"));
    }

    #[test]
    fn error_message_object_is_provider_reported() {
        let body = r#"{"Error Message": "Invalid API KEY."}"#;
        assert_eq!(
            decode_ratios_ttm(body),
            Decoded::ProviderReported(String::from("FMP API error: Invalid API KEY."))
        );
    }

    #[test]
    fn empty_array_is_distinguished_from_error_and_garbage() {
        assert_eq!(decode_ratios_ttm("[]"), Decoded::Empty);
        assert_eq!(decode_ratios_ttm("  "), Decoded::Empty);
        assert!(matches!(decode_ratios_ttm("<html>"), Decoded::Malformed(_)));
        assert!(matches!(decode_ratios_ttm("[1, 2]"), Decoded::Malformed(_)));
    }

    #[test]
    fn history_rows_carry_their_fiscal_date() {
        let body = r#"[{"date": "2024-10-31", "returnOnEquity": 0.13},
                       {"date": "2023-10-31", "returnOnEquity": 0.15}]"#;

        let Decoded::Payload(history) = decode_ratio_history(body) else {
            panic!("expected payload");
        };

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period.as_deref(), Some("2024-10-31"));
        assert_eq!(history[1].get(Metric::Roe), Some(0.15));
    }

    #[test]
    fn quote_requires_a_price() {
        let body = r#"[{"symbol": "RY.TRT", "price": 142.1, "changesPercentage": 0.52,
            "volume": 3100200, "yearHigh": 150.0, "yearLow": 110.0, "timestamp": 1717000000}]"#;

        let Decoded::Payload(quote) = decode_quote(body, "RY") else {
            panic!("expected payload");
        };
        assert_eq!(quote.symbol, "RY");
        assert_eq!(quote.volume, Some(3_100_200));
        assert_eq!(quote.change_percent, Some(0.52));

        assert!(matches!(
            decode_quote(r#"[{"symbol": "RY.TRT"}]"#, "RY"),
            Decoded::Malformed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_requests_wire_form_with_api_key() {
        let http = Arc::new(
            ScriptedHttpClient::new().on("/ratios-ttm/TD.TRT", ScriptedReply::json(r#"[{"peRatioTTM": 10.0}]"#)),
        );
        let adapter = FmpAdapter::new(
            ProviderClient::with_budget(http.clone(), 2),
            ProviderPolicy::fmp_default(),
            "https://fmp.test/api/v3/",
            "k3y",
        );
        let symbol = SymbolNormalizer::default().normalize("td");

        let outcome = adapter.current_ratios(&symbol).await;

        assert!(outcome.is_success());
        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://fmp.test/api/v3/ratios-ttm/TD.TRT?apikey=k3y");
    }

    #[tokio::test(start_paused = true)]
    async fn price_history_is_not_offered() {
        let adapter = FmpAdapter::new(
            ProviderClient::with_budget(Arc::new(ScriptedHttpClient::new()), 1),
            ProviderPolicy::fmp_default(),
            FMP_DEFAULT_BASE_URL,
            "demo",
        );
        let symbol = SymbolNormalizer::default().normalize("TD");
        let range = crate::HistoryRange::days(5).expect("range");

        let outcome = adapter.price_history(&symbol, range).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failure { kind: FailureKind::Unsupported, attempts: 0, .. }
        ));
    }
}
