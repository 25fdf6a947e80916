use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, ValidationError};

const MAX_SYMBOL_LEN: usize = 15;

/// Per-provider exchange suffixes for a single listing venue.
///
/// The default table describes the Toronto Stock Exchange, which Yahoo spells
/// `.TO` and FMP spells `.TRT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueTable {
    suffixes: BTreeMap<ProviderId, String>,
}

impl Default for VenueTable {
    fn default() -> Self {
        Self::new([(ProviderId::Yahoo, "TO"), (ProviderId::Fmp, "TRT")])
    }
}

impl VenueTable {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = (ProviderId, S)>,
        S: Into<String>,
    {
        let suffixes = suffixes
            .into_iter()
            .map(|(provider, suffix)| {
                let suffix: String = suffix.into();
                let suffix = suffix.trim().trim_start_matches('.').to_ascii_uppercase();
                (provider, suffix)
            })
            .collect();
        Self { suffixes }
    }

    pub fn suffix_for(&self, provider: ProviderId) -> Option<&str> {
        self.suffixes.get(&provider).map(String::as_str)
    }

    /// Known suffixes ordered longest first so `.TRT` wins over a hypothetical `.T`.
    fn known_suffixes(&self) -> Vec<&str> {
        let mut suffixes = self
            .suffixes
            .values()
            .map(String::as_str)
            .filter(|suffix| !suffix.is_empty())
            .collect::<Vec<_>>();
        suffixes.sort_by(|left, right| right.len().cmp(&left.len()).then(left.cmp(right)));
        suffixes.dedup();
        suffixes
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        for (provider, suffix) in &self.suffixes {
            let valid = !suffix.is_empty() && suffix.chars().all(|ch| ch.is_ascii_alphanumeric());
            if !valid {
                return Err(ValidationError::config(format!(
                    "venue suffix for '{provider}' must be non-empty and alphanumeric"
                )));
            }
        }
        Ok(())
    }
}

/// Canonical base ticker plus the spelling each provider expects on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    wire_forms: BTreeMap<ProviderId, String>,
}

impl Symbol {
    /// Canonical base ticker without any venue suffix, e.g. `TD`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Provider wire form. Providers without a venue suffix receive the bare base ticker.
    pub fn wire_form(&self, provider: ProviderId) -> &str {
        self.wire_forms
            .get(&provider)
            .map(String::as_str)
            .unwrap_or(self.base.as_str())
    }

    pub fn wire_forms(&self) -> &BTreeMap<ProviderId, String> {
        &self.wire_forms
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base)
    }
}

/// Derives [`Symbol`] values from raw user or provider input.
#[derive(Debug, Clone, Default)]
pub struct SymbolNormalizer {
    venue: VenueTable,
}

impl SymbolNormalizer {
    pub fn new(venue: VenueTable) -> Self {
        Self { venue }
    }

    pub fn venue(&self) -> &VenueTable {
        &self.venue
    }

    /// Normalizes any input into a symbol. Never fails: a missing or unknown
    /// suffix is treated as a bare ticker on the default venue.
    pub fn normalize(&self, raw: &str) -> Symbol {
        let cleaned = raw.trim().to_ascii_uppercase();
        let base = self.strip_known_suffix(&cleaned).to_owned();

        let wire_forms = self
            .venue
            .suffixes
            .iter()
            .map(|(provider, suffix)| (*provider, format!("{base}.{suffix}")))
            .collect();

        Symbol { base, wire_forms }
    }

    /// Validates request input and then normalizes it.
    pub fn parse(&self, raw: &str) -> Result<Symbol, ValidationError> {
        validate_ticker(raw)?;
        Ok(self.normalize(raw))
    }

    fn strip_known_suffix<'a>(&self, cleaned: &'a str) -> &'a str {
        for suffix in self.venue.known_suffixes() {
            if let Some(stripped) = cleaned.strip_suffix(suffix) {
                if let Some(base) = stripped.strip_suffix('.') {
                    if !base.is_empty() {
                        return base;
                    }
                }
            }
        }
        cleaned
    }
}

/// Rejects tickers that could never be sent to a provider.
pub fn validate_ticker(input: &str) -> Result<(), ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let len = trimmed.chars().count();
    if len > MAX_SYMBOL_LEN {
        return Err(ValidationError::SymbolTooLong {
            len,
            max: MAX_SYMBOL_LEN,
        });
    }

    if let Some(first) = trimmed.chars().next() {
        if !first.is_ascii_alphabetic() {
            return Err(ValidationError::SymbolInvalidStart { ch: first });
        }
    }

    for (index, ch) in trimmed.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-';
        if !valid {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }
    }

    Ok(())
}
