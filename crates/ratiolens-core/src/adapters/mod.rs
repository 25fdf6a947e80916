//! Concrete provider adapters.

mod fmp;
mod yahoo;

pub use fmp::{FmpAdapter, FMP_DEFAULT_BASE_URL};
pub use yahoo::{YahooAdapter, YAHOO_DEFAULT_BASE_URL};
