use rust_decimal::Decimal;
use serde::Deserialize;

/// USD price per million tokens for one upstream model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPrice {
    pub input: Decimal,
    pub output: Decimal,
}
