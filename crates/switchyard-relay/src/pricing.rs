use indexmap::IndexMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use switchyard_config::ModelPrice;

/// Tokens per pricing unit
const TOKENS_PER_UNIT: u32 = 1_000_000;
/// Scale of the input and output cost components
const COMPONENT_SCALE: u32 = 6;
/// Scale of the total cost
const TOTAL_SCALE: u32 = 4;

/// Source of per-model token prices
pub trait PriceCatalog: Send + Sync {
    fn price_of(&self, model: &str) -> Option<ModelPrice>;
}

/// Prices from the `[pricing]` config table
#[derive(Debug, Default)]
pub struct StaticPricing {
    prices: IndexMap<String, ModelPrice>,
}

impl StaticPricing {
    pub fn new(prices: IndexMap<String, ModelPrice>) -> Self {
        Self { prices }
    }
}

impl PriceCatalog for StaticPricing {
    fn price_of(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }
}

/// USD cost of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cost {
    pub input: Decimal,
    pub output: Decimal,
    pub total: Decimal,
}

impl Cost {
    pub const ZERO: Self = Self {
        input: Decimal::ZERO,
        output: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Price tokens per million, rounding half-up at each step
    pub fn compute(price: &ModelPrice, input_tokens: u64, output_tokens: u64) -> Self {
        let input = component(price.input, input_tokens);
        let output = component(price.output, output_tokens);
        let total = (input + output).round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero);

        Self { input, output, total }
    }
}

fn component(price_per_million: Decimal, tokens: u64) -> Decimal {
    if tokens == 0 {
        return Decimal::ZERO;
    }

    (price_per_million * Decimal::from(tokens) / Decimal::from(TOKENS_PER_UNIT))
        .round_dp_with_strategy(COMPONENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
