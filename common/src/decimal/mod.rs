//! Decimal and credit types for prices, scores and balances

pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

/// Listing and credit pack price
pub type Price = Decimal;

/// Money actually paid for a credit pack
pub type Amount = Decimal;

/// Whole credits; balances and movements are never fractional
pub type Credits = i64;

/// Precision helpers for common operations
pub mod precision {
    use super::*;

    /// Price precision (2 decimal places)
    pub const PRICE_PRECISION: u32 = 2;

    /// Average score precision (2 decimal places)
    pub const SCORE_PRECISION: u32 = 2;

    /// Round price to standard precision
    pub fn round_price(price: Price) -> Price {
        price.round_dp(PRICE_PRECISION)
    }

    /// Round an average score to standard precision
    pub fn round_score(score: Decimal) -> Decimal {
        score.round_dp(SCORE_PRECISION)
    }
}
