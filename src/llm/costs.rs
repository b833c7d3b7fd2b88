//! Per-token prices for the models we route through.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD price per token for `model`, zero when unknown.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    match model {
        // Groq
        "llama-3.3-70b-versatile" => (dec!(0.00000059), dec!(0.00000079)),
        "llama-3.1-8b-instant" => (dec!(0.00000005), dec!(0.00000008)),
        "mixtral-8x7b-32768" => (dec!(0.00000024), dec!(0.00000024)),
        "gemma2-9b-it" => (dec!(0.0000002), dec!(0.0000002)),
        // OpenAI
        "gpt-4o" => (dec!(0.0000025), dec!(0.00001)),
        "gpt-4o-mini" => (dec!(0.00000015), dec!(0.0000006)),
        _ => (Decimal::ZERO, Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_has_price() {
        let (input, output) = model_cost("llama-3.3-70b-versatile");
        assert!(input > Decimal::ZERO);
        assert!(output > input);
    }

    #[test]
    fn unknown_model_is_free() {
        assert_eq!(model_cost("my-local-model"), (Decimal::ZERO, Decimal::ZERO));
    }
}
