//! Property tests for indicator invariants:
//! output length matches input, RSI stays in [0, 100], the MACD histogram is
//! line minus signal, and accepted levels are pairwise separated.

use chrono::{Duration, TimeZone, Utc};
use core_types::PriceBar;
use indicators::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn build(closes: &[f64]) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let close = Decimal::try_from(c).unwrap().round_dp(2);
            PriceBar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + Decimal::ONE,
                low: close - Decimal::ONE,
                close,
                volume: Decimal::ONE,
            }
        })
        .collect();
    PriceSeries::from_bars(&bars).unwrap()
}

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1000.0..3000.0_f64, 0..150)
}

proptest! {
    #[test]
    fn outputs_match_input_length(closes in arb_closes(), period in 1usize..30) {
        let s = build(&closes);
        prop_assert_eq!(ema(&s, period).unwrap().len(), s.len());
        prop_assert_eq!(sma(&s, period).unwrap().len(), s.len());
        prop_assert_eq!(rsi(&s, period).unwrap().len(), s.len());
        prop_assert_eq!(atr(&s, period).unwrap().len(), s.len());
        let params = BollingerParams { period: period + 1, std_dev: 2.0 };
        prop_assert_eq!(bollinger(&s, params).unwrap().middle.len(), s.len());
    }

    #[test]
    fn rsi_stays_in_range(closes in arb_closes(), period in 1usize..30) {
        for value in rsi(&build(&closes), period).unwrap().into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&value), "rsi out of range: {}", value);
        }
    }

    #[test]
    fn ema_of_constant_is_constant(level in 1.0..5000.0_f64, len in 1usize..100, period in 1usize..60) {
        for value in ema_of(&vec![level; len], period).unwrap() {
            prop_assert!((value.unwrap() - level).abs() <= level * 1e-12);
        }
    }

    #[test]
    fn macd_histogram_is_line_minus_signal(closes in arb_closes()) {
        let out = macd(&build(&closes), MacdParams::default()).unwrap();
        for i in 0..out.line.len() {
            let expected = out.line[i].unwrap() - out.signal[i].unwrap();
            prop_assert!((out.histogram[i].unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn levels_are_pairwise_separated(
        closes in prop::collection::vec(1000.0..3000.0_f64, 0..200),
        window in 1usize..10,
        threshold in 0.0..0.05_f64,
    ) {
        let levels = support_resistance(&build(&closes), LevelParams { window, threshold }).unwrap();
        for group in [&levels.support, &levels.resistance] {
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    prop_assert!(relative_distance(*a, *b) > threshold);
                }
            }
        }
    }
}
