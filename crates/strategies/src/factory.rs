use crate::SignalStrategy;
use crate::batch::BatchStrategy;
use crate::confluence::ConfluenceStrategy;
use crate::error::StrategyError;
use configuration::SignalSettings;
use core_types::{SignalGranularity, StrategyConfig};

/// Creates the signal evaluator for a strategy, chosen by its granularity.
///
/// Batch strategies take their periods and thresholds from the strategy
/// itself; confluence strategies take theirs from `[signals.confluence]`
/// and only the stop-loss distance from the strategy.
pub fn create_strategy(
    config: &StrategyConfig,
    signals: &SignalSettings,
) -> Result<Box<dyn SignalStrategy>, StrategyError> {
    // The compiler will error if a new granularity is added but not handled here.
    match config.granularity {
        SignalGranularity::Batch => Ok(Box::new(BatchStrategy::new(config)?)),
        SignalGranularity::Confluence => Ok(Box::new(ConfluenceStrategy::new(
            signals.confluence.clone(),
            config.stop_loss_pct,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::config;

    #[test]
    fn granularity_selects_implementation() {
        let mut cfg = config();
        let signals = SignalSettings::default();
        assert_eq!(create_strategy(&cfg, &signals).unwrap().name(), "batch");

        cfg.granularity = SignalGranularity::Confluence;
        assert_eq!(create_strategy(&cfg, &signals).unwrap().name(), "confluence");
    }

    #[test]
    fn invalid_confluence_settings_are_reported() {
        let mut cfg = config();
        cfg.granularity = SignalGranularity::Confluence;
        let mut signals = SignalSettings::default();
        signals.confluence.macd_fast = 40;
        assert!(matches!(
            create_strategy(&cfg, &signals),
            Err(StrategyError::InvalidParameters(_))
        ));
    }
}
