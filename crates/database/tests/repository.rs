use chrono::{NaiveDate, TimeZone, Utc};
use configuration::DatabaseSettings;
use core_types::{
    CloseReason, NewPosition, NewStrategy, OrderSide, OrderStatus, OrderType, Position, SignalGranularity,
    StrategyConfig, StrategyUpdate, TradeRecord,
};
use database::{DbError, DbRepository, RiskDecisionRecord, Store, connect, run_migrations};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn repo() -> DbRepository {
    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    };
    let pool = connect(&settings).await.unwrap();
    run_migrations(&pool).await.unwrap();
    DbRepository::new(pool)
}

fn new_strategy(name: &str) -> NewStrategy {
    NewStrategy {
        name: name.to_string(),
        symbol: "XAUUSD".to_string(),
        timeframe: "1h".to_string(),
        granularity: SignalGranularity::Batch,
        fast_ema: 12,
        slow_ema: 26,
        rsi_period: 14,
        rsi_overbought: 70.0,
        rsi_oversold: 30.0,
        position_size: dec!(0.01),
        stop_loss_percent: dec!(1.5),
        take_profit_percent: dec!(3),
        max_daily_loss: dec!(5),
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
}

fn open(strategy: &StrategyConfig, side: OrderSide) -> (Position, TradeRecord) {
    let (stop, target) = match side {
        OrderSide::Buy => (dec!(1970), dec!(2060)),
        OrderSide::Sell => (dec!(2030), dec!(1940)),
    };
    let position = Position::open(NewPosition {
        strategy_id: strategy.id,
        symbol: strategy.symbol.clone(),
        side,
        entry_price: dec!(2000),
        quantity: dec!(0.5),
        stop_loss: stop,
        take_profit: target,
        entry_time: Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap(),
    })
    .unwrap();
    let trade = TradeRecord {
        trade_id: Uuid::new_v4(),
        strategy_id: strategy.id,
        position_id: Some(position.id),
        symbol: position.symbol.clone(),
        side,
        order_type: OrderType::Market,
        status: OrderStatus::Executed,
        price: position.entry_price,
        quantity: position.quantity,
        stop_loss: Some(stop),
        take_profit: Some(target),
        broker_order_id: Some("SIM-1".to_string()),
        note: None,
        created_at: position.entry_time,
    };
    (position, trade)
}

#[tokio::test]
async fn inserted_strategies_load_until_deactivated() {
    let repo = repo().await;
    let a = repo.insert_strategy(&new_strategy("a")).await.unwrap();
    let b = repo.insert_strategy(&new_strategy("b")).await.unwrap();
    assert_ne!(a.id, b.id);

    repo.deactivate_strategy(a.id).await.unwrap();
    let active = repo.load_active_strategies().await.unwrap().rows;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "b");
    assert_eq!(repo.list_strategies().await.unwrap().rows.len(), 2);

    assert!(matches!(repo.deactivate_strategy(999).await, Err(DbError::NotFound)));
}

#[tokio::test]
async fn invalid_strategy_is_never_written() {
    let repo = repo().await;
    let mut bad = new_strategy("bad");
    bad.fast_ema = 50;
    assert!(matches!(repo.insert_strategy(&bad).await, Err(DbError::Validation(_))));
    assert!(repo.list_strategies().await.unwrap().rows.is_empty());
}

#[tokio::test]
async fn update_is_applied_after_validation() {
    let repo = repo().await;
    let config = repo.insert_strategy(&new_strategy("gold")).await.unwrap();

    let rejected = StrategyUpdate {
        slow_ema: Some(5),
        ..Default::default()
    };
    assert!(matches!(repo.update_strategy(config.id, &rejected).await, Err(DbError::Validation(_))));

    let accepted = StrategyUpdate {
        granularity: Some(SignalGranularity::Confluence),
        max_daily_loss: Some(dec!(8)),
        ..Default::default()
    };
    let updated = repo.update_strategy(config.id, &accepted).await.unwrap();
    assert_eq!(updated.granularity, SignalGranularity::Confluence);

    let stored = StrategyConfig::try_from(repo.get_strategy(config.id).await.unwrap().unwrap()).unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.slow_ema, 26);

    assert!(matches!(repo.update_strategy(404, &accepted).await, Err(DbError::NotFound)));
}

#[tokio::test]
async fn incomplete_rows_surface_as_configuration_errors() {
    let repo = repo().await;
    sqlx::query(
        r#"
        INSERT INTO strategies (name, timeframe, fast_ema, slow_ema, rsi_period, position_size,
            stop_loss_percent, take_profit_percent, max_daily_loss, created_at, updated_at)
        VALUES ('legacy', '1h', 12, 26, NULL, '0.01', '1.5', '3', '5', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')
        "#,
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let records = repo.load_active_strategies().await.unwrap().rows;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rsi_period, None);
    assert!(StrategyConfig::try_from(records[0].clone()).is_err());
}

#[tokio::test]
async fn malformed_rows_are_set_aside_individually() {
    let repo = repo().await;
    sqlx::query(
        r#"
        INSERT INTO strategies (name, timeframe, fast_ema, slow_ema, rsi_period, position_size,
            stop_loss_percent, take_profit_percent, max_daily_loss, created_at, updated_at)
        VALUES ('broken', '1h', 12, 26, 14, 'abc', '1.5', '3', '5', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')
        "#,
    )
    .execute(repo.pool())
    .await
    .unwrap();
    let gold = repo.insert_strategy(&new_strategy("gold")).await.unwrap();

    let loaded = repo.load_active_strategies().await.unwrap();
    assert_eq!(loaded.rows.len(), 1);
    assert_eq!(loaded.rows[0].id, gold.id);
    assert_eq!(loaded.rejected.len(), 1);
    assert_eq!(loaded.rejected[0].label, "broken");
    assert!(loaded.rejected[0].reason.contains("position_size"));

    let (position, trade) = open(&gold, OrderSide::Buy);
    repo.open_position(&position, &trade).await.unwrap();
    let mut silver = gold.clone();
    silver.symbol = "XAGUSD".to_string();
    let (other, other_trade) = open(&silver, OrderSide::Buy);
    repo.open_position(&other, &other_trade).await.unwrap();
    sqlx::query("UPDATE positions SET quantity = 'lots' WHERE id = ?")
        .bind(other.id.to_string())
        .execute(repo.pool())
        .await
        .unwrap();

    let positions = repo.load_open_positions().await.unwrap();
    assert_eq!(positions.rows, vec![position]);
    assert_eq!(positions.rejected.len(), 1);
    assert_eq!(positions.rejected[0].id, other.id.to_string());
    assert_eq!(positions.rejected[0].label, "XAGUSD");
}

#[tokio::test]
async fn close_is_persisted_exactly_once() {
    let repo = repo().await;
    let strategy = repo.insert_strategy(&new_strategy("gold")).await.unwrap();
    let (mut position, trade) = open(&strategy, OrderSide::Buy);
    repo.open_position(&position, &trade).await.unwrap();

    let found = repo.find_open_position(strategy.id, "XAUUSD").await.unwrap().unwrap();
    assert_eq!(found, position);

    let exit_time = Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap();
    position.close(dec!(1970), exit_time, CloseReason::Stop).unwrap();
    assert!(repo.close_position(&position, day()).await.unwrap());
    assert!(!repo.close_position(&position, day()).await.unwrap());

    assert!(repo.load_open_positions().await.unwrap().rows.is_empty());
    let daily = repo.daily_risk_state(strategy.id, day()).await.unwrap();
    assert_eq!(daily.realized_pnl, dec!(-15));
    assert_eq!(daily.trades_closed, 1);
    assert_eq!(daily.losing_trades, 1);

    let trades = repo.trades_for_strategy(strategy.id).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].status, OrderStatus::Closed);
}

#[tokio::test]
async fn second_open_position_for_the_same_pair_conflicts() {
    let repo = repo().await;
    let strategy = repo.insert_strategy(&new_strategy("gold")).await.unwrap();
    let (first, first_trade) = open(&strategy, OrderSide::Buy);
    let (second, second_trade) = open(&strategy, OrderSide::Sell);

    repo.open_position(&first, &first_trade).await.unwrap();
    let err = repo.open_position(&second, &second_trade).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));

    // The failed open rolled back its trade too.
    assert_eq!(repo.trades_for_strategy(strategy.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn realized_pnl_sums_by_strategy_and_range() {
    let repo = repo().await;
    let a = repo.insert_strategy(&new_strategy("a")).await.unwrap();
    let b = repo.insert_strategy(&new_strategy("b")).await.unwrap();

    let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    for (strategy, exit_price, closed_on) in [(&a, dec!(2010), monday), (&b, dec!(1990), day())] {
        let (mut position, trade) = open(strategy, OrderSide::Buy);
        repo.open_position(&position, &trade).await.unwrap();
        position.close(exit_price, Utc::now(), CloseReason::Signal).unwrap();
        repo.close_position(&position, closed_on).await.unwrap();
    }

    assert_eq!(repo.realized_pnl_between(Some(a.id), monday, day()).await.unwrap(), dec!(5));
    assert_eq!(repo.realized_pnl_between(None, monday, day()).await.unwrap(), Decimal::ZERO);
    assert_eq!(repo.realized_pnl_between(None, day(), day()).await.unwrap(), dec!(-5));
}

#[tokio::test]
async fn failed_transaction_leaves_no_trace() {
    let repo = repo().await;
    let strategy = repo.insert_strategy(&new_strategy("gold")).await.unwrap();
    let (_, trade) = open(&strategy, OrderSide::Buy);
    let orphan = TradeRecord {
        position_id: None,
        status: OrderStatus::Failed,
        ..trade
    };

    let result: Result<(), DbError> = repo
        .in_transaction(move |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO trades (id, strategy_id, symbol, side, order_type, status, price, quantity, created_at, updated_at) VALUES (?, ?, 'XAUUSD', 'BUY', 'MARKET', 'FAILED', '2000', '0.5', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')")
                    .bind(orphan.trade_id.to_string())
                    .bind(orphan.strategy_id)
                    .execute(&mut *conn)
                    .await?;
                Err(DbError::NotFound)
            })
        })
        .await;

    assert!(result.is_err());
    assert!(repo.trades_for_strategy(strategy.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_orders_and_risk_blocks_are_recorded() {
    let repo = repo().await;
    let strategy = repo.insert_strategy(&new_strategy("gold")).await.unwrap();
    let (_, trade) = open(&strategy, OrderSide::Buy);
    let failed = TradeRecord {
        position_id: None,
        status: OrderStatus::Failed,
        broker_order_id: None,
        note: Some("broker timeout".to_string()),
        ..trade
    };
    repo.append_trade(&failed).await.unwrap();
    repo.record_decision(&RiskDecisionRecord {
        strategy_id: strategy.id,
        window: "DAILY".to_string(),
        loss: dec!(6),
        limit: dec!(5),
        decided_at: Utc::now(),
    })
    .await
    .unwrap();

    let trades = repo.trades_for_strategy(strategy.id).await.unwrap();
    assert_eq!(trades, vec![failed]);

    let blocks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM risk_decisions WHERE strategy_id = ?")
        .bind(strategy.id)
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(blocks, 1);
}
