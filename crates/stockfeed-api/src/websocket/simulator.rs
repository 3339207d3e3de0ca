//! 모의 시세 simulator.
//!
//! KIS 인증 정보가 없을 때 사용하는 상류 시세 소스. 설정된 종목의 가격을
//! 랜덤 워크로 움직이며 체결/호가 이벤트를 만들어 냅니다.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Asia::Seoul;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stockfeed_exchange::{
    ExchangeError, ExchangeResult, KrRealtimeOrderbook, KrRealtimeTrade, QuoteSource,
    RealtimeEvent,
};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 생성하는 호가 단계 수.
const BOOK_LEVELS: i64 = 10;

/// 종목별 가격 상태.
#[derive(Debug, Clone)]
struct SymbolPrice {
    /// 전일 종가
    base_price: i64,
    current_price: i64,
    high: i64,
    low: i64,
    acc_volume: i64,
}

impl SymbolPrice {
    fn new(base_price: i64) -> Self {
        Self {
            base_price,
            current_price: base_price,
            high: base_price,
            low: base_price,
            acc_volume: 0,
        }
    }
}

/// 알려진 종목의 기준가.
fn base_price_for(symbol: &str) -> i64 {
    match symbol {
        "005930" => 84500,  // 삼성전자
        "000660" => 178000, // SK하이닉스
        "035720" => 42500,  // 카카오
        "035420" => 185000, // 네이버
        "005380" => 250000, // 현대차
        _ => 50000,
    }
}

/// KRX 호가 단위.
pub fn krx_tick_size(price: i64) -> i64 {
    match price {
        p if p < 2_000 => 1,
        p if p < 5_000 => 5,
        p if p < 20_000 => 10,
        p if p < 50_000 => 50,
        p if p < 200_000 => 100,
        p if p < 500_000 => 500,
        _ => 1_000,
    }
}

/// 모의 시세 시뮬레이터.
pub struct MockQuoteSimulator {
    prices: Vec<(String, SymbolPrice)>,
    update_interval: Duration,
    rng: StdRng,
}

impl MockQuoteSimulator {
    /// 새로운 시뮬레이터 생성.
    pub fn new(symbols: &[String], update_interval: Duration) -> Self {
        Self::with_rng(symbols, update_interval, StdRng::from_entropy())
    }

    /// 고정 시드 시뮬레이터 생성 (재현 가능한 테스트용).
    pub fn with_seed(symbols: &[String], update_interval: Duration, seed: u64) -> Self {
        Self::with_rng(symbols, update_interval, StdRng::seed_from_u64(seed))
    }

    fn with_rng(symbols: &[String], update_interval: Duration, rng: StdRng) -> Self {
        let mut seen = HashSet::new();
        let prices = symbols
            .iter()
            .filter(|s| seen.insert(s.as_str()))
            .map(|s| (s.clone(), SymbolPrice::new(base_price_for(s))))
            .collect();

        Self {
            prices,
            update_interval,
            rng,
        }
    }

    /// 모든 종목의 가격을 한 번 움직이고 이벤트를 생성합니다.
    ///
    /// 종목마다 체결 이벤트 하나와 호가 이벤트 하나를 만듭니다.
    pub fn tick(&mut self) -> Vec<RealtimeEvent> {
        let now = kst_now();
        let mut events = Vec::with_capacity(self.prices.len() * 2);

        for (symbol, price) in self.prices.iter_mut() {
            // 랜덤 가격 변동 (-0.5% ~ +0.5%)
            let change_pct: f64 = self.rng.gen_range(-0.005..0.005);
            let moved = price.current_price as f64 * (1.0 + change_pct);
            let tick = krx_tick_size(moved as i64);
            price.current_price = ((moved / tick as f64).round() as i64 * tick).max(tick);

            price.high = price.high.max(price.current_price);
            price.low = price.low.min(price.current_price);

            let volume = self.rng.gen_range(1..500);
            price.acc_volume += volume;

            let change = price.current_price - price.base_price;
            let change_rate =
                ((change as f64 / price.base_price as f64) * 10_000.0).round() / 100.0;

            debug!(symbol = %symbol, price = price.current_price, "Price updated");

            events.push(RealtimeEvent::Trade(KrRealtimeTrade {
                symbol: symbol.clone(),
                time: now,
                price: price.current_price,
                change,
                change_rate,
                high: price.high,
                low: price.low,
                volume,
                acc_volume: price.acc_volume,
            }));

            let tick = krx_tick_size(price.current_price);
            let mut ask_volumes = Vec::with_capacity(BOOK_LEVELS as usize);
            let mut bid_volumes = Vec::with_capacity(BOOK_LEVELS as usize);
            for _ in 0..BOOK_LEVELS {
                ask_volumes.push(self.rng.gen_range(10..5_000));
                bid_volumes.push(self.rng.gen_range(10..5_000));
            }

            events.push(RealtimeEvent::Orderbook(KrRealtimeOrderbook {
                symbol: symbol.clone(),
                time: now,
                ask_prices: (0..BOOK_LEVELS)
                    .map(|i| price.current_price + tick * i)
                    .collect(),
                ask_volumes,
                bid_prices: (1..=BOOK_LEVELS)
                    .map(|i| (price.current_price - tick * i).max(0))
                    .collect(),
                bid_volumes,
            }));
        }

        events
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSimulator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &mut self,
        tx: mpsc::Sender<RealtimeEvent>,
        shutdown: CancellationToken,
    ) -> ExchangeResult<()> {
        if self.prices.is_empty() {
            return Err(ExchangeError::Config("시뮬레이션할 종목이 없습니다".to_string()));
        }

        info!(
            symbols = self.prices.len(),
            interval_ms = self.update_interval.as_millis() as u64,
            "Mock quote simulator started"
        );

        if tx.send(RealtimeEvent::ConnectionStatus(true)).await.is_err() {
            return Ok(());
        }

        // interval()은 0 주기를 허용하지 않음
        let mut ticker = interval(self.update_interval.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for event in self.tick() {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        info!("Mock quote simulator stopped");
        Ok(())
    }
}

fn kst_now() -> NaiveDateTime {
    Utc::now().with_timezone(&Seoul).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["005930".to_string(), "000660".to_string(), "005930".to_string()]
    }

    #[test]
    fn test_simulator_creation() {
        let simulator = MockQuoteSimulator::with_seed(&symbols(), Duration::from_secs(1), 7);

        assert_eq!(simulator.prices.len(), 2);
        assert_eq!(simulator.prices[0].1.base_price, 84500);
        assert_eq!(simulator.name(), "mock");
    }

    #[test]
    fn test_tick_size_bands() {
        assert_eq!(krx_tick_size(1_500), 1);
        assert_eq!(krx_tick_size(84_500), 100);
        assert_eq!(krx_tick_size(178_000), 100);
        assert_eq!(krx_tick_size(250_000), 500);
        assert_eq!(krx_tick_size(600_000), 1_000);
    }

    #[test]
    fn test_tick_produces_consistent_events() {
        let mut simulator = MockQuoteSimulator::with_seed(&symbols(), Duration::from_secs(1), 42);

        for _ in 0..20 {
            let events = simulator.tick();
            assert_eq!(events.len(), 4);

            for event in &events {
                match event {
                    RealtimeEvent::Trade(trade) => {
                        assert_eq!(trade.price % krx_tick_size(trade.price), 0);
                        assert!(trade.low <= trade.price && trade.price <= trade.high);
                    }
                    RealtimeEvent::Orderbook(book) => {
                        assert_eq!(book.ask_prices.len(), 10);
                        assert!(book.ask_prices.windows(2).all(|w| w[0] < w[1]));
                        assert!(book.bid_prices.windows(2).all(|w| w[0] >= w[1]));
                        assert!(book.bid_prices[0] < book.ask_prices[0]);
                    }
                    other => panic!("unexpected: {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut simulator =
            MockQuoteSimulator::with_seed(&symbols(), Duration::from_millis(10), 1);
        let (tx, mut rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let handle = tokio::spawn(async move { simulator.run(tx, token).await });

        assert_eq!(rx.recv().await, Some(RealtimeEvent::ConnectionStatus(true)));
        assert!(matches!(rx.recv().await, Some(RealtimeEvent::Trade(_))));

        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
