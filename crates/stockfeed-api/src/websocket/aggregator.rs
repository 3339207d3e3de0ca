//! 상류 시세 이벤트를 프론트엔드 메시지로 변환해 브로드캐스트하는 어그리게이터.
//!
//! 체결 이벤트에는 호가가, 호가 이벤트에는 현재가가 없으므로 종목별 최신 스냅샷을
//! 유지하면서 이벤트 하나당 `QuoteMessage` 하나를 만듭니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! let aggregator = QuoteAggregator::new(registry, feed_status);
//! aggregator.run(event_rx, shutdown).await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use stockfeed_core::{QuoteMessage, ORDERBOOK_DEPTH};
use stockfeed_exchange::{KrRealtimeOrderbook, KrRealtimeTrade, RealtimeEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::SharedSessionRegistry;
use crate::metrics::record_upstream_event;
use crate::state::FeedStatus;

/// 종목별 최신 시세 스냅샷.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub ask_prices: [i64; ORDERBOOK_DEPTH],
    pub bid_prices: [i64; ORDERBOOK_DEPTH],
    pub ask_qtys: [i64; ORDERBOOK_DEPTH],
    pub bid_qtys: [i64; ORDERBOOK_DEPTH],
    pub price: i64,
    pub change: i64,
    pub change_rate: f64,
    pub low: i64,
    pub high: i64,
    pub timestamp: NaiveDateTime,
}

impl QuoteSnapshot {
    /// 체결 필드 반영.
    pub fn apply_trade(&mut self, trade: &KrRealtimeTrade) {
        self.price = trade.price;
        self.change = trade.change;
        self.change_rate = trade.change_rate;
        self.low = trade.low;
        self.high = trade.high;
        self.timestamp = trade.time;
    }

    /// 최우선 4단계 호가 반영. 부족한 단계는 0.
    pub fn apply_orderbook(&mut self, book: &KrRealtimeOrderbook) {
        self.ask_prices = best_levels(&book.ask_prices);
        self.bid_prices = best_levels(&book.bid_prices);
        self.ask_qtys = best_levels(&book.ask_volumes);
        self.bid_qtys = best_levels(&book.bid_volumes);
        self.timestamp = book.time;
    }

    /// 프론트엔드 메시지 생성.
    pub fn to_message(&self, symbol: &str) -> QuoteMessage {
        QuoteMessage {
            symbol: symbol.to_string(),
            ask_prices: self.ask_prices,
            bid_prices: self.bid_prices,
            ask_qtys: self.ask_qtys,
            bid_qtys: self.bid_qtys,
            stck_prpr: self.price,
            prdy_vrss: self.change,
            prdy_ctrt: self.change_rate,
            stck_lwpr: self.low,
            stck_hgpr: self.high,
            timestamp: self.timestamp,
        }
    }
}

fn best_levels(levels: &[i64]) -> [i64; ORDERBOOK_DEPTH] {
    let mut out = [0; ORDERBOOK_DEPTH];
    for (slot, value) in out.iter_mut().zip(levels) {
        *slot = *value;
    }
    out
}

/// 상류 이벤트를 `SessionRegistry`로 브로드캐스트하는 어그리게이터.
pub struct QuoteAggregator {
    registry: SharedSessionRegistry,
    feed: Arc<FeedStatus>,
    snapshots: HashMap<String, QuoteSnapshot>,
}

impl QuoteAggregator {
    /// 새로운 어그리게이터 생성.
    pub fn new(registry: SharedSessionRegistry, feed: Arc<FeedStatus>) -> Self {
        Self {
            registry,
            feed,
            snapshots: HashMap::new(),
        }
    }

    /// 이벤트 하나를 반영하고, 시세 이벤트면 메시지를 반환합니다.
    pub fn apply(&mut self, event: &RealtimeEvent) -> Option<QuoteMessage> {
        record_upstream_event(event.kind());

        match event {
            RealtimeEvent::Trade(trade) => {
                let snapshot = self.snapshots.entry(trade.symbol.clone()).or_default();
                snapshot.apply_trade(trade);
                Some(snapshot.to_message(&trade.symbol))
            }
            RealtimeEvent::Orderbook(book) => {
                let snapshot = self.snapshots.entry(book.symbol.clone()).or_default();
                snapshot.apply_orderbook(book);
                Some(snapshot.to_message(&book.symbol))
            }
            RealtimeEvent::ConnectionStatus(connected) => {
                if *connected {
                    info!("상류 시세 연결됨");
                } else {
                    warn!("상류 시세 연결 끊김");
                }
                self.feed.set_connected(*connected);
                None
            }
            RealtimeEvent::Error(msg) => {
                error!(error = %msg, "상류 시세 에러");
                None
            }
        }
    }

    /// 종목 스냅샷 조회.
    pub fn snapshot(&self, symbol: &str) -> Option<&QuoteSnapshot> {
        self.snapshots.get(symbol)
    }

    /// 어그리게이터 실행.
    ///
    /// 채널이 닫히거나 종료 토큰이 취소될 때까지 실행됩니다.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RealtimeEvent>, shutdown: CancellationToken) {
        info!("QuoteAggregator 시작");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        warn!("QuoteAggregator 종료 - 이벤트 채널 닫힘");
                        break;
                    }
                },
            };

            let Some(quote) = self.apply(&event) else {
                continue;
            };

            let payload = match quote.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(symbol = %quote.symbol, error = %e, "시세 직렬화 실패");
                    continue;
                }
            };

            let report = self.registry.broadcast(payload).await;
            debug!(
                symbol = %quote.symbol,
                delivered = report.delivered,
                dropped = report.dropped.len(),
                "시세 브로드캐스트"
            );
        }

        self.feed.set_connected(false);
        info!("QuoteAggregator 종료");
    }
}

/// 어그리게이터를 백그라운드 태스크로 시작.
pub fn start_aggregator(
    registry: SharedSessionRegistry,
    feed: Arc<FeedStatus>,
    rx: mpsc::Receiver<RealtimeEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let aggregator = QuoteAggregator::new(registry, feed);
    tokio::spawn(aggregator.run(rx, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::registry::SessionRegistry;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 24)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn aggregator() -> QuoteAggregator {
        QuoteAggregator::new(
            Arc::new(SessionRegistry::default()),
            Arc::new(FeedStatus::default()),
        )
    }

    fn trade() -> KrRealtimeTrade {
        KrRealtimeTrade {
            symbol: "005930".to_string(),
            time: at(15, 0, 0),
            price: 84500,
            change: -200,
            change_rate: -0.23,
            high: 85000,
            low: 84000,
            volume: 10,
            acc_volume: 1_000_000,
        }
    }

    fn orderbook() -> KrRealtimeOrderbook {
        KrRealtimeOrderbook {
            symbol: "005930".to_string(),
            time: at(15, 0, 1),
            ask_prices: vec![84500, 84600, 84700, 84800, 84900],
            ask_volumes: vec![1200, 800, 950, 3000, 10],
            bid_prices: vec![84400, 84300, 84200, 84100, 84000],
            bid_volumes: vec![1500, 2100, 900, 400, 10],
        }
    }

    #[test]
    fn test_trade_without_orderbook_has_zero_levels() {
        let mut agg = aggregator();
        let quote = agg.apply(&RealtimeEvent::Trade(trade())).unwrap();

        assert_eq!(quote.stck_prpr, 84500);
        assert_eq!(quote.prdy_vrss, -200);
        assert_eq!(quote.ask_prices, [0; 4]);
        assert_eq!(quote.timestamp, at(15, 0, 0));
    }

    #[test]
    fn test_orderbook_merges_with_last_trade() {
        let mut agg = aggregator();
        agg.apply(&RealtimeEvent::Trade(trade()));
        let quote = agg.apply(&RealtimeEvent::Orderbook(orderbook())).unwrap();

        assert_eq!(quote.symbol, "005930");
        assert_eq!(quote.ask_prices, [84500, 84600, 84700, 84800]);
        assert_eq!(quote.bid_prices, [84400, 84300, 84200, 84100]);
        assert_eq!(quote.ask_qtys, [1200, 800, 950, 3000]);
        assert_eq!(quote.bid_qtys, [1500, 2100, 900, 400]);
        assert_eq!(quote.stck_prpr, 84500);
        assert_eq!(quote.stck_hgpr, 85000);
        assert_eq!(quote.timestamp, at(15, 0, 1));
    }

    #[test]
    fn test_short_orderbook_is_padded() {
        let mut agg = aggregator();
        let mut book = orderbook();
        book.ask_prices.truncate(2);
        let quote = agg.apply(&RealtimeEvent::Orderbook(book)).unwrap();

        assert_eq!(quote.ask_prices, [84500, 84600, 0, 0]);
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut agg = aggregator();
        agg.apply(&RealtimeEvent::Trade(trade()));
        let mut other = trade();
        other.symbol = "000660".to_string();
        other.price = 120000;
        agg.apply(&RealtimeEvent::Trade(other));

        assert_eq!(agg.snapshot("005930").unwrap().price, 84500);
        assert_eq!(agg.snapshot("000660").unwrap().price, 120000);
    }

    #[test]
    fn test_status_events_update_feed() {
        let mut agg = aggregator();
        assert!(agg.apply(&RealtimeEvent::ConnectionStatus(true)).is_none());
        assert!(agg.feed.is_connected());
        assert!(agg.apply(&RealtimeEvent::Error("boom".into())).is_none());
    }

    #[tokio::test]
    async fn test_run_broadcasts_each_event() {
        let registry = Arc::new(SessionRegistry::default());
        let (conn, mut queue) = registry.open_connection();
        registry.register(conn).await;

        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = start_aggregator(
            registry.clone(),
            Arc::new(FeedStatus::default()),
            rx,
            shutdown.clone(),
        );

        tx.send(RealtimeEvent::Trade(trade())).await.unwrap();
        tx.send(RealtimeEvent::Orderbook(orderbook())).await.unwrap();

        let first = QuoteMessage::from_json(&queue.recv().await.unwrap()).unwrap();
        let second = QuoteMessage::from_json(&queue.recv().await.unwrap()).unwrap();
        assert_eq!(first.ask_prices, [0; 4]);
        assert_eq!(second.ask_prices, [84500, 84600, 84700, 84800]);

        drop(tx);
        handle.await.unwrap();
    }
}
