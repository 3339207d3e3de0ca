//! 프론트엔드 JSON 계약 통합 테스트.

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use stockfeed_core::QuoteMessage;

fn kst(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

#[test]
fn test_samsung_quote_round_trip() {
    let json = r#"{
        "symbol": "005930",
        "askPrices": [84500, 84600, 84700, 84800],
        "bidPrices": [84400, 84300, 84200, 84100],
        "askQtys": [1200, 800, 950, 3000],
        "bidQtys": [1500, 2100, 900, 400],
        "stckPrpr": 84500,
        "prdyVrss": -200,
        "prdyCtrt": -0.23,
        "stckLwpr": 84000,
        "stckHgpr": 85000,
        "timestamp": "2025-09-24T15:00:00"
    }"#;

    let quote = QuoteMessage::from_json(json).expect("계약 형식 파싱 실패");

    assert_eq!(quote.symbol, "005930");
    assert_eq!(quote.ask_prices, [84500, 84600, 84700, 84800]);
    assert_eq!(quote.bid_prices, [84400, 84300, 84200, 84100]);
    assert_eq!(quote.stck_prpr, 84500);
    assert_eq!(quote.prdy_vrss, -200);
    assert_eq!(quote.prdy_ctrt, -0.23);
    assert_eq!(quote.stck_lwpr, 84000);
    assert_eq!(quote.stck_hgpr, 85000);
    assert_eq!(quote.timestamp, kst(2025, 9, 24, 15, 0, 0));

    // 다시 직렬화해도 같은 JSON 값이어야 함
    let reserialized: serde_json::Value =
        serde_json::from_str(&quote.to_json().unwrap()).unwrap();
    let original: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(reserialized, original);

    let decoded = QuoteMessage::from_json(&quote.to_json().unwrap()).unwrap();
    assert_eq!(decoded, quote);
}

#[test]
fn test_missing_field_is_rejected() {
    let json = r#"{"symbol": "005930", "stckPrpr": 84500}"#;
    assert!(QuoteMessage::from_json(json).is_err());
}

fn levels() -> impl Strategy<Value = [i64; 4]> {
    prop::array::uniform4(0i64..2_000_000)
}

proptest! {
    #[test]
    fn prop_quote_survives_json(
        symbol in "[0-9]{6}",
        asks in levels(),
        bids in levels(),
        ask_qtys in levels(),
        bid_qtys in levels(),
        price in 1i64..2_000_000,
        change in -300_000i64..300_000,
        rate_bp in -3000i64..3000,
        secs in 0u32..86_400,
    ) {
        let quote = QuoteMessage {
            symbol,
            ask_prices: asks,
            bid_prices: bids,
            ask_qtys,
            bid_qtys,
            stck_prpr: price,
            prdy_vrss: change,
            prdy_ctrt: rate_bp as f64 / 100.0,
            stck_lwpr: price - 100,
            stck_hgpr: price + 100,
            timestamp: kst(2025, 9, 24, secs / 3600, (secs / 60) % 60, secs % 60),
        };

        let decoded = QuoteMessage::from_json(&quote.to_json().unwrap()).unwrap();
        prop_assert_eq!(decoded, quote);
    }
}
