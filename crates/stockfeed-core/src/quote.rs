//! 프론트엔드로 전달되는 실시간 시세 메시지.
//!
//! 필드 이름은 프론트엔드와 합의된 JSON 계약이므로 변경하면 안 됩니다.
//!
//! ```json
//! {
//!   "symbol": "005930",
//!   "askPrices": [84500, 84600, 84700, 84800],
//!   "bidPrices": [84400, 84300, 84200, 84100],
//!   "askQtys": [120, 80, 95, 300],
//!   "bidQtys": [150, 210, 90, 40],
//!   "stckPrpr": 84500,
//!   "prdyVrss": -200,
//!   "prdyCtrt": -0.23,
//!   "stckLwpr": 84000,
//!   "stckHgpr": 85000,
//!   "timestamp": "2025-09-24T15:00:00"
//! }
//! ```

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// 메시지에 포함되는 호가 단계 수 (최우선 호가부터).
pub const ORDERBOOK_DEPTH: usize = 4;

/// 한 종목의 시세 업데이트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMessage {
    /// 종목코드
    pub symbol: String,
    /// 매도호가 (최우선 → 차순위)
    pub ask_prices: [i64; ORDERBOOK_DEPTH],
    /// 매수호가 (최우선 → 차순위)
    pub bid_prices: [i64; ORDERBOOK_DEPTH],
    /// 매도호가 잔량
    pub ask_qtys: [i64; ORDERBOOK_DEPTH],
    /// 매수호가 잔량
    pub bid_qtys: [i64; ORDERBOOK_DEPTH],
    /// 현재가
    pub stck_prpr: i64,
    /// 전일대비
    pub prdy_vrss: i64,
    /// 전일대비율 (%)
    pub prdy_ctrt: f64,
    /// 당일 저가
    pub stck_lwpr: i64,
    /// 당일 고가
    pub stck_hgpr: i64,
    /// 체결/호가 시각 (KST, 오프셋 없음)
    pub timestamp: NaiveDateTime,
}

impl QuoteMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 브로드캐스트용 공유 페이로드 생성.
    ///
    /// 한 번 직렬화한 문자열을 모든 연결이 공유합니다.
    pub fn to_payload(&self) -> CoreResult<Arc<str>> {
        Ok(Arc::from(self.to_json()?))
    }
}
