//! 상류 시세 소스가 전달하는 원시 이벤트.

use chrono::NaiveDateTime;

/// 전일대비 부호 (KIS `PRDY_VRSS_SIGN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSign {
    /// 1: 상한
    UpperLimit,
    /// 2: 상승
    Up,
    /// 3: 보합
    Flat,
    /// 4: 하한
    LowerLimit,
    /// 5: 하락
    Down,
}

impl ChangeSign {
    /// KIS 부호 코드에서 변환. 알 수 없는 코드는 `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(ChangeSign::UpperLimit),
            "2" => Some(ChangeSign::Up),
            "3" => Some(ChangeSign::Flat),
            "4" => Some(ChangeSign::LowerLimit),
            "5" => Some(ChangeSign::Down),
            _ => None,
        }
    }

    /// 하락 방향 여부.
    pub fn is_negative(&self) -> bool {
        matches!(self, ChangeSign::LowerLimit | ChangeSign::Down)
    }

    /// 부호에 맞게 크기 값의 방향을 맞춥니다.
    pub fn apply_i64(&self, value: i64) -> i64 {
        match self {
            ChangeSign::Flat => value,
            _ if self.is_negative() => -value.abs(),
            _ => value.abs(),
        }
    }

    /// 부호에 맞게 비율 값의 방향을 맞춥니다.
    pub fn apply_f64(&self, value: f64) -> f64 {
        match self {
            ChangeSign::Flat => value,
            _ if self.is_negative() => -value.abs(),
            _ => value.abs(),
        }
    }
}

/// 국내 주식 실시간 체결 (`H0STCNT0`).
#[derive(Debug, Clone, PartialEq)]
pub struct KrRealtimeTrade {
    /// 종목코드
    pub symbol: String,
    /// 체결시각 (KST)
    pub time: NaiveDateTime,
    /// 현재가
    pub price: i64,
    /// 전일대비 (부호 반영)
    pub change: i64,
    /// 전일대비율 % (부호 반영)
    pub change_rate: f64,
    /// 당일 고가
    pub high: i64,
    /// 당일 저가
    pub low: i64,
    /// 체결량
    pub volume: i64,
    /// 누적거래량
    pub acc_volume: i64,
}

/// 국내 주식 실시간 호가 (`H0STASP0`), 최우선 호가부터 정렬.
#[derive(Debug, Clone, PartialEq)]
pub struct KrRealtimeOrderbook {
    /// 종목코드
    pub symbol: String,
    /// 호가시각 (KST)
    pub time: NaiveDateTime,
    /// 매도호가 1~10
    pub ask_prices: Vec<i64>,
    /// 매도호가 잔량 1~10
    pub ask_volumes: Vec<i64>,
    /// 매수호가 1~10
    pub bid_prices: Vec<i64>,
    /// 매수호가 잔량 1~10
    pub bid_volumes: Vec<i64>,
}

/// 상류 시세 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// 체결가
    Trade(KrRealtimeTrade),
    /// 호가
    Orderbook(KrRealtimeOrderbook),
    /// 연결 상태 변경
    ConnectionStatus(bool),
    /// 에러
    Error(String),
}

impl RealtimeEvent {
    /// 메트릭 라벨용 종류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeEvent::Trade(_) => "trade",
            RealtimeEvent::Orderbook(_) => "orderbook",
            RealtimeEvent::ConnectionStatus(_) => "connection",
            RealtimeEvent::Error(_) => "error",
        }
    }
}
