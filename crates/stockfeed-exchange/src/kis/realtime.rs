//! KIS 실시간 WebSocket 프레임 파서와 구독 메시지 생성.
//!
//! 데이터 프레임 형식: `암호화여부|tr_id|데이터건수|필드^필드^...`
//!
//! 데이터 건수가 2 이상이면 필드 목록을 건수로 균등 분할합니다.
//! `{`로 시작하는 프레임은 JSON 제어 메시지(구독 응답, PINGPONG)입니다.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Asia::Seoul;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::tr_id;
use crate::error::ExchangeResult;
use crate::event::{ChangeSign, KrRealtimeOrderbook, KrRealtimeTrade, RealtimeEvent};

/// 체결 레코드 최소 필드 수.
pub const TRADE_MIN_FIELDS: usize = 14;

/// 호가 레코드 최소 필드 수.
pub const ORDERBOOK_MIN_FIELDS: usize = 43;

/// 호가 단계 수.
const ORDERBOOK_LEVELS: usize = 10;

/// 수신 프레임 분류 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum KisFrame {
    /// 서버 keep-alive. 받은 원문을 그대로 돌려보내야 합니다.
    PingPong(String),
    /// 구독 응답 등 JSON 제어 메시지
    Control(ControlMessage),
    /// 실시간 데이터 레코드
    Data {
        tr_id: String,
        records: Vec<Vec<String>>,
    },
}

/// JSON 제어 메시지 요약.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub tr_id: String,
    pub tr_key: Option<String>,
    /// 응답 코드 ("0" 성공)
    pub rt_cd: Option<String>,
    pub msg: Option<String>,
}

impl ControlMessage {
    /// 실패 응답 여부.
    pub fn is_error(&self) -> bool {
        matches!(self.rt_cd.as_deref(), Some(code) if code != "0")
    }
}

#[derive(Debug, Deserialize)]
struct RawControl {
    header: RawControlHeader,
    #[serde(default)]
    body: Option<RawControlBody>,
}

#[derive(Debug, Deserialize)]
struct RawControlHeader {
    tr_id: String,
    #[serde(default)]
    tr_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawControlBody {
    #[serde(default)]
    rt_cd: Option<String>,
    #[serde(default)]
    msg1: Option<String>,
}

/// 수신 텍스트 프레임 분류.
///
/// 형식을 알 수 없으면 `None`.
pub fn classify_frame(text: &str) -> Option<KisFrame> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        let raw: RawControl = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "KIS 제어 메시지 파싱 실패");
                return None;
            }
        };

        if raw.header.tr_id == tr_id::PINGPONG {
            return Some(KisFrame::PingPong(text.to_string()));
        }

        let (rt_cd, msg) = raw
            .body
            .map(|b| (b.rt_cd, b.msg1))
            .unwrap_or((None, None));

        return Some(KisFrame::Control(ControlMessage {
            tr_id: raw.header.tr_id,
            tr_key: raw.header.tr_key,
            rt_cd,
            msg,
        }));
    }

    let mut parts = trimmed.splitn(4, '|');
    let _encrypted = parts.next()?;
    let channel = parts.next()?;
    let count: usize = parts.next()?.trim().parse().ok()?;
    let data = parts.next()?;

    if count == 0 {
        return None;
    }

    let fields: Vec<&str> = data.split('^').collect();
    if fields.len() % count != 0 {
        warn!(
            tr_id = channel,
            count,
            fields = fields.len(),
            "필드 수가 데이터 건수로 나누어떨어지지 않음"
        );
        return None;
    }

    let per_record = fields.len() / count;
    let records = fields
        .chunks(per_record)
        .map(|chunk| chunk.iter().map(|f| f.to_string()).collect())
        .collect();

    Some(KisFrame::Data {
        tr_id: channel.to_string(),
        records,
    })
}

/// 데이터 프레임의 레코드를 이벤트로 변환.
///
/// 필드가 부족한 레코드는 경고 후 건너뜁니다.
pub fn decode_records(
    channel: &str,
    records: &[Vec<String>],
    date: NaiveDate,
) -> Vec<RealtimeEvent> {
    records
        .iter()
        .filter_map(|record| {
            let fields: Vec<&str> = record.iter().map(String::as_str).collect();
            match channel {
                tr_id::WS_KR_TRADE => parse_trade(&fields, date).map(RealtimeEvent::Trade),
                tr_id::WS_KR_ORDERBOOK => {
                    parse_orderbook(&fields, date).map(RealtimeEvent::Orderbook)
                }
                other => {
                    debug!(tr_id = other, "알 수 없는 tr_id");
                    None
                }
            }
        })
        .collect()
}

/// 체결 레코드 파싱 (`H0STCNT0`).
pub fn parse_trade(fields: &[&str], date: NaiveDate) -> Option<KrRealtimeTrade> {
    if fields.len() < TRADE_MIN_FIELDS {
        warn!(fields = fields.len(), "체결 데이터 필드 부족");
        return None;
    }

    let price = parse_i64(fields[2]);
    let mut change = parse_i64(fields[4]);
    let mut change_rate = parse_f64(fields[5]);

    if let Some(sign) = ChangeSign::from_code(fields[3]) {
        change = sign.apply_i64(change);
        change_rate = sign.apply_f64(change_rate);
    }

    Some(KrRealtimeTrade {
        symbol: fields[0].trim().to_string(),
        time: record_time(fields[1], date),
        price,
        change,
        change_rate,
        high: parse_i64(fields[8]),
        low: parse_i64(fields[9]),
        volume: parse_i64(fields[12]),
        acc_volume: parse_i64(fields[13]),
    })
}

/// 호가 레코드 파싱 (`H0STASP0`).
///
/// 필드 배치: 3..=12 매도호가, 13..=22 매수호가, 23..=32 매도잔량, 33..=42 매수잔량.
pub fn parse_orderbook(fields: &[&str], date: NaiveDate) -> Option<KrRealtimeOrderbook> {
    if fields.len() < ORDERBOOK_MIN_FIELDS {
        warn!(fields = fields.len(), "호가 데이터 필드 부족");
        return None;
    }

    let column = |start: usize| -> Vec<i64> {
        fields[start..start + ORDERBOOK_LEVELS]
            .iter()
            .map(|f| parse_i64(f))
            .collect()
    };

    Some(KrRealtimeOrderbook {
        symbol: fields[0].trim().to_string(),
        time: record_time(fields[1], date),
        ask_prices: column(3),
        bid_prices: column(13),
        ask_volumes: column(23),
        bid_volumes: column(33),
    })
}

/// 현재 KST 날짜.
pub fn kst_today() -> NaiveDate {
    Utc::now().with_timezone(&Seoul).date_naive()
}

/// 현재 KST 시각.
fn kst_now() -> NaiveDateTime {
    Utc::now().with_timezone(&Seoul).naive_local()
}

/// `HHMMSS`와 KST 날짜 결합. 파싱 불가 시 현재 KST 시각.
fn record_time(hhmmss: &str, date: NaiveDate) -> NaiveDateTime {
    NaiveTime::parse_from_str(hhmmss.trim(), "%H%M%S")
        .map(|t| date.and_time(t))
        .unwrap_or_else(|_| kst_now())
}

fn parse_i64(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

// NaN/inf는 JSON으로 직렬화할 수 없으므로 0으로 처리
fn parse_f64(s: &str) -> f64 {
    s.trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .unwrap_or(0.0)
}

/// WebSocket 구독 요청 메시지.
#[derive(Debug, Serialize)]
struct WsSubscribeRequest<'a> {
    header: WsHeader<'a>,
    body: WsBody<'a>,
}

#[derive(Debug, Serialize)]
struct WsHeader<'a> {
    approval_key: &'a str,
    custtype: &'a str,
    /// "1": 구독 등록, "2": 구독 해제
    tr_type: &'a str,
    #[serde(rename = "content-type")]
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
struct WsBody<'a> {
    input: WsInput<'a>,
}

#[derive(Debug, Serialize)]
struct WsInput<'a> {
    tr_id: &'a str,
    /// 종목코드
    tr_key: &'a str,
}

/// 구독(또는 해제) 요청 JSON 생성.
pub fn subscribe_message(
    approval_key: &str,
    tr_id: &str,
    symbol: &str,
    subscribe: bool,
) -> ExchangeResult<String> {
    let request = WsSubscribeRequest {
        header: WsHeader {
            approval_key,
            custtype: "P", // P: 개인
            tr_type: if subscribe { "1" } else { "2" },
            content_type: "utf-8",
        },
        body: WsBody {
            input: WsInput {
                tr_id,
                tr_key: symbol,
            },
        },
    };

    Ok(serde_json::to_string(&request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 24).unwrap()
    }

    fn trade_fields(
        symbol: &str,
        time: &str,
        price: &str,
        sign: &str,
        change: &str,
        rate: &str,
    ) -> Vec<String> {
        let mut fields: Vec<String> = vec!["0".to_string(); 46];
        fields[0] = symbol.to_string();
        fields[1] = time.to_string();
        fields[2] = price.to_string();
        fields[3] = sign.to_string();
        fields[4] = change.to_string();
        fields[5] = rate.to_string();
        fields[8] = "85000".to_string();
        fields[9] = "84000".to_string();
        fields[12] = "10".to_string();
        fields[13] = "1234567".to_string();
        fields
    }

    #[test]
    fn test_parse_trade_applies_sign() {
        let fields = trade_fields("005930", "150000", "84500", "5", "200", "0.23");
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();

        let trade = parse_trade(&refs, date()).unwrap();
        assert_eq!(trade.symbol, "005930");
        assert_eq!(trade.price, 84500);
        assert_eq!(trade.change, -200);
        assert_eq!(trade.change_rate, -0.23);
        assert_eq!(trade.high, 85000);
        assert_eq!(trade.low, 84000);
        assert_eq!(trade.acc_volume, 1234567);
        assert_eq!(trade.time, date().and_hms_opt(15, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_trade_non_finite_rate_is_zero() {
        for rate in ["NaN", "inf", "-infinity"] {
            let fields = trade_fields("005930", "150000", "84500", "2", "200", rate);
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();

            let trade = parse_trade(&refs, date()).unwrap();
            assert_eq!(trade.change_rate, 0.0, "rate {:?}", rate);
            assert_eq!(trade.change, 200);
        }
    }

    #[test]
    fn test_parse_trade_too_short() {
        let fields = ["005930", "150000", "84500"];
        assert!(parse_trade(&fields, date()).is_none());
    }

    #[test]
    fn test_parse_orderbook_columns() {
        let mut fields: Vec<String> = vec!["0".to_string(); 59];
        fields[0] = "005930".to_string();
        fields[1] = "093001".to_string();
        for i in 0..10 {
            fields[3 + i] = (84500 + 100 * i as i64).to_string();
            fields[13 + i] = (84400 - 100 * i as i64).to_string();
            fields[23 + i] = (1000 + i).to_string();
            fields[33 + i] = (2000 + i).to_string();
        }
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();

        let book = parse_orderbook(&refs, date()).unwrap();
        assert_eq!(book.ask_prices[..4], [84500, 84600, 84700, 84800]);
        assert_eq!(book.bid_prices[..4], [84400, 84300, 84200, 84100]);
        assert_eq!(book.ask_volumes[0], 1000);
        assert_eq!(book.bid_volumes[9], 2009);
        assert_eq!(book.time.hour(), 9);
        assert_eq!(book.time.second(), 1);
    }

    #[test]
    fn test_classify_multi_record_frame() {
        let a = trade_fields("005930", "150000", "84500", "2", "200", "0.23").join("^");
        let b = trade_fields("000660", "150001", "120000", "3", "0", "0.00").join("^");
        let frame = format!("0|H0STCNT0|002|{}^{}", a, b);

        let Some(KisFrame::Data { tr_id, records }) = classify_frame(&frame) else {
            panic!("data frame expected");
        };
        assert_eq!(tr_id, "H0STCNT0");
        assert_eq!(records.len(), 2);

        let events = decode_records(&tr_id, &records, date());
        assert_eq!(events.len(), 2);
        match &events[1] {
            RealtimeEvent::Trade(t) => assert_eq!(t.symbol, "000660"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_uneven_frame_rejected() {
        assert!(classify_frame("0|H0STCNT0|002|a^b^c").is_none());
        assert!(classify_frame("0|H0STCNT0|000|a").is_none());
        assert!(classify_frame("garbage").is_none());
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let frame = "0|H0STCNT0|001|005930^150000^84500";
        let Some(KisFrame::Data { tr_id, records }) = classify_frame(frame) else {
            panic!("data frame expected");
        };
        assert!(decode_records(&tr_id, &records, date()).is_empty());
    }

    #[test]
    fn test_classify_pingpong() {
        let text = r#"{"header":{"tr_id":"PINGPONG","datetime":"20250924150000"}}"#;
        assert_eq!(classify_frame(text), Some(KisFrame::PingPong(text.to_string())));
    }

    #[test]
    fn test_classify_subscribe_response() {
        let text = r#"{"header":{"tr_id":"H0STCNT0","tr_key":"005930","encrypt":"N"},
            "body":{"rt_cd":"1","msg_cd":"OPSP0011","msg1":"invalid approval"}}"#;
        let Some(KisFrame::Control(control)) = classify_frame(text) else {
            panic!("control frame expected");
        };
        assert_eq!(control.tr_key.as_deref(), Some("005930"));
        assert!(control.is_error());
    }

    #[test]
    fn test_subscribe_message_format() {
        let msg = subscribe_message("test_key", "H0STCNT0", "005930", true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();

        assert_eq!(value["header"]["approval_key"], "test_key");
        assert_eq!(value["header"]["custtype"], "P");
        assert_eq!(value["header"]["tr_type"], "1");
        assert_eq!(value["header"]["content-type"], "utf-8");
        assert_eq!(value["body"]["input"]["tr_id"], "H0STCNT0");
        assert_eq!(value["body"]["input"]["tr_key"], "005930");
    }

    #[test]
    fn test_unsubscribe_message_format() {
        let msg = subscribe_message("test_key", "H0STASP0", "005930", false).unwrap();
        assert!(msg.contains("\"tr_type\":\"2\""));
    }
}
