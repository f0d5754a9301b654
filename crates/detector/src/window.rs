//! 출발지별 슬라이딩 윈도우
//!
//! - [`ConnectionState`]: 윈도우 내 고유 목적지 포트와 마지막 관찰 시각
//! - [`RateWindow`]: 윈도우 내 패킷 시각 목록
//!
//! 두 구조 모두 "현재 시각"을 지금까지 기록된 가장 늦은 플로우 시각으로 정의합니다.
//! 워커 간 처리 순서가 뒤섞여도 윈도우가 뒤로 가지 않습니다.
//! 만료 항목은 다음 기록 시점에 지연 정리됩니다.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// 윈도우에 남을 수 있는지 확인합니다 (`now - ts < window`).
fn within(ts: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - ts < window
}

/// 출발지 하나의 목적지 포트 추적 상태
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// 목적지 포트 → 마지막 관찰 시각
    ports: HashMap<u16, DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// 포트 접근을 기록하고 만료된 포트를 정리합니다.
    pub fn record(&mut self, port: u16, ts: DateTime<Utc>, window: Duration) {
        let now = self.advance(ts);
        if within(ts, now, window) {
            self.ports
                .entry(port)
                .and_modify(|seen| *seen = (*seen).max(ts))
                .or_insert(ts);
        }
        self.prune(now, window);
    }

    fn advance(&mut self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.latest.map_or(ts, |latest| latest.max(ts));
        self.latest = Some(now);
        now
    }

    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        self.ports.retain(|_, seen| within(*seen, now, window));
    }

    /// 윈도우 내 고유 포트 수
    pub fn distinct_ports(&self) -> usize {
        self.ports.len()
    }

    /// 가장 늦은 관찰 시각
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.latest
    }

    /// 보관 중인 모든 항목이 윈도우 안에 있는지 확인합니다.
    pub fn is_within(&self, window: Duration) -> bool {
        match self.latest {
            Some(now) => self.ports.values().all(|seen| within(*seen, now, window)),
            None => self.ports.is_empty(),
        }
    }
}

/// 출발지 하나의 패킷 속도 윈도우
///
/// 시각을 정렬된 상태로 보관하므로 앞에서부터 만료시키는 연산이 분할 상환 O(1)입니다.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    stamps: VecDeque<DateTime<Utc>>,
}

impl RateWindow {
    /// 패킷 시각을 기록하고 윈도우 밖 항목을 제거합니다.
    pub fn record(&mut self, ts: DateTime<Utc>, window: Duration) {
        // 늦게 도착한 시각은 뒤에서부터 제자리를 찾음
        let mut idx = self.stamps.len();
        while idx > 0 && self.stamps[idx - 1] > ts {
            idx -= 1;
        }
        self.stamps.insert(idx, ts);
        self.evict(window);
    }

    fn evict(&mut self, window: Duration) {
        let Some(&now) = self.stamps.back() else {
            return;
        };
        while let Some(&oldest) = self.stamps.front() {
            if within(oldest, now, window) {
                break;
            }
            self.stamps.pop_front();
        }
    }

    /// 윈도우 내 패킷 수
    pub fn count(&self) -> usize {
        self.stamps.len()
    }

    /// 가장 오래된 보관 시각
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.stamps.front().copied()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.stamps.back().copied()
    }
}
