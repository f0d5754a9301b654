//! 중복 제거 — (규칙, 출발지) 쌍마다 윈도우당 알림 하나
//!
//! 윈도우는 해당 쌍의 첫 알림 시각을 원점으로 하는 고정 구간입니다.
//!
//! ```text
//! window_id = floor((ts - origin) / window)
//! ```
//!
//! 판정은 `window_id`가 마지막으로 허용된 id보다 클 때만 허용됩니다.
//! 원점보다 이른 시각(워커 간 순서 역전)은 0번 윈도우에 속하므로 다시 발화하지 않습니다.
//!
//! 정리(`cleanup_expired`)는 유예 구간만큼 지난 항목만 제거하고 워터마크를 올립니다.
//! 워터마크보다 이른 시각으로는 새 원점을 만들지 않으므로, 제거된 항목의 윈도우에
//! 늦게 도착한 플로우도 다시 발화하지 않습니다.

use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use sentinel_core::types::RuleId;

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    origin: DateTime<Utc>,
    last_window: i64,
    window: chrono::Duration,
}

impl DedupEntry {
    /// 마지막으로 허용된 윈도우가 끝나는 시각
    fn current_window_end(&self) -> DateTime<Utc> {
        let span = self
            .window
            .checked_mul(i32::try_from(self.last_window + 1).unwrap_or(i32::MAX))
            .unwrap_or(chrono::Duration::MAX);
        self.origin
            .checked_add_signed(span)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// `ts`가 속한 윈도우 번호
pub fn window_id(origin: DateTime<Utc>, ts: DateTime<Utc>, window: Duration) -> i64 {
    let window_micros = i64::try_from(window.as_micros()).unwrap_or(i64::MAX).max(1);
    let elapsed = (ts - origin).num_microseconds().unwrap_or(i64::MAX);
    if elapsed <= 0 {
        0
    } else {
        elapsed / window_micros
    }
}

/// 알림 중복 제거기
#[derive(Debug)]
pub struct DedupTracker {
    entries: DashMap<(RuleId, IpAddr), DedupEntry>,
    suppressed: AtomicU64,
    /// 새 항목을 만들 수 있는 가장 이른 시각 (UNIX epoch 마이크로초, 없으면 `i64::MIN`)
    watermark_micros: AtomicI64,
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            suppressed: AtomicU64::new(0),
            watermark_micros: AtomicI64::new(i64::MIN),
        }
    }
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 판정을 허용할지 결정합니다.
    ///
    /// 같은 키에 대한 동시 호출은 샤드 락으로 직렬화되므로 한 윈도우에서
    /// `true`는 최대 한 번만 반환됩니다.
    pub fn admit(&self, rule: RuleId, source: IpAddr, ts: DateTime<Utc>, window: Duration) -> bool {
        match self.entries.entry((rule, source)) {
            Entry::Vacant(vacant) => {
                if ts.timestamp_micros() < self.watermark_micros.load(Ordering::Acquire) {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                vacant.insert(DedupEntry {
                    origin: ts,
                    last_window: 0,
                    window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
                });
                true
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let id = window_id(entry.origin, ts, window);
                if id > entry.last_window {
                    entry.last_window = id;
                    true
                } else {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    /// 지금까지 억제된 판정 수
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 현재 윈도우가 `now - grace` 이전에 끝난 항목을 제거합니다.
    ///
    /// 제거된 쌍의 다음 판정은 새 원점에서 시작하지만, `now - grace`보다
    /// 이른 시각의 판정은 억제됩니다.
    pub fn cleanup_expired(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        // 제거 전에 올려야 제거 직후의 판정도 워터마크를 봄
        self.watermark_micros
            .fetch_max(cutoff.timestamp_micros(), Ordering::AcqRel);

        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.current_window_end() > cutoff);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.suppressed.store(0, Ordering::Relaxed);
        self.watermark_micros.store(i64::MIN, Ordering::Release);
    }
}
