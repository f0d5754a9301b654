//! 최근 알림 링 버퍼
//!
//! 기록 태스크가 채우고, 대화형 모드의 상태 조회가 읽습니다.
//! 용량을 넘으면 가장 오래된 알림부터 버립니다.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use sentinel_core::types::AlertRecord;

#[derive(Debug)]
struct Ring {
    alerts: VecDeque<AlertRecord>,
    capacity: usize,
}

/// 공유 가능한 최근 알림 목록 (복제 시 같은 버퍼를 가리킴)
#[derive(Debug, Clone)]
pub struct RecentAlerts {
    inner: Arc<Mutex<Ring>>,
}

impl RecentAlerts {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Ring {
                alerts: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    pub fn push(&self, alert: AlertRecord) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.alerts.len() == ring.capacity {
            ring.alerts.pop_front();
        }
        ring.alerts.push_back(alert);
    }

    /// 최신순으로 최대 `n`개를 반환합니다.
    pub fn latest(&self, n: usize) -> Vec<AlertRecord> {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ring.alerts.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .alerts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .alerts
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_core::types::{FlowRecord, Protocol, RuleId};

    fn alert(dport: u16) -> AlertRecord {
        let flow = FlowRecord {
            timestamp: Utc::now(),
            src_ip: "10.0.0.5".parse().unwrap(),
            dst_ip: "192.168.1.10".parse().unwrap(),
            src_port: 40000,
            dst_port: dport,
            protocol: Protocol::Tcp,
            size: 60,
        };
        AlertRecord::from_flow(RuleId::PortScan, &flow)
    }

    #[test]
    fn test_latest_is_newest_first() {
        let recent = RecentAlerts::new(10);
        recent.push(alert(1));
        recent.push(alert(2));
        recent.push(alert(3));

        let ports: Vec<_> = recent.latest(2).iter().map(|a| a.dest_port).collect();
        assert_eq!(ports, vec![3, 2]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let recent = RecentAlerts::new(2);
        for port in 1..=5 {
            recent.push(alert(port));
        }
        assert_eq!(recent.len(), 2);
        let ports: Vec<_> = recent.latest(10).iter().map(|a| a.dest_port).collect();
        assert_eq!(ports, vec![5, 4]);
    }

    #[test]
    fn test_clones_share_buffer() {
        let recent = RecentAlerts::new(4);
        let view = recent.clone();
        recent.push(alert(7));
        assert_eq!(view.len(), 1);
        view.clear();
        assert!(recent.is_empty());
    }
}
