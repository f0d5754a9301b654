#![doc = include_str!("../README.md")]
//! 탐지 엔진 — 출발지별 상태와 규칙 기반 알림 생성
//!
//! 여러 워커가 하나의 [`DetectionEngine`]을 공유하며 플로우를 평가합니다.
//!
//! # 모듈 구성
//! - [`window`]: 고유 포트 추적과 패킷 속도 슬라이딩 윈도우
//! - [`state`]: 샤딩된 출발지 맵과 원자적 집계 카운터
//! - [`rules`]: 포트 스캔, 의심 포트, 속도 제한 규칙
//! - [`dedup`]: (규칙, 출발지) 쌍의 윈도우당 단일 알림 보장
//! - [`engine`]: 위 구성 요소를 엮는 진입점

pub mod dedup;
pub mod engine;
pub mod rules;
pub mod state;
pub mod window;

pub use dedup::DedupTracker;
pub use engine::DetectionEngine;
pub use rules::{PortScanRule, RateLimitRule, Rule, SuspiciousProtocolRule, Verdict, default_rules};
pub use state::{SourceSnapshot, StateStore, WindowConfig};
pub use window::{ConnectionState, RateWindow};
