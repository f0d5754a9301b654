#![doc = include_str!("../README.md")]
//! 알림 저장 — 단일 기록 태스크와 원자적 컬렉션 파일
//!
//! # 모듈 구성
//! - [`sink`]: 기록 태스크, [`AlertSink`] 제어 핸들, [`AlertEmitter`] 전달 핸들
//! - [`store`]: [`CollectionStore`] trait과 [`JsonFileStore`]
//! - [`recent`]: 상태 조회용 최근 알림 링 버퍼

pub mod recent;
pub mod sink;
pub mod store;

pub use recent::RecentAlerts;
pub use sink::{AlertEmitter, AlertSink, FinalizeReport};
pub use store::{CollectionStore, JsonFileStore, load_collection};
