#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`frame`]: 원시 프레임과 링크 계층 타입
//! - [`source`]: 패킷 소스 trait과 libpcap 라이브/파일 구현
//! - [`extract`]: 프레임 → 플로우 레코드 변환과 드롭 카운터

pub mod extract;
pub mod frame;
pub mod source;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// --- 주요 타입 re-export ---

pub use extract::{DropCounts, FlowExtractor, extract};
pub use frame::{LinkType, RawFrame};
pub use source::{FrameSource, PcapFileSource, PcapSource, open_source};
