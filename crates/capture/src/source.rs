//! 패킷 소스 — 캡처 디바이스 핸들 관리
//!
//! [`FrameSource`]는 캡처 루프가 사용하는 유일한 인터페이스입니다.
//! `next_frame()`은 짧은 대기 후 `Ok(None)`(타임아웃)을 반환할 수 있으며,
//! 이는 에러가 아니라 캡처 루프가 중지 플래그를 확인하는 지점입니다.
//!
//! # 구현
//! - [`PcapSource`]: libpcap 라이브 캡처 (커널 BPF 필터 적용)
//! - [`PcapFileSource`]: 저장된 pcap 파일 재생

use std::path::Path;

use chrono::{DateTime, Utc};
use pcap::{Active, Capture, Device, Offline, Packet};
use tracing::{info, warn};

use sentinel_core::config::CaptureConfig;
use sentinel_core::error::CaptureError;
use sentinel_core::metrics as m;

use crate::frame::{LinkType, RawFrame};

/// 원시 프레임 공급자
///
/// 캡처 태스크가 독점 소유하므로 `Send`만 요구합니다.
pub trait FrameSource: Send {
    /// 다음 프레임을 읽습니다.
    ///
    /// - `Ok(Some(frame))`: 프레임 수신
    /// - `Ok(None)`: 읽기 타임아웃 (정상)
    /// - `Err(CaptureError::Exhausted)`: 오프라인 소스의 끝
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    /// 로그용 소스 설명
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 설정에 따라 라이브 또는 파일 소스를 엽니다.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    if config.pcap_file.is_empty() {
        Ok(Box::new(PcapSource::open(config)?))
    } else {
        Ok(Box::new(PcapFileSource::open(&config.pcap_file, &config.filter)?))
    }
}

// =============================================================================
// 라이브 캡처
// =============================================================================

/// libpcap 라이브 캡처 소스
pub struct PcapSource {
    capture: Capture<Active>,
    device: String,
    link: LinkType,
}

impl PcapSource {
    /// 인터페이스를 열고 BPF 필터를 적용합니다.
    ///
    /// # 에러
    /// - `DeviceNotFound`: 이름이 장치 목록에 없거나 기본 장치가 없음
    /// - `PermissionDenied`: 캡처 권한 없음 (CAP_NET_RAW 등)
    /// - `Filter`: 필터 식 컴파일 실패
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let device = resolve_device(&config.interface)?;

        let snaplen = i32::try_from(config.snaplen).unwrap_or(i32::MAX);
        let timeout_ms = i32::try_from(config.read_timeout_ms).unwrap_or(i32::MAX);

        let mut capture = Capture::from_device(device.as_str())
            .map_err(|e| classify_open_error(&device, e))?
            .promisc(config.promiscuous)
            .snaplen(snaplen)
            .timeout(timeout_ms)
            .open()
            .map_err(|e| classify_open_error(&device, e))?;

        apply_filter(&mut capture, &config.filter)?;

        let link = LinkType::from_dlt(capture.get_datalink().0);
        if let LinkType::Unsupported(dlt) = link {
            warn!(device = %device, dlt, "unsupported link type, frames will be dropped");
        }

        info!(
            device = %device,
            filter = %config.filter,
            promiscuous = config.promiscuous,
            read_timeout_ms = config.read_timeout_ms,
            "capture device opened"
        );

        Ok(Self {
            capture,
            device,
            link,
        })
    }
}

impl FrameSource for PcapSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(to_raw_frame(&packet, self.link))),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::Read(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("interface {}", self.device)
    }
}

/// 인터페이스 이름을 확인하거나 기본 장치를 조회합니다.
fn resolve_device(interface: &str) -> Result<String, CaptureError> {
    if interface.is_empty() {
        let device = Device::lookup()
            .map_err(|e| classify_open_error("default", e))?
            .ok_or_else(|| CaptureError::DeviceNotFound("no default capture device".to_owned()))?;
        return Ok(device.name);
    }

    let devices = Device::list().map_err(|e| classify_open_error(interface, e))?;
    if devices.iter().any(|d| d.name == interface) {
        Ok(interface.to_owned())
    } else {
        Err(CaptureError::DeviceNotFound(interface.to_owned()))
    }
}

/// libpcap 에러 메시지를 캡처 에러 분류로 변환합니다.
pub(crate) fn classify_open_error(device: &str, err: pcap::Error) -> CaptureError {
    let reason = err.to_string();
    let lower = reason.to_lowercase();
    if lower.contains("permission") || lower.contains("not permitted") {
        CaptureError::PermissionDenied {
            device: device.to_owned(),
            reason,
        }
    } else if lower.contains("no such device") {
        CaptureError::DeviceNotFound(device.to_owned())
    } else {
        CaptureError::Open {
            device: device.to_owned(),
            reason,
        }
    }
}

fn apply_filter<T: pcap::Activated + ?Sized>(
    capture: &mut Capture<T>,
    filter: &str,
) -> Result<(), CaptureError> {
    if filter.is_empty() {
        return Ok(());
    }
    capture
        .filter(filter, true)
        .map_err(|e| CaptureError::Filter {
            filter: filter.to_owned(),
            reason: e.to_string(),
        })
}

fn to_raw_frame(packet: &Packet<'_>, link: LinkType) -> RawFrame {
    metrics::counter!(m::CAPTURE_FRAMES_TOTAL).increment(1);
    let header = packet.header;
    #[allow(clippy::unnecessary_cast)]
    let timestamp = header_timestamp(header.ts.tv_sec as i64, header.ts.tv_usec as i64);
    RawFrame {
        timestamp,
        link,
        data: bytes::Bytes::copy_from_slice(packet.data),
        wire_len: header.len as usize,
    }
}

/// pcap 헤더 시각을 UTC로 변환합니다. 범위를 벗어나면 현재 시각을 사용합니다.
fn header_timestamp(secs: i64, micros: i64) -> DateTime<Utc> {
    let nanos = u32::try_from(micros.clamp(0, 999_999) * 1_000).unwrap_or(0);
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}

// =============================================================================
// 파일 재생
// =============================================================================

/// 저장된 pcap 파일을 재생하는 소스
///
/// 파일 끝에서 `CaptureError::Exhausted`를 반환하며, 프레임 시각은 파일에 기록된
/// 캡처 시각을 그대로 사용합니다.
pub struct PcapFileSource {
    capture: Capture<Offline>,
    path: String,
    link: LinkType,
}

impl PcapFileSource {
    pub fn open(path: impl AsRef<Path>, filter: &str) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.exists() {
            return Err(CaptureError::DeviceNotFound(display));
        }

        let mut capture = Capture::from_file(path).map_err(|e| CaptureError::Open {
            device: display.clone(),
            reason: e.to_string(),
        })?;
        apply_filter(&mut capture, filter)?;

        let link = LinkType::from_dlt(capture.get_datalink().0);
        info!(path = %path.display(), filter, ?link, "replaying capture file");

        Ok(Self {
            capture,
            path: display,
            link,
        })
    }
}

impl FrameSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(to_raw_frame(&packet, self.link))),
            Err(pcap::Error::NoMorePackets) => Err(CaptureError::Exhausted),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::Read(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path)
    }
}
