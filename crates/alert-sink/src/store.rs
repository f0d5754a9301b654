//! 컬렉션 저장 대상
//!
//! [`CollectionStore`]는 기록 태스크가 전체 알림 컬렉션을 한 번에 쓰는 대상입니다.
//! 호출은 항상 `spawn_blocking` 안에서 이루어지므로 동기 I/O를 사용해도 됩니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use sentinel_core::error::{SentinelError, SinkError};
use sentinel_core::types::AlertRecord;

/// 알림 컬렉션 저장 대상
pub trait CollectionStore: Send + Sync + 'static {
    /// 컬렉션 전체를 기록합니다. 이전 내용은 대체됩니다.
    fn persist(&self, alerts: &[AlertRecord]) -> Result<(), SinkError>;

    /// 로그와 에러 메시지에 쓰는 저장 위치
    fn location(&self) -> String;
}

/// JSON 배열 파일 저장소
///
/// 같은 디렉토리에 임시 파일을 만들고 fsync 후 rename 하므로, 읽는 쪽은
/// 항상 이전 컬렉션이나 새 컬렉션 중 하나의 완전한 내용만 봅니다.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failed(&self, reason: impl ToString) -> SinkError {
        SinkError::WriteFailed {
            path: self.location(),
            attempts: 1,
            reason: reason.to_string(),
        }
    }
}

impl CollectionStore for JsonFileStore {
    fn persist(&self, alerts: &[AlertRecord]) -> Result<(), SinkError> {
        let mut body =
            serde_json::to_vec_pretty(alerts).map_err(|e| SinkError::Serialize(e.to_string()))?;
        body.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_failed(e))?;
        tmp.write_all(&body).map_err(|e| self.write_failed(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_failed(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.write_failed(e.error))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// 저장된 컬렉션을 읽습니다.
pub fn load_collection(path: impl AsRef<Path>) -> Result<Vec<AlertRecord>, SentinelError> {
    let content = std::fs::read(path.as_ref())?;
    let alerts =
        serde_json::from_slice(&content).map_err(|e| SinkError::Serialize(e.to_string()))?;
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sentinel_core::types::{FlowRecord, Protocol, RuleId};

    fn alert(dport: u16) -> AlertRecord {
        let flow = FlowRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            src_ip: "10.0.0.5".parse().unwrap(),
            dst_ip: "192.168.1.10".parse().unwrap(),
            src_port: 40000,
            dst_port: dport,
            protocol: Protocol::Tcp,
            size: 60,
        };
        AlertRecord::from_flow(RuleId::SuspiciousProtocol, &flow)
    }

    #[test]
    fn test_json_store_writes_parseable_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("alerts.json"));
        store.persist(&[alert(23), alert(445)]).unwrap();

        let loaded = load_collection(store.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].dest_port, 445);
    }

    #[test]
    fn test_json_store_empty_collection_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("alerts.json"));
        store.persist(&[]).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn test_json_store_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("alerts.json"));
        store.persist(&[alert(23), alert(445), alert(3389)]).unwrap();
        store.persist(&[alert(23)]).unwrap();

        assert_eq!(load_collection(store.path()).unwrap().len(), 1);
        // 임시 파일이 남지 않음
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_json_store_uses_collection_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("alerts.json"));
        store.persist(&[alert(23)]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let first = &value[0];
        assert_eq!(first["timestamp"], "2026-03-01T12:00:00.000000Z");
        assert_eq!(first["source_ip"], "10.0.0.5");
        assert_eq!(first["dest_port"], 23);
        assert_eq!(first["protocol"], "TCP");
        assert_eq!(first["alert"], "Suspicious protocol usage");
        assert_eq!(first["severity"], "medium");
    }

    #[test]
    fn test_json_store_missing_directory_fails() {
        let store = JsonFileStore::new("/nonexistent-sentinel-dir/alerts.json");
        let err = store.persist(&[]).unwrap_err();
        assert!(matches!(err, SinkError::WriteFailed { attempts: 1, .. }));
        assert!(err.to_string().contains("/nonexistent-sentinel-dir/alerts.json"));
    }
}
