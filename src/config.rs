//! 프로토콜 설정

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    Error, Result, DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_SERVER_PORT, MAX_CHUNK_SIZE,
};

/// 전송(클라이언트측) 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 시도당 응답 대기 타임아웃 (밀리초)
    pub attempt_timeout_ms: u64,

    /// 요청당 최대 시도 횟수
    pub max_attempts: u32,

    /// 워커 수 고정값 (0이면 파일 크기로 결정)
    pub parallel_workers: usize,

    /// 자동 결정 시 최소 워커 수
    pub min_workers: usize,

    /// 워커 수 상한 (고정값에도 적용)
    pub max_workers: usize,

    /// 자동 결정 시 워커 하나가 맡을 청크 수
    pub chunks_per_worker: usize,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS, // 3초
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            parallel_workers: 0, // 파일 크기 기준
            min_workers: 2,
            max_workers: 32,
            chunks_per_worker: 16,
            recv_buffer_size: 64 * 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 시도당 타임아웃
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// 청크 수에 맞는 워커 수 계산
    ///
    /// 큰 파일일수록 워커가 늘어나지만 `max_workers`와 청크 수를 넘지 않음
    pub fn worker_count(&self, chunk_count: usize) -> usize {
        if chunk_count == 0 {
            return 0;
        }

        let wanted = if self.parallel_workers > 0 {
            self.parallel_workers
        } else {
            let per_worker = self.chunks_per_worker.max(1);
            chunk_count.div_ceil(per_worker).max(self.min_workers)
        };

        wanted.min(self.max_workers).min(chunk_count).max(1)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size는 1..={} 범위여야 함: {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts는 1 이상이어야 함".into()));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "attempt_timeout_ms는 1 이상이어야 함".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig("max_workers는 1 이상이어야 함".into()));
        }
        if self.min_workers > self.max_workers {
            return Err(Error::InvalidConfig(format!(
                "min_workers({}) > max_workers({})",
                self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            chunk_size: 1024,
            attempt_timeout_ms: 5000,
            max_attempts: 5,
            parallel_workers: 0,
            min_workers: 1,
            max_workers: 4,
            chunks_per_worker: 64,
            recv_buffer_size: 16 * 1024,
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            chunk_size: 16 * 1024,
            attempt_timeout_ms: 1000,
            max_attempts: 5,
            parallel_workers: 0,
            min_workers: 4,
            max_workers: 64,
            chunks_per_worker: 8,
            recv_buffer_size: 64 * 1024,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 1024, // 작은 청크
            attempt_timeout_ms: 1500,
            max_attempts: 10,
            parallel_workers: 0,
            min_workers: 2,
            max_workers: 16,
            chunks_per_worker: 16,
            recv_buffer_size: 64 * 1024,
        }
    }

    /// 이름으로 프리셋 선택
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "low-spec" => Some(Self::low_spec()),
            "high-performance" => Some(Self::high_performance()),
            "unstable-network" => Some(Self::unstable_network()),
            _ => None,
        }
    }
}

/// 서버 설정
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 바인드 주소
    pub bind_addr: SocketAddr,

    /// 제공 디렉터리
    pub root: PathBuf,

    /// 허용 목록 파일
    pub allow_list_path: PathBuf,

    /// 한 응답에 담을 최대 청크 길이
    pub max_chunk_len: usize,

    /// 동시에 처리하는 요청 수 상한
    pub max_in_flight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_SERVER_PORT)),
            root: PathBuf::from("data"),
            allow_list_path: PathBuf::from("data/file_list.txt"),
            max_chunk_len: MAX_CHUNK_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ServerConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_len == 0 || self.max_chunk_len > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_chunk_len은 1..={} 범위여야 함: {}",
                MAX_CHUNK_SIZE, self.max_chunk_len
            )));
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidConfig(
                "max_in_flight은 1 이상이어야 함".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_scales_and_caps() {
        let config = Config::default();

        assert_eq!(config.worker_count(0), 0);
        assert_eq!(config.worker_count(1), 1);
        // 최소 워커 수 적용
        assert_eq!(config.worker_count(3), 2);
        assert_eq!(config.worker_count(160), 10);
        // 상한
        assert_eq!(config.worker_count(100_000), 32);
    }

    #[test]
    fn test_fixed_workers_still_capped() {
        let config = Config {
            parallel_workers: 50,
            max_workers: 64,
            ..Config::default()
        };
        assert_eq!(config.worker_count(98), 50);
        assert_eq!(config.worker_count(3), 3);

        let capped = Config {
            parallel_workers: 500,
            ..Config::default()
        };
        assert_eq!(capped.worker_count(10_000), 32);
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::low_spec().validate().is_ok());
        assert!(Config::high_performance().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());

        let bad = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        let bad = Config {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..Config::default()
        };
        assert!(bad.validate().is_err());

        let bad = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());

        let bad = Config {
            min_workers: 8,
            max_workers: 4,
            ..Config::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_server_config_validate() {
        assert!(ServerConfig::default().validate().is_ok());

        let bad = ServerConfig {
            max_in_flight: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        let bad = ServerConfig {
            max_chunk_len: MAX_CHUNK_SIZE + 1,
            ..ServerConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(Config::preset("low-spec").map(|c| c.max_workers), Some(4));
        assert!(Config::preset("turbo").is_none());
        assert!(ServerConfig::default().validate().is_ok());
    }
}
