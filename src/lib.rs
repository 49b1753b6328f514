//! # CFP (Chunk Fetch Protocol)
//!
//! UDP 기반 청크 단위 파일 가져오기 프로토콜
//!
//! ## 핵심 특징
//! - **청크 요청형**: 클라이언트가 필요한 청크를 직접 요청
//! - **체크섬 검증**: SHA-256 다이제스트가 일치해야만 청크 수락
//! - **ACK**: 검증된 청크마다 fire-and-forget ACK 전송
//! - **유한 재시도**: 시도마다 고정 타임아웃, 최대 시도 횟수 제한
//! - **워커 풀**: 파일 크기에 비례하되 상한이 있는 동시 워커 수
//! - **전부 아니면 전무**: 모든 청크가 모여야만 조립

pub mod allowlist;
pub mod checksum;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod message;
pub mod server;
pub mod sink;
pub mod stats;
pub mod watchlist;

pub use allowlist::AllowList;
pub use chunk::{ChunkIndex, ChunkSpec, FileHandle, TransferState};
pub use config::{Config, ServerConfig};
pub use coordinator::TransferCoordinator;
pub use error::{Error, Result};
pub use fetcher::ChunkFetcher;
pub use message::{Reply, Request};
pub use server::{Server, ServerState};
pub use sink::{DirectorySink, Sink};
pub use stats::{ServerStats, StatsSnapshot, TransferStats};
pub use watchlist::WatchList;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// 기본 서버 포트
pub const DEFAULT_SERVER_PORT: u16 = 12345;

/// 시도당 응답 대기 시간 (밀리초)
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 3000;

/// 청크당 최대 시도 횟수
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// 서버가 한 번에 내보내는 최대 청크 길이.
/// base64로 늘어난 봉투도 데이터그램 하나에 들어가야 함
pub const MAX_CHUNK_SIZE: usize = 32 * 1024;

/// 서버가 동시에 처리하는 요청 수 기본 상한
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// UDP/IPv4 최대 페이로드
pub const MAX_DATAGRAM_SIZE: usize = 65507;
