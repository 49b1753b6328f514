//! 에러 타입 정의

use thiserror::Error;

use crate::chunk::ChunkIndex;

/// CFP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("잘못된 메시지 봉투: {0}")]
    MalformedEnvelope(String),

    #[error("요청 거부됨 (허용 목록 밖이거나 존재하지 않음): {filename}")]
    InvalidRequest { filename: String },

    #[error("파일 끝 도달: {filename}, offset={offset}")]
    EndOfStream { filename: String, offset: u64 },

    #[error("체크섬 불일치: expected {expected}, got {got}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("요청보다 긴 청크: offset={offset}, 요청 {requested} bytes, 응답 {got} bytes")]
    OversizedChunk {
        offset: u64,
        requested: u64,
        got: u64,
    },

    #[error("응답 타임아웃: {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("청크 수신 실패: {filename}, offset={offset}, {attempts}회 시도")]
    FetchFailed {
        filename: String,
        offset: u64,
        attempts: u32,
    },

    #[error("파일 크기 조회 실패: {filename}")]
    SizeUnavailable { filename: String },

    #[error("파일 목록 조회 실패")]
    ListUnavailable,

    #[error("불완전한 전송: {filename}, 누락 청크 {missing:?}")]
    IncompleteTransfer {
        filename: String,
        missing: Vec<ChunkIndex>,
    },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 같은 요청을 다시 보내면 회복될 수 있는 에러인지
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::ChecksumMismatch { .. }
                | Error::OversizedChunk { .. }
                | Error::MalformedEnvelope(_)
                | Error::Io(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
