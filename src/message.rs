//! 프로토콜 메시지 정의
//!
//! 데이터그램 하나에 JSON 봉투 하나. `type` 필드로 종류를 구분하고
//! 청크 데이터는 base64로 봉투 안에 넣음

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// 요청 메시지 (클라이언트 → 서버)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// 파일 목록 요청
    GetList,

    /// 파일 크기 요청
    GetSize { filename: String },

    /// 청크 요청
    GetChunk {
        filename: String,
        offset: u64,
        length: u64,
    },

    /// 청크 수신 확인 (응답 없음)
    Ack { filename: String, offset: u64 },
}

impl Request {
    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::MalformedEnvelope(e.to_string()))
    }

    /// 메시지 타입 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetList => "GET_LIST",
            Request::GetSize { .. } => "GET_SIZE",
            Request::GetChunk { .. } => "GET_CHUNK",
            Request::Ack { .. } => "ACK",
        }
    }
}

/// 응답 메시지 (서버 → 클라이언트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    /// 줄바꿈으로 이어 붙인 파일 이름
    List { data: String },

    /// 10진수 텍스트로 된 파일 크기
    Size { filename: String, data: String },

    /// 청크 데이터 + 다이제스트
    ///
    /// `filename`/`offset`은 요청을 그대로 되돌려 줌 (지연 응답 구분용)
    Chunk {
        filename: String,
        offset: u64,
        #[serde(with = "base64_data")]
        data: Bytes,
        checksum: String,
    },

    /// 거부 (허용 목록 밖, 파일 없음, 잘못된 범위)
    Invalid,

    /// 요청 offset이 파일 끝 이후
    End,
}

impl Reply {
    /// 크기 응답 생성
    pub fn size(filename: impl Into<String>, size: u64) -> Self {
        Reply::Size {
            filename: filename.into(),
            data: size.to_string(),
        }
    }

    /// 목록 응답 생성
    pub fn list<S: AsRef<str>>(names: &[S]) -> Self {
        let data = names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        Reply::List { data }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::MalformedEnvelope(e.to_string()))
    }

    /// 크기 응답의 숫자 값
    ///
    /// 크기 응답이 아니거나 숫자가 아니면 None
    pub fn size_value(&self) -> Option<u64> {
        match self {
            Reply::Size { data, .. } => data.trim().parse().ok(),
            _ => None,
        }
    }

    /// 목록 응답의 파일 이름들
    pub fn list_entries(&self) -> Option<Vec<String>> {
        match self {
            Reply::List { data } => Some(
                data.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 메시지 타입 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::List { .. } => "LIST",
            Reply::Size { .. } => "SIZE",
            Reply::Chunk { .. } => "CHUNK",
            Reply::Invalid => "INVALID",
            Reply::End => "END",
        }
    }
}

/// `Bytes` <-> base64 문자열
mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
