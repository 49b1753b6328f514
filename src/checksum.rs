//! 청크 다이제스트 (SHA-256, 16진수 문자열)

use sha2::{Digest, Sha256};

/// 16진수 다이제스트 길이
pub const DIGEST_HEX_LEN: usize = 64;

/// 바이트 범위의 SHA-256 다이제스트
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 다이제스트 검증
pub fn verify(data: &[u8], expected: &str) -> bool {
    expected.len() == DIGEST_HEX_LEN && digest(data).eq_ignore_ascii_case(expected)
}
