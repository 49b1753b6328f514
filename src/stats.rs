//! 전송 통계
//!
//! 모든 워커가 공유하는 카운터. 잠금 없이 원자적으로만 갱신하며
//! 프로토콜 판단에는 쓰지 않음

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 다운로드 하나의 통계 (클라이언트측)
#[derive(Debug, Default)]
pub struct TransferStats {
    attempts: AtomicU64,
    timeouts: AtomicU64,
    checksum_mismatches: AtomicU64,
    malformed_replies: AtomicU64,
    stale_replies: AtomicU64,
    acks_sent: AtomicU64,
    chunks_completed: AtomicU64,
    chunks_failed: AtomicU64,
    bytes_received: AtomicU64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 요청 전송 (재시도 포함)
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checksum_mismatch(&self) {
        self.checksum_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_replies.fetch_add(1, Ordering::Relaxed);
    }

    /// 기다리던 요청이 아닌 응답
    pub fn record_stale(&self) {
        self.stale_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// 청크 완료 기록, 지금까지 완료된 청크 수 반환
    pub fn record_chunk(&self, size: usize) -> u64 {
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
        self.chunks_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 마지막 라운드 후에도 누락된 청크 수
    pub fn record_failed_chunks(&self, count: u64) {
        self.chunks_failed.fetch_add(count, Ordering::Relaxed);
    }

    /// 현재 값 복사
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            checksum_mismatches: self.checksum_mismatches.load(Ordering::Relaxed),
            malformed_replies: self.malformed_replies.load(Ordering::Relaxed),
            stale_replies: self.stale_replies.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub timeouts: u64,
    pub checksum_mismatches: u64,
    pub malformed_replies: u64,
    pub stale_replies: u64,
    pub acks_sent: u64,
    pub chunks_completed: u64,
    pub chunks_failed: u64,
    pub bytes_received: u64,
}

impl StatsSnapshot {
    /// 첫 시도를 제외한 재전송 요청 수
    pub fn retries(&self) -> u64 {
        self.attempts
            .saturating_sub(self.chunks_completed + self.chunks_failed)
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed.as_secs_f64()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks={} failed={} bytes={} attempts={} timeouts={} checksum_mismatches={} malformed={} stale={} acks={}",
            self.chunks_completed,
            self.chunks_failed,
            self.bytes_received,
            self.attempts,
            self.timeouts,
            self.checksum_mismatches,
            self.malformed_replies,
            self.stale_replies,
            self.acks_sent
        )
    }
}

/// 서버 통계
#[derive(Debug, Default)]
pub struct ServerStats {
    requests: AtomicU64,
    rejected: AtomicU64,
    malformed: AtomicU64,
    acks: AtomicU64,
    bytes_served: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// INVALID 응답
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_served(&self, size: usize) {
        self.bytes_served.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn acks(&self) -> u64 {
        self.acks.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_retries() {
        let stats = TransferStats::new();

        for _ in 0..5 {
            stats.record_attempt();
        }
        stats.record_timeout();
        stats.record_checksum_mismatch();
        assert_eq!(stats.record_chunk(2048), 1);
        assert_eq!(stats.record_chunk(904), 2);
        stats.record_failed_chunks(1);

        let snap = stats.snapshot();
        assert_eq!(snap.chunks_completed, 2);
        assert_eq!(snap.bytes_received, 2952);
        assert_eq!(snap.retries(), 2);
        assert_eq!(snap.throughput(Duration::from_secs(2)), 1476.0);
        assert_eq!(snap.throughput(Duration::ZERO), 0.0);
        assert!(snap.to_string().contains("timeouts=1"));
    }

    #[test]
    fn test_server_counters() {
        let stats = ServerStats::new();
        stats.record_request();
        stats.record_request();
        stats.record_rejected();
        stats.record_ack();
        stats.record_served(904);

        assert_eq!(stats.requests(), 2);
        assert_eq!(stats.rejected(), 1);
        assert_eq!(stats.acks(), 1);
        assert_eq!(stats.malformed(), 0);
        assert_eq!(stats.bytes_served(), 904);
    }
}
