//! 전송 조정자 (클라이언트측)
//!
//! - 크기 조회 → 청크 계획 → 워커 풀에 분배
//! - 첫 라운드 후 누락된 청크만 한 번 더 요청
//! - 모든 청크가 모여야 번호 순서대로 조립

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::Receiver as WorkQueue;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkSpec, FileHandle, TransferState};
use crate::fetcher::ChunkFetcher;
use crate::sink::Sink;
use crate::stats::{StatsSnapshot, TransferStats};
use crate::{Config, Error, Result};

/// 진행률 로그 간격 (%)
const PROGRESS_STEP_PERCENT: u64 = 10;

/// 다운로드 조정자
pub struct TransferCoordinator {
    config: Config,
    server_addr: SocketAddr,
}

impl TransferCoordinator {
    /// 새 조정자 생성
    pub fn new(config: Config, server_addr: SocketAddr) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            server_addr,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// 서버 파일 목록
    pub async fn list(&self) -> Result<Vec<String>> {
        let fetcher = self.control_fetcher().await?;
        fetcher.query_list().await
    }

    /// 파일 크기
    pub async fn size(&self, filename: &str) -> Result<u64> {
        let fetcher = self.control_fetcher().await?;
        fetcher.query_size(filename).await
    }

    /// 파일 다운로드
    pub async fn download(&self, filename: &str) -> Result<Bytes> {
        self.download_with_stats(filename)
            .await
            .map(|(data, _)| data)
    }

    /// 다운로드 후 출력 대상에 기록
    ///
    /// 조립에 성공한 경우에만 sink를 호출함
    pub async fn download_to<S: Sink + ?Sized>(&self, filename: &str, sink: &mut S) -> Result<u64> {
        let data = self.download(filename).await?;
        sink.write(filename, &data)?;
        Ok(data.len() as u64)
    }

    /// 파일 다운로드 (통계 포함)
    pub async fn download_with_stats(&self, filename: &str) -> Result<(Bytes, StatsSnapshot)> {
        let stats = Arc::new(TransferStats::new());
        let data = self.download_recording(filename, &stats).await?;
        Ok((data, stats.snapshot()))
    }

    /// 호출자가 준 통계에 기록하며 다운로드
    ///
    /// 실패한 경우에도 `stats`에 시도/실패 기록이 남음
    pub async fn download_recording(
        &self,
        filename: &str,
        stats: &Arc<TransferStats>,
    ) -> Result<Bytes> {
        let started = Instant::now();

        let size = self.size(filename).await?;
        let handle = FileHandle::new(filename, size, self.config.chunk_size)?;
        let plan = handle.plan();
        let state = Arc::new(TransferState::new(&handle));

        info!(
            "다운로드 시작: {} ({} bytes, {} chunks)",
            filename,
            size,
            plan.len()
        );

        self.run_round(&state, plan, stats, 1).await?;

        let missing = state.missing();
        if !missing.is_empty() {
            warn!(
                "{}: 누락 청크 {}개 재요청 {:?}",
                filename,
                missing.len(),
                missing
            );
            let retry: Vec<ChunkSpec> = missing.iter().filter_map(|&i| handle.spec(i)).collect();
            self.run_round(&state, retry, stats, 2).await?;
        }

        // 두 라운드가 끝난 뒤에도 비어 있는 청크만 실패로 셈
        let failed = state.missing().len() as u64;
        if failed > 0 {
            stats.record_failed_chunks(failed);
        }

        let data = match state.assemble() {
            Ok(data) => data,
            Err(e) => {
                warn!("다운로드 실패: {}", e);
                return Err(e);
            }
        };

        if data.len() as u64 != size {
            warn!(
                "{}: 조립 크기가 조회 크기와 다름 (expected {}, got {})",
                filename,
                size,
                data.len()
            );
        }

        let snapshot = stats.snapshot();
        let elapsed = started.elapsed();
        info!(
            "다운로드 완료: {} ({} bytes, {:.2}s, {:.2} KB/s)",
            filename,
            data.len(),
            elapsed.as_secs_f64(),
            snapshot.throughput(elapsed) / 1000.0
        );
        debug!("{}: {}", filename, snapshot);

        Ok(data)
    }

    /// 한 라운드: 작업 큐 + 고정 크기 워커 풀
    async fn run_round(
        &self,
        state: &Arc<TransferState>,
        specs: Vec<ChunkSpec>,
        stats: &Arc<TransferStats>,
        round: u32,
    ) -> Result<()> {
        let workers = self.config.worker_count(specs.len());
        if workers == 0 {
            return Ok(());
        }

        debug!(
            "라운드 {}: {} chunks, {} workers",
            round,
            specs.len(),
            workers
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        for spec in specs {
            // 수신측이 살아 있으므로 실패하지 않음
            let _ = tx.send(spec);
        }
        drop(tx);

        // 소켓을 먼저 모두 만들어 두고 하나라도 실패하면 중단
        let mut fetchers = Vec::with_capacity(workers);
        for _ in 0..workers {
            fetchers.push(ChunkFetcher::bind(&self.config, self.server_addr, stats.clone()).await?);
        }

        let total = state.chunk_count() as u64;
        let mut set = JoinSet::new();
        for (worker_id, fetcher) in fetchers.into_iter().enumerate() {
            let queue = rx.clone();
            let state = state.clone();
            set.spawn(run_worker(worker_id, fetcher, queue, state, total));
        }
        drop(rx);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("워커 비정상 종료: {}", e);
            }
        }

        Ok(())
    }

    /// 크기/목록 조회용 연결
    async fn control_fetcher(&self) -> Result<ChunkFetcher> {
        ChunkFetcher::bind(
            &self.config,
            self.server_addr,
            Arc::new(TransferStats::new()),
        )
        .await
    }
}

/// 워커: 큐가 빌 때까지 청크를 하나씩 가져옴
///
/// 청크 하나의 실패는 다른 청크에 영향을 주지 않음
async fn run_worker(
    worker_id: usize,
    fetcher: ChunkFetcher,
    queue: WorkQueue<ChunkSpec>,
    state: Arc<TransferState>,
    total: u64,
) {
    while let Ok(spec) = queue.try_recv() {
        if state.contains(spec.index) {
            continue;
        }

        match fetcher.fetch_into(&state, &spec).await {
            Ok(()) => {
                let done = state.completed() as u64;
                if total > 0 && crossed_progress_step(done, total) {
                    info!(
                        "Progress: {}/{} chunks ({:.1}%) - {}",
                        done,
                        total,
                        done as f64 / total as f64 * 100.0,
                        state.filename()
                    );
                }
            }
            Err(e) => {
                warn!(
                    "[worker {}] 청크 {} 실패: {}",
                    worker_id, spec.index, e
                );
            }
        }
    }
}

/// done번째 청크로 진행률 구간을 새로 넘었는지
fn crossed_progress_step(done: u64, total: u64) -> bool {
    let step = |n: u64| n * 100 / total / PROGRESS_STEP_PERCENT;
    done == total || step(done) > step(done.saturating_sub(1))
}

/// 다운로드 결과를 요약한 에러인지 (재시도 가치 판단용)
pub fn is_retryable_transfer_error(error: &Error) -> bool {
    matches!(
        error,
        Error::IncompleteTransfer { .. } | Error::SizeUnavailable { .. } | Error::Io(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_steps() {
        let crossings: Vec<u64> = (1..=20).filter(|&d| crossed_progress_step(d, 20)).collect();
        assert_eq!(crossings, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);

        assert!(crossed_progress_step(1, 1));
        assert!(crossed_progress_step(3, 3));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        assert!(matches!(
            TransferCoordinator::new(config, addr),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_transfer_error(&Error::IncompleteTransfer {
            filename: "a".into(),
            missing: vec![1],
        }));
        assert!(!is_retryable_transfer_error(&Error::InvalidRequest {
            filename: "a".into()
        }));
    }
}
