//! 청크 가져오기 (클라이언트측)
//!
//! - 요청 전송 → 시도당 고정 타임아웃 동안 응답 대기
//! - 다이제스트 검증 후 ACK (fire-and-forget)
//! - 시도 횟수 상한이 있는 명시적 루프, 일시 오류만 재시도

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::checksum;
use crate::chunk::{ChunkSpec, TransferState};
use crate::message::{Reply, Request};
use crate::stats::TransferStats;
use crate::{Config, Error, Result, MAX_DATAGRAM_SIZE};

/// 시도 한 번의 결과
#[derive(Debug)]
enum Attempt<T> {
    /// 성공
    Done(T),

    /// 같은 요청을 다시 보내면 회복 가능 (타임아웃, 체크섬 불일치, 길이 초과)
    Transient(Error),

    /// 재시도해도 소용없음 (INVALID / END)
    Terminal(Error),
}

/// 요청/응답 교환 실패
#[derive(Debug)]
enum ExchangeError {
    Terminal(Error),
    Exhausted { attempts: u32, last: Error },
}

/// 서버 하나와 요청/응답을 주고받는 워커 단위 연결
///
/// 워커마다 자기 소켓을 가지므로 다른 워커의 응답과 섞이지 않음
pub struct ChunkFetcher {
    socket: UdpSocket,
    server_addr: SocketAddr,
    attempt_timeout: Duration,
    max_attempts: u32,
    recv_buffer_size: usize,
    stats: Arc<TransferStats>,
}

impl ChunkFetcher {
    /// 임시 포트에 소켓 바인딩
    pub async fn bind(
        config: &Config,
        server_addr: SocketAddr,
        stats: Arc<TransferStats>,
    ) -> Result<Self> {
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Self {
            socket,
            server_addr,
            attempt_timeout: config.attempt_timeout(),
            max_attempts: config.max_attempts.max(1),
            // base64 확장 + 봉투 필드가 들어갈 만큼은 확보
            recv_buffer_size: config
                .recv_buffer_size
                .max(config.chunk_size * 2 + 1024)
                .min(MAX_DATAGRAM_SIZE),
            stats,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> &Arc<TransferStats> {
        &self.stats
    }

    /// 청크 하나 가져오기
    ///
    /// INVALID/END는 즉시 실패, 타임아웃과 체크섬 불일치, 요청보다 긴 응답은
    /// `max_attempts`까지 재시도.
    /// 시도를 다 쓰면 `FetchFailed`
    pub async fn fetch(&self, filename: &str, offset: u64, length: u64) -> Result<Bytes> {
        let request = Request::GetChunk {
            filename: filename.to_string(),
            offset,
            length,
        };

        let result = self
            .exchange(&request, |reply, _| match reply {
                Reply::Chunk {
                    filename: name,
                    offset: reply_offset,
                    data,
                    checksum: expected,
                } if name == filename && reply_offset == offset => {
                    if data.len() as u64 > length {
                        warn!(
                            "요청보다 긴 청크 거부: {} offset={} ({} > {})",
                            filename,
                            offset,
                            data.len(),
                            length
                        );
                        Some(Attempt::Transient(Error::OversizedChunk {
                            offset,
                            requested: length,
                            got: data.len() as u64,
                        }))
                    } else if checksum::verify(&data, &expected) {
                        Some(Attempt::Done(data))
                    } else {
                        self.stats.record_checksum_mismatch();
                        Some(Attempt::Transient(Error::ChecksumMismatch {
                            got: checksum::digest(&data),
                            expected,
                        }))
                    }
                }
                Reply::Invalid => Some(Attempt::Terminal(Error::InvalidRequest {
                    filename: filename.to_string(),
                })),
                Reply::End => Some(Attempt::Terminal(Error::EndOfStream {
                    filename: filename.to_string(),
                    offset,
                })),
                // 다른 청크/요청에 대한 늦은 응답
                _ => None,
            })
            .await;

        match result {
            Ok((data, sender)) => {
                self.send_ack(filename, offset, sender).await;
                Ok(data)
            }
            Err(ExchangeError::Terminal(e)) => Err(e),
            Err(ExchangeError::Exhausted { attempts, last }) => {
                debug!(
                    "청크 포기: {} offset={} ({}회 시도, 마지막 에러: {})",
                    filename, offset, attempts, last
                );
                Err(Error::FetchFailed {
                    filename: filename.to_string(),
                    offset,
                    attempts,
                })
            }
        }
    }

    /// 청크를 가져와서 전송 상태에 기록
    ///
    /// 잠금은 슬롯 갱신 동안만 잡음 (네트워크 I/O 중에는 잡지 않음)
    pub async fn fetch_into(&self, state: &TransferState, spec: &ChunkSpec) -> Result<()> {
        let data = self
            .fetch(state.filename(), spec.offset, spec.length)
            .await?;
        let len = data.len();

        if len as u64 != spec.length {
            debug!(
                "청크 길이가 계획과 다름: index={} planned={} actual={}",
                spec.index, spec.length, len
            );
        }

        if state.insert(spec.index, data) {
            self.stats.record_chunk(len);
        } else {
            debug!("이미 수신된 청크: index={}", spec.index);
        }
        Ok(())
    }

    /// 파일 크기 조회
    ///
    /// 거부, 0 바이트, 시도 소진 모두 `SizeUnavailable`
    pub async fn query_size(&self, filename: &str) -> Result<u64> {
        let request = Request::GetSize {
            filename: filename.to_string(),
        };
        let unavailable = || Error::SizeUnavailable {
            filename: filename.to_string(),
        };

        let result = self
            .exchange(&request, |reply, _| match &reply {
                Reply::Size { filename: name, .. } if name == filename => {
                    match reply.size_value() {
                        Some(size) if size > 0 => Some(Attempt::Done(size)),
                        _ => Some(Attempt::Terminal(unavailable())),
                    }
                }
                Reply::Invalid => Some(Attempt::Terminal(unavailable())),
                _ => None,
            })
            .await;

        match result {
            Ok((size, _)) => Ok(size),
            Err(ExchangeError::Terminal(e)) => Err(e),
            Err(ExchangeError::Exhausted { .. }) => Err(unavailable()),
        }
    }

    /// 서버 파일 목록 조회
    pub async fn query_list(&self) -> Result<Vec<String>> {
        let result = self
            .exchange(&Request::GetList, |reply, _| {
                reply.list_entries().map(Attempt::Done)
            })
            .await;

        match result {
            Ok((names, _)) => Ok(names),
            Err(ExchangeError::Terminal(e)) => Err(e),
            Err(ExchangeError::Exhausted { .. }) => Err(Error::ListUnavailable),
        }
    }

    /// 요청 전송 + 응답 대기 루프
    ///
    /// `accept`가 None을 돌려주면 기다리던 응답이 아니므로 같은 시도 안에서 계속 대기
    async fn exchange<T, F>(
        &self,
        request: &Request,
        mut accept: F,
    ) -> std::result::Result<(T, SocketAddr), ExchangeError>
    where
        F: FnMut(Reply, SocketAddr) -> Option<Attempt<T>>,
    {
        let bytes = request.to_bytes().map_err(ExchangeError::Terminal)?;
        let mut buf = vec![0u8; self.recv_buffer_size];
        let mut last = Error::Timeout {
            timeout_ms: self.attempt_timeout.as_millis() as u64,
        };

        for attempt in 1..=self.max_attempts {
            self.stats.record_attempt();
            if let Err(e) = self.socket.send_to(&bytes, self.server_addr).await {
                warn!("{} 전송 실패 (시도 {}): {}", request.kind(), attempt, e);
                last = e.into();
                tokio::time::sleep(self.attempt_timeout).await;
                continue;
            }

            let deadline = Instant::now() + self.attempt_timeout;
            let outcome = loop {
                match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Err(_) => {
                        self.stats.record_timeout();
                        break Attempt::Transient(Error::Timeout {
                            timeout_ms: self.attempt_timeout.as_millis() as u64,
                        });
                    }
                    Ok(Err(e)) => {
                        // ICMP 에러 등, 남은 시간 동안 계속 대기
                        debug!("수신 에러: {}", e);
                        continue;
                    }
                    Ok(Ok((len, sender))) => match Reply::from_bytes(&buf[..len]) {
                        Err(e) => {
                            self.stats.record_malformed();
                            warn!("잘못된 응답 무시 ({}): {}", sender, e);
                        }
                        Ok(reply) => {
                            let kind = reply.kind();
                            match accept(reply, sender) {
                                Some(Attempt::Done(value)) => break Attempt::Done((value, sender)),
                                Some(Attempt::Transient(e)) => break Attempt::Transient(e),
                                Some(Attempt::Terminal(e)) => break Attempt::Terminal(e),
                                None => {
                                    self.stats.record_stale();
                                    debug!("기다리던 응답 아님, 무시: {}", kind);
                                }
                            }
                        }
                    },
                }
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Terminal(e) => return Err(ExchangeError::Terminal(e)),
                Attempt::Transient(e) => {
                    debug!(
                        "{} 재시도 대상 (시도 {}/{}): {}",
                        request.kind(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last = e;
                }
            }
        }

        Err(ExchangeError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    /// 응답을 보낸 주소로 ACK 전송 (재시도 없음)
    async fn send_ack(&self, filename: &str, offset: u64, sender: SocketAddr) {
        let ack = Request::Ack {
            filename: filename.to_string(),
            offset,
        };
        match ack.to_bytes() {
            Ok(bytes) => match self.socket.send_to(&bytes, sender).await {
                Ok(_) => self.stats.record_ack(),
                Err(e) => debug!("ACK 전송 실패: {}", e),
            },
            Err(e) => debug!("ACK 직렬화 실패: {}", e),
        }
    }
}
