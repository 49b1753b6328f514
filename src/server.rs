//! 서버 (디렉터리/크기 서비스 + 청크 서비스)
//!
//! - 허용 목록이 유일한 인가 경계
//! - 요청마다 독립적으로 처리, 잘못된 요청은 자기 응답에만 영향
//! - 허용 목록 외에는 요청 간 상태 없음

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::allowlist::AllowList;
use crate::checksum;
use crate::message::{Reply, Request};
use crate::stats::ServerStats;
use crate::{Result, ServerConfig, DEFAULT_MAX_IN_FLIGHT, MAX_CHUNK_SIZE, MAX_DATAGRAM_SIZE};

/// 서버 상태 (시작 시 한 번 생성, 요청 핸들러들이 공유)
#[derive(Debug)]
pub struct ServerState {
    root: PathBuf,
    allow_list: AllowList,
    max_chunk_len: usize,
    stats: ServerStats,
}

impl ServerState {
    pub fn new(root: impl Into<PathBuf>, allow_list: AllowList) -> Self {
        Self {
            root: root.into(),
            allow_list,
            max_chunk_len: MAX_CHUNK_SIZE,
            stats: ServerStats::new(),
        }
    }

    /// 설정에서 생성 (허용 목록 파일 로드)
    pub fn load(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let allow_list = AllowList::load(&config.allow_list_path)?;
        info!(
            "허용 목록 로드: {:?} ({}개)",
            config.allow_list_path,
            allow_list.len()
        );
        Ok(Self::new(config.root.clone(), allow_list).with_max_chunk_len(config.max_chunk_len))
    }

    /// 최대 청크 길이 지정
    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// 허용 목록에 있고 디스크에도 있는 파일 이름 (정렬됨)
    pub async fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        for name in self.allow_list.iter() {
            if self.resolve(name).await.is_some() {
                names.push(name.to_string());
            }
        }
        names
    }

    /// 파일 크기 (허용 목록 밖이거나 없으면 None)
    pub async fn size(&self, filename: &str) -> Option<u64> {
        let path = self.resolve(filename).await?;
        tokio::fs::metadata(&path).await.ok().map(|m| m.len())
    }

    /// 청크 읽기
    ///
    /// 파일 끝에서는 실제로 읽은 만큼만 담아 보냄
    pub async fn chunk(&self, filename: &str, offset: u64, length: u64) -> Reply {
        if length == 0 || length > self.max_chunk_len as u64 {
            debug!("청크 길이 거부: {} length={}", filename, length);
            return Reply::Invalid;
        }
        let Some(path) = self.resolve(filename).await else {
            return Reply::Invalid;
        };

        match read_range(&path, offset, length).await {
            Ok(Some(data)) => Reply::Chunk {
                filename: filename.to_string(),
                offset,
                checksum: checksum::digest(&data),
                data,
            },
            Ok(None) => Reply::End,
            Err(e) => {
                warn!("파일 읽기 실패: {:?}: {}", path, e);
                Reply::Invalid
            }
        }
    }

    /// 요청 하나 처리 (ACK는 응답 없음)
    pub async fn handle(&self, request: Request, peer: SocketAddr) -> Option<Reply> {
        self.stats.record_request();

        let reply = match request {
            Request::GetList => {
                let names = self.list().await;
                debug!("GET_LIST from {}: {}개", peer, names.len());
                Reply::list(&names)
            }
            Request::GetSize { filename } => match self.size(&filename).await {
                Some(size) => Reply::size(filename, size),
                None => Reply::Invalid,
            },
            Request::GetChunk {
                filename,
                offset,
                length,
            } => self.chunk(&filename, offset, length).await,
            Request::Ack { filename, offset } => {
                self.stats.record_ack();
                debug!("ACK from {}: {} offset={}", peer, filename, offset);
                return None;
            }
        };

        match &reply {
            Reply::Invalid => {
                self.stats.record_rejected();
                info!("요청 거부: {}", peer);
            }
            Reply::Chunk { data, .. } => self.stats.record_served(data.len()),
            _ => {}
        }
        Some(reply)
    }

    /// 허용된 이름이면 실제 파일 경로
    async fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if !self.allow_list.contains(filename) {
            return None;
        }
        let path = self.root.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

/// offset부터 최대 length 바이트 읽기
///
/// offset이 파일 끝 이후면 None
async fn read_range(path: &Path, offset: u64, length: u64) -> std::io::Result<Option<Bytes>> {
    let mut file = File::open(path).await?;
    let size = file.metadata().await?.len();
    if offset >= size {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::with_capacity(length.min(size - offset) as usize);
    file.take(length).read_to_end(&mut buf).await?;
    Ok(Some(Bytes::from(buf)))
}

/// UDP 서버
pub struct Server {
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    in_flight: Arc<Semaphore>,
}

impl Server {
    /// 소켓 바인딩
    pub async fn bind(addr: SocketAddr, state: Arc<ServerState>) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("CFP Server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            state,
            in_flight: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        })
    }

    /// 동시에 처리하는 요청 수 상한 지정 (최소 1)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// 수신 루프
    ///
    /// 요청마다 별도 태스크에서 처리하므로 느린 파일 읽기가 다른 요청을 막지 않음.
    /// 처리 중인 요청이 상한에 도달하면 하나가 끝날 때까지 수신을 멈춤
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    // 이전 응답에 대한 ICMP 에러 등은 무시
                    debug!("수신 에러: {}", e);
                    continue;
                }
            };

            let request = match Request::from_bytes(&buf[..len]) {
                Ok(request) => request,
                Err(e) => {
                    self.state.stats.record_malformed();
                    warn!("잘못된 요청 무시 ({}): {}", peer, e);
                    continue;
                }
            };

            let Ok(permit) = self.in_flight.clone().acquire_owned().await else {
                // 세마포어는 닫지 않으므로 도달하지 않음
                return Ok(());
            };

            let socket = self.socket.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let kind = request.kind();
                let Some(reply) = state.handle(request, peer).await else {
                    return;
                };
                match reply.to_bytes() {
                    Ok(bytes) if bytes.len() <= MAX_DATAGRAM_SIZE => {
                        if let Err(e) = socket.send_to(&bytes, peer).await {
                            warn!("{} 응답 전송 실패 ({}): {}", kind, peer, e);
                        }
                    }
                    Ok(bytes) => {
                        warn!(
                            "{} 응답이 데이터그램 한도 초과 ({} bytes), 전송 안 함",
                            kind,
                            bytes.len()
                        );
                    }
                    Err(e) => warn!("{} 응답 직렬화 실패: {}", kind, e),
                }
            });
        }
    }
}
