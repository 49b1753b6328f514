// 통합 테스트 공용 도구: 실제 서버, 장애 주입 프록시, 가짜 서버

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use cfp::{AllowList, Config, Reply, Request, Server, ServerState};
use tempfile::TempDir;
use tokio::net::UdpSocket;

/// 짧은 타임아웃 테스트 설정
pub fn test_config() -> Config {
    Config {
        attempt_timeout_ms: 200,
        max_attempts: 5,
        ..Config::default()
    }
}

/// 결정적인 테스트 데이터
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}

/// 실행 중인 테스트 서버
pub struct TestServer {
    pub dir: TempDir,
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

/// `served/` 아래 파일을 두고 서버 시작
pub async fn start_server(files: &[(&str, Vec<u8>)], allow: &str) -> TestServer {
    start_server_with_limit(files, allow, cfp::DEFAULT_MAX_IN_FLIGHT).await
}

/// 동시 처리 요청 수 상한을 지정해 서버 시작
pub async fn start_server_with_limit(
    files: &[(&str, Vec<u8>)],
    allow: &str,
    max_in_flight: usize,
) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("served");
    std::fs::create_dir_all(&root).unwrap();
    for (name, content) in files {
        std::fs::write(root.join(name), content).unwrap();
    }

    let state = Arc::new(ServerState::new(&root, AllowList::parse(allow)));
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), state.clone())
        .await
        .unwrap()
        .with_max_in_flight(max_in_flight);
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer { dir, addr, state }
}

/// 요청 하나 보내고 응답 하나 받기
pub async fn round_trip(server: SocketAddr, request: &Request) -> Reply {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&request.to_bytes().unwrap(), server)
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        socket.recv_from(&mut buf),
    )
    .await
    .expect("no reply from server")
    .unwrap();
    Reply::from_bytes(&buf[..len]).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Reply,
}

/// 데이터그램 필터. None이면 버림
pub type Filter = Arc<dyn Fn(Direction, Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

/// 클라이언트와 서버 사이에서 데이터그램을 버리거나 변조하는 프록시
///
/// 클라이언트 주소마다 업스트림 소켓을 따로 만들어 응답을 돌려보냄
pub async fn start_proxy(upstream: SocketAddr, filter: Filter) -> SocketAddr {
    let front = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = front.local_addr().unwrap();

    tokio::spawn(async move {
        let mut routes: HashMap<SocketAddr, Arc<UdpSocket>> = HashMap::new();
        let mut buf = vec![0u8; 65535];

        loop {
            let Ok((len, client)) = front.recv_from(&mut buf).await else {
                break;
            };

            let back = match routes.get(&client) {
                Some(back) => back.clone(),
                None => {
                    let back = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
                    back.connect(upstream).await.unwrap();
                    routes.insert(client, back.clone());

                    let front = front.clone();
                    let filter = filter.clone();
                    let pump = back.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 65535];
                        while let Ok(len) = pump.recv(&mut buf).await {
                            if let Some(out) = filter(Direction::Reply, buf[..len].to_vec()) {
                                let _ = front.send_to(&out, client).await;
                            }
                        }
                    });
                    back
                }
            };

            if let Some(out) = filter(Direction::Request, buf[..len].to_vec()) {
                let _ = back.send(&out).await;
            }
        }
    });

    addr
}

/// 청크 응답의 데이터를 한 바이트 바꾸고 체크섬은 그대로 둠
pub fn corrupt_chunk(datagram: &[u8]) -> Vec<u8> {
    match Reply::from_bytes(datagram) {
        Ok(Reply::Chunk {
            filename,
            offset,
            data,
            checksum,
        }) => {
            let mut tampered = data.to_vec();
            if let Some(first) = tampered.first_mut() {
                *first ^= 0xFF;
            }
            Reply::Chunk {
                filename,
                offset,
                data: tampered.into(),
                checksum,
            }
            .to_bytes()
            .unwrap()
        }
        _ => datagram.to_vec(),
    }
}

/// 청크 응답의 offset (청크 응답이 아니면 None)
pub fn chunk_offset(datagram: &[u8]) -> Option<u64> {
    match Reply::from_bytes(datagram) {
        Ok(Reply::Chunk { offset, .. }) => Some(offset),
        _ => None,
    }
}

/// 요청마다 정해진 데이터그램들을 돌려주는 가짜 서버
pub async fn start_fake_server<F>(handler: F) -> SocketAddr
where
    F: Fn(Request) -> Vec<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let Ok(request) = Request::from_bytes(&buf[..len]) else {
                continue;
            };
            for datagram in handler(request) {
                let _ = socket.send_to(&datagram, peer).await;
            }
        }
    });

    addr
}

/// 정상 청크 응답 바이트
pub fn chunk_reply(filename: &str, offset: u64, data: &[u8]) -> Vec<u8> {
    Reply::Chunk {
        filename: filename.to_string(),
        offset,
        data: data.to_vec().into(),
        checksum: cfp::checksum::digest(data),
    }
    .to_bytes()
    .unwrap()
}
