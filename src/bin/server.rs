//! CFP 서버 - Chunk Fetch Protocol
//!
//! 허용 목록에 있는 파일만 청크 단위로 제공
//! - GET_LIST / GET_SIZE / GET_CHUNK 응답, ACK 기록
//! - 요청마다 독립 처리 (요청 간 상태 없음)
//!
//! 사용법:
//!   cargo run --release --bin cfp-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin cfp-server -- --root data --allow data/file_list.txt

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cfp::{Server, ServerConfig, ServerState};

const USAGE: &str = r#"CFP Server - Chunk Fetch Protocol 서버

허용 목록에 있는 파일을 청크 단위로 제공
- 청크마다 SHA-256 다이제스트 첨부
- 허용 목록 밖의 이름은 항상 INVALID

사용법:
  cargo run --release --bin cfp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:12345)
  -r, --root <DIR>        제공 디렉터리 (기본: data)
  -a, --allow <FILE>      허용 목록 파일 (기본: data/file_list.txt)
  --max-chunk <SIZE>      응답 하나의 최대 청크 길이 (기본: 32768)
  --max-in-flight <N>     동시에 처리하는 요청 수 상한 (기본: 256)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG로 조절 (기본: info)
"#;

fn parse_args() -> Result<ServerConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        let value = |name: &str| {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} 값이 필요함", name))
        };

        match args[i].as_str() {
            "--bind" | "-b" => {
                let v = value("--bind")?;
                config.bind_addr = v.parse().map_err(|_| format!("유효한 주소 필요: {}", v))?;
                i += 1;
            }
            "--root" | "-r" => {
                config.root = PathBuf::from(value("--root")?);
                i += 1;
            }
            "--allow" | "-a" => {
                config.allow_list_path = PathBuf::from(value("--allow")?);
                i += 1;
            }
            "--max-chunk" => {
                let v = value("--max-chunk")?;
                config.max_chunk_len = v.parse().map_err(|_| format!("유효한 숫자 필요: {}", v))?;
                i += 1;
            }
            "--max-in-flight" => {
                let v = value("--max-in-flight")?;
                config.max_in_flight = v.parse().map_err(|_| format!("유효한 숫자 필요: {}", v))?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other)),
        }
        i += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    info!("CFP Server starting...");
    info!("Served root: {:?}", server_config.root);
    info!("Max chunk length: {} bytes", server_config.max_chunk_len);

    let state = Arc::new(ServerState::load(&server_config)?);
    if state.allow_list().is_empty() {
        info!("허용 목록이 비어 있음, 모든 파일 요청이 거부됨");
    }

    let server = Server::bind(server_config.bind_addr, state.clone())
        .await?
        .with_max_in_flight(server_config.max_in_flight);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("서버 종료: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, 종료");
        }
    }

    let stats = state.stats();
    info!(
        "요청 {}건 (거부 {}, 잘못된 데이터그램 {}, ACK {}), {} bytes 전송",
        stats.requests(),
        stats.rejected(),
        stats.malformed(),
        stats.acks(),
        stats.bytes_served()
    );

    Ok(())
}
