//! CFP 클라이언트 - Chunk Fetch Protocol
//!
//! 청크 단위로 파일을 요청하고 다이제스트 검증 후 조립
//! - 청크마다 시도당 타임아웃 + 최대 시도 횟수
//! - 모든 청크가 모였을 때만 출력 디렉터리에 기록
//!
//! 사용법:
//!   cargo run --release --bin cfp-client -- [OPTIONS] <COMMAND>
//!
//! 예시:
//!   # 목록 조회
//!   cargo run --release --bin cfp-client -- --server 127.0.0.1:12345 list
//!
//!   # 파일 두 개 받기
//!   cargo run --release --bin cfp-client -- -o downloads get a.bin b.bin
//!
//!   # 감시 목록 파일에 추가되는 이름을 계속 받기
//!   cargo run --release --bin cfp-client -- watch input.txt --interval 5

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cfp::coordinator::is_retryable_transfer_error;
use cfp::{Config, DirectorySink, TransferCoordinator, WatchList, DEFAULT_SERVER_PORT};

const USAGE: &str = r#"CFP Client - Chunk Fetch Protocol 클라이언트

사용법:
  cargo run --release --bin cfp-client -- [OPTIONS] <COMMAND>

명령:
  list                        서버가 제공하는 파일 목록
  get <NAME>...               파일 받기
  watch <FILE> [--interval S] 감시 목록 파일의 새 이름을 계속 받기 (기본 간격: 5초)

옵션:
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:12345)
  -o, --output <DIR>      출력 디렉터리 (기본: downloads)
  -w, --workers <N>       워커 수 고정 (기본: 청크 수에 비례)
  --chunk-size <SIZE>     청크 크기 바이트 (기본: 2048)
  --timeout-ms <MS>       시도당 타임아웃 (기본: 3000)
  --attempts <N>          청크당 최대 시도 횟수 (기본: 5)
  --preset <NAME>         default | low-spec | high-performance | unstable-network
  -h, --help              이 도움말 출력

개별 옵션은 프리셋 값보다 우선함. 로그 레벨은 RUST_LOG로 조절 (기본: info)
"#;

/// 실행할 명령
enum Command {
    List,
    Get(Vec<String>),
    Watch { path: PathBuf, interval: Duration },
}

/// 클라이언트 설정
struct ClientConfig {
    server_addr: SocketAddr,
    output_dir: PathBuf,
    config: Config,
    command: Command,
}

fn parse_args() -> Result<ClientConfig, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut server_addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_SERVER_PORT));
    let mut output_dir = PathBuf::from("downloads");
    let mut preset = None;
    let mut workers = None;
    let mut chunk_size = None;
    let mut timeout_ms = None;
    let mut attempts = None;
    let mut interval = Duration::from_secs(5);
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let value = |name: &str| {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} 값이 필요함", name))
        };
        let number = |name: &str| -> Result<u64, String> {
            let v = value(name)?;
            v.parse().map_err(|_| format!("유효한 숫자 필요: {} {}", name, v))
        };

        match args[i].as_str() {
            "--server" | "-s" => {
                let v = value("--server")?;
                server_addr = v.parse().map_err(|_| format!("유효한 주소 필요: {}", v))?;
                i += 1;
            }
            "--output" | "-o" => {
                output_dir = PathBuf::from(value("--output")?);
                i += 1;
            }
            "--workers" | "-w" => {
                workers = Some(number("--workers")? as usize);
                i += 1;
            }
            "--chunk-size" => {
                chunk_size = Some(number("--chunk-size")? as usize);
                i += 1;
            }
            "--timeout-ms" => {
                timeout_ms = Some(number("--timeout-ms")?);
                i += 1;
            }
            "--attempts" => {
                attempts = Some(number("--attempts")? as u32);
                i += 1;
            }
            "--interval" => {
                interval = Duration::from_secs(number("--interval")?.max(1));
                i += 1;
            }
            "--preset" => {
                let name = value("--preset")?;
                preset = Some(Config::preset(&name).ok_or_else(|| format!("알 수 없는 프리셋: {}", name))?);
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("알 수 없는 옵션: {}", flag)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut config = preset.unwrap_or_default();
    if let Some(n) = workers {
        config.parallel_workers = n;
    }
    if let Some(n) = chunk_size {
        config.chunk_size = n;
    }
    if let Some(ms) = timeout_ms {
        config.attempt_timeout_ms = ms;
    }
    if let Some(n) = attempts {
        config.max_attempts = n;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("list") => Command::List,
        Some("get") => {
            let names: Vec<String> = positional.collect();
            if names.is_empty() {
                return Err("get: 파일 이름이 필요함".to_string());
            }
            Command::Get(names)
        }
        Some("watch") => {
            let path = positional.next().ok_or("watch: 감시 목록 파일이 필요함")?;
            Command::Watch {
                path: PathBuf::from(path),
                interval,
            }
        }
        Some(other) => return Err(format!("알 수 없는 명령: {}", other)),
        None => return Err("명령이 필요함".to_string()),
    };

    Ok(ClientConfig {
        server_addr,
        output_dir,
        config,
        command,
    })
}

/// 다운로드 한 건의 결과
enum Outcome {
    Saved(u64),
    Failed(cfp::Error),
    Interrupted,
}

/// Ctrl-C와 경쟁하며 다운로드 (중단되면 아무것도 기록하지 않음)
async fn fetch_one(
    coordinator: &TransferCoordinator,
    name: &str,
    sink: &mut DirectorySink,
) -> Outcome {
    tokio::select! {
        result = coordinator.download_to(name, sink) => match result {
            Ok(written) => Outcome::Saved(written),
            Err(e) => Outcome::Failed(e),
        },
        _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
    }
}

/// 파일 여러 개 받기, 실패 건수 반환
async fn run_get(
    coordinator: &TransferCoordinator,
    names: &[String],
    sink: &mut DirectorySink,
) -> usize {
    let mut failed = 0;

    for (n, name) in names.iter().enumerate() {
        match fetch_one(coordinator, name, sink).await {
            Outcome::Saved(written) => {
                debug!("{}: {} bytes", name, written);
            }
            Outcome::Failed(e) => {
                error!("{} 다운로드 실패: {}", name, e);
                failed += 1;
            }
            Outcome::Interrupted => {
                warn!("Ctrl-C, {} 다운로드 중단", name);
                // 중단된 것과 아직 시작하지 않은 것 모두 실패
                failed += names.len() - n;
                break;
            }
        }
    }

    failed
}

/// 감시 목록을 주기적으로 읽어 새 이름을 받기 (Ctrl-C까지)
async fn run_watch(
    coordinator: &TransferCoordinator,
    mut watch: WatchList,
    interval: Duration,
    sink: &mut DirectorySink,
) -> usize {
    let mut failed = 0;
    info!("감시 시작: {:?} ({}초 간격)", watch.path(), interval.as_secs());

    loop {
        let names = match watch.poll() {
            Ok(names) => names,
            Err(e) => {
                warn!("감시 목록 읽기 실패: {}", e);
                Vec::new()
            }
        };

        for name in names {
            match fetch_one(coordinator, &name, sink).await {
                Outcome::Saved(written) => {
                    debug!("{}: {} bytes", name, written);
                }
                Outcome::Failed(e) if is_retryable_transfer_error(&e) => {
                    warn!("{} 다운로드 실패, 다음 주기에 재시도: {}", name, e);
                    watch.forget(&name);
                }
                Outcome::Failed(e) => {
                    error!("{} 다운로드 실패: {}", name, e);
                    failed += 1;
                }
                Outcome::Interrupted => {
                    warn!("Ctrl-C, {} 다운로드 중단", name);
                    return failed + 1;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C, 감시 종료");
                return failed;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    info!("CFP Client starting...");
    info!("Server address: {}", client_config.server_addr);
    info!(
        "Chunk size: {} bytes, timeout: {} ms, attempts: {}",
        client_config.config.chunk_size,
        client_config.config.attempt_timeout_ms,
        client_config.config.max_attempts
    );

    let coordinator = TransferCoordinator::new(client_config.config, client_config.server_addr)?;
    let mut sink = DirectorySink::new(&client_config.output_dir);

    let failed = match client_config.command {
        Command::List => {
            let names = coordinator.list().await?;
            for name in &names {
                println!("{}", name);
            }
            0
        }
        Command::Get(names) => {
            std::fs::create_dir_all(&client_config.output_dir)?;
            run_get(&coordinator, &names, &mut sink).await
        }
        Command::Watch { path, interval } => {
            std::fs::create_dir_all(&client_config.output_dir)?;
            run_watch(&coordinator, WatchList::new(path), interval, &mut sink).await
        }
    };

    if failed > 0 {
        error!("실패 {}건", failed);
        std::process::exit(1);
    }

    Ok(())
}
