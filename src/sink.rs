//! 조립된 파일을 넘겨받는 출력 대상

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::allowlist::is_plain_name;
use crate::{Error, Result};

/// 완성된 파일을 받는 쪽
pub trait Sink {
    fn write(&mut self, filename: &str, data: &[u8]) -> Result<()>;
}

/// 디렉터리에 파일로 저장
///
/// 임시 파일에 쓴 뒤 rename하므로 최종 이름으로 부분 파일이 남지 않음
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 최종 저장 경로
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl Sink for DirectorySink {
    fn write(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        if !is_plain_name(filename) {
            return Err(Error::InvalidRequest {
                filename: filename.to_string(),
            });
        }

        fs::create_dir_all(&self.dir)?;
        let final_path = self.path_for(filename);
        let tmp_path = self.dir.join(format!(".{}.part", filename));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &final_path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!("저장 완료: {:?} ({} bytes)", final_path, data.len());
        Ok(())
    }
}

/// 메모리에 모아 두는 출력 대상
impl Sink for Vec<(String, Vec<u8>)> {
    fn write(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        self.push((filename.to_string(), data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_sink_writes_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));

        sink.write("a.bin", b"hello").unwrap();

        assert_eq!(fs::read(sink.path_for("a.bin")).unwrap(), b"hello");
        // 임시 파일은 남지 않음
        let names: Vec<_> = fs::read_dir(sink.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["a.bin"]);
    }

    #[test]
    fn test_directory_sink_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());

        assert!(matches!(
            sink.write("../escape.bin", b"x"),
            Err(Error::InvalidRequest { .. })
        ));
        assert!(!dir.path().join("../escape.bin").exists());
    }
}
