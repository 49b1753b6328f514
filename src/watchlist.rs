//! 감시 목록 (다운로드할 파일 이름 텍스트 파일)
//!
//! 주기적으로 다시 읽어서 새로 추가된 이름만 돌려줌

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::allowlist::parse_name_lines;
use crate::Result;

/// 감시 목록 파일
#[derive(Debug)]
pub struct WatchList {
    path: PathBuf,
    seen: HashSet<String>,
}

impl WatchList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 아직 반환하지 않은 항목 (파일 순서)
    ///
    /// 파일이 없으면 빈 목록 (나중에 생길 수 있음)
    pub fn poll(&mut self) -> Result<Vec<String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("감시 목록 없음: {:?}", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut fresh = Vec::new();
        for name in parse_name_lines(&text) {
            if self.seen.insert(name.to_string()) {
                fresh.push(name.to_string());
            }
        }
        Ok(fresh)
    }

    /// 이미 처리된 것으로 표시 (다시 반환하지 않음)
    pub fn mark_seen(&mut self, name: &str) {
        self.seen.insert(name.to_string());
    }

    /// 이전에 반환했던 이름을 다시 대상으로 (실패한 다운로드 재시도용)
    pub fn forget(&mut self, name: &str) -> bool {
        self.seen.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_returns_only_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.txt");
        let mut watch = WatchList::new(&path);

        assert!(watch.poll().unwrap().is_empty());

        std::fs::write(&path, "a.bin\n# 주석\n\nb.bin\na.bin\n").unwrap();
        assert_eq!(watch.poll().unwrap(), vec!["a.bin", "b.bin"]);
        assert!(watch.poll().unwrap().is_empty());

        std::fs::write(&path, "a.bin\nb.bin\n  c.bin \n").unwrap();
        assert_eq!(watch.poll().unwrap(), vec!["c.bin"]);
    }

    #[test]
    fn test_forget_and_mark_seen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.txt");
        std::fs::write(&path, "a.bin\nb.bin\n").unwrap();

        let mut watch = WatchList::new(&path);
        watch.mark_seen("b.bin");
        assert_eq!(watch.poll().unwrap(), vec!["a.bin"]);

        assert!(watch.forget("a.bin"));
        assert!(!watch.forget("zzz"));
        assert_eq!(watch.poll().unwrap(), vec!["a.bin"]);
    }
}
