//! 서버 허용 목록
//!
//! 시작 시 한 번 읽고 이후 변경하지 않음. 허용 목록이 유일한 인가 경계

use std::collections::BTreeSet;
use std::path::{Component, Path};

use tracing::warn;

use crate::Result;

/// 허용된 파일 이름 집합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl AllowList {
    /// 이름 목록으로 생성 (경로 형태 이름은 제외)
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| {
                let ok = is_plain_name(name);
                if !ok {
                    warn!("허용 목록 항목 무시 (파일 이름이 아님): {:?}", name);
                }
                ok
            })
            .collect();
        Self { names }
    }

    /// 텍스트에서 파싱 (한 줄에 하나, 빈 줄과 # 주석 무시)
    pub fn parse(text: &str) -> Self {
        Self::new(parse_name_lines(text))
    }

    /// 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// 허용 여부
    pub fn contains(&self, name: &str) -> bool {
        is_plain_name(name) && self.names.contains(name)
    }

    /// 허용된 이름들 (정렬됨)
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 디렉터리 구분자 없는 단일 파일 이름인지
pub fn is_plain_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// 줄 단위 이름 목록 파싱
pub(crate) fn parse_name_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}
