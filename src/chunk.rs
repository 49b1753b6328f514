//! 청크 계획과 전송 상태
//!
//! - FileHandle: 이름 + 크기 + 청크 크기 → 청크 계획
//! - TransferState: 청크 번호로 접근하는 고정 크기 슬롯 (단일 잠금)

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::{Error, Result};

/// 청크 번호 (1부터 시작)
pub type ChunkIndex = u32;

/// 청크 하나의 요청 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 청크 번호
    pub index: ChunkIndex,

    /// 파일 내 오프셋 (바이트)
    pub offset: u64,

    /// 요청 길이 (마지막 청크만 짧을 수 있음)
    pub length: u64,
}

/// 원격 파일 정보
///
/// 청크 수가 `ChunkIndex` 범위에 들어가는 경우에만 생성됨
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    size: u64,
    chunk_size: u64,
    chunk_count: ChunkIndex,
}

impl FileHandle {
    /// 청크 수가 `ChunkIndex::MAX`를 넘으면 `InvalidConfig`
    pub fn new(name: impl Into<String>, size: u64, chunk_size: usize) -> Result<Self> {
        let chunk_size = chunk_size.max(1) as u64;
        let chunk_count = ChunkIndex::try_from(size.div_ceil(chunk_size)).map_err(|_| {
            Error::InvalidConfig(format!(
                "청크 수가 너무 많음: size={} chunk_size={}",
                size, chunk_size
            ))
        })?;

        Ok(Self {
            name: name.into(),
            size,
            chunk_size,
            chunk_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 전체 크기 (바이트)
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 청크 수 = ceil(size / chunk_size)
    pub fn chunk_count(&self) -> ChunkIndex {
        self.chunk_count
    }

    /// 청크 번호의 요청 범위
    pub fn spec(&self, index: ChunkIndex) -> Option<ChunkSpec> {
        if index == 0 || index > self.chunk_count() {
            return None;
        }
        let offset = (index as u64 - 1) * self.chunk_size;
        let length = self.chunk_size.min(self.size - offset);
        Some(ChunkSpec {
            index,
            offset,
            length,
        })
    }

    /// 전체 청크 계획 (번호 오름차순)
    pub fn plan(&self) -> Vec<ChunkSpec> {
        (1..=self.chunk_count())
            .filter_map(|index| self.spec(index))
            .collect()
    }
}

/// 다운로드 하나의 수신 상태
///
/// 슬롯은 한 번 채워지면 덮어쓰지 않음. 잠금은 슬롯 갱신 동안만 잡음
#[derive(Debug)]
pub struct TransferState {
    filename: String,
    slots: Mutex<Vec<Option<Bytes>>>,
}

impl TransferState {
    /// 청크 수만큼 빈 슬롯 생성
    pub fn new(handle: &FileHandle) -> Self {
        Self::with_chunk_count(handle.name(), handle.chunk_count())
    }

    pub fn with_chunk_count(filename: impl Into<String>, chunk_count: u32) -> Self {
        Self {
            filename: filename.into(),
            slots: Mutex::new(vec![None; chunk_count as usize]),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// 총 청크 수
    pub fn chunk_count(&self) -> u32 {
        self.slots.lock().len() as u32
    }

    /// 청크 삽입
    ///
    /// 범위 밖 번호이거나 이미 채워진 슬롯이면 false
    pub fn insert(&self, index: ChunkIndex, data: Bytes) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = (index as usize)
            .checked_sub(1)
            .and_then(|i| slots.get_mut(i))
        else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(data);
        true
    }

    /// 수신 여부
    pub fn contains(&self, index: ChunkIndex) -> bool {
        let slots = self.slots.lock();
        (index as usize)
            .checked_sub(1)
            .and_then(|i| slots.get(i))
            .is_some_and(Option::is_some)
    }

    /// 수신된 청크 수
    pub fn completed(&self) -> u32 {
        self.slots.lock().iter().filter(|s| s.is_some()).count() as u32
    }

    /// 누락된 청크 번호 (오름차순)
    pub fn missing(&self) -> Vec<ChunkIndex> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as ChunkIndex + 1)
            .collect()
    }

    /// 완료 여부
    pub fn is_complete(&self) -> bool {
        self.slots.lock().iter().all(Option::is_some)
    }

    /// 수신률
    pub fn receive_ratio(&self) -> f64 {
        let slots = self.slots.lock();
        if slots.is_empty() {
            return 0.0;
        }
        slots.iter().filter(|s| s.is_some()).count() as f64 / slots.len() as f64
    }

    /// 번호 순서대로 조립
    ///
    /// 하나라도 비어 있으면 `IncompleteTransfer`
    pub fn assemble(&self) -> Result<Bytes> {
        let slots = self.slots.lock();

        let missing: Vec<ChunkIndex> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as ChunkIndex + 1)
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteTransfer {
                filename: self.filename.clone(),
                missing,
            });
        }

        let total: usize = slots.iter().flatten().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(total);
        for data in slots.iter().flatten() {
            buf.extend_from_slice(data);
        }
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_plan_for_5000_bytes() {
        let handle = FileHandle::new("a.bin", 5000, 2048).unwrap();
        let plan = handle.plan();

        assert_eq!(handle.chunk_count(), 3);
        assert_eq!(
            plan.iter().map(|s| s.length).collect::<Vec<_>>(),
            vec![2048, 2048, 904]
        );
        assert_eq!(
            plan[2],
            ChunkSpec {
                index: 3,
                offset: 4096,
                length: 904
            }
        );
        assert!(handle.spec(0).is_none());
        assert!(handle.spec(4).is_none());
    }

    #[test]
    fn test_plan_edge_sizes() {
        assert_eq!(FileHandle::new("e", 0, 2048).unwrap().plan(), vec![]);
        assert_eq!(FileHandle::new("x", 2048, 2048).unwrap().chunk_count(), 1);
        assert_eq!(FileHandle::new("x", 2049, 2048).unwrap().chunk_count(), 2);
        assert_eq!(FileHandle::new("x", 1, 2048).unwrap().plan()[0].length, 1);
    }

    #[test]
    fn test_too_many_chunks_is_rejected() {
        let limit = ChunkIndex::MAX as u64;

        assert!(matches!(
            FileHandle::new("huge.bin", limit + 1, 1),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            FileHandle::new("huge.bin", (limit + 1) * 2, 2),
            Err(Error::InvalidConfig(_))
        ));

        let edge = FileHandle::new("edge.bin", limit, 1).unwrap();
        assert_eq!(edge.chunk_count(), ChunkIndex::MAX);
        assert_eq!(edge.spec(ChunkIndex::MAX).map(|s| s.offset), Some(limit - 1));
    }

    #[test]
    fn test_plan_covers_file_exactly() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..500 {
            let size = rng.gen_range(1..200_000u64);
            let chunk_size = rng.gen_range(1..5000usize);
            let handle = FileHandle::new("f", size, chunk_size).unwrap();
            let plan = handle.plan();

            assert_eq!(plan.len() as u64, size.div_ceil(chunk_size as u64));
            assert_eq!(plan.iter().map(|s| s.length).sum::<u64>(), size);

            let mut expected_offset = 0;
            for (i, spec) in plan.iter().enumerate() {
                assert_eq!(spec.index as usize, i + 1);
                assert_eq!(spec.offset, expected_offset);
                assert!(spec.length <= chunk_size as u64 && spec.length > 0);
                expected_offset += spec.length;
            }
        }
    }

    #[test]
    fn test_assembly_is_independent_of_arrival_order() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let size = rng.gen_range(1..50_000usize);
            let chunk_size = rng.gen_range(1..4096usize);
            let content: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

            let handle = FileHandle::new("f", size as u64, chunk_size).unwrap();
            let state = TransferState::new(&handle);

            let mut plan = handle.plan();
            plan.shuffle(&mut rng);
            for spec in plan {
                let start = spec.offset as usize;
                let end = start + spec.length as usize;
                assert!(state.insert(spec.index, Bytes::copy_from_slice(&content[start..end])));
            }

            assert!(state.is_complete());
            assert_eq!(state.assemble().unwrap().as_ref(), content.as_slice());
        }
    }

    #[test]
    fn test_slots_are_never_overwritten() {
        let state = TransferState::with_chunk_count("f", 2);

        assert!(state.insert(1, Bytes::from_static(b"first")));
        assert!(!state.insert(1, Bytes::from_static(b"second")));
        assert!(!state.insert(0, Bytes::from_static(b"zero")));
        assert!(!state.insert(3, Bytes::from_static(b"overflow")));

        assert!(state.contains(1));
        assert!(!state.contains(2));
        assert_eq!(state.completed(), 1);
        assert_eq!(state.missing(), vec![2]);
        assert_eq!(state.receive_ratio(), 0.5);
    }

    #[test]
    fn test_incomplete_assembly_reports_missing() {
        let state = TransferState::with_chunk_count("movie.mp4", 4);
        state.insert(2, Bytes::from_static(b"bb"));
        state.insert(3, Bytes::from_static(b"cc"));

        match state.assemble() {
            Err(Error::IncompleteTransfer { filename, missing }) => {
                assert_eq!(filename, "movie.mp4");
                assert_eq!(missing, vec![1, 4]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
