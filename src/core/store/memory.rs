//! 内存帧存储 - exact scan, insertion order

use super::{Candidate, FrameStore, StoreError};
use crate::core::index::FrameRecord;
use crate::core::query::CompiledQuery;
use log::debug;
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    records: Vec<FrameRecord>,
    ids: HashSet<String>,
    dimension: Option<usize>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.read().ok().and_then(|inner| inner.dimension)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }
}

impl Inner {
    /// An emptied store forgets its dimension.
    fn remove_video(&mut self, video_id: &str) -> usize {
        let Inner {
            records,
            ids,
            dimension,
        } = &mut *self;
        let before = records.len();
        records.retain(|r| {
            let keep = r.video_id != video_id;
            if !keep {
                ids.remove(&r.id);
            }
            keep
        });
        if records.is_empty() {
            *dimension = None;
        }
        before - records.len()
    }
}

fn check_dimension(expected: Option<usize>, actual: usize) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(StoreError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

impl FrameStore for InMemoryStore {
    fn append(&self, record: &FrameRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        check_dimension(inner.dimension, record.embedding.len())?;
        if !inner.ids.insert(record.id.clone()) {
            return Err(StoreError::DuplicateId(record.id.clone()));
        }
        inner.dimension = Some(record.embedding.len());
        inner.records.push(record.clone());
        Ok(())
    }

    fn delete_video(&self, video_id: &str) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        Ok(inner.remove_video(video_id))
    }

    fn replace_video(&self, video_id: &str, records: &[FrameRecord]) -> Result<usize, StoreError> {
        let mut inner = self.write()?;

        // validate against the store as it will look without this video
        let mut dimension = inner
            .records
            .iter()
            .any(|r| r.video_id != video_id)
            .then_some(inner.dimension)
            .flatten();
        let mut seen: HashSet<&str> = inner
            .records
            .iter()
            .filter(|r| r.video_id != video_id)
            .map(|r| r.id.as_str())
            .collect();
        for record in records {
            check_dimension(dimension, record.embedding.len())?;
            dimension = Some(record.embedding.len());
            if !seen.insert(record.id.as_str()) {
                return Err(StoreError::DuplicateId(record.id.clone()));
            }
        }
        drop(seen);

        let removed = inner.remove_video(video_id);
        for record in records {
            inner.ids.insert(record.id.clone());
            inner.records.push(record.clone());
        }
        if dimension.is_some() {
            inner.dimension = dimension;
        }
        Ok(removed)
    }

    fn search(&self, query: &CompiledQuery) -> Result<Vec<Candidate>, StoreError> {
        let inner = self.read()?;
        for clause in query.text.iter().chain(query.image.iter()) {
            check_dimension(inner.dimension, clause.vector.len())?;
        }

        let candidates: Vec<Candidate> = inner
            .records
            .iter()
            .filter(|r| query.matches(r))
            .filter_map(|r| {
                let (text_distance, image_distance) = query.distances(&r.embedding);
                query.admits(text_distance, image_distance).then(|| Candidate {
                    record: r.clone(),
                    text_distance,
                    image_distance,
                })
            })
            .collect();

        debug!(
            "🗂️ scanned {} frames, {} candidates",
            inner.records.len(),
            candidates.len()
        );
        Ok(candidates)
    }

    fn frames_for_video(&self, video_id: &str) -> Result<Vec<FrameRecord>, StoreError> {
        let inner = self.read()?;
        let mut frames: Vec<FrameRecord> = inner
            .records
            .iter()
            .filter(|r| r.video_id == video_id)
            .cloned()
            .collect();
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(frames)
    }
}
