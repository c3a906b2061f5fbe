//! 查询构建 - turns a [`Query`] into vectors plus discrete predicates
//!
//! Every user value ends up as data in [`CompiledQuery`]; nothing is
//! spliced into query text. The store evaluates
//! `(text fires OR image fires OR no vectors) AND objects AND color AND words`.

use super::error::QueryError;
use super::model::{ObjectsContain, Query, RankingParams};
use super::vocabulary;
use crate::core::distance::cosine_distance;
use crate::core::index::{Embedder, FrameRecord, Rgb};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct VectorClause {
    pub vector: Vec<f32>,
    /// exclusive cosine distance ceiling
    pub ceiling: f64,
}

impl VectorClause {
    pub fn fires(&self, distance: f64) -> bool {
        distance < self.ceiling
    }

    pub fn distance(&self, embedding: &[f32]) -> f64 {
        cosine_distance(&self.vector, embedding)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPredicate {
    pub mode: ObjectsContain,
    /// sorted and deduplicated
    pub labels: Vec<String>,
}

impl ObjectPredicate {
    pub fn new(labels: &[String], mode: ObjectsContain) -> Self {
        let labels: BTreeSet<&String> = labels.iter().collect();
        Self {
            mode,
            labels: labels.into_iter().cloned().collect(),
        }
    }

    pub fn matches(&self, objects: &BTreeMap<String, u32>) -> bool {
        match self.mode {
            ObjectsContain::Any => self.labels.iter().any(|l| objects.contains_key(l)),
            ObjectsContain::All => self.labels.iter().all(|l| objects.contains_key(l)),
            // map keys are sorted and unique, like `labels`
            ObjectsContain::Only => objects.keys().eq(self.labels.iter()),
        }
    }
}

/// Per-channel inclusive bounds of the color box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPredicate {
    pub target: Rgb,
    pub radius: u32,
    pub low: Rgb,
    pub high: Rgb,
}

impl ColorPredicate {
    pub fn new(target: Rgb, radius: u32) -> Self {
        let r = radius.min(255) as i32;
        let bound = |c: u8, delta: i32| (c as i32 + delta).clamp(0, 255) as u8;
        Self {
            target,
            radius,
            low: target.map(|c| bound(c, -r)),
            high: target.map(|c| bound(c, r)),
        }
    }

    /// Same as membership in [`neighbour_colors`], without expanding it.
    pub fn contains(&self, color: Rgb) -> bool {
        (0..3).all(|i| self.low[i] <= color[i] && color[i] <= self.high[i])
    }

    pub fn matches(&self, dominant: &[Rgb]) -> bool {
        dominant.iter().any(|c| self.contains(*c))
    }

    pub fn neighbourhood(&self) -> Vec<Rgb> {
        neighbour_colors(self.target, self.radius)
    }
}

/// Every RGB triple within Chebyshev distance `radius` of `target`, each
/// channel clamped to `[0, 255]`. A box, not a sphere.
pub fn neighbour_colors(target: Rgb, radius: u32) -> Vec<Rgb> {
    let p = ColorPredicate::new(target, radius);
    let span = |i: usize| (p.high[i] as usize - p.low[i] as usize) + 1;
    let mut colors = Vec::with_capacity(span(0) * span(1) * span(2));
    for r in p.low[0]..=p.high[0] {
        for g in p.low[1]..=p.high[1] {
            for b in p.low[2]..=p.high[2] {
                colors.push([r, g, b]);
            }
        }
    }
    colors
}

/// 编译后的查询
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: Option<VectorClause>,
    pub image: Option<VectorClause>,
    pub objects: Option<ObjectPredicate>,
    pub color: Option<ColorPredicate>,
    /// stored words must intersect these (case-sensitive)
    pub words: Option<Vec<String>>,
    pub max_results: usize,
}

impl CompiledQuery {
    /// Matches every frame.
    pub fn match_all(max_results: usize) -> Self {
        Self {
            text: None,
            image: None,
            objects: None,
            color: None,
            words: None,
            max_results,
        }
    }

    pub fn has_vectors(&self) -> bool {
        self.text.is_some() || self.image.is_some()
    }

    pub fn color_target(&self) -> Option<Rgb> {
        self.color.map(|c| c.target)
    }

    /// Cosine distances for the vector clauses present in the query.
    pub fn distances(&self, embedding: &[f32]) -> (Option<f64>, Option<f64>) {
        (
            self.text.as_ref().map(|c| c.distance(embedding)),
            self.image.as_ref().map(|c| c.distance(embedding)),
        )
    }

    /// The similarity part of the predicate.
    pub fn admits(&self, text_distance: Option<f64>, image_distance: Option<f64>) -> bool {
        if !self.has_vectors() {
            return true;
        }
        let fired = |clause: &Option<VectorClause>, d: Option<f64>| match (clause, d) {
            (Some(c), Some(d)) => c.fires(d),
            _ => false,
        };
        fired(&self.text, text_distance) || fired(&self.image, image_distance)
    }

    /// The discrete object/color/word part of the predicate.
    pub fn matches(&self, record: &FrameRecord) -> bool {
        if let Some(objects) = &self.objects {
            if !objects.matches(&record.objects) {
                return false;
            }
        }
        if let Some(color) = &self.color {
            if !color.matches(&record.dominant_colors) {
                return false;
            }
        }
        if let Some(words) = &self.words {
            if !words.iter().any(|w| record.words.contains(w)) {
                return false;
            }
        }
        true
    }
}

pub struct QueryBuilder<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder }
    }

    /// Labels are checked before any embedding work is done.
    pub fn build(&self, query: &Query) -> Result<CompiledQuery, QueryError> {
        if let Some(label) = query.objects.iter().find(|l| !vocabulary::is_known(l)) {
            return Err(QueryError::InvalidLabel(label.clone()));
        }

        let RankingParams {
            max_text_distance,
            max_image_distance,
            max_results,
        } = query.params;

        let text = match query.text() {
            Some(text) => Some(VectorClause {
                vector: self.embedder.embed_text(text).map_err(|e| {
                    QueryError::ExtractorFailure {
                        modality: "text",
                        reason: e.to_string(),
                    }
                })?,
                ceiling: max_text_distance,
            }),
            None => None,
        };

        let image = match &query.image {
            Some(image) => Some(VectorClause {
                vector: self.embedder.embed_image(image).map_err(|e| {
                    QueryError::ExtractorFailure {
                        modality: "image",
                        reason: e.to_string(),
                    }
                })?,
                ceiling: max_image_distance,
            }),
            None => None,
        };

        let objects = (!query.objects.is_empty())
            .then(|| ObjectPredicate::new(&query.objects, query.contain));
        let color = query.color.map(|c| ColorPredicate::new(c.target, c.radius));
        let words = (!query.words.is_empty()).then(|| query.words.clone());

        let compiled = CompiledQuery {
            text,
            image,
            objects,
            color,
            words,
            max_results,
        };
        debug!(
            "🔎 compiled query: text={} image={} objects={:?} color={:?} words={:?}",
            compiled.text.is_some(),
            compiled.image.is_some(),
            compiled.objects.as_ref().map(|o| &o.labels),
            compiled.color_target(),
            compiled.words
        );
        Ok(compiled)
    }
}
