//! Randomized contiguous region growth over a face adjacency graph.
//!
//! A region is grown by breadth-first walks seeded at uniformly random faces.
//! Each walk stops when it has collected the requested number of faces or when
//! the faces reachable from its seed are exhausted. The driving loop keeps
//! walking with the remaining deficit until the target size is met.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{FaceAdjacency, MaskError, Result, TriangleMesh};

/// Interval the per-scene mask ratio is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskRatioRange {
    pub min: f64,
    pub max: f64,
}

impl MaskRatioRange {
    /// Creates a validated ratio interval.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Interval containing a single value.
    pub fn fixed(ratio: f64) -> Result<Self> {
        Self::new(ratio, ratio)
    }

    /// Checks `0 <= min <= max <= 1`.
    pub fn validate(&self) -> Result<()> {
        let ok = self.min.is_finite()
            && self.max.is_finite()
            && self.min >= 0.0
            && self.min <= self.max
            && self.max <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(MaskError::InvalidMaskRatio {
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Draws a ratio uniformly from the interval.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

impl Default for MaskRatioRange {
    fn default() -> Self {
        Self { min: 0.2, max: 0.5 }
    }
}

/// Number of faces to mask: `floor(face_count * ratio)`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn mask_face_count(face_count: usize, ratio: f64) -> usize {
    let count = (face_count as f64 * ratio).floor();
    (count.max(0.0) as usize).min(face_count)
}

/// A set of face indices with O(1) membership and insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSet {
    member: Vec<bool>,
    order: Vec<u32>,
}

impl FaceSet {
    /// Creates an empty set over a mesh with `face_count` faces.
    pub fn new(face_count: usize) -> Self {
        Self {
            member: vec![false; face_count],
            order: Vec::new(),
        }
    }

    /// Number of faces the set ranges over.
    pub fn capacity(&self) -> usize {
        self.member.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, face: u32) -> bool {
        self.member.get(face as usize).copied().unwrap_or(false)
    }

    /// Inserts a face, returning `true` when it was not present.
    ///
    /// # Panics
    /// Panics if `face` is out of range.
    pub fn insert(&mut self, face: u32) -> bool {
        let slot = &mut self.member[face as usize];
        if *slot {
            return false;
        }
        *slot = true;
        self.order.push(face);
        true
    }

    /// Inserts all faces, returning how many were new.
    pub fn extend_from(&mut self, faces: &[u32]) -> usize {
        faces.iter().filter(|&&f| self.insert(f)).count()
    }

    /// Faces in insertion order.
    pub fn faces(&self) -> &[u32] {
        &self.order
    }

    /// Faces sorted ascending.
    pub fn sorted(&self) -> Vec<u32> {
        let mut faces = self.order.clone();
        faces.sort_unstable();
        faces
    }

    /// Sorted, deduplicated vertex indices referenced by the selected faces.
    ///
    /// Fails with [`MaskError::SizeMismatch`] when the set does not range
    /// over exactly the faces of `mesh`.
    pub fn vertex_indices(&self, mesh: &TriangleMesh) -> Result<Vec<u32>> {
        if self.capacity() != mesh.face_count() {
            return Err(MaskError::SizeMismatch {
                expected: mesh.face_count(),
                actual: self.capacity(),
            });
        }

        let mut used = vec![false; mesh.vertex_count()];
        for &face in &self.order {
            for &v in &mesh.triangles()[face as usize] {
                used[v as usize] = true;
            }
        }
        Ok(used
            .iter()
            .enumerate()
            .filter(|&(_, &u)| u)
            .map(|(v, _)| u32::try_from(v).unwrap_or(u32::MAX))
            .collect())
    }
}

/// Outcome of growing a region.
#[derive(Debug, Clone)]
pub struct MaskRegion {
    /// Selected faces.
    pub faces: FaceSet,
    /// Requested number of faces after clamping to the face count.
    pub target: usize,
    /// Seed face of every walk, in order.
    pub seeds: Vec<u32>,
}

impl MaskRegion {
    /// Whether the region reached its target size.
    pub fn is_complete(&self) -> bool {
        self.faces.len() == self.target
    }

    /// Number of walks performed.
    pub fn walks(&self) -> usize {
        self.seeds.len()
    }
}

/// Grows contiguous face regions over an adjacency graph.
#[derive(Debug, Clone)]
pub struct RegionSelector<'a> {
    adjacency: &'a FaceAdjacency,
    max_walks: Option<usize>,
}

impl<'a> RegionSelector<'a> {
    /// Creates a selector without a walk limit.
    pub fn new(adjacency: &'a FaceAdjacency) -> Self {
        Self {
            adjacency,
            max_walks: None,
        }
    }

    /// Limits the number of walks a single [`grow`](Self::grow) may run.
    ///
    /// Without a limit growth still ends: every walk adds at least one face.
    #[must_use]
    pub fn with_max_walks(mut self, max_walks: usize) -> Self {
        self.max_walks = Some(max_walks.max(1));
        self
    }

    pub fn max_walks(&self) -> Option<usize> {
        self.max_walks
    }

    /// Runs one breadth-first walk of at most `count` faces.
    ///
    /// The seed is drawn uniformly from the faces not in `selected`, and
    /// selected faces are never revisited. Faces are returned in visitation
    /// order; the first one is the seed. The result is shorter than `count`
    /// when the reachable unselected faces run out, and empty when `count` is
    /// zero or every face is already selected.
    pub fn walk<R: Rng>(&self, rng: &mut R, count: usize, selected: &FaceSet) -> Vec<u32> {
        if count == 0 || selected.len() >= self.adjacency.len() {
            return Vec::new();
        }
        Walker::new(self.adjacency.len(), selected).walk(self.adjacency, rng, count)
    }

    /// Grows a region of `target` faces.
    ///
    /// Targets above the face count are clamped. Growth stops early, leaving
    /// a partial region, when a walk makes no progress or the walk limit is
    /// reached.
    pub fn grow<R: Rng>(&self, rng: &mut R, target: usize) -> MaskRegion {
        let face_count = self.adjacency.len();
        let target = if target > face_count {
            log::warn!("mask target {target} exceeds face count {face_count}, clamping");
            face_count
        } else {
            target
        };

        let mut faces = FaceSet::new(face_count);
        let mut seeds = Vec::new();
        let mut walker = Walker::new(face_count, &faces);

        while faces.len() < target {
            if self.max_walks.is_some_and(|limit| seeds.len() >= limit) {
                log::warn!(
                    "region growth stopped after {} walks with {}/{} faces",
                    seeds.len(),
                    faces.len(),
                    target
                );
                break;
            }

            let walk = walker.walk(self.adjacency, rng, target - faces.len());
            let Some(&seed) = walk.first() else {
                log::warn!(
                    "region growth made no progress at {}/{} faces",
                    faces.len(),
                    target
                );
                break;
            };
            seeds.push(seed);
            faces.extend_from(&walk);
        }

        log::debug!(
            "grew mask region: {}/{} faces in {} walks",
            faces.len(),
            target,
            seeds.len()
        );

        MaskRegion {
            faces,
            target,
            seeds,
        }
    }
}

const TAKEN: usize = usize::MAX;

/// Scratch state shared by the walks of one region.
///
/// Unselected faces live in a swap-remove list so seeds are drawn in O(1),
/// and the BFS visited marks are generation stamps reset by bumping a
/// counter instead of clearing a buffer.
struct Walker {
    free: Vec<u32>,
    slot: Vec<usize>,
    stamp: Vec<u32>,
    generation: u32,
    queue: VecDeque<u32>,
}

impl Walker {
    fn new(face_count: usize, selected: &FaceSet) -> Self {
        let mut free = Vec::with_capacity(face_count - selected.len().min(face_count));
        let mut slot = vec![TAKEN; face_count];
        for face in (0..face_count).filter_map(|f| u32::try_from(f).ok()) {
            if !selected.contains(face) {
                slot[face as usize] = free.len();
                free.push(face);
            }
        }
        Self {
            free,
            slot,
            stamp: vec![0; face_count],
            generation: 0,
            queue: VecDeque::new(),
        }
    }

    fn is_free(&self, face: u32) -> bool {
        self.slot[face as usize] != TAKEN
    }

    fn take(&mut self, face: u32) {
        let index = self.slot[face as usize];
        self.free.swap_remove(index);
        if let Some(&moved) = self.free.get(index) {
            self.slot[moved as usize] = index;
        }
        self.slot[face as usize] = TAKEN;
    }

    fn next_generation(&mut self) -> u32 {
        if self.generation == u32::MAX {
            self.stamp.fill(0);
            self.generation = 0;
        }
        self.generation += 1;
        self.generation
    }

    /// Walks from a random free face, taking every face it returns.
    fn walk<R: Rng>(&mut self, adjacency: &FaceAdjacency, rng: &mut R, count: usize) -> Vec<u32> {
        if count == 0 || self.free.is_empty() {
            return Vec::new();
        }

        let seed = self.free[rng.gen_range(0..self.free.len())];
        let generation = self.next_generation();
        let mut result = Vec::with_capacity(count.min(self.free.len()));

        self.queue.clear();
        self.stamp[seed as usize] = generation;
        self.queue.push_back(seed);

        while let Some(face) = self.queue.pop_front() {
            self.take(face);
            result.push(face);
            if result.len() >= count {
                break;
            }
            for &n in adjacency.neighbors(face) {
                if self.stamp[n as usize] != generation && self.is_free(n) {
                    self.stamp[n as usize] = generation;
                    self.queue.push_back(n);
                }
            }
        }

        result
    }
}
