//! Face adjacency graph built from triangle connectivity.
//!
//! Two faces are adjacent when they share an edge, i.e. an unordered pair of
//! vertex indices. Edges shared by more than two faces (non-manifold meshes)
//! connect every incident face pairwise.

use std::collections::HashMap;

use smallvec::SmallVec;

/// Neighbor list of a single face. Manifold triangles have at most three
/// neighbors, which fit inline.
pub type Neighbors = SmallVec<[u32; 3]>;

/// Face adjacency graph stored as an arena indexed by face.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceAdjacency {
    neighbors: Vec<Neighbors>,
}

impl FaceAdjacency {
    /// Builds the adjacency graph for the given triangles.
    ///
    /// Every face index `0..triangles.len()` gets an entry, isolated faces an
    /// empty one.
    pub fn build(triangles: &[[u32; 3]]) -> Self {
        let edge_to_faces = build_edge_to_faces(triangles);

        let mut neighbors: Vec<Neighbors> = vec![Neighbors::new(); triangles.len()];
        for faces in edge_to_faces.values() {
            if faces.len() < 2 {
                continue;
            }
            for (i, &a) in faces.iter().enumerate() {
                for &b in &faces[i + 1..] {
                    link(&mut neighbors[a as usize], b);
                    link(&mut neighbors[b as usize], a);
                }
            }
        }

        // HashMap iteration order is random; sort so traversal order only
        // depends on the mesh.
        for list in &mut neighbors {
            list.sort_unstable();
        }

        log::debug!(
            "built face adjacency: {} faces, {} shared edges",
            triangles.len(),
            edge_to_faces.values().filter(|f| f.len() > 1).count()
        );

        Self { neighbors }
    }

    /// Number of faces in the graph.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Neighbors of `face`, sorted ascending.
    ///
    /// # Panics
    /// Panics if `face` is out of range.
    pub fn neighbors(&self, face: u32) -> &[u32] {
        &self.neighbors[face as usize]
    }

    pub fn degree(&self, face: u32) -> usize {
        self.neighbors[face as usize].len()
    }

    pub fn are_adjacent(&self, a: u32, b: u32) -> bool {
        self.neighbors
            .get(a as usize)
            .is_some_and(|list| list.binary_search(&b).is_ok())
    }

    /// Number of undirected adjacency links.
    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(SmallVec::len).sum::<usize>() / 2
    }

    /// Sizes of the connected components, largest first.
    pub fn component_sizes(&self) -> Vec<usize> {
        let mut visited = vec![false; self.len()];
        let mut stack = Vec::new();
        let mut sizes = Vec::new();

        for start in 0..self.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);
            let mut size = 0;
            while let Some(face) = stack.pop() {
                size += 1;
                for &n in &self.neighbors[face] {
                    if !visited[n as usize] {
                        visited[n as usize] = true;
                        stack.push(n as usize);
                    }
                }
            }
            sizes.push(size);
        }

        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }
}

fn link(list: &mut Neighbors, face: u32) {
    if !list.contains(&face) {
        list.push(face);
    }
}

/// Build a map from edges to the faces that contain them.
fn build_edge_to_faces(triangles: &[[u32; 3]]) -> HashMap<(u32, u32), Vec<u32>> {
    let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
        HashMap::with_capacity(triangles.len() * 3 / 2);

    for (face_idx, tri) in triangles.iter().enumerate() {
        let face_idx = u32::try_from(face_idx).unwrap_or(u32::MAX);
        let edges = [
            normalize_edge(tri[0], tri[1]),
            normalize_edge(tri[1], tri[2]),
            normalize_edge(tri[2], tri[0]),
        ];

        for (i, edge) in edges.iter().enumerate() {
            // Degenerate triangles repeat an edge or collapse one to a point.
            if edge.0 == edge.1 || edges[..i].contains(edge) {
                continue;
            }
            edge_to_faces.entry(*edge).or_default().push(face_idx);
        }
    }

    edge_to_faces
}

/// Normalize an edge so the smaller vertex index comes first.
fn normalize_edge(v0: u32, v1: u32) -> (u32, u32) {
    if v0 < v1 {
        (v0, v1)
    } else {
        (v1, v0)
    }
}
