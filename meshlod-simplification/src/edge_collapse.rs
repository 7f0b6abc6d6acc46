//! Edge collapse simplification
//!
//! Implements iterative edge collapse over an indexed triangle list using
//! quadric error metrics (QEM) for error-driven edge prioritization. Every
//! vertex keeps the list of live triangles touching it, which is all the
//! local topology a collapse needs (one-ring, link condition, fold-over).

use crate::quadric::{triangle_normal, Quadric};
use crate::{MeshSimplifier, SimplificationResult, Termination};
use meshlod_core::{Point3d, RawGeometry, Result, Vector2f, Vector3d, Vector3f, Vector4f};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum cosine between a triangle's normal before and after a collapse
const FOLD_OVER_COS: f64 = 0.2;

type EdgeKey = (usize, usize);

#[inline]
fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn position_bits(p: &Point3d) -> [u64; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

/// Number of values present in both sorted slices
fn count_common(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

// ============================================================
// Collapse Mesh
// ============================================================

#[derive(Debug, Clone)]
struct Triangle {
    v: [usize; 3],
    /// Current unit normal, `None` while the triangle has no area
    normal: Option<Vector3d>,
    removed: bool,
}

impl Triangle {
    #[inline]
    fn contains(&self, v: usize) -> bool {
        self.v.contains(&v)
    }
}

/// A collapse merging `remove` into `keep`, placed at `position`
#[derive(Debug, Clone, Copy)]
struct Candidate {
    keep: usize,
    remove: usize,
    position: Point3d,
    cost: f64,
}

struct CollapseMesh {
    positions: Vec<Point3d>,
    uvs: Vec<Vector2f>,
    normals: Vec<Vector3f>,
    tangents: Vec<Vector4f>,
    quadrics: Vec<Quadric>,
    triangles: Vec<Triangle>,
    /// Live triangles touching each vertex, ascending
    vertex_triangles: Vec<Vec<usize>>,
    vertex_removed: Vec<bool>,
    border: Vec<bool>,
    seam: Vec<bool>,
    /// Seam vertices grouped by exact position, ascending within a group
    seam_copies: HashMap<[u64; 3], Vec<usize>>,
    preserve_seams: bool,
    active_triangles: usize,
}

impl CollapseMesh {
    fn new(geometry: &RawGeometry, config: &SimplifierConfig) -> Self {
        let nv = geometry.vertex_count();
        let mut triangles = Vec::with_capacity(geometry.triangle_count());
        let mut vertex_triangles = vec![Vec::new(); nv];

        for [a, b, c] in geometry.triangles() {
            let v = [a as usize, b as usize, c as usize];
            // Repeated corners: nothing to draw and no edge to collapse
            if v[0] == v[1] || v[1] == v[2] || v[2] == v[0] {
                continue;
            }
            let ti = triangles.len();
            for &vi in &v {
                vertex_triangles[vi].push(ti);
            }
            let normal = triangle_normal(
                &geometry.positions[v[0]],
                &geometry.positions[v[1]],
                &geometry.positions[v[2]],
            );
            triangles.push(Triangle {
                v,
                normal,
                removed: false,
            });
        }

        let mut mesh = CollapseMesh {
            positions: geometry.positions.clone(),
            uvs: geometry.uvs.clone(),
            normals: geometry.normals.clone(),
            tangents: geometry.tangents.clone(),
            quadrics: vec![Quadric::zero(); nv],
            active_triangles: triangles.len(),
            triangles,
            vertex_triangles,
            vertex_removed: vec![false; nv],
            border: vec![false; nv],
            seam: vec![false; nv],
            seam_copies: HashMap::new(),
            preserve_seams: config.preserve_seams,
        };
        mesh.initialize_quadrics(config);
        mesh
    }

    fn initialize_quadrics(&mut self, config: &SimplifierConfig) {
        for tri in &self.triangles {
            if let Some(n) = tri.normal {
                let p0 = self.positions[tri.v[0]];
                let q = Quadric::from_plane(&n, -n.dot(&p0.coords), 1.0);
                for &vi in &tri.v {
                    self.quadrics[vi] += q;
                }
            }
        }

        // Edge use counts, ordered so that quadric sums are reproducible
        let mut edges: BTreeMap<EdgeKey, (usize, usize)> = BTreeMap::new();
        for (ti, tri) in self.triangles.iter().enumerate() {
            for j in 0..3 {
                edges
                    .entry(edge_key(tri.v[j], tri.v[(j + 1) % 3]))
                    .and_modify(|e| e.0 += 1)
                    .or_insert((1, ti));
            }
        }
        let border_edges: Vec<(EdgeKey, usize)> = edges
            .into_iter()
            .filter(|(_, (count, _))| *count == 1)
            .map(|(key, (_, ti))| (key, ti))
            .collect();
        for &((a, b), _) in &border_edges {
            self.border[a] = true;
            self.border[b] = true;
        }

        // Seams: border vertices sharing their exact position with another one
        let mut coincident: HashMap<[u64; 3], Vec<usize>> = HashMap::new();
        for v in (0..self.positions.len()).filter(|&v| self.border[v]) {
            coincident.entry(position_bits(&self.positions[v])).or_default().push(v);
        }
        coincident.retain(|_, group| group.len() > 1);
        for &v in coincident.values().flatten() {
            self.seam[v] = true;
        }
        self.seam_copies = coincident;

        // Constraint planes through border edges, perpendicular to their face
        for ((a, b), ti) in border_edges {
            let Some(n) = self.triangles[ti].normal else {
                continue;
            };
            let pa = self.positions[a];
            let Some(m) = (self.positions[b] - pa).cross(&n).try_normalize(f64::EPSILON) else {
                continue;
            };
            let weight = if self.seam[a] && self.seam[b] {
                config.seam_weight
            } else {
                config.boundary_weight
            };
            let q = Quadric::from_plane(&m, -m.dot(&pa.coords), weight);
            self.quadrics[a] += q;
            self.quadrics[b] += q;
        }
    }

    /// Live seam vertices sharing the position of `v`, `v` excluded
    fn seam_copies_of(&self, v: usize) -> Vec<usize> {
        self.seam_copies
            .get(&position_bits(&self.positions[v]))
            .map(|group| {
                group
                    .iter()
                    .copied()
                    .filter(|&u| u != v && !self.vertex_removed[u])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copies of seam edge (k, r) on the other side of the seam, as
    /// (keep, remove) pairs. `None` when a copy of `r` has no edge to a copy
    /// of `k`, since removing it alone would crack the seam.
    fn seam_partners(&self, k: usize, r: usize) -> Option<Vec<(usize, usize)>> {
        let keep_copies = self.seam_copies_of(k);
        self.seam_copies_of(r)
            .into_iter()
            .map(|rc| {
                keep_copies
                    .iter()
                    .copied()
                    .find(|&kc| self.shared_triangles(kc, rc) > 0)
                    .map(|kc| (kc, rc))
            })
            .collect()
    }

    /// Error of sliding seam vertex `r` onto `k`, partners included
    fn seam_slide_cost(&self, k: usize, r: usize) -> Option<f64> {
        let position = self.positions[k];
        let mut cost = (self.quadrics[k] + self.quadrics[r]).error(&position);
        for (kc, rc) in self.seam_partners(k, r)? {
            cost += (self.quadrics[kc] + self.quadrics[rc]).error(&position);
        }
        Some(cost)
    }

    /// Distinct vertices sharing a live triangle with `v`, ascending
    fn neighbors(&self, v: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self.vertex_triangles[v]
            .iter()
            .flat_map(|&ti| self.triangles[ti].v)
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn shared_triangles(&self, a: usize, b: usize) -> usize {
        self.vertex_triangles[a]
            .iter()
            .filter(|&&ti| self.triangles[ti].contains(b))
            .count()
    }

    /// Cheapest placement for collapsing edge (a, b)
    fn candidate(&self, a: usize, b: usize) -> Option<Candidate> {
        if self.vertex_removed[a] || self.vertex_removed[b] {
            return None;
        }
        let q = self.quadrics[a] + self.quadrics[b];
        let (pa, pb) = (self.positions[a], self.positions[b]);

        // Seam vertices never move; a seam vertex only disappears by sliding
        // onto its neighbour along the seam together with all of its copies
        let (keep, remove, position) = match (self.seam[a], self.seam[b]) {
            (true, true) if self.preserve_seams => return None,
            (true, true) => {
                if position_bits(&pa) == position_bits(&pb) {
                    return None;
                }
                let slides = (self.seam_slide_cost(a, b), self.seam_slide_cost(b, a));
                let (keep, remove, cost) = match slides {
                    (Some(ca), Some(cb)) if cb < ca => (b, a, cb),
                    (Some(ca), _) => (a, b, ca),
                    (None, Some(cb)) => (b, a, cb),
                    (None, None) => return None,
                };
                return Some(Candidate {
                    keep,
                    remove,
                    position: self.positions[keep],
                    cost,
                });
            }
            (true, false) => (a, b, pa),
            (false, true) => (b, a, pb),
            (false, false) => {
                let mid = nalgebra::center(&pa, &pb);
                let reach = (pb - pa).norm();
                let optimal = q
                    .optimal_position()
                    .filter(|p| (*p - mid).norm() <= reach);
                let position = optimal.unwrap_or_else(|| {
                    let mut best = pa;
                    let mut best_error = q.error(&pa);
                    for p in [pb, mid] {
                        let e = q.error(&p);
                        if e < best_error {
                            best = p;
                            best_error = e;
                        }
                    }
                    best
                });
                (a.min(b), a.max(b), position)
            }
        };

        Some(Candidate {
            keep,
            remove,
            position,
            cost: q.error(&position),
        })
    }

    /// Link condition, border pinching and fold-over checks
    fn can_collapse(&self, c: &Candidate) -> bool {
        let (k, r) = (c.keep, c.remove);
        let shared = self.shared_triangles(k, r);
        if shared == 0 || shared > 2 {
            return false;
        }
        // An interior edge joining two border vertices would pinch the surface
        if shared == 2 && self.border[k] && self.border[r] {
            return false;
        }
        if count_common(&self.neighbors(k), &self.neighbors(r)) != shared {
            return false;
        }

        for v in [k, r] {
            for &ti in &self.vertex_triangles[v] {
                let tri = &self.triangles[ti];
                if tri.contains(k) && tri.contains(r) {
                    continue;
                }
                let Some(old) = tri.normal else {
                    continue;
                };
                let p = tri
                    .v
                    .map(|u| if u == k || u == r { c.position } else { self.positions[u] });
                match triangle_normal(&p[0], &p[1], &p[2]) {
                    Some(n) if n.dot(&old) >= FOLD_OVER_COS => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// `c` together with the seam copies that must collapse with it, or
    /// `None` when any of them is blocked
    fn collapse_group(&self, c: &Candidate) -> Option<Vec<Candidate>> {
        if !self.can_collapse(c) {
            return None;
        }
        let mut group = vec![*c];
        if self.seam[c.keep] && self.seam[c.remove] {
            for (keep, remove) in self.seam_partners(c.keep, c.remove)? {
                let partner = Candidate {
                    keep,
                    remove,
                    position: c.position,
                    cost: 0.0,
                };
                if !self.can_collapse(&partner) {
                    return None;
                }
                group.push(partner);
            }
        }

        // Members checked up front must not share triangles
        for (i, m) in group.iter().enumerate() {
            let mut ring = self.neighbors(m.keep);
            ring.extend(self.neighbors(m.remove));
            ring.extend([m.keep, m.remove]);
            if group[i + 1..]
                .iter()
                .any(|o| ring.contains(&o.keep) || ring.contains(&o.remove))
            {
                return None;
            }
        }
        Some(group)
    }

    fn collapse(&mut self, c: &Candidate) {
        let (k, r) = (c.keep, c.remove);

        // Parameter of the new position along k -> r
        let pk = self.positions[k];
        let edge = self.positions[r] - pk;
        let len2 = edge.norm_squared();
        let t = if len2 > 0.0 {
            ((c.position - pk).dot(&edge) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.interpolate_attributes(k, r, t as f32);

        self.positions[k] = c.position;
        let qr = self.quadrics[r];
        self.quadrics[k] += qr;
        self.border[k] |= self.border[r];
        self.seam[k] |= self.seam[r];

        for ti in std::mem::take(&mut self.vertex_triangles[r]) {
            if self.triangles[ti].contains(k) {
                self.triangles[ti].removed = true;
                self.active_triangles -= 1;
                for u in self.triangles[ti].v {
                    if u != r {
                        self.vertex_triangles[u].retain(|&x| x != ti);
                    }
                }
            } else {
                for u in self.triangles[ti].v.iter_mut() {
                    if *u == r {
                        *u = k;
                    }
                }
                self.vertex_triangles[k].push(ti);
            }
        }
        self.vertex_triangles[k].sort_unstable();
        self.vertex_removed[r] = true;

        for i in 0..self.vertex_triangles[k].len() {
            let ti = self.vertex_triangles[k][i];
            let [x, y, z] = self.triangles[ti].v;
            self.triangles[ti].normal =
                triangle_normal(&self.positions[x], &self.positions[y], &self.positions[z]);
        }
    }

    fn interpolate_attributes(&mut self, k: usize, r: usize, t: f32) {
        if !self.uvs.is_empty() {
            self.uvs[k] = self.uvs[k].lerp(&self.uvs[r], t);
        }
        if !self.normals.is_empty() {
            let n = self.normals[k].lerp(&self.normals[r], t);
            if let Some(n) = n.try_normalize(f32::EPSILON) {
                self.normals[k] = n;
            }
        }
        if !self.tangents.is_empty() {
            let (tk, tr) = (self.tangents[k], self.tangents[r]);
            let w = if t <= 0.5 { tk.w } else { tr.w };
            let xyz = tk.xyz().lerp(&tr.xyz(), t);
            self.tangents[k] = match xyz.try_normalize(f32::EPSILON) {
                Some(d) => Vector4f::new(d.x, d.y, d.z, w),
                None => Vector4f::new(tk.x, tk.y, tk.z, w),
            };
        }
    }

    /// Compact to live, referenced vertices; triangles keep their order
    fn into_geometry(self) -> RawGeometry {
        let nv = self.positions.len();
        let mut referenced = vec![false; nv];
        for tri in self.triangles.iter().filter(|t| !t.removed) {
            for &v in &tri.v {
                referenced[v] = true;
            }
        }

        let mut remap = vec![u32::MAX; nv];
        let mut geometry = RawGeometry::default();
        for v in (0..nv).filter(|&v| referenced[v]) {
            remap[v] = geometry.positions.len() as u32;
            geometry.positions.push(self.positions[v]);
            if !self.uvs.is_empty() {
                geometry.uvs.push(self.uvs[v]);
            }
            if !self.normals.is_empty() {
                geometry.normals.push(self.normals[v]);
            }
            if !self.tangents.is_empty() {
                geometry.tangents.push(self.tangents[v]);
            }
        }
        geometry.indices = self
            .triangles
            .iter()
            .filter(|t| !t.removed)
            .flat_map(|t| t.v.map(|v| remap[v]))
            .collect();
        geometry
    }
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

#[derive(Debug, Clone, Copy)]
struct EdgeCost {
    cost: f64,
    key: EdgeKey,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-queue pops the smallest cost first, then the lowest vertex pair
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.key.cmp(&self.key))
    }
}

type EdgeQueue = PriorityQueue<EdgeKey, EdgeCost>;

fn build_queue(mesh: &CollapseMesh) -> EdgeQueue {
    let mut queue = PriorityQueue::with_capacity(mesh.active_triangles * 3 / 2);
    for tri in mesh.triangles.iter().filter(|t| !t.removed) {
        for j in 0..3 {
            let key = edge_key(tri.v[j], tri.v[(j + 1) % 3]);
            if queue.get(&key).is_some() {
                continue;
            }
            if let Some(c) = mesh.candidate(key.0, key.1) {
                queue.push(key, EdgeCost { cost: c.cost, key });
            }
        }
    }
    queue
}

/// Refresh every edge touching `center` or its one-ring
fn update_ring(mesh: &CollapseMesh, queue: &mut EdgeQueue, center: usize) {
    let mut ring = mesh.neighbors(center);
    ring.push(center);
    for v in ring {
        for n in mesh.neighbors(v) {
            let key = edge_key(v, n);
            match mesh.candidate(key.0, key.1) {
                Some(c) => {
                    queue.push(key, EdgeCost { cost: c.cost, key });
                }
                None => {
                    queue.remove(&key);
                }
            }
        }
    }
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Cooperative cancellation checked between collapses
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Tuning of the edge collapse simplifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifierConfig {
    /// Weight of the constraint planes along open borders
    pub boundary_weight: f64,
    /// Weight of the constraint planes along UV/normal seams
    pub seam_weight: f64,
    /// Never remove seam vertices. When off, a seam vertex may slide onto a
    /// neighbour along the seam, moving all of its coincident copies with it.
    pub preserve_seams: bool,
    /// Stop when the cheapest collapse costs more than this
    pub error_threshold: Option<f64>,
    /// Stop after this many collapses
    pub max_collapses: Option<usize>,
    /// Stop after this many milliseconds
    pub time_budget_ms: Option<u64>,
}

impl Default for SimplifierConfig {
    fn default() -> Self {
        Self {
            boundary_weight: 100.0,
            seam_weight: 1000.0,
            preserve_seams: false,
            error_threshold: None,
            max_collapses: None,
            time_budget_ms: None,
        }
    }
}

/// Quadric error edge collapse simplifier.
///
/// Edges are kept in a priority queue ordered by collapse error, ties broken
/// by the lowest vertex pair, so identical input always yields identical
/// output. Open borders and seams carry weighted constraint planes that
/// discourage collapses eroding them. Seam vertices are never moved, so the
/// copies on either side of a seam stay coincident.
#[derive(Debug, Clone, Default)]
pub struct EdgeCollapseSimplifier {
    pub config: SimplifierConfig,
    cancel: Option<CancelFlag>,
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimplifierConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Abort (best effort) once `flag` is raised
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn limit_reached(&self, collapses: usize, started: Instant) -> Option<Termination> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Some(Termination::Cancelled);
        }
        if self.config.max_collapses.is_some_and(|max| collapses >= max) {
            return Some(Termination::CollapseBudget);
        }
        if let Some(ms) = self.config.time_budget_ms {
            if started.elapsed() >= Duration::from_millis(ms) {
                return Some(Termination::TimeBudget);
            }
        }
        None
    }

    /// Pop edges until one can collapse. The returned group holds the popped
    /// collapse first, then any seam copies that go with it.
    fn next_collapse(
        &self,
        mesh: &CollapseMesh,
        queue: &mut EdgeQueue,
    ) -> std::result::Result<Vec<Candidate>, Termination> {
        while let Some((key, queued)) = queue.pop() {
            let Some(candidate) = mesh.candidate(key.0, key.1) else {
                continue;
            };
            // Stale entry: requeue at its current cost
            if candidate.cost.total_cmp(&queued.cost) == Ordering::Greater {
                queue.push(
                    key,
                    EdgeCost {
                        cost: candidate.cost,
                        key,
                    },
                );
                continue;
            }
            if self.config.error_threshold.is_some_and(|max| candidate.cost > max) {
                return Err(Termination::ErrorThreshold);
            }
            // Rejected edges come back when their neighbourhood changes
            if let Some(group) = mesh.collapse_group(&candidate) {
                return Ok(group);
            }
        }
        Err(Termination::NoCollapsibleEdges)
    }

    fn collapse_until(&self, mesh: &mut CollapseMesh, target: usize, collapses: &mut usize) -> Termination {
        let started = Instant::now();
        let mut queue = build_queue(mesh);

        loop {
            if mesh.active_triangles <= target {
                return Termination::TargetReached;
            }
            if let Some(reason) = self.limit_reached(*collapses, started) {
                return reason;
            }
            let group = match self.next_collapse(mesh, &mut queue) {
                Ok(group) => group,
                Err(reason) => return reason,
            };

            for candidate in &group {
                let removed_ring = mesh.neighbors(candidate.remove);
                mesh.collapse(candidate);
                *collapses += 1;
                for n in removed_ring {
                    queue.remove(&edge_key(candidate.remove, n));
                }
            }
            for candidate in &group {
                update_ring(mesh, &mut queue, candidate.keep);
            }
        }
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn simplify(&self, geometry: &RawGeometry, target_triangles: usize) -> Result<SimplificationResult> {
        geometry.validate()?;
        let original_triangles = geometry.triangle_count();

        if target_triangles == 0 {
            return Ok(SimplificationResult {
                geometry: RawGeometry::default(),
                original_triangles,
                target_triangles,
                collapses: 0,
                termination: Termination::TargetReached,
            });
        }

        let mut mesh = CollapseMesh::new(geometry, &self.config);
        let mut collapses = 0usize;
        let termination = if mesh.active_triangles <= target_triangles {
            Termination::TargetReached
        } else {
            self.collapse_until(&mut mesh, target_triangles, &mut collapses)
        };

        let geometry = mesh.into_geometry();
        log::debug!(
            "edge collapse: {} -> {} triangles (target {}, {} collapses, {})",
            original_triangles,
            geometry.triangle_count(),
            target_triangles,
            collapses,
            termination
        );

        Ok(SimplificationResult {
            geometry,
            original_triangles,
            target_triangles,
            collapses,
            termination,
        })
    }
}
