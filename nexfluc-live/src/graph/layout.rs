//! Force-directed layout
//!
//! Iterative simulation with d3-force tick semantics:
//! - Many-body repulsion (charge / squared distance, exact pairwise)
//! - Per-edge springs with rest length `link_distance / strength`
//! - Centering toward the viewport center
//!
//! Alpha decays geometrically from 1.0 to `alpha_min` over 300 ticks.
//! Nodes seed from previous positions when available, otherwise at random
//! inside the viewport.

use crate::types::{Edge, Entity, Position};
use nexfluc_common::config::PipelineSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Ticks for alpha to decay from 1.0 to `alpha_min`
const DECAY_TICKS: f64 = 300.0;

/// Minimum distance used by the many-body force
const DISTANCE_MIN: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub width: f64,
    pub height: f64,
    /// Negative repels
    pub charge_strength: f64,
    /// Rest length of a strength-1.0 edge
    pub link_distance: f64,
    pub center_strength: f64,
    /// Fraction of velocity lost per tick
    pub velocity_decay: f64,
    pub alpha_min: f64,
    pub max_iterations: usize,
    /// Seed for positions of nodes without a previous position
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for LayoutConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            width: f64::from(settings.layout_width),
            height: f64::from(settings.layout_height),
            charge_strength: -500.0,
            link_distance: 100.0,
            center_strength: 0.1,
            velocity_decay: 0.4,
            alpha_min: 0.001,
            max_iterations: settings.layout_max_iterations,
            seed: None,
        }
    }
}

impl LayoutConfig {
    fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    fn alpha_decay(&self) -> f64 {
        1.0 - self.alpha_min.powf(1.0 / DECAY_TICKS)
    }
}

struct Body {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
}

struct Link {
    source: usize,
    target: usize,
    distance: f64,
    strength: f64,
    bias: f64,
}

/// Tiny deterministic offset separating coincident points
///
/// Never zero; depends only on the indices involved.
fn jiggle(i: usize, j: usize) -> f64 {
    let bucket = (i.wrapping_mul(31).wrapping_add(j.wrapping_mul(17))) % 97;
    ((bucket as f64 + 0.25) / 97.0 - 0.5) * 1e-6
}

/// Compute one finite position per node
pub fn layout(
    nodes: &[Entity],
    edges: &[Edge],
    previous: Option<&BTreeMap<String, Position>>,
    config: &LayoutConfig,
) -> BTreeMap<String, Position> {
    if nodes.is_empty() {
        return BTreeMap::new();
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (cx, cy) = config.center();
    let mut seeded = 0usize;
    let mut bodies: Vec<Body> = nodes
        .iter()
        .map(|node| {
            let prior = previous
                .and_then(|p| p.get(&node.id))
                .filter(|p| p.x.is_finite() && p.y.is_finite());
            let (x, y) = match prior {
                Some(p) => {
                    seeded += 1;
                    (p.x, p.y)
                }
                None => (
                    rng.gen_range(0.0..=config.width.max(0.0)),
                    rng.gen_range(0.0..=config.height.max(0.0)),
                ),
            };
            Body {
                x,
                y,
                vx: 0.0,
                vy: 0.0,
            }
        })
        .collect();

    let links = build_links(nodes, edges, config.link_distance);

    let alpha_decay = config.alpha_decay();
    let mut alpha = 1.0_f64;
    let mut iterations = 0;

    while alpha >= config.alpha_min && iterations < config.max_iterations {
        alpha += (0.0 - alpha) * alpha_decay;

        apply_links(&mut bodies, &links, alpha);
        apply_charge(&mut bodies, config.charge_strength, alpha);
        apply_centering(&mut bodies, cx, cy, config.center_strength, alpha);

        let retain = 1.0 - config.velocity_decay;
        for body in &mut bodies {
            body.vx *= retain;
            body.vy *= retain;
            body.x += body.vx;
            body.y += body.vy;
        }

        iterations += 1;
    }

    debug!(
        nodes = nodes.len(),
        edges = links.len(),
        seeded,
        iterations,
        "Layout converged"
    );

    nodes
        .iter()
        .zip(bodies)
        .map(|(node, body)| {
            let position = if body.x.is_finite() && body.y.is_finite() {
                Position {
                    x: body.x,
                    y: body.y,
                }
            } else {
                warn!(node = %node.id, "Non-finite layout position, recentering");
                Position { x: cx, y: cy }
            };
            (node.id.clone(), position)
        })
        .collect()
}

fn build_links(nodes: &[Entity], edges: &[Edge], link_distance: f64) -> Vec<Link> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let resolved: Vec<(usize, usize, f64)> = edges
        .iter()
        .filter_map(|e| {
            let s = *index.get(e.source_id.as_str())?;
            let t = *index.get(e.target_id.as_str())?;
            (s != t && e.strength > 0.0).then_some((s, t, f64::from(e.strength)))
        })
        .collect();

    let mut degree = vec![0usize; nodes.len()];
    for &(s, t, _) in &resolved {
        degree[s] += 1;
        degree[t] += 1;
    }

    resolved
        .into_iter()
        .map(|(source, target, strength)| {
            let (ds, dt) = (degree[source] as f64, degree[target] as f64);
            Link {
                source,
                target,
                distance: link_distance / strength,
                strength: 1.0 / ds.min(dt),
                bias: ds / (ds + dt),
            }
        })
        .collect()
}

fn apply_links(bodies: &mut [Body], links: &[Link], alpha: f64) {
    for (k, link) in links.iter().enumerate() {
        let (s, t) = (&bodies[link.source], &bodies[link.target]);
        let mut dx = t.x + t.vx - s.x - s.vx;
        let mut dy = t.y + t.vy - s.y - s.vy;
        if dx == 0.0 {
            dx = jiggle(link.source, k);
        }
        if dy == 0.0 {
            dy = jiggle(link.target, k + 1);
        }

        let l = (dx * dx + dy * dy).sqrt();
        let factor = (l - link.distance) / l * alpha * link.strength;
        dx *= factor;
        dy *= factor;

        bodies[link.target].vx -= dx * link.bias;
        bodies[link.target].vy -= dy * link.bias;
        bodies[link.source].vx += dx * (1.0 - link.bias);
        bodies[link.source].vy += dy * (1.0 - link.bias);
    }
}

fn apply_charge(bodies: &mut [Body], strength: f64, alpha: f64) {
    let n = bodies.len();
    let min2 = DISTANCE_MIN * DISTANCE_MIN;

    for i in 0..n {
        let (mut ax, mut ay) = (0.0, 0.0);
        for j in 0..n {
            if i == j {
                continue;
            }
            let mut dx = bodies[j].x - bodies[i].x;
            let mut dy = bodies[j].y - bodies[i].y;
            if dx == 0.0 {
                dx = jiggle(i, j);
            }
            if dy == 0.0 {
                dy = jiggle(j, i);
            }

            let mut l2 = dx * dx + dy * dy;
            if l2 < min2 {
                l2 = (min2 * l2).sqrt();
            }
            let w = strength * alpha / l2;
            ax += dx * w;
            ay += dy * w;
        }
        bodies[i].vx += ax;
        bodies[i].vy += ay;
    }
}

fn apply_centering(bodies: &mut [Body], cx: f64, cy: f64, strength: f64, alpha: f64) {
    for body in bodies {
        body.vx += (cx - body.x) * strength * alpha;
        body.vy += (cy - body.y) * strength * alpha;
    }
}
