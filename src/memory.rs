//! Memory budgeting and tiling for the large contractions.
//!
//! The budget is expressed in doubles. Fixed-overhead components register
//! their requirements first; whatever remains bounds the streaming buffer,
//! and the three large contraction shapes are split into the minimum number
//! of equal tiles that fit it. If the doubles amplitudes cannot stay in
//! core alongside the fixed buffers, they move to disk and the computation
//! is retried with their reservation dropped.

use tracing::{info, warn};

use crate::error::{CepaError, Result};

const BYTES_PER_DOUBLE: f64 = 8.0;
const MB: f64 = 1024.0 * 1024.0;

/// A fixed-size memory request pool.
#[derive(Debug, Default)]
pub struct MemoryBudget {
    total: u64,
    reserved: Vec<(&'static str, u64)>,
}

impl MemoryBudget {
    pub fn new(total_doubles: u64) -> Self {
        Self {
            total: total_doubles,
            reserved: Vec::new(),
        }
    }

    pub fn reserve(mut self, label: &'static str, doubles: u64) -> Self {
        self.reserved.push((label, doubles));
        self
    }

    pub fn reserved_total(&self) -> u64 {
        self.reserved.iter().map(|(_, n)| n).sum()
    }

    /// Remaining budget, or `None` when the reservations exceed it.
    pub fn available(&self) -> Option<u64> {
        self.total.checked_sub(self.reserved_total())
    }
}

/// One tiled dimension: `ntiles` equal chunks, the last possibly smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    pub ntiles: usize,
    pub tilesize: usize,
    pub last: usize,
}

impl Tiling {
    /// Split `total` so that `tilesize * other <= budget`, with the
    /// minimum number of equal tiles. The tile count grows while the tile
    /// shrinks, so this always terminates; if even a single-unit tile
    /// cannot fit, that is unrecoverable.
    pub fn compute(total: usize, other: usize, budget: u64, what: &str) -> Result<Self> {
        if other as u64 > budget {
            return Err(CepaError::OutOfMemory(format!(
                "a single tile of the {what} contraction does not fit in the memory budget"
            )));
        }
        let mut ntiles = 1usize;
        let mut tilesize = total.div_ceil(ntiles);
        while (tilesize * other) as u64 > budget {
            ntiles += 1;
            tilesize = total.div_ceil(ntiles);
        }
        let last = total - (ntiles - 1) * tilesize;
        Ok(Self {
            ntiles,
            tilesize,
            last,
        })
    }

    /// Chunk length of tile `t` given the element count per unit.
    pub fn chunk_len(&self, t: usize, per_unit: usize) -> usize {
        if t + 1 == self.ntiles {
            self.last * per_unit
        } else {
            self.tilesize * per_unit
        }
    }
}

/// The planner's decision for one run.
#[derive(Debug, Clone, Copy)]
pub struct MemoryPlan {
    /// Whether the doubles amplitudes live on disk.
    pub t2_on_disk: bool,
    /// Tiling of the packed `v(v+1)/2` virtual-pair dimension.
    pub vvvv: Tiling,
    /// Tiling of the `o v^2` dimension.
    pub ov2: Tiling,
    /// Tiling of the `o v` dimension.
    pub ov: Tiling,
    /// Size of the shared general-purpose contraction buffer.
    pub maxelem: usize,
    /// Fixed-overhead requirement in doubles, for reporting.
    pub min_required: u64,
}

fn fixed_budget(o: u64, v: u64, vv: u64, extra: u64, t2_on_disk: bool, total: u64) -> MemoryBudget {
    let mut budget = MemoryBudget::new(total)
        .reserve("scratch tensors", 2 * (o * o * vv + o * v))
        .reserve("singles amplitudes and residual", 2 * o * v)
        .reserve("virtual-virtual intermediates", 2 * v * v)
        .reserve("orbital energies", o + v)
        .reserve("registered extras", extra);
    if !t2_on_disk {
        budget = budget.reserve("doubles amplitudes", o * o * v * v);
    }
    budget
}

/// Tile the three large-contraction shapes against the remaining budget.
/// Returns `None` when the general buffer cannot reach `o^2 v^2` with the
/// amplitudes held in core, signalling the disk retry.
fn define_tiling(
    o: usize,
    v: usize,
    vv: usize,
    total: u64,
    extra: u64,
    t2_on_disk: bool,
) -> Result<Option<(Tiling, Tiling, Tiling)>> {
    let o2v2 = (o * o * v * v) as u64;
    let budget = fixed_budget(o as u64, v as u64, vv as u64, extra, t2_on_disk, total);
    let available = budget.available().unwrap_or(0);
    if available < o2v2 {
        return if t2_on_disk {
            Err(CepaError::OutOfMemory(
                "minimum buffers do not fit even with the doubles amplitudes on disk".into(),
            ))
        } else {
            Ok(None)
        };
    }

    let vtri = v * (v + 1) / 2;
    let vvvv = Tiling::compute(vtri, vtri, available, "four-virtual")?;
    let ov2 = Tiling::compute(o * v * v, v, available, "particle ladder")?;
    let ov = Tiling::compute(o * v, v * v, available, "singles ladder")?;
    Ok(Some((vvvv, ov2, ov)))
}

fn general_buffer(v: usize, tiles: &(Tiling, Tiling, Tiling)) -> usize {
    let vtri = v * (v + 1) / 2;
    let (vvvv, ov2, ov) = tiles;
    (vvvv.tilesize * vtri)
        .max(ov.tilesize * v * v)
        .max(ov2.tilesize * v)
}

/// Plan the run: residency of the doubles amplitudes, the three tilings,
/// and the size of the shared contraction buffer.
///
/// `vv` is the square virtual dimension of the scratch tensors (`v^2`, or
/// `nso^2` on the integral-direct path); `extra` carries reservations from
/// specialized variants.
pub fn plan(o: usize, v: usize, vv: usize, total_doubles: u64, extra: u64) -> Result<MemoryPlan> {
    let o2v2 = o * o * v * v;
    let min_required = fixed_budget(o as u64, v as u64, vv as u64, extra, false, 0).reserved_total();

    let mut t2_on_disk = false;
    let mut tiles = define_tiling(o, v, vv, total_doubles, extra, false)?;
    let mut dim = tiles.as_ref().map(|t| general_buffer(v, t)).unwrap_or(0);
    if dim < o2v2 {
        warn!("cannot accommodate the doubles amplitudes in core; T2 will be stored on disk");
        t2_on_disk = true;
        tiles = define_tiling(o, v, vv, total_doubles, extra, true)?;
        dim = tiles.as_ref().map(|t| general_buffer(v, t)).unwrap_or(0);
        if dim < o2v2 {
            return Err(CepaError::OutOfMemory(
                "general buffer cannot accommodate a full doubles block".into(),
            ));
        }
        info!(
            "increase the memory budget by {:9.2} mb to hold the doubles amplitudes in core",
            o2v2 as f64 * BYTES_PER_DOUBLE / MB
        );
    }

    let (vvvv, ov2, ov) = tiles.expect("tiling exists when the general buffer fits");
    info!("four-virtual diagrams will be evaluated in {} blocks", vvvv.ntiles);
    info!(
        "particle-ladder diagrams will be evaluated in {} blocks over ov^2",
        ov2.ntiles
    );
    info!(
        "singles-ladder diagrams will be evaluated in {} blocks over ov",
        ov.ntiles
    );

    Ok(MemoryPlan {
        t2_on_disk,
        vvvv,
        ov2,
        ov,
        maxelem: dim,
        min_required,
    })
}

/// Convert a memory budget in megabytes to doubles.
pub fn doubles_from_mb(memory_mb: f64) -> u64 {
    (memory_mb * MB / BYTES_PER_DOUBLE) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiling_identity_holds() {
        for total in [1usize, 7, 64, 1000] {
            for budget in [total as u64 * 3, 40, 9] {
                let other = 3usize;
                if other as u64 > budget {
                    continue;
                }
                let t = Tiling::compute(total, other, budget, "test").unwrap();
                assert_eq!((t.ntiles - 1) * t.tilesize + t.last, total);
                assert!((t.tilesize * other) as u64 <= budget);
                assert!(t.last >= 1 && t.last <= t.tilesize);
            }
        }
    }

    #[test]
    fn single_tile_when_budget_is_large() {
        let t = Tiling::compute(100, 10, 10_000, "test").unwrap();
        assert_eq!(t.ntiles, 1);
        assert_eq!(t.tilesize, 100);
        assert_eq!(t.last, 100);
    }

    #[test]
    fn tile_that_cannot_fit_is_fatal() {
        let err = Tiling::compute(100, 50, 49, "test").unwrap_err();
        assert!(matches!(err, CepaError::OutOfMemory(_)));
    }

    #[test]
    fn ample_budget_keeps_t2_in_core() {
        let plan = plan(4, 8, 64, 10_000_000, 0).unwrap();
        assert!(!plan.t2_on_disk);
        assert_eq!(plan.vvvv.ntiles, 1);
        assert!(plan.maxelem >= 4 * 4 * 8 * 8);
    }

    #[test]
    fn tight_budget_moves_t2_to_disk() {
        let (o, v) = (4usize, 8usize);
        let o2v2 = (o * o * v * v) as u64;
        // fixed pool with t2 in core, plus less than one more o^2 v^2:
        // the in-core attempt cannot fit a full doubles block, the on-disk
        // retry can
        let fixed = 2 * (o * o * v * v + o * v) as u64
            + 2 * (o * v) as u64
            + 2 * (v * v) as u64
            + (o + v) as u64
            + o2v2;
        let total = fixed + o2v2 / 2;
        let plan = plan(o, v, v * v, total, 0).unwrap();
        assert!(plan.t2_on_disk);
        assert!(plan.maxelem >= o * o * v * v);
    }

    #[test]
    fn hopeless_budget_is_resource_exhaustion() {
        let err = plan(4, 8, 64, 100, 0).unwrap_err();
        assert!(matches!(err, CepaError::OutOfMemory(_)));
    }

    #[test]
    fn registered_extras_shrink_the_pool() {
        let (o, v) = (2usize, 4usize);
        let generous = plan(o, v, v * v, 1_000_000, 0).unwrap();
        assert!(!generous.t2_on_disk);
        // an extra reservation of nearly the whole pool forces the retry path
        let err = plan(o, v, v * v, 1_000_000, 1_000_000).unwrap_err();
        assert!(matches!(err, CepaError::OutOfMemory(_)));
    }

    #[test]
    fn chunk_len_distinguishes_last_tile() {
        let t = Tiling {
            ntiles: 3,
            tilesize: 4,
            last: 2,
        };
        assert_eq!(t.chunk_len(0, 5), 20);
        assert_eq!(t.chunk_len(2, 5), 10);
    }
}
