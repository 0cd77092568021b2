//! Nutrient and waste carried by grid sites.
//!
//! Each tick the field is recomputed from the snapshot alone: every site
//! trades `diffusion_rate` of its contents with its four orthogonal
//! neighbors, gains `inflow` nutrient, and loses `waste_decay` of its waste.
//! Living cells then absorb from and excrete onto the diffused field while
//! the new generation is assembled.

use crate::grid::Grid;
use petri_core::{ChemistryConfig, Neighborhood, Position, Site};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

const FIELD_SALT: u64 = 0xA076_1D64_78BD_642F;
const DROPS_PER_CLUSTER: u32 = 50;

/// Sites after one tick of diffusion, inflow, and decay.
pub fn diffuse(grid: &Grid, chemistry: &ChemistryConfig, parallel: bool) -> Vec<Site> {
    let width = grid.width() as usize;
    let mut next = vec![Site::default(); grid.len()];

    let fill = |(y, row): (usize, &mut [Site])| diffuse_row(grid, chemistry, y as i32, row);
    if parallel {
        next.par_chunks_mut(width).enumerate().for_each(fill);
    } else {
        next.chunks_mut(width).enumerate().for_each(fill);
    }
    next
}

fn diffuse_row(grid: &Grid, chemistry: &ChemistryConfig, y: i32, row: &mut [Site]) {
    let sites = grid.sites();
    let rate = chemistry.diffusion_rate;
    let keep = 1.0 - chemistry.waste_decay;

    for (x, out) in row.iter_mut().enumerate() {
        let pos = Position::new(x as i32, y);
        let here = sites[grid.pos_to_index(pos)];

        let (mut nutrient, mut waste) = (0.0f32, 0.0f32);
        for &offset in Neighborhood::VonNeumann.offsets() {
            // a closed edge reflects the site's own contents back
            let site = grid
                .resolve(pos, offset)
                .map_or(here, |p| sites[grid.pos_to_index(p)]);
            nutrient += site.nutrient;
            waste += site.waste;
        }

        *out = Site {
            nutrient: here.nutrient * (1.0 - rate) + nutrient * rate / 4.0 + chemistry.inflow,
            waste: (here.waste * (1.0 - rate) + waste * rate / 4.0) * keep,
        };
    }
}

/// Nutrient a living cell on `site` absorbs this tick.
pub fn uptake(site: &Site, chemistry: &ChemistryConfig) -> f32 {
    if chemistry.enabled {
        site.nutrient * chemistry.uptake_rate
    } else {
        0.0
    }
}

/// Move `amount` of nutrient out of `site` and release the matching waste.
pub(crate) fn absorb(site: &mut Site, amount: f32, chemistry: &ChemistryConfig) {
    site.nutrient = (site.nutrient - amount).max(0.0);
    site.waste += amount * chemistry.waste_ratio;
}

/// Fill every site with `initial_nutrient`, then scatter `cluster_amount`
/// over `clusters` Gaussian patches. Leaves the sites empty when chemistry
/// is disabled.
pub fn seed_field(grid: &mut Grid, chemistry: &ChemistryConfig, seed: u64) {
    if !chemistry.enabled {
        return;
    }
    for site in grid.sites_mut() {
        *site = Site::new(chemistry.initial_nutrient, 0.0);
    }
    if chemistry.clusters == 0 || chemistry.cluster_amount <= 0.0 {
        return;
    }

    let (width, height) = (grid.width(), grid.height());
    let radius = (width.min(height) / 6).max(1) as f32;
    let drop = chemistry.cluster_amount / (chemistry.clusters * DROPS_PER_CLUSTER) as f32;
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ FIELD_SALT);

    for _ in 0..chemistry.clusters {
        let cx = rng.gen_range(0..width) as f32;
        let cy = rng.gen_range(0..height) as f32;
        for _ in 0..DROPS_PER_CLUSTER {
            let (dx, dy) = gaussian_pair(&mut rng);
            let x = (cx + dx * radius / 2.0).round().clamp(0.0, (width - 1) as f32) as i32;
            let y = (cy + dy * radius / 2.0).round().clamp(0.0, (height - 1) as f32) as i32;
            let index = grid.pos_to_index(Position::new(x, y));
            grid.sites_mut()[index].nutrient += drop;
        }
    }
}

/// Give sites outside the old `width x height` corner the starting nutrient.
pub fn fill_new_sites(grid: &mut Grid, width: i32, height: i32, chemistry: &ChemistryConfig) {
    if !chemistry.enabled {
        return;
    }
    let fresh: Vec<usize> = grid
        .positions()
        .enumerate()
        .filter(|(_, pos)| pos.x >= width || pos.y >= height)
        .map(|(index, _)| index)
        .collect();
    let sites = grid.sites_mut();
    for index in fresh {
        sites[index] = Site::new(chemistry.initial_nutrient, 0.0);
    }
}

/// Two independent standard normal samples (Box-Muller).
fn gaussian_pair(rng: &mut ChaCha8Rng) -> (f32, f32) {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f32::consts::PI * u2;
    (r * theta.cos(), r * theta.sin())
}
