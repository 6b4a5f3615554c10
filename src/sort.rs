use glam::Mat4;
use rayon::prelude::*;

use crate::SplatCloud;

/// Order splat indices back-to-front for alpha compositing under the given
/// view matrix.
///
/// The depth key is the dot product of the view matrix's third row (rotation
/// part only) with each position, so the ordering depends on camera
/// orientation but not camera translation. For typical scene scales the
/// difference is invisible; the formula is kept until that stops being true.
///
/// Keys sort ascending under a total order (NaN positions sort high), the
/// sort is unstable and runs on the rayon pool, so equal depths come back in
/// no particular order.
pub fn by_depth(cloud: &SplatCloud, view: &Mat4) -> Vec<u32> {
    let axis = view.row(2).truncate();
    let depths: Vec<f32> = cloud
        .positions()
        .iter()
        .map(|position| axis.dot(*position))
        .collect();

    let mut order: Vec<u32> = (0..depths.len() as u32).collect();
    order.par_sort_unstable_by(|&a, &b| depths[a as usize].total_cmp(&depths[b as usize]));
    order
}
