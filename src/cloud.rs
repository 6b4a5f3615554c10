use glam::{Quat, Vec3};

/// Zeroth-band SH basis constant, used to fold plain colors into DC terms.
const SH0: f32 = 0.28209479177387814;

/// One decoded splat, copied out of the columns of a [`SplatCloud`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub opacity: f32,
}

/// Column-oriented, read-only collection of decoded splats.
///
/// Built once by the loader and then shared freely: nothing here mutates, so
/// per-frame consumers (sorter, renderer) can read it without locking.
pub struct SplatCloud {
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
    opacities: Vec<f32>,
    /// `len() * sh_dim()` floats, per row: 3 DC values then the higher bands
    /// grouped so each coefficient's three channel values sit adjacently.
    sh: Vec<f32>,
    sh_dim: usize,
}

impl SplatCloud {
    pub(crate) fn new(
        positions: Vec<Vec3>,
        rotations: Vec<Quat>,
        scales: Vec<Vec3>,
        opacities: Vec<f32>,
        sh: Vec<f32>,
        sh_dim: usize,
    ) -> Self {
        debug_assert_eq!(rotations.len(), positions.len());
        debug_assert_eq!(scales.len(), positions.len());
        debug_assert_eq!(opacities.len(), positions.len());
        debug_assert_eq!(sh.len(), positions.len() * sh_dim);
        Self {
            positions,
            rotations,
            scales,
            opacities,
            sh,
            sh_dim,
        }
    }

    /// Four axis-aligned splats to show before any file is loaded.
    pub fn placeholder() -> Self {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let scales = vec![
            Vec3::splat(0.03),
            Vec3::new(0.2, 0.03, 0.03),
            Vec3::new(0.03, 0.2, 0.03),
            Vec3::new(0.03, 0.03, 0.2),
        ];
        let colors = [
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let sh = colors
            .iter()
            .flat_map(|c| [(c.x - 0.5) / SH0, (c.y - 0.5) / SH0, (c.z - 0.5) / SH0])
            .collect();
        Self::new(
            positions,
            vec![Quat::IDENTITY; 4],
            scales,
            vec![1.0; 4],
            sh,
            3,
        )
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Color coefficients per splat (`3 * (max_degree + 1)^2`).
    pub fn sh_dim(&self) -> usize {
        self.sh_dim
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn rotations(&self) -> &[Quat] {
        &self.rotations
    }

    pub fn scales(&self) -> &[Vec3] {
        &self.scales
    }

    pub fn opacities(&self) -> &[f32] {
        &self.opacities
    }

    pub fn sh(&self) -> &[f32] {
        &self.sh
    }

    pub fn sh_row(&self, index: usize) -> &[f32] {
        &self.sh[index * self.sh_dim..(index + 1) * self.sh_dim]
    }

    pub fn splat(&self, index: usize) -> Splat {
        Splat {
            position: self.positions[index],
            rotation: self.rotations[index],
            scale: self.scales[index],
            opacity: self.opacities[index],
        }
    }

    /// Interleave all columns per splat for upload to the renderer:
    /// position, rotation (w first, as stored on disk), scale, opacity,
    /// then the SH row.
    pub fn flatten(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.len() * (11 + self.sh_dim));
        for i in 0..self.len() {
            let p = self.positions[i];
            let q = self.rotations[i];
            let s = self.scales[i];
            flat.extend_from_slice(&[p.x, p.y, p.z]);
            flat.extend_from_slice(&[q.w, q.x, q.y, q.z]);
            flat.extend_from_slice(&[s.x, s.y, s.z]);
            flat.push(self.opacities[i]);
            flat.extend_from_slice(self.sh_row(i));
        }
        flat
    }
}
