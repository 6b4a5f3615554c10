mod ply;

use std::path::Path;

use crate::SplatCloud;

/// Failure to turn a splat file into a [`SplatCloud`]. All variants abort the
/// load; there are no partial loads or attribute defaults.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unrecognized splat file: {0}")]
    Format(String),
    #[error("vertex property missing from header: {0}")]
    MissingAttribute(String),
}

/// Load a splat collection, dispatching on the file extension.
///
/// `max_sh_degree` fixes the expected per-channel coefficient count
/// `(max_sh_degree + 1)^2`; a file carrying fewer extended coefficients fails
/// with [`LoadError::MissingAttribute`].
pub fn load(path: &Path, max_sh_degree: usize) -> Result<SplatCloud, LoadError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ply") => ply::load(path, max_sh_degree),
        _ => Err(LoadError::Format(format!(
            "unsupported file name: {}",
            path.display()
        ))),
    }
}
