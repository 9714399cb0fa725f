use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::SrError;

/// File stem of the SRGAN generator.
pub const GENERATOR: &str = "generator";
/// File stem of the SRGAN discriminator.
pub const DISCRIMINATOR: &str = "discriminator";
/// File stem of the FSRCNN model.
pub const FSRCNN: &str = "fsrcnn";

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write the parameters of `module` to `<dir>/<name>.mpk`.
pub fn save<B: Backend, M: Module<B>>(module: M, dir: &Path, name: &str) -> Result<PathBuf, SrError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);

    module
        .save_file(path.clone(), &recorder())
        .map_err(|err| SrError::Checkpoint(format!("saving {}: {err:?}", path.display())))?;

    let path = path.with_extension("mpk");
    log::info!("Saved checkpoint {}", path.display());
    Ok(path)
}

/// Load `<dir>/<name>.mpk` into `module`, which must have the same architecture.
pub fn load<B: Backend, M: Module<B>>(
    module: M,
    dir: &Path,
    name: &str,
    device: &B::Device,
) -> Result<M, SrError> {
    let path = dir.join(name);

    let module = module
        .load_file(path.clone(), &recorder(), device)
        .map_err(|err| SrError::Checkpoint(format!("loading {}: {err:?}", path.display())))?;

    log::info!("Loaded checkpoint {}.mpk", path.display());
    Ok(module)
}
