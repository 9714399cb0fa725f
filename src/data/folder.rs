use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use globwalk::DirEntry;
use image::imageops::FilterType;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::ImagePair;
use crate::SrError;

const SUPPORTED_FILES: [&str; 4] = ["bmp", "jpg", "jpeg", "png"];

/// Images under a folder, each resized into a low/high resolution pair on access.
///
/// Both sides are resized from the original image: the high-resolution target to
/// `hr_size`, the input to `hr_size / scale_factor`.
#[derive(Clone, Debug)]
pub struct SrImageFolder {
    paths: Vec<PathBuf>,
    hr_size: u32,
    lr_size: u32,
}

impl SrImageFolder {
    /// Every supported image under `root`, ordered by path.
    pub fn new<P: AsRef<Path>>(root: P, hr_size: usize, scale_factor: usize) -> Result<Self, SrError> {
        if scale_factor == 0 || hr_size == 0 || hr_size % scale_factor != 0 {
            return Err(SrError::Config(format!(
                "high resolution size {hr_size} is not a positive multiple of the scale factor {scale_factor}"
            )));
        }

        let walker = globwalk::GlobWalkerBuilder::from_patterns(
            root.as_ref(),
            &[format!("*.{{{}}}", SUPPORTED_FILES.join(","))],
        )
        .case_insensitive(true)
        .follow_links(true)
        .sort_by(|p1: &DirEntry, p2: &DirEntry| p1.path().cmp(p2.path()))
        .build()
        .map_err(|err| SrError::Config(format!("{err:?}")))?
        .filter_map(Result::ok);

        let paths: Vec<_> = walker.map(|entry| entry.path().to_path_buf()).collect();
        log::info!(
            "Found {} images under {}",
            paths.len(),
            root.as_ref().display()
        );

        Ok(Self::from_paths(paths, hr_size, scale_factor))
    }

    /// Use an explicit list of image files.
    pub fn from_paths(paths: Vec<PathBuf>, hr_size: usize, scale_factor: usize) -> Self {
        Self {
            paths,
            hr_size: hr_size as u32,
            lr_size: (hr_size / scale_factor) as u32,
        }
    }

    /// Split into `(train, test)` after a seeded shuffle; the test side gets
    /// `ceil(len * test_fraction)` images.
    pub fn split(self, test_fraction: f64, seed: u64) -> (Self, Self) {
        let mut paths = self.paths;
        paths.shuffle(&mut StdRng::seed_from_u64(seed));

        let num_test = ((paths.len() as f64) * test_fraction).ceil() as usize;
        let train = paths.split_off(num_test.min(paths.len()));

        let with = |paths| Self {
            paths,
            hr_size: self.hr_size,
            lr_size: self.lr_size,
        };
        (with(train), with(paths))
    }

    /// Files backing this dataset.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Decode and resize the image at `index`.
    pub fn load(&self, index: usize) -> Result<ImagePair, SrError> {
        let path = self
            .paths
            .get(index)
            .ok_or(SrError::MissingSample { index })?;
        let image = image::open(path)?.to_rgb8();

        let high_res =
            image::imageops::resize(&image, self.hr_size, self.hr_size, FilterType::Triangle);
        let low_res =
            image::imageops::resize(&image, self.lr_size, self.lr_size, FilterType::Triangle);

        Ok(ImagePair::from_images(&low_res, &high_res))
    }
}

impl Dataset<ImagePair> for SrImageFolder {
    fn get(&self, index: usize) -> Option<ImagePair> {
        match self.load(index) {
            Ok(pair) => Some(pair),
            Err(err) => {
                log::error!("Could not load {:?}: {err}", self.paths.get(index));
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_images(dir: &Path, count: usize) {
        for i in 0..count {
            let image = RgbImage::from_pixel(20, 12, Rgb([i as u8 * 10, 100, 200]));
            image.save(dir.join(format!("img_{i:02}.png"))).unwrap();
        }
    }

    #[test]
    fn loads_resized_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 2);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let dataset = SrImageFolder::new(dir.path(), 16, 4).unwrap();
        let pair = dataset.get(0).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(pair.low_res.shape, vec![3, 4, 4]);
        assert_eq!(pair.high_res.shape, vec![3, 16, 16]);
    }

    #[test]
    fn corrupt_image_is_a_missing_sample() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), "not a png").unwrap();

        let dataset = SrImageFolder::new(dir.path(), 16, 4).unwrap();

        assert_eq!(dataset.len(), 1);
        assert!(dataset.get(0).is_none());
        assert!(dataset.load(0).is_err());
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 20);

        let (train, test) = SrImageFolder::new(dir.path(), 16, 4)
            .unwrap()
            .split(0.05, 42);
        let (train_again, test_again) = SrImageFolder::new(dir.path(), 16, 4)
            .unwrap()
            .split(0.05, 42);

        assert_eq!(test.len(), 1);
        assert_eq!(train.len(), 19);
        assert_eq!(test.paths(), test_again.paths());
        assert_eq!(train.paths(), train_again.paths());
        assert!(!train.paths().contains(&test.paths()[0]));
    }

    #[test]
    fn size_must_be_a_multiple_of_the_scale() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            SrImageFolder::new(dir.path(), 30, 4),
            Err(SrError::Config(_))
        ));
    }
}
