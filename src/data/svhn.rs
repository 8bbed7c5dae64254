use crate::data::mat::MatFile;
use crate::error::DataError;
use burn_common::network::downloader::download_file_as_bytes;
use burn_dataset::{Dataset, InMemDataset};
use serde::{Deserialize, Serialize};
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

// Stanford UFLDL mirror, cropped-digits format
const URL: &str = "http://ufldl.stanford.edu/housenumbers/";
const TRAIN_FILE: &str = "train_32x32.mat";
const TEST_FILE: &str = "test_32x32.mat";

pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;

/// SVHN item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SvhnItem {
    /// Image bytes in channel-major (CHW) row-major order.
    ///
    /// # Shape
    /// [CHANNELS * height * width]
    pub image: Vec<u8>,
    pub height: usize,
    pub width: usize,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_name(self) -> &'static str {
        match self {
            Split::Train => TRAIN_FILE,
            Split::Test => TEST_FILE,
        }
    }

    fn url(self) -> String {
        format!("{URL}{}", self.file_name())
    }
}

/// The Street View House Numbers dataset: 32x32 RGB crops of house-number digits in 10 classes.
/// There are 73,257 training images and 26,032 test images.
///
/// The data is downloaded from the web from the [Stanford UFLDL mirror](http://ufldl.stanford.edu/housenumbers/).
pub struct SvhnDataset {
    dataset: InMemDataset<SvhnItem>,
}

impl Dataset<SvhnItem> for SvhnDataset {
    fn get(&self, index: usize) -> Option<SvhnItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl SvhnDataset {
    /// Creates a new train dataset.
    pub fn train() -> Result<Self, DataError> {
        Self::new(Split::Train)
    }

    /// Creates a new test dataset.
    pub fn test() -> Result<Self, DataError> {
        Self::new(Split::Test)
    }

    pub fn new(split: Split) -> Result<Self, DataError> {
        let path = Self::download(split)?;
        Self::from_mat_file(&path)
    }

    /// Loads a split from an already downloaded `.mat` file.
    pub fn from_mat_file(path: &Path) -> Result<Self, DataError> {
        log::info!("Loading SVHN from {path:?}");
        let bytes = std::fs::read(path).map_err(|err| DataError::io(path, err))?;
        let mat = MatFile::parse(&bytes)?;
        // Train images (u8): 32 * 32 * 3 * 73257 = 225Mb
        // Test images (u8): 32 * 32 * 3 * 26032 = 80Mb
        let items = items_from_mat(mat)?;
        log::info!("Loaded {} SVHN images", items.len());
        Ok(Self::from_items(items))
    }

    pub fn from_items(items: Vec<SvhnItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Download the split file once into the burn-dataset cache directory.
    /// A single attempt is made; there are no retries.
    ///
    /// # Panics
    /// When the network request fails. Only cache and file IO errors are returned.
    fn download(split: Split) -> Result<PathBuf, DataError> {
        let cache_dir = cache_dir().ok_or_else(|| {
            DataError::io(
                "~",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory"),
            )
        })?;
        if !cache_dir.exists() {
            create_dir_all(&cache_dir).map_err(|err| DataError::io(&cache_dir, err))?;
        }

        let name = split.file_name();
        let file_name = cache_dir.join(name);
        if file_name.exists() {
            log::debug!("SVHN {split:?} found in cache at {file_name:?}");
        } else {
            log::info!("Downloading SVHN {split:?} split into {file_name:?}");
            let bytes = download_file_as_bytes(&split.url(), name);
            std::fs::write(&file_name, bytes).map_err(|err| DataError::io(&file_name, err))?;
        }

        Ok(file_name)
    }
}

/// `~/.cache/burn-dataset/svhn`, next to burn's bundled datasets.
fn cache_dir() -> Option<PathBuf> {
    Some(
        dirs::home_dir()?
            .join(".cache")
            .join("burn-dataset")
            .join("svhn"),
    )
}

/// Builds the items out of the `X` (`H x W x C x N`, column-major) and `y` (`N x 1`) variables.
fn items_from_mat(mut mat: MatFile) -> Result<Vec<SvhnItem>, DataError> {
    let images = mat.take("X").ok_or(DataError::MissingVariable("X"))?;
    let labels = mat.take("y").ok_or(DataError::MissingVariable("y"))?;

    let &[height, width, channels, count] = images.dims.as_slice() else {
        return Err(DataError::ShapeMismatch {
            name: "X",
            dims: images.dims.clone(),
        });
    };
    if channels != CHANNELS || height == 0 || width == 0 {
        return Err(DataError::ShapeMismatch {
            name: "X",
            dims: images.dims,
        });
    }
    if labels.data.len() != count {
        return Err(DataError::ShapeMismatch {
            name: "y",
            dims: labels.dims,
        });
    }

    let labels = labels.data.to_f64();
    let pixels = images.data.into_u8();
    let plane = height * width;

    pixels
        .chunks_exact(plane * channels)
        .zip(labels)
        .enumerate()
        .map(|(index, (source, label))| {
            let label = svhn_label(index, label)?;
            let mut image = vec![0u8; plane * channels];
            for channel in 0..channels {
                for row in 0..height {
                    for col in 0..width {
                        image[channel * plane + row * width + col] =
                            source[channel * plane + col * height + row];
                    }
                }
            }
            Ok(SvhnItem {
                image,
                height,
                width,
                label,
            })
        })
        .collect()
}

/// SVHN stores the digit `0` as label `10`.
fn svhn_label(index: usize, raw: f64) -> Result<u8, DataError> {
    let label = if raw == 10.0 { 0.0 } else { raw };
    if label.fract() != 0.0 || !(0.0..=9.0).contains(&label) {
        return Err(DataError::InvalidLabel { index, label: raw });
    }
    Ok(label as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mat::fixtures::*;

    const UINT8: u32 = 2;

    /// Column-major `X` whose value encodes (image, channel, row, col).
    fn column_major_images(height: usize, width: usize, count: usize) -> Vec<u8> {
        let mut data = vec![0u8; height * width * CHANNELS * count];
        for n in 0..count {
            for channel in 0..CHANNELS {
                for col in 0..width {
                    for row in 0..height {
                        let index = row
                            + height * col
                            + height * width * channel
                            + height * width * CHANNELS * n;
                        data[index] = (n * 100 + channel * 30 + row * width + col) as u8;
                    }
                }
            }
        }
        data
    }

    fn svhn_mat(labels: &[u8]) -> Vec<u8> {
        let (height, width, count) = (2, 3, labels.len());
        file(&[
            matrix(
                "X",
                CLASS_UINT8,
                &[height, width, CHANNELS, count],
                UINT8,
                &column_major_images(height, width, count),
            ),
            matrix("y", CLASS_DOUBLE, &[count, 1], UINT8, labels),
        ])
    }

    #[test]
    fn rearranges_images_to_chw() {
        let mat = MatFile::parse(&svhn_mat(&[3, 4])).unwrap();

        let items = items_from_mat(mat).unwrap();

        assert_eq!(items.len(), 2);
        for (n, item) in items.iter().enumerate() {
            assert_eq!((item.height, item.width), (2, 3));
            let expected: Vec<u8> = (0..CHANNELS * 6)
                .map(|i| (n * 100 + (i / 6) * 30 + i % 6) as u8)
                .collect();
            assert_eq!(item.image, expected);
        }
    }

    #[test]
    fn label_ten_becomes_zero() {
        let mat = MatFile::parse(&svhn_mat(&[10, 1, 9])).unwrap();

        let labels: Vec<u8> = items_from_mat(mat)
            .unwrap()
            .iter()
            .map(|item| item.label)
            .collect();

        assert_eq!(labels, vec![0, 1, 9]);
    }

    #[test]
    fn out_of_range_labels_are_rejected() {
        let mat = MatFile::parse(&svhn_mat(&[1, 11])).unwrap();

        let err = items_from_mat(mat).unwrap_err();

        assert!(matches!(err, DataError::InvalidLabel { index: 1, .. }));
    }

    #[test]
    fn missing_labels_are_reported() {
        let bytes = file(&[matrix(
            "X",
            CLASS_UINT8,
            &[2, 3, CHANNELS, 1],
            UINT8,
            &column_major_images(2, 3, 1),
        )]);
        let mat = MatFile::parse(&bytes).unwrap();

        let err = items_from_mat(mat).unwrap_err();

        assert!(matches!(err, DataError::MissingVariable("y")));
    }

    #[test]
    fn grayscale_images_are_rejected() {
        let bytes = file(&[
            matrix("X", CLASS_UINT8, &[2, 2, 1, 1], UINT8, &[0, 1, 2, 3]),
            matrix("y", CLASS_DOUBLE, &[1, 1], UINT8, &[1]),
        ]);
        let mat = MatFile::parse(&bytes).unwrap();

        let err = items_from_mat(mat).unwrap_err();

        assert!(matches!(err, DataError::ShapeMismatch { name: "X", .. }));
    }

    #[test]
    fn empty_image_planes_are_rejected() {
        let bytes = file(&[
            matrix("X", CLASS_UINT8, &[0, 32, CHANNELS, 2], UINT8, &[]),
            matrix("y", CLASS_DOUBLE, &[2, 1], UINT8, &[1, 2]),
        ]);
        let mat = MatFile::parse(&bytes).unwrap();

        let err = items_from_mat(mat).unwrap_err();

        assert!(matches!(err, DataError::ShapeMismatch { name: "X", .. }));
    }

    #[test]
    fn splits_download_from_the_ufldl_mirror_into_the_burn_cache() {
        assert_eq!(
            Split::Train.url(),
            "http://ufldl.stanford.edu/housenumbers/train_32x32.mat"
        );
        assert_eq!(
            Split::Test.url(),
            "http://ufldl.stanford.edu/housenumbers/test_32x32.mat"
        );
        if let Some(dir) = cache_dir() {
            assert!(dir.ends_with(".cache/burn-dataset/svhn"));
        }
    }

    #[test]
    fn loads_from_a_mat_file_on_disk() {
        let path = std::env::temp_dir().join(format!("svhn-cnn-{}.mat", std::process::id()));
        std::fs::write(&path, svhn_mat(&[5, 6, 7])).unwrap();

        let dataset = SvhnDataset::from_mat_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(2).unwrap().label, 7);
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let Err(err) = SvhnDataset::from_mat_file(Path::new("/nonexistent/svhn.mat")) else {
            panic!("loading a missing file must fail");
        };
        assert!(matches!(err, DataError::Io { .. }));
    }
}
