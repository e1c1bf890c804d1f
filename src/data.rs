use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{Dataset, InMemDataset},
    },
    prelude::*,
};
use image::{imageops::FilterType, ImageReader, RgbImage};
use rand::{thread_rng, Rng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, warn};

use crate::{
    classes::ClassDictionary,
    error::{Error, Result},
    model::INPUT_CHANNELS,
};

#[derive(Debug, Clone)]
pub struct ProfessionItem {
    /// Channel-major RGB pixels, `3 * image_dim * image_dim` bytes.
    pub image: Vec<u8>,
    pub label: u32,
}

/// Images of a `<root>/<label>/<file>` tree, one subdirectory per class.
pub struct ProfessionDataset {
    dataset: InMemDataset<ProfessionItem>,
}

impl Dataset<ProfessionItem> for ProfessionDataset {
    fn get(&self, index: usize) -> Option<ProfessionItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl ProfessionDataset {
    pub fn load(data_dir: &Path, classes: &ClassDictionary, image_dim: usize) -> Result<Self> {
        if !data_dir.is_dir() {
            return Err(Error::MissingDirectory(data_dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for (id, name) in classes.labels().iter().enumerate() {
            let class_dir = data_dir.join(name);
            if !class_dir.is_dir() {
                return Err(Error::MissingDirectory(class_dir));
            }

            let mut class_paths = fs::read_dir(&class_dir)?
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<std::io::Result<Vec<PathBuf>>>()?;
            class_paths.retain(|path| path.is_file());
            class_paths.sort();

            debug!(class = %name, images = class_paths.len(), "found class directory");
            paths.extend(class_paths.into_iter().map(|path| (path, id as u32)));
        }

        let items: Vec<_> = paths
            .into_par_iter()
            .filter_map(|(path, label)| match load_image(&path, image_dim) {
                Ok(image) => Some(ProfessionItem { image, label }),
                Err(err) => {
                    warn!("skipping {}: {err}", path.display());
                    None
                }
            })
            .collect();

        if items.is_empty() {
            return Err(Error::EmptyDataset(data_dir.to_path_buf()));
        }

        Ok(ProfessionDataset {
            dataset: InMemDataset::new(items),
        })
    }
}

/// Decodes an image file and resizes it to `image_dim x image_dim` RGB.
pub fn load_image(path: &Path, image_dim: usize) -> Result<Vec<u8>> {
    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?;

    let image = image.resize_exact(image_dim as u32, image_dim as u32, FilterType::Triangle);

    Ok(to_channels_first(&image.to_rgb8()))
}

fn to_channels_first(image: &RgbImage) -> Vec<u8> {
    let plane = image.width() as usize * image.height() as usize;
    let mut channels = vec![0; plane * INPUT_CHANNELS];

    for (i, pixel) in image.pixels().enumerate() {
        let [r, g, b] = pixel.0;
        channels[i] = r;
        channels[plane + i] = g;
        channels[2 * plane + i] = b;
    }

    channels
}

/// Mirrors every row of a channel-major image in place.
fn flip_horizontal(image: &mut [u8], image_dim: usize) {
    for row in image.chunks_exact_mut(image_dim) {
        row.reverse();
    }
}

#[derive(Clone, Debug)]
pub struct ProfessionBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone)]
pub struct ProfessionBatcher<B: Backend> {
    device: B::Device,
    image_dim: usize,
    flip_probability: f64,
}

impl<B: Backend> ProfessionBatcher<B> {
    pub fn new(device: B::Device, image_dim: usize) -> Self {
        Self {
            device,
            image_dim,
            flip_probability: 0.0,
        }
    }

    /// Mirror each image with probability one half.
    pub fn with_horizontal_flip(self, horizontal_flip: bool) -> Self {
        self.with_flip_probability(if horizontal_flip { 0.5 } else { 0.0 })
    }

    fn with_flip_probability(mut self, probability: f64) -> Self {
        self.flip_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn flip_probability(&self) -> f64 {
        self.flip_probability
    }

    /// Stacks channel-major pixel buffers into a `[N, 3, dim, dim]` tensor scaled to `[0, 1]`.
    pub fn images(&self, images: Vec<Vec<u8>>) -> Tensor<B, 4> {
        let count = images.len();
        let pixels = images.concat();
        let data = TensorData::new(pixels, [count, INPUT_CHANNELS, self.image_dim, self.image_dim])
            .convert::<B::FloatElem>();

        Tensor::<B, 4>::from_data(data, &self.device) / 255.
    }
}

impl<B: Backend> Batcher<ProfessionItem, ProfessionBatch<B>> for ProfessionBatcher<B> {
    fn batch(&self, items: Vec<ProfessionItem>) -> ProfessionBatch<B> {
        let mut rng = thread_rng();

        let targets = items
            .iter()
            .map(|item| (item.label as i64).elem::<B::IntElem>())
            .collect::<Vec<_>>();

        let images = items
            .into_iter()
            .map(|item| {
                let mut image = item.image;
                if self.flip_probability > 0.0 && rng.gen_bool(self.flip_probability) {
                    flip_horizontal(&mut image, self.image_dim);
                }
                image
            })
            .collect();

        let count = targets.len();
        let images = self.images(images);
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [count]), &self.device);

        ProfessionBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn two_classes() -> ClassDictionary {
        ClassDictionary::new(vec!["chef".into(), "pilot".into()]).unwrap()
    }

    fn write_image(path: &Path, color: [u8; 3]) {
        RgbImage::from_pixel(20, 12, Rgb(color)).save(path).unwrap();
    }

    fn tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for (label, count) in [("chef", 3), ("pilot", 2)] {
            let dir = root.path().join(label);
            fs::create_dir(&dir).unwrap();
            for i in 0..count {
                write_image(&dir.join(format!("{label}-{i}.png")), [200, 100, 50]);
            }
        }
        root
    }

    #[test]
    fn loads_every_image_with_its_class_index() {
        let root = tree();

        let dataset = ProfessionDataset::load(root.path(), &two_classes(), 8).unwrap();

        assert_eq!(dataset.len(), 5);
        let labels: Vec<_> = (0..5).map(|i| dataset.get(i).unwrap().label).collect();
        assert_eq!(labels.iter().filter(|&&label| label == 0).count(), 3);
        assert_eq!(labels.iter().filter(|&&label| label == 1).count(), 2);
        assert_eq!(dataset.get(0).unwrap().image.len(), 3 * 8 * 8);
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let root = tree();
        fs::write(root.path().join("chef").join("notes.txt"), "not an image").unwrap();

        let dataset = ProfessionDataset::load(root.path(), &two_classes(), 8).unwrap();

        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn missing_directories_are_errors() {
        let root = tree();

        let err = ProfessionDataset::load(&root.path().join("absent"), &two_classes(), 8);
        assert!(matches!(err, Err(Error::MissingDirectory(_))));

        let classes = ClassDictionary::new(vec!["chef".into(), "waiter".into()]).unwrap();
        match ProfessionDataset::load(root.path(), &classes, 8) {
            Err(Error::MissingDirectory(path)) => assert!(path.ends_with("waiter")),
            other => panic!("expected a missing class directory, got {:?}", other.err()),
        }
    }

    #[test]
    fn empty_tree_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("chef")).unwrap();
        fs::create_dir(root.path().join("pilot")).unwrap();

        let err = ProfessionDataset::load(root.path(), &two_classes(), 8);

        assert!(matches!(err, Err(Error::EmptyDataset(_))));
    }

    #[test]
    fn images_are_channel_major() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        image.put_pixel(1, 0, Rgb([4, 5, 6]));

        assert_eq!(to_channels_first(&image), [1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn flip_mirrors_each_row_of_each_channel() {
        // 2x2 image, three channels
        let mut image = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

        flip_horizontal(&mut image, 2);

        assert_eq!(image, [2, 1, 4, 3, 6, 5, 8, 7, 10, 9, 12, 11]);
    }

    #[test]
    fn batch_scales_pixels_and_keeps_targets() {
        let device = Default::default();
        let batcher = ProfessionBatcher::<TestBackend>::new(device, 4);
        let items = vec![
            ProfessionItem {
                image: vec![255; 3 * 4 * 4],
                label: 1,
            },
            ProfessionItem {
                image: vec![0; 3 * 4 * 4],
                label: 0,
            },
        ];

        let batch = batcher.batch(items);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!(pixels[..48].iter().all(|&p| p == 1.0));
        assert!(pixels[48..].iter().all(|&p| p == 0.0));
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, [1, 0]);
    }

    fn asymmetric_item() -> ProfessionItem {
        // 2x2 image, three channels, no row reads the same both ways
        ProfessionItem {
            image: vec![0, 51, 102, 153, 204, 255, 51, 0, 255, 102, 153, 0],
            label: 0,
        }
    }

    fn batch_pixels(batcher: &ProfessionBatcher<TestBackend>) -> Vec<u8> {
        batcher
            .batch(vec![asymmetric_item()])
            .images
            .into_data()
            .to_vec::<f32>()
            .unwrap()
            .into_iter()
            .map(|pixel| (pixel * 255.0).round() as u8)
            .collect()
    }

    #[test]
    fn certain_flip_mirrors_every_row() {
        let batcher =
            ProfessionBatcher::<TestBackend>::new(Default::default(), 2).with_flip_probability(1.0);

        assert_eq!(
            batch_pixels(&batcher),
            [51, 0, 153, 102, 255, 204, 0, 51, 102, 255, 0, 153]
        );
    }

    #[test]
    fn disabled_flip_leaves_images_untouched() {
        let batcher = ProfessionBatcher::<TestBackend>::new(Default::default(), 2)
            .with_horizontal_flip(false);

        for _ in 0..16 {
            assert_eq!(batch_pixels(&batcher), asymmetric_item().image);
        }
    }

    #[test]
    fn horizontal_flip_fires_half_the_time() {
        let batcher = ProfessionBatcher::<TestBackend>::new(Default::default(), 2);
        assert_eq!(batcher.flip_probability(), 0.0);

        let batcher = batcher.with_horizontal_flip(true);
        assert_eq!(batcher.flip_probability(), 0.5);
    }
}
