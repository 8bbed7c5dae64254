pub mod batcher;
pub mod mat;
pub mod svhn;

pub use batcher::{HEIGHT, Normalizer, SvhnBatch, SvhnBatcher, WIDTH};
pub use svhn::{CHANNELS, NUM_CLASSES, Split, SvhnDataset, SvhnItem};
