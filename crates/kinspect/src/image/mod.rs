mod file;
mod reader;

#[cfg(test)]
pub mod mock;

pub use file::{CoreImage, SegmentDesc, SegmentMap};
pub use reader::ReadImage;

#[cfg(test)]
pub use mock::{MockImage, MockImageBuilder};
