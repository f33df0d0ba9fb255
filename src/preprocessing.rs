use image::imageops::{self, FilterType};
use ndarray::{Array, Ix4};
use thiserror::Error;

pub const INPUT_SIZE: u32 = 299;
pub const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to build input tensor: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Decodes an uploaded image into a `(1, 299, 299, 3)` RGB tensor scaled to `[0, 1]`.
pub fn transform_image(image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
    let original_img = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()?
        .decode()?;

    let rgb = original_img.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let side = INPUT_SIZE as usize;
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.)
        .collect();

    Ok(Array::from_shape_vec((1, side, side, CHANNELS), data)?)
}
