use anyhow::{bail, Result};
use ndarray::Array4;

use super::crop::CropRegion;

/// MoveNet Lightning の入力サイズ
pub const MOVENET_LIGHTNING_INPUT_SIZE: usize = 192;
/// MoveNet Thunder の入力サイズ
pub const MOVENET_THUNDER_INPUT_SIZE: usize = 256;

/// デコード済みRGBフレーム（行優先、1画素3バイト）
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            bail!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            );
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    fn channel(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width as usize + x) * 3 + c] as f32
    }
}

/// クロップ領域を切り出して `size`×`size` にリサイズした入力テンソルを作る
///
/// - バイリニア補間
/// - 画像外はゼロ埋め（クロップ領域は画像からはみ出すことがある）
/// - [1, size, size, 3] の f32 テンソル (0.0-255.0)
pub fn crop_and_resize(frame: &RgbFrame, crop: &CropRegion, size: usize) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    if frame.width == 0 || frame.height == 0 || size == 0 {
        return tensor;
    }

    let h_max = (frame.height - 1) as f32;
    let w_max = (frame.width - 1) as f32;
    let step = |span: f32, extent: f32| {
        if size > 1 {
            span * extent / (size - 1) as f32
        } else {
            0.0
        }
    };
    let y_step = step(crop.y_max - crop.y_min, h_max);
    let x_step = step(crop.x_max - crop.x_min, w_max);

    for oy in 0..size {
        let in_y = crop.y_min * h_max + oy as f32 * y_step;
        if in_y < 0.0 || in_y > h_max {
            continue;
        }
        let y0 = in_y.floor() as usize;
        let y1 = (y0 + 1).min(frame.height as usize - 1);
        let fy = in_y - y0 as f32;

        for ox in 0..size {
            let in_x = crop.x_min * w_max + ox as f32 * x_step;
            if in_x < 0.0 || in_x > w_max {
                continue;
            }
            let x0 = in_x.floor() as usize;
            let x1 = (x0 + 1).min(frame.width as usize - 1);
            let fx = in_x - x0 as f32;

            for c in 0..3 {
                let top = frame.channel(x0, y0, c) * (1.0 - fx) + frame.channel(x1, y0, c) * fx;
                let bottom = frame.channel(x0, y1, c) * (1.0 - fx) + frame.channel(x1, y1, c) * fx;
                tensor[[0, oy, ox, c]] = top * (1.0 - fy) + bottom * fy;
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> RgbFrame {
        let data = (0..width * height).flat_map(|_| rgb).collect();
        RgbFrame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_rgb_frame_rejects_wrong_length() {
        assert!(RgbFrame::new(4, 4, vec![0; 10]).is_err());
    }

    #[test]
    fn test_full_crop_of_solid_frame() {
        let frame = solid_frame(8, 8, [10, 20, 30]);
        let crop = CropRegion::initial(8, 8);
        let tensor = crop_and_resize(&frame, &crop, 4);
        assert_eq!(tensor.shape(), &[1, 4, 4, 3]);
        for y in 0..4 {
            for x in 0..4 {
                assert!((tensor[[0, y, x, 0]] - 10.0).abs() < 1e-4);
                assert!((tensor[[0, y, x, 1]] - 20.0).abs() < 1e-4);
                assert!((tensor[[0, y, x, 2]] - 30.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_out_of_bounds_is_zero_padded() {
        // 横長フレームのデフォルト領域は上下にはみ出す
        let frame = solid_frame(16, 8, [255, 255, 255]);
        let crop = CropRegion::initial(8, 16);
        let tensor = crop_and_resize(&frame, &crop, 16);
        assert_eq!(tensor[[0, 0, 8, 0]], 0.0);
        assert_eq!(tensor[[0, 15, 8, 0]], 0.0);
        assert!((tensor[[0, 8, 8, 0]] - 255.0).abs() < 1e-3);
    }
}
