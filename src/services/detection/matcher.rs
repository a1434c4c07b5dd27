use image::imageops::{self, FilterType};
use image::GrayImage;
use std::borrow::Cow;

/// Сравнение снимка с эталоном
pub trait TemplateMatcher: Send + Sync {
    /// Лучшая уверенность совпадения эталона со снимком, в диапазоне [0, 1]
    fn match_score(&self, source: &GrayImage, template: &GrayImage) -> f32;
}

/// Нормированная взаимная корреляция с вычитанием среднего (аналог TM_CCOEFF_NORMED).
///
/// Суммы по окнам считаются через интегральные изображения, числитель - прямым перебором.
#[derive(Debug, Clone, Copy)]
pub struct NccMatcher {
    downscale: u32,
}

impl NccMatcher {
    pub fn new(downscale: u32) -> Self {
        Self {
            downscale: downscale.max(1),
        }
    }

    fn shrink<'a>(&self, image: &'a GrayImage) -> Cow<'a, GrayImage> {
        if self.downscale == 1 {
            return Cow::Borrowed(image);
        }
        let width = (image.width() / self.downscale).max(1);
        let height = (image.height() / self.downscale).max(1);
        Cow::Owned(imageops::resize(image, width, height, FilterType::Triangle))
    }
}

impl Default for NccMatcher {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Интегральные суммы значений и их квадратов, размер (w+1)x(h+1)
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq_sum = vec![0.0; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq_sum }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        table[(y + h) * s + x + w] - table[y * s + x + w] - table[(y + h) * s + x] + table[y * s + x]
    }
}

impl TemplateMatcher for NccMatcher {
    fn match_score(&self, source: &GrayImage, template: &GrayImage) -> f32 {
        if source.width() == 0 || source.height() == 0 || template.width() == 0 || template.height() == 0 {
            return 0.0;
        }
        if source.width() < template.width() || source.height() < template.height() {
            return 0.0;
        }

        let source = self.shrink(source);
        let template = self.shrink(template);
        if source.width() < template.width() || source.height() < template.height() {
            return 0.0;
        }

        let (tw, th) = (template.width() as usize, template.height() as usize);
        let n = (tw * th) as f64;

        let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let t_zero: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
        let t_energy: f64 = t_zero.iter().map(|v| v * v).sum();
        if t_energy <= f64::EPSILON {
            // Однотонный эталон не с чем коррелировать
            return 0.0;
        }

        let integral = Integral::new(&source);
        let (sw, sh) = (source.width() as usize, source.height() as usize);
        let src = source.as_raw();
        let mut best = 0.0f64;

        for y in 0..=(sh - th) {
            for x in 0..=(sw - tw) {
                let s_sum = integral.window(&integral.sum, x, y, tw, th);
                let s_sq = integral.window(&integral.sq_sum, x, y, tw, th);
                let s_var = s_sq - s_sum * s_sum / n;
                if s_var <= 1e-6 {
                    continue;
                }

                // Среднее окна не нужно: сумма t_zero равна нулю
                let mut numerator = 0.0;
                for ty in 0..th {
                    let row = (y + ty) * sw + x;
                    let t_row = &t_zero[ty * tw..(ty + 1) * tw];
                    for (tx, t) in t_row.iter().enumerate() {
                        numerator += t * src[row + tx] as f64;
                    }
                }

                let score = numerator / (t_energy * s_var).sqrt();
                if score > best {
                    best = score;
                }
            }
        }

        best.clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn smooth(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = 128.0 + 50.0 * (x as f64 / 9.0).sin() + 50.0 * (y as f64 / 13.0).cos() + (x * y % 7) as f64;
            Luma([v.clamp(0.0, 255.0) as u8])
        })
    }

    fn checkerboard(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([if (x + y) % 2 == 0 { 20 } else { 230 }]))
    }

    #[test]
    fn test_exact_crop_matches() {
        let source = smooth(200, 120);
        let template = imageops::crop_imm(&source, 70, 40, 40, 30).to_image();

        let score = NccMatcher::new(1).match_score(&source, &template);
        assert!(score > 0.99, "score {}", score);
    }

    #[test]
    fn test_downscaled_crop_still_matches() {
        let source = smooth(200, 120);
        let template = imageops::crop_imm(&source, 80, 40, 60, 40).to_image();

        let score = NccMatcher::new(2).match_score(&source, &template);
        assert!(score > 0.9, "score {}", score);
    }

    #[test]
    fn test_unrelated_template_scores_low() {
        let source = smooth(200, 120);
        let template = checkerboard(30, 30);

        let score = NccMatcher::new(1).match_score(&source, &template);
        assert!(score < 0.5, "score {}", score);
    }

    #[test]
    fn test_degenerate_inputs_score_zero() {
        let matcher = NccMatcher::default();
        let source = smooth(20, 20);

        assert_eq!(matcher.match_score(&source, &smooth(40, 10)), 0.0);
        assert_eq!(matcher.match_score(&GrayImage::new(0, 0), &source), 0.0);
        assert_eq!(matcher.match_score(&source, &GrayImage::new(0, 0)), 0.0);
        assert_eq!(matcher.match_score(&source, &GrayImage::from_pixel(5, 5, Luma([90]))), 0.0);
    }
}
