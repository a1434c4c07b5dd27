use crate::config::{AutoClickConfig, DetectionConfig};
use crate::events::WindowHandle;
use image::GrayImage;
use std::sync::Arc;

use super::capture::ScreenCapturer;
use super::matcher::TemplateMatcher;
use super::region_check::{load_template, RegionCheck};

/// Условие срабатывания автощелчка
#[async_trait::async_trait]
pub trait RegionTrigger: Send + Sync {
    async fn is_triggered(&self, handle: &WindowHandle) -> bool;
}

/// Срабатывает, когда эталон найден в области с уверенностью не ниже порога
pub struct TemplateTrigger {
    capturer: Arc<dyn ScreenCapturer>,
    matcher: Arc<dyn TemplateMatcher>,
    check: RegionCheck,
}

impl TemplateTrigger {
    pub fn new(
        config: &AutoClickConfig,
        detection: &DetectionConfig,
        capturer: Arc<dyn ScreenCapturer>,
        matcher: Arc<dyn TemplateMatcher>,
    ) -> Self {
        Self::with_template(config, load_template(&config.template_path(detection)), capturer, matcher)
    }

    pub fn with_template(
        config: &AutoClickConfig,
        template: Option<Arc<GrayImage>>,
        capturer: Arc<dyn ScreenCapturer>,
        matcher: Arc<dyn TemplateMatcher>,
    ) -> Self {
        Self {
            capturer,
            matcher,
            check: RegionCheck::new("auto_click", config.region, template, config.threshold),
        }
    }

    pub fn template_loaded(&self) -> bool {
        self.check.has_template()
    }
}

#[async_trait::async_trait]
impl RegionTrigger for TemplateTrigger {
    async fn is_triggered(&self, handle: &WindowHandle) -> bool {
        // Без эталона совпадений не бывает
        match self.check.score(self.capturer.as_ref(), &self.matcher, handle).await {
            Some(score) => self.check.passes(score),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::Region;
    use crate::services::detection::NccMatcher;
    use image::{imageops, DynamicImage, Luma};

    struct StaticCapturer(Option<DynamicImage>);

    #[async_trait::async_trait]
    impl ScreenCapturer for StaticCapturer {
        async fn capture_region(&self, _handle: &WindowHandle, _region: Region) -> Result<Option<DynamicImage>> {
            Ok(self.0.clone())
        }
    }

    fn frame() -> GrayImage {
        GrayImage::from_fn(100, 80, |x, y| {
            let v = 128.0 + 70.0 * ((x as f64) / 5.0).sin() * ((y as f64) / 7.0).cos();
            Luma([v as u8])
        })
    }

    fn trigger(screen: Option<GrayImage>, with_template: bool) -> TemplateTrigger {
        let template = imageops::crop_imm(&frame(), 20, 15, 30, 25).to_image();
        TemplateTrigger::with_template(
            &AutoClickConfig::default(),
            with_template.then(|| Arc::new(template)),
            Arc::new(StaticCapturer(screen.map(DynamicImage::ImageLuma8))),
            Arc::new(NccMatcher::new(1)),
        )
    }

    fn handle() -> WindowHandle {
        WindowHandle::new("0x1", 1)
    }

    #[tokio::test]
    async fn test_fires_on_visible_template() {
        assert!(trigger(Some(frame()), true).is_triggered(&handle()).await);
    }

    #[tokio::test]
    async fn test_flat_screen_does_not_fire() {
        let flat = GrayImage::from_pixel(100, 80, Luma([90]));
        assert!(!trigger(Some(flat), true).is_triggered(&handle()).await);
    }

    #[tokio::test]
    async fn test_no_template_or_capture_does_not_fire() {
        let missing = trigger(Some(frame()), false);
        assert!(!missing.template_loaded());
        assert!(!missing.is_triggered(&handle()).await);
        assert!(!trigger(None, true).is_triggered(&handle()).await);
    }
}
