use crate::config::{DetectionConfig, RegionsConfig};
use crate::debug_if_enabled;
use crate::events::{DetectionResult, WindowHandle};
use image::GrayImage;
use std::sync::Arc;

use super::capture::ScreenCapturer;
use super::matcher::TemplateMatcher;
use super::region_check::{load_template, RegionCheck};

/// Источник `DetectionResult` для цикла мониторинга
#[async_trait::async_trait]
pub trait StateDetector: Send + Sync {
    async fn check_state(&self, handle: &WindowHandle) -> DetectionResult;
}

/// Проверка состояния игры по двум областям: всплывающее окно и маркер интерфейса
pub struct DetectionOrchestrator {
    capturer: Arc<dyn ScreenCapturer>,
    matcher: Arc<dyn TemplateMatcher>,
    popup: RegionCheck,
    ui: RegionCheck,
}

impl DetectionOrchestrator {
    pub fn new(
        config: &DetectionConfig,
        regions: &RegionsConfig,
        capturer: Arc<dyn ScreenCapturer>,
        matcher: Arc<dyn TemplateMatcher>,
    ) -> Self {
        Self::with_templates(
            config,
            regions,
            load_template(&config.popup_template_path()),
            load_template(&config.ui_template_path()),
            capturer,
            matcher,
        )
    }

    pub fn with_templates(
        config: &DetectionConfig,
        regions: &RegionsConfig,
        popup_template: Option<Arc<GrayImage>>,
        ui_template: Option<Arc<GrayImage>>,
        capturer: Arc<dyn ScreenCapturer>,
        matcher: Arc<dyn TemplateMatcher>,
    ) -> Self {
        Self {
            capturer,
            matcher,
            popup: RegionCheck::new("popup", regions.popup, popup_template, config.popup_threshold),
            ui: RegionCheck::new("ui", regions.ui, ui_template, config.ui_threshold),
        }
    }

    pub fn templates_loaded(&self) -> bool {
        self.popup.has_template() && self.ui.has_template()
    }

    async fn score(&self, handle: &WindowHandle, check: &RegionCheck) -> Option<f32> {
        check.score(self.capturer.as_ref(), &self.matcher, handle).await
    }
}

#[async_trait::async_trait]
impl StateDetector for DetectionOrchestrator {
    async fn check_state(&self, handle: &WindowHandle) -> DetectionResult {
        if !self.templates_loaded() {
            debug_if_enabled!("Эталоны не загружены, состояние неизвестно");
            return DetectionResult::failed();
        }

        let Some(popup_score) = self.score(handle, &self.popup).await else {
            return DetectionResult::failed();
        };
        let Some(ui_score) = self.score(handle, &self.ui).await else {
            return DetectionResult::failed();
        };

        DetectionResult::detected(self.popup.passes(popup_score), self.ui.passes(ui_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::Region;
    use crate::services::detection::NccMatcher;
    use image::{imageops, DynamicImage, Luma};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Отдаёт заранее заданный снимок для каждой области
    struct FakeCapturer {
        frames: Mutex<HashMap<Region, DynamicImage>>,
    }

    #[async_trait::async_trait]
    impl ScreenCapturer for FakeCapturer {
        async fn capture_region(&self, _handle: &WindowHandle, region: Region) -> Result<Option<DynamicImage>> {
            Ok(self.frames.lock().get(&region).cloned())
        }
    }

    fn pattern(width: u32, height: u32, phase: f64) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = 128.0 + 60.0 * ((x as f64 + phase) / 6.0).sin() * ((y as f64) / 4.0).cos();
            Luma([v as u8])
        })
    }

    fn orchestrator(frames: HashMap<Region, DynamicImage>, with_templates: bool) -> DetectionOrchestrator {
        let regions = RegionsConfig::default();
        let popup_frame = pattern(120, 90, 0.0);
        let ui_frame = pattern(80, 60, 3.0);
        let popup_template = imageops::crop_imm(&popup_frame, 30, 20, 40, 30).to_image();
        let ui_template = imageops::crop_imm(&ui_frame, 10, 10, 30, 20).to_image();

        DetectionOrchestrator::with_templates(
            &DetectionConfig::default(),
            &regions,
            with_templates.then(|| Arc::new(popup_template)),
            with_templates.then(|| Arc::new(ui_template)),
            Arc::new(FakeCapturer { frames: Mutex::new(frames) }),
            Arc::new(NccMatcher::new(1)),
        )
    }

    fn handle() -> WindowHandle {
        WindowHandle::new("0x1", 1)
    }

    #[tokio::test]
    async fn test_detects_both_regions() {
        let regions = RegionsConfig::default();
        let frames = HashMap::from([
            (regions.popup, DynamicImage::ImageLuma8(pattern(120, 90, 0.0))),
            (regions.ui, DynamicImage::ImageLuma8(pattern(80, 60, 3.0))),
        ]);

        let result = orchestrator(frames, true).check_state(&handle()).await;
        assert_eq!(result, DetectionResult::detected(true, true));
    }

    #[tokio::test]
    async fn test_absent_popup_is_negative_not_failure() {
        let regions = RegionsConfig::default();
        let blank = GrayImage::from_fn(120, 90, |x, _| Luma([(x * 2) as u8]));
        let frames = HashMap::from([
            (regions.popup, DynamicImage::ImageLuma8(blank)),
            (regions.ui, DynamicImage::ImageLuma8(pattern(80, 60, 3.0))),
        ]);

        let result = orchestrator(frames, true).check_state(&handle()).await;
        assert!(result.success);
        assert!(!result.popup_detected);
        assert!(result.ui_detected);
    }

    #[tokio::test]
    async fn test_capture_failure_is_unknown() {
        let regions = RegionsConfig::default();
        let frames = HashMap::from([(regions.popup, DynamicImage::ImageLuma8(pattern(120, 90, 0.0)))]);

        let result = orchestrator(frames, true).check_state(&handle()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_missing_templates_is_unknown() {
        let regions = RegionsConfig::default();
        let frames = HashMap::from([
            (regions.popup, DynamicImage::ImageLuma8(pattern(120, 90, 0.0))),
            (regions.ui, DynamicImage::ImageLuma8(pattern(80, 60, 3.0))),
        ]);

        let detector = orchestrator(frames, false);
        assert!(!detector.templates_loaded());
        assert_eq!(detector.check_state(&handle()).await, DetectionResult::failed());
    }
}
