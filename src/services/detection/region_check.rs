use crate::debug_if_enabled;
use crate::events::{Region, WindowHandle};
use image::GrayImage;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::capture::ScreenCapturer;
use super::matcher::TemplateMatcher;

/// Загрузить эталон в оттенках серого; ошибка только логируется
pub fn load_template(path: &Path) -> Option<Arc<GrayImage>> {
    match image::open(path) {
        Ok(image) => {
            let gray = image.to_luma8();
            info!("✅ Эталон {:?} загружен ({}x{})", path, gray.width(), gray.height());
            Some(Arc::new(gray))
        }
        Err(e) => {
            warn!("❌ Эталон {:?} не загружен: {}", path, e);
            None
        }
    }
}

/// Область окна, эталон для неё и порог совпадения
pub(crate) struct RegionCheck {
    name: &'static str,
    region: Region,
    template: Option<Arc<GrayImage>>,
    threshold: f32,
}

impl RegionCheck {
    pub fn new(name: &'static str, region: Region, template: Option<Arc<GrayImage>>, threshold: f32) -> Self {
        Self {
            name,
            region,
            template,
            threshold,
        }
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn passes(&self, score: f32) -> bool {
        score >= self.threshold
    }

    /// Уверенность совпадения в области; `None` - проверить не удалось
    pub async fn score(
        &self,
        capturer: &dyn ScreenCapturer,
        matcher: &Arc<dyn TemplateMatcher>,
        handle: &WindowHandle,
    ) -> Option<f32> {
        let template = Arc::clone(self.template.as_ref()?);

        let image = match capturer.capture_region(handle, self.region).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                debug_if_enabled!("Снимок области {} не получен", self.name);
                return None;
            }
            Err(e) => {
                warn!("Захват области {} не удался: {}", self.name, e);
                return None;
            }
        };

        // Снимок может прийти в RGBA/RGB, сравнение идёт в оттенках серого
        let source = image.to_luma8();
        let matcher = Arc::clone(matcher);
        let score = tokio::task::spawn_blocking(move || matcher.match_score(&source, &template))
            .await
            .map_err(|e| warn!("Сравнение области {} прервано: {}", self.name, e))
            .ok()?;

        debug_if_enabled!("{}: лучшее совпадение {:.3} (порог {:.3})", self.name, score, self.threshold);
        Some(score)
    }
}
