// 配置模块
// 图库的可调参数：文件大小上限、允许的类型、模拟上传/分享的时间常量等

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GalleryError, Result};

/// 允许导入的 MIME 类型
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
    "application/pdf",
];

/// 图库配置，缺省字段使用默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// 单个文件大小上限（MB）
    pub max_file_size_mb: u64,
    /// 允许的 MIME 类型
    pub allowed_mime_types: Vec<String>,
    /// 模拟上传速度（字节/秒）
    pub simulated_upload_speed_bps: u64,
    /// 单个文件最短上传时长（毫秒）
    pub min_upload_duration_ms: u64,
    /// 进度条步数，每步前进 100/steps
    pub upload_steps: u32,
    /// 分享的模拟网络延迟（毫秒）
    pub share_delay_ms: u64,
    /// 点击聚类后打开预览前的等待（毫秒）
    pub cluster_preview_delay_ms: u64,
    /// 热力图饱和密度（张/天）
    pub heatmap_saturation_density: f64,
    /// 标签栏显示的标签数量
    pub top_tag_count: usize,
    /// 幻灯片切换间隔（毫秒）
    pub slideshow_interval_ms: u64,
    /// 缩略图长边（像素）
    pub thumbnail_max_size: u32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 500,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            simulated_upload_speed_bps: 3 * 1024 * 1024,
            min_upload_duration_ms: 500,
            upload_steps: 20,
            share_delay_ms: 1500,
            cluster_preview_delay_ms: 500,
            heatmap_saturation_density: 25.0,
            top_tag_count: 15,
            slideshow_interval_ms: 5000,
            thumbnail_max_size: 300,
        }
    }
}

impl GalleryConfig {
    /// 从 JSON 字符串解析配置
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heatmap_saturation_density.is_nan() || self.heatmap_saturation_density <= 1.0 {
            return Err(GalleryError::InvalidConfig(format!(
                "heatmap_saturation_density 必须大于 1，当前为 {}",
                self.heatmap_saturation_density
            )));
        }
        if self.upload_steps == 0 {
            return Err(GalleryError::InvalidConfig("upload_steps 不能为 0".to_string()));
        }
        Ok(())
    }

    /// 从 JSON 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("已加载配置: {}", path.display());
        Ok(config)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn share_delay(&self) -> Duration {
        Duration::from_millis(self.share_delay_ms)
    }

    pub fn cluster_preview_delay(&self) -> Duration {
        Duration::from_millis(self.cluster_preview_delay_ms)
    }

    pub fn slideshow_interval(&self) -> Duration {
        Duration::from_millis(self.slideshow_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GalleryConfig::from_json(r#"{ "max_file_size_mb": 10 }"#).unwrap();
        assert_eq!(config.max_file_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.upload_steps, 20);
        assert_eq!(config.top_tag_count, 15);
        assert_eq!(config.allowed_mime_types.len(), DEFAULT_ALLOWED_MIME_TYPES.len());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(&path, r#"{ "share_delay_ms": 10, "top_tag_count": 3 }"#).unwrap();

        let config = GalleryConfig::load(&path).unwrap();
        assert_eq!(config.share_delay(), Duration::from_millis(10));
        assert_eq!(config.top_tag_count, 3);
    }

    #[test]
    fn test_rejects_degenerate_values() {
        for json in [
            r#"{ "heatmap_saturation_density": 1.0 }"#,
            r#"{ "heatmap_saturation_density": 0.5 }"#,
            r#"{ "upload_steps": 0 }"#,
        ] {
            assert!(matches!(
                GalleryConfig::from_json(json),
                Err(GalleryError::InvalidConfig(_))
            ));
        }
        assert!(GalleryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(GalleryConfig::from_json("{ not json").is_err());
    }
}
