// 缩略图模块
// 把图片字节缩放后编码为 JPEG data URL，供网格和地图弹窗使用

use base64::Engine;
use image::{DynamicImage, GenericImageView};

use crate::models::MediaFile;

/// 从图片字节生成缩略图，返回 base64 编码的 JPEG data URL
pub fn generate_thumbnail(bytes: &[u8], max_size: u32) -> Result<String, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("无法打开图片: {}", e))?;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err("图片尺寸为 0".to_string());
    }

    // 计算缩放比例，保持宽高比
    let scale = max_size as f64 / w.max(h) as f64;

    // 如果图片本身比缩略图小，不放大
    let thumbnail = if scale < 1.0 {
        let new_w = ((w as f64 * scale).round() as u32).max(1);
        let new_h = ((h as f64 * scale).round() as u32).max(1);
        img.resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG 不支持透明通道
    let rgb = DynamicImage::ImageRgb8(thumbnail.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| format!("缩略图编码失败: {}", e))?;

    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Ok(format!("data:image/jpeg;base64,{}", b64))
}

/// 文件缩略图，非图片返回 None
pub fn thumbnail_for(file: &MediaFile, max_size: u32) -> Option<String> {
    if !file.is_image() {
        return None;
    }
    let bytes = match file.read_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("读取文件失败 {}: {}", file.name, e);
            return None;
        }
    };
    match generate_thumbnail(&bytes, max_size) {
        Ok(url) => Some(url),
        Err(e) => {
            log::debug!("生成缩略图失败 {}: {}", file.name, e);
            None
        }
    }
}
