// 数据模型定义
// 定义媒体文件、照片元数据、地理坐标等核心数据结构

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 文件内容来源
#[derive(Debug, Clone)]
pub enum FileSource {
    /// 磁盘文件（文件夹导入、文件选择器）
    Path(PathBuf),
    /// 内存字节（拖拽导入）
    Memory(Arc<[u8]>),
}

/// 媒体文件句柄
#[derive(Debug, Clone, Serialize)]
pub struct MediaFile {
    /// 图库内唯一标识，相册和选择集都引用它
    pub id: Uuid,
    /// 文件名
    pub name: String,
    /// 字节数
    pub size: u64,
    /// MIME 类型，可能为空字符串
    pub mime_type: String,
    /// 最后修改时间（毫秒时间戳）
    pub last_modified: i64,
    #[serde(skip)]
    pub source: FileSource,
}

impl MediaFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: i64,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            last_modified,
            source: FileSource::Memory(bytes),
        }
    }

    pub fn from_path(
        path: PathBuf,
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        last_modified: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            last_modified,
            source: FileSource::Path(path),
        }
    }

    /// 缓存键：文件名 + 修改时间
    pub fn key(&self) -> FileKey {
        FileKey {
            name: self.name.clone(),
            last_modified: self.last_modified,
        }
    }

    /// 去重判断：文件名 + 大小
    pub fn same_content_as(&self, other: &MediaFile) -> bool {
        self.name == other.name && self.size == other.size
    }

    pub fn category(&self) -> FileType {
        FileType::from_mime(&self.mime_type)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// 读取文件全部内容
    pub fn read_bytes(&self) -> std::io::Result<Arc<[u8]>> {
        match &self.source {
            FileSource::Path(path) => Ok(std::fs::read(path)?.into()),
            FileSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    /// 修改时间对应的本地时间
    pub fn last_modified_local(&self) -> NaiveDateTime {
        local_from_millis(self.last_modified)
    }
}

/// 毫秒时间戳转本地墙钟时间
pub fn local_from_millis(millis: i64) -> NaiveDateTime {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.naive_local(),
        None => DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .naive_utc(),
    }
}

/// 元数据缓存、自定义位置和标签使用的文件键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub name: String,
    pub last_modified: i64,
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.last_modified)
    }
}

/// 文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Pdf,
    Other,
}

impl FileType {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            FileType::Image
        } else if mime.starts_with("video/") {
            FileType::Video
        } else if mime == "application/pdf" {
            FileType::Pdf
        } else {
            FileType::Other
        }
    }
}

/// 类型过滤条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileTypeFilter {
    #[default]
    All,
    Image,
    Video,
    Pdf,
    Other,
}

impl FileTypeFilter {
    pub fn matches(self, file_type: FileType) -> bool {
        match self {
            FileTypeFilter::All => true,
            FileTypeFilter::Image => file_type == FileType::Image,
            FileTypeFilter::Video => file_type == FileType::Video,
            FileTypeFilter::Pdf => file_type == FileType::Pdf,
            FileTypeFilter::Other => file_type == FileType::Other,
        }
    }
}

/// 经纬度（十进制度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// 照片元数据
/// 非图片文件或解析失败时为空记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    /// 拍摄时间（EXIF 墙钟时间，无时区）
    pub date_taken: Option<NaiveDateTime>,
    pub gps: Option<GeoCoordinate>,
    /// GPS 时间（UTC）
    pub gps_date: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub iso: Option<String>,
    pub exposure_time: Option<String>,
    pub f_number: Option<String>,
    pub description: Option<String>,
    /// EXIF/IPTC/XMP 关键字，只读
    pub keywords: Vec<String>,
}

impl PhotoMetadata {
    pub fn is_empty(&self) -> bool {
        *self == PhotoMetadata::default()
    }
}

/// 字节数格式化，例如 1536 -> "1.5 KB"
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let k = 1024f64;
    let value = bytes as f64;
    let i = ((value.ln() / k.ln()).floor() as usize).min(UNITS.len() - 1);
    let scaled = value / k.powi(i as i32);
    // 去掉多余的尾随零
    let text = format!("{:.*}", decimals, scaled);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };
    format!("{} {}", text, UNITS[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_mime() {
        assert_eq!(FileType::from_mime("image/jpeg"), FileType::Image);
        assert_eq!(FileType::from_mime("video/mp4"), FileType::Video);
        assert_eq!(FileType::from_mime("application/pdf"), FileType::Pdf);
        assert_eq!(FileType::from_mime(""), FileType::Other);
        assert!(FileTypeFilter::All.matches(FileType::Other));
        assert!(!FileTypeFilter::Video.matches(FileType::Image));
    }

    #[test]
    fn test_file_key_display() {
        let file = MediaFile::from_bytes("a.jpg", "image/jpeg", 42, vec![0u8; 3]);
        assert_eq!(file.key().to_string(), "a.jpg-42");
        assert_eq!(file.size, 3);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0, 2), "0 Bytes");
        assert_eq!(format_bytes(1536, 2), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024, 1), "5 MB");
        assert_eq!(format_bytes(500, 2), "500 Bytes");
    }

    #[test]
    fn test_empty_metadata() {
        assert!(PhotoMetadata::default().is_empty());
        let meta = PhotoMetadata {
            keywords: vec!["x".into()],
            ..Default::default()
        };
        assert!(!meta.is_empty());
    }
}
