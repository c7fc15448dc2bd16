// 元数据读取模块
// 从图片文件中提取拍摄时间、GPS、相机信息和关键字（EXIF/IPTC/XMP）

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rayon::prelude::*;

use crate::models::{Dimensions, FileKey, GeoCoordinate, MediaFile, PhotoMetadata};

/// 标签读取器的错误类型
pub type TagReadError = Box<dyn std::error::Error + Send + Sync>;

/// IPTC Keywords 字段，不同软件写成单个字符串或列表
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordField {
    Single(String),
    List(Vec<String>),
}

/// 标签读取器读出的原始标签
/// 数值字段保持原样，由 `metadata_from_tags` 统一校验和换算
#[derive(Debug, Clone, Default)]
pub struct RawTags {
    /// 度/分/秒
    pub gps_latitude: Option<Vec<f64>>,
    pub gps_latitude_ref: Option<String>,
    pub gps_longitude: Option<Vec<f64>>,
    pub gps_longitude_ref: Option<String>,
    /// "YYYY:MM:DD"
    pub gps_date_stamp: Option<String>,
    /// "HH:MM:SS"
    pub gps_time_stamp: Option<String>,
    /// "YYYY:MM:DD HH:MM:SS"
    pub date_time_original: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens_model: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub iso: Option<String>,
    pub exposure_time: Option<String>,
    pub f_number: Option<String>,
    pub image_description: Option<String>,
    /// Windows XPKeywords，分号分隔
    pub xp_keywords: Option<String>,
    pub keywords: Option<KeywordField>,
    /// XMP dc:subject
    pub xmp_subjects: Vec<String>,
}

/// 元数据解析的外部协作者：输入文件字节，输出标签字典
pub trait TagReader: Send + Sync {
    fn read_tags(&self, bytes: &[u8]) -> Result<RawTags, TagReadError>;
}

/// 基于 kamadak-exif 的默认读取器，另外扫描 IPTC 与 XMP 数据段
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifTagReader;

impl TagReader for ExifTagReader {
    fn read_tags(&self, bytes: &[u8]) -> Result<RawTags, TagReadError> {
        let mut tags = RawTags::default();
        read_embedded_keywords(bytes, &mut tags);

        let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => exif,
            Err(e) => {
                // 没有 EXIF 但有 IPTC/XMP 关键字时仍然返回
                if tags.keywords.is_some() || !tags.xmp_subjects.is_empty() {
                    return Ok(tags);
                }
                return Err(e.into());
            }
        };

        fill_from_exif(&exif, &mut tags);
        Ok(tags)
    }
}

fn fill_from_exif(exif: &exif::Exif, tags: &mut RawTags) {
    use exif::{In, Tag};

    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY);

    tags.gps_latitude = field(Tag::GPSLatitude).and_then(|f| rationals(&f.value));
    tags.gps_latitude_ref = field(Tag::GPSLatitudeRef).and_then(|f| ascii(&f.value));
    tags.gps_longitude = field(Tag::GPSLongitude).and_then(|f| rationals(&f.value));
    tags.gps_longitude_ref = field(Tag::GPSLongitudeRef).and_then(|f| ascii(&f.value));
    tags.gps_date_stamp = field(Tag::GPSDateStamp).and_then(|f| ascii(&f.value));
    tags.gps_time_stamp = field(Tag::GPSTimeStamp)
        .and_then(|f| rationals(&f.value))
        .and_then(|hms| {
            if hms.len() < 3 || hms.iter().any(|v| !v.is_finite()) {
                return None;
            }
            Some(format!(
                "{:02}:{:02}:{:02}",
                hms[0] as u32, hms[1] as u32, hms[2] as u32
            ))
        });
    tags.date_time_original = field(Tag::DateTimeOriginal).and_then(|f| ascii(&f.value));
    tags.make = field(Tag::Make).and_then(|f| ascii(&f.value));
    tags.model = field(Tag::Model).and_then(|f| ascii(&f.value));
    tags.lens_model = field(Tag::LensModel).and_then(|f| ascii(&f.value));
    tags.image_description = field(Tag::ImageDescription).and_then(|f| ascii(&f.value));

    tags.image_width = field(Tag::ImageWidth)
        .or_else(|| field(Tag::PixelXDimension))
        .and_then(|f| f.value.get_uint(0));
    tags.image_height = field(Tag::ImageLength)
        .or_else(|| field(Tag::PixelYDimension))
        .and_then(|f| f.value.get_uint(0));

    tags.iso = field(Tag::PhotographicSensitivity)
        .and_then(|f| f.value.get_uint(0))
        .map(|v| v.to_string());
    tags.exposure_time = field(Tag::ExposureTime).map(|f| f.display_value().to_string());
    tags.f_number = field(Tag::FNumber).map(|f| f.display_value().to_string());

    // XPKeywords (Tag 0x9C9E) 不在 kamadak-exif 预定义常量中，手动构造
    let xp_keywords_tag = Tag(exif::Context::Tiff, 0x9C9E);
    if let Some(f) = exif.get_field(xp_keywords_tag, In::PRIMARY) {
        if let exif::Value::Byte(ref bytes) = f.value {
            // UTF-16LE 编码
            let u16_chars: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                .collect();
            let text = String::from_utf16_lossy(&u16_chars);
            tags.xp_keywords = Some(text.trim_end_matches('\0').to_string());
        }
    }
}

fn ascii(value: &exif::Value) -> Option<String> {
    match value {
        exif::Value::Ascii(vec) => vec.first().map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        }),
        _ => None,
    }
}

fn rationals(value: &exif::Value) -> Option<Vec<f64>> {
    match value {
        // 分母为 0 时 to_f64 得到 NaN/inf，交给后续校验丢弃
        exif::Value::Rational(rats) => Some(rats.iter().map(|r| r.to_f64()).collect()),
        _ => None,
    }
}

/// 提取单个文件的元数据，解析在阻塞线程池中执行
/// 非图片文件直接返回空记录；任何失败都降级为空记录
pub async fn extract_photo_metadata(reader: Arc<dyn TagReader>, file: MediaFile) -> PhotoMetadata {
    if !file.is_image() {
        return PhotoMetadata::default();
    }
    let name = file.name.clone();
    match tokio::task::spawn_blocking(move || extract_blocking(reader.as_ref(), &file)).await {
        Ok(metadata) => metadata,
        Err(e) => {
            log::debug!("元数据任务异常 {}: {}", name, e);
            PhotoMetadata::default()
        }
    }
}

/// 同步版本，供批量处理使用
pub fn extract_blocking(reader: &dyn TagReader, file: &MediaFile) -> PhotoMetadata {
    if !file.is_image() {
        return PhotoMetadata::default();
    }
    let bytes = match file.read_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            log::debug!("读取文件失败 {}: {}", file.name, e);
            return PhotoMetadata::default();
        }
    };
    match reader.read_tags(&bytes) {
        Ok(tags) => metadata_from_tags(&tags),
        Err(e) => {
            log::debug!("无法读取元数据 {}: {}", file.name, e);
            PhotoMetadata::default()
        }
    }
}

/// 并行提取一批文件的元数据
pub fn extract_batch(reader: &dyn TagReader, files: &[MediaFile]) -> Vec<(FileKey, PhotoMetadata)> {
    files
        .par_iter()
        .map(|file| (file.key(), extract_blocking(reader, file)))
        .collect()
}

/// 将原始标签换算为元数据记录
pub fn metadata_from_tags(tags: &RawTags) -> PhotoMetadata {
    let dimensions = match (tags.image_width, tags.image_height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Some(Dimensions { width, height })
        }
        _ => None,
    };

    PhotoMetadata {
        date_taken: tags.date_time_original.as_deref().and_then(parse_exif_datetime),
        gps: parse_gps(tags),
        gps_date: parse_gps_date(tags),
        camera_make: non_empty(&tags.make),
        camera_model: non_empty(&tags.model),
        lens_model: non_empty(&tags.lens_model),
        dimensions,
        iso: non_empty(&tags.iso),
        exposure_time: non_empty(&tags.exposure_time),
        f_number: non_empty(&tags.f_number),
        description: non_empty(&tags.image_description),
        keywords: merge_keywords(tags),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// 度分秒转十进制，S/W 取负；四个字段缺一不可
fn parse_gps(tags: &RawTags) -> Option<GeoCoordinate> {
    let lat = tags.gps_latitude.as_deref()?;
    let lat_ref = tags.gps_latitude_ref.as_deref()?;
    let lon = tags.gps_longitude.as_deref()?;
    let lon_ref = tags.gps_longitude_ref.as_deref()?;

    let mut latitude = dms_to_decimal(lat)?;
    if lat_ref.trim().eq_ignore_ascii_case("S") {
        latitude = -latitude;
    }
    let mut longitude = dms_to_decimal(lon)?;
    if lon_ref.trim().eq_ignore_ascii_case("W") {
        longitude = -longitude;
    }

    Some(GeoCoordinate::new(latitude, longitude))
}

fn dms_to_decimal(dms: &[f64]) -> Option<f64> {
    if dms.len() < 3 {
        return None;
    }
    let value = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    value.is_finite().then_some(value)
}

/// 解析 "YYYY:MM:DD HH:MM:SS"
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('\0');
    let (date_part, time_part) = text.split_once(' ')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y:%m:%d").ok()?;
    let time = NaiveTime::parse_from_str(time_part.trim(), "%H:%M:%S").ok()?;
    Some(NaiveDateTime::new(date, time))
}

/// GPS 日期 + 时间，按 UTC 解释
fn parse_gps_date(tags: &RawTags) -> Option<chrono::DateTime<Utc>> {
    let date = tags.gps_date_stamp.as_deref()?;
    let time = tags.gps_time_stamp.as_deref()?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y:%m:%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

/// XPKeywords 与 IPTC/XMP 关键字合并：按首次出现顺序去重
fn merge_keywords(tags: &RawTags) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keywords = Vec::new();
    let mut push = |kw: &str| {
        let kw = kw.trim();
        if !kw.is_empty() && seen.insert(kw.to_string()) {
            keywords.push(kw.to_string());
        }
    };

    if let Some(xp) = &tags.xp_keywords {
        xp.split(';').for_each(&mut push);
    }
    match &tags.keywords {
        Some(KeywordField::Single(kw)) => push(kw.as_str()),
        Some(KeywordField::List(list)) => list.iter().for_each(|kw| push(kw.as_str())),
        None => {}
    }
    tags.xmp_subjects.iter().for_each(|kw| push(kw.as_str()));

    keywords
}

const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\x00";
const IPTC_RESOURCE_ID: u16 = 0x0404;
/// IPTC-IIM 中关键字的 (record, dataset)
const IPTC_KEYWORDS: (u8, u8) = (2, 25);
const XMP_OPEN: &[u8] = b"<x:xmpmeta";
const XMP_CLOSE: &[u8] = b"</x:xmpmeta>";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// 文件字节中嵌入的关键字块（IPTC、XMP），与 EXIF 分开扫描
fn read_embedded_keywords(bytes: &[u8], tags: &mut RawTags) {
    let iptc = iptc_keywords(bytes);
    if !iptc.is_empty() {
        tags.keywords = Some(KeywordField::List(iptc));
    }
    if let Some(packet) = xmp_packet(bytes) {
        tags.xmp_subjects = xmp_subjects(packet);
    }
}

fn locate(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn be_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(..2)?.try_into().ok()?))
}

fn be_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?))
}

/// Photoshop 图像资源块（8BIM）：产出 (资源 ID, 数据)
struct ImageResources<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for ImageResources<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = locate(self.data, b"8BIM")? + 4;
        let header = &self.data[start..];
        let id = be_u16(header)?;
        // pascal 字符串名称，连同长度字节补齐为偶数
        let name_len = *header.get(2)? as usize;
        let size_at = 2 + ((name_len + 2) & !1);
        let size = be_u32(header.get(size_at..)?)? as usize;
        let body_at = size_at + 4;
        let body = header.get(body_at..body_at.checked_add(size)?)?;
        let next_at = (body_at + size + (size & 1)).min(header.len());
        self.data = &header[next_at..];
        Some((id, body))
    }
}

/// IPTC-IIM 数据集：产出 (record, dataset, 值)
struct IptcDataSets<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for IptcDataSets<'a> {
    type Item = (u8, u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.data.iter().position(|&b| b == 0x1C)?;
        let entry = self.data.get(start..start + 5)?;
        let (record, dataset) = (entry[1], entry[2]);
        let len = be_u16(&entry[3..])? as usize;
        let value_at = start + 5;
        let value = self.data.get(value_at..value_at + len)?;
        self.data = &self.data[value_at + len..];
        Some((record, dataset, value))
    }
}

/// 非 UTF-8 时按 Latin-1 解码
fn decode_iptc_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    }
}

/// IPTC 关键字（JPEG APP13 段中的 Photoshop 资源）
fn iptc_keywords(bytes: &[u8]) -> Vec<String> {
    let Some(at) = locate(bytes, PHOTOSHOP_SIGNATURE) else {
        return Vec::new();
    };
    let resources = ImageResources {
        data: &bytes[at + PHOTOSHOP_SIGNATURE.len()..],
    };
    resources
        .filter(|(id, _)| *id == IPTC_RESOURCE_ID)
        .flat_map(|(_, block)| IptcDataSets { data: block })
        .filter(|(record, dataset, _)| (*record, *dataset) == IPTC_KEYWORDS)
        .map(|(_, _, raw)| decode_iptc_text(raw).trim().to_string())
        .filter(|kw| !kw.is_empty())
        .collect()
}

/// 文件中的 XMP 包（x:xmpmeta 元素）
fn xmp_packet(bytes: &[u8]) -> Option<&str> {
    let start = locate(bytes, XMP_OPEN)?;
    let end = start + locate(&bytes[start..], XMP_CLOSE)? + XMP_CLOSE.len();
    std::str::from_utf8(&bytes[start..end]).ok()
}

/// dc:subject 下的 rdf:li 条目
fn xmp_subjects(xml: &str) -> Vec<String> {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            log::debug!("XMP 解析失败: {}", e);
            return Vec::new();
        }
    };
    doc.descendants()
        .filter(|n| n.has_tag_name((DC_NS, "subject")))
        .flat_map(|subject| subject.descendants())
        .filter(|n| n.has_tag_name((RDF_NS, "li")))
        .filter_map(|li| li.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}
