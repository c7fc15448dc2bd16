// 文件夹导入模块
// 遍历文件夹，按扩展名推断 MIME 类型，生成媒体文件句柄

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::models::MediaFile;

/// 扩展名到 MIME 类型
const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("avif", "image/avif"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("json", "application/json"),
    ("zip", "application/zip"),
];

/// 按扩展名推断 MIME 类型，未知时为空字符串
pub fn mime_from_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension() else {
        return "";
    };
    let ext_lower = ext.to_string_lossy().to_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext_lower)
        .map(|(_, mime)| *mime)
        .unwrap_or("")
}

/// 扫描指定文件夹中的所有文件
pub fn scan_files(source_dir: &Path, include_subdirs: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(source_dir);
    let walker = if include_subdirs {
        walker
    } else {
        walker.max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// 为磁盘文件生成句柄：名称、大小、修改时间、推断的类型
pub fn media_file_from_path(path: &Path) -> std::io::Result<MediaFile> {
    let meta = std::fs::metadata(path)?;
    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let last_modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(MediaFile::from_path(
        path.to_path_buf(),
        name,
        meta.len(),
        mime_from_path(path),
        last_modified,
    ))
}

/// 导入文件夹，读取失败的文件记录日志后跳过
pub fn import_folder(source_dir: &Path, include_subdirs: bool) -> Vec<MediaFile> {
    let paths = scan_files(source_dir, include_subdirs);
    log::info!("在 {} 中找到 {} 个文件", source_dir.display(), paths.len());

    paths
        .iter()
        .filter_map(|path| match media_file_from_path(path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("读取文件信息失败 {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_path(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(mime_from_path(Path::new("noext")), "");
        assert_eq!(mime_from_path(Path::new("x.unknown")), "");
    }

    #[test]
    fn test_import_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"12345").unwrap();
        fs::write(dir.path().join("b.pdf"), b"1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.mp4"), b"12").unwrap();

        let top = import_folder(dir.path(), false);
        let names: Vec<_> = top.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.pdf"]);
        assert_eq!(top[0].size, 5);
        assert_eq!(top[0].mime_type, "image/jpeg");
        assert!(top[0].last_modified > 0);
        assert_eq!(&top[0].read_bytes().unwrap()[..], b"12345");

        let all = import_folder(dir.path(), true);
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|f| f.name == "c.mp4" && f.is_video()));
    }
}
