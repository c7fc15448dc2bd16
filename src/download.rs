// 文件下载模块
// 把选中文件按原文件名保存到目标文件夹，同名时加数字后缀

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::models::MediaFile;

/// 超过这个数量的下载需要用户确认
pub const CONFIRM_DOWNLOAD_THRESHOLD: usize = 5;

pub fn needs_confirmation(count: usize) -> bool {
    count > CONFIRM_DOWNLOAD_THRESHOLD
}

/// 单个文件的保存结果
#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize)]
pub struct DownloadReport {
    pub saved: Vec<SavedFile>,
    pub errors: Vec<String>,
}

/// 保存一批文件，单个文件失败不影响其余文件
pub fn download_files(files: &[MediaFile], target_dir: &Path) -> Result<DownloadReport> {
    // 确保目标文件夹存在
    if !target_dir.exists() {
        fs::create_dir_all(target_dir)?;
    }

    let mut report = DownloadReport::default();
    for file in files {
        match save_file(file, target_dir) {
            Ok(path) => report.saved.push(SavedFile {
                name: file.name.clone(),
                path,
            }),
            Err(e) => {
                log::error!("保存文件失败 {}: {}", file.name, e);
                report.errors.push(format!("\"{}\" 保存失败: {}", file.name, e));
            }
        }
    }

    log::info!(
        "下载到 {}: {} 个成功, {} 个失败",
        target_dir.display(),
        report.saved.len(),
        report.errors.len()
    );
    Ok(report)
}

fn save_file(file: &MediaFile, target_dir: &Path) -> Result<PathBuf> {
    let bytes = file.read_bytes()?;
    let dest = resolve_filename_conflict(target_dir, &safe_file_name(&file.name));
    fs::write(&dest, &bytes[..])?;
    Ok(dest)
}

/// 去掉文件名中的路径部分
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// 解决文件名冲突：如果目标已存在同名文件，添加数字后缀
fn resolve_filename_conflict(dir: &Path, filename: &str) -> PathBuf {
    let dest = dir.join(filename);
    if !dest.exists() {
        return dest;
    }

    let path = Path::new(filename);
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
