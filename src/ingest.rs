// 文件导入校验模块
// 按大小上限和类型白名单过滤一批新文件，并跳过图库中已有的文件

use serde::Serialize;

use crate::config::GalleryConfig;
use crate::models::{format_bytes, MediaFile};

/// 一批文件的校验结果
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    /// 通过校验且图库中不存在的文件
    pub accepted: Vec<MediaFile>,
    /// 逐个文件的错误提示
    pub errors: Vec<String>,
    /// 因重复被跳过的数量
    pub duplicates: usize,
}

/// 校验一批文件
/// 无效文件只产生错误提示，不影响同一批中的有效文件
pub fn validate_batch(
    config: &GalleryConfig,
    existing: &[MediaFile],
    incoming: Vec<MediaFile>,
) -> IngestReport {
    let mut report = IngestReport::default();
    let max_bytes = config.max_file_size_bytes();

    for file in incoming {
        if file.size > max_bytes {
            log::warn!("文件过大，已拒绝: {} ({})", file.name, format_bytes(file.size, 1));
            report.errors.push(format!(
                "\"{}\" 超过 {}MB 大小限制",
                file.name, config.max_file_size_mb
            ));
            continue;
        }
        // 部分系统不上报类型，空类型放行
        if !file.mime_type.is_empty()
            && !config.allowed_mime_types.iter().any(|t| *t == file.mime_type)
        {
            log::warn!("不支持的文件类型: {} ({})", file.name, file.mime_type);
            report.errors.push(format!(
                "\"{}\" 的文件类型不受支持 ({})",
                file.name, file.mime_type
            ));
            continue;
        }

        let duplicate = existing
            .iter()
            .chain(report.accepted.iter())
            .any(|f| f.same_content_as(&file));
        if duplicate {
            report.duplicates += 1;
            continue;
        }
        report.accepted.push(file);
    }

    if !report.accepted.is_empty() || !report.errors.is_empty() {
        log::info!(
            "导入校验: {} 个通过, {} 个错误, {} 个重复",
            report.accepted.len(),
            report.errors.len(),
            report.duplicates
        );
    }
    report
}
