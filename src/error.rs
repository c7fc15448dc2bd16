// 错误类型定义
// 图库核心操作的领域错误，命令层会将其转换为字符串返回前端

use thiserror::Error;
use uuid::Uuid;

use crate::upload::UploadStatus;

/// 图库操作错误
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("相册已存在: {0}")]
    AlbumExists(String),

    #[error("相册名称不能为空")]
    BlankAlbumName,

    #[error("相册不存在: {0}")]
    AlbumNotFound(String),

    #[error("文件不存在: {0}")]
    FileNotFound(Uuid),

    #[error("上传任务不存在: {0}")]
    UploadNotFound(String),

    #[error("非法的上传状态转换: {from:?} -> {to:?}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    #[error("分享信息不完整: {0}")]
    ShareValidation(String),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置失败: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("配置无效: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, GalleryError>;
