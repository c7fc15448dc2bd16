// 分享模拟模块
// 校验收发件人后等待固定延迟，返回分享回执

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{GalleryError, Result};
use crate::models::{format_bytes, MediaFile};

/// 分享表单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareRequest {
    pub recipient_email: String,
    pub sender_email: String,
    #[serde(default)]
    pub message: String,
}

impl ShareRequest {
    /// 两个邮箱都必须填写
    pub fn validate(&self) -> Result<()> {
        if self.recipient_email.trim().is_empty() || self.sender_email.trim().is_empty() {
            return Err(GalleryError::ShareValidation(
                "请填写收件人和发件人邮箱".to_string(),
            ));
        }
        Ok(())
    }
}

/// 分享回执，同时记入分享历史
#[derive(Debug, Clone, Serialize)]
pub struct SharedDetails {
    pub files: Vec<MediaFile>,
    pub recipient_email: String,
    pub sender_email: String,
    pub message: String,
    pub shared_at: DateTime<Local>,
}

impl SharedDetails {
    pub fn total_size(&self) -> u64 {
        total_size(&self.files)
    }
}

pub fn total_size(files: &[MediaFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

/// 模拟发送：校验失败立即返回，成功则在延迟后给出回执
pub async fn simulate_share(
    files: Vec<MediaFile>,
    request: ShareRequest,
    delay: Duration,
) -> Result<SharedDetails> {
    request.validate()?;
    tokio::time::sleep(delay).await;

    log::info!(
        "已分享 {} 个文件 ({}) 给 {}",
        files.len(),
        format_bytes(total_size(&files), 1),
        request.recipient_email
    );
    Ok(SharedDetails {
        files,
        recipient_email: request.recipient_email,
        sender_email: request.sender_email,
        message: request.message,
        shared_at: Local::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;

    fn request(to: &str, from: &str) -> ShareRequest {
        ShareRequest {
            recipient_email: to.to_string(),
            sender_email: from.to_string(),
            message: "看看这些".to_string(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(request("a@x.com", "b@x.com").validate().is_ok());
        assert!(matches!(
            request("", "b@x.com").validate(),
            Err(GalleryError::ShareValidation(_))
        ));
        assert!(request("a@x.com", "  ").validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_waits_for_delay() {
        let files = vec![
            MediaFile::from_bytes("a.jpg", "image/jpeg", 0, vec![0u8; 10]),
            MediaFile::from_bytes("b.jpg", "image/jpeg", 0, vec![0u8; 5]),
        ];
        let start = tokio::time::Instant::now();
        let details = simulate_share(files, request("a@x.com", "b@x.com"), Duration::from_millis(1500))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(details.files.len(), 2);
        assert_eq!(details.total_size(), 15);
        assert_eq!(details.message, "看看这些");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_share_fails_fast() {
        let start = tokio::time::Instant::now();
        let result = simulate_share(vec![], request("", ""), Duration::from_millis(1500)).await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_newest_first() {
        let mut library = Library::new();
        for to in ["first@x.com", "second@x.com"] {
            let details = simulate_share(vec![], request(to, "me@x.com"), Duration::from_millis(10))
                .await
                .unwrap();
            library.record_share(details);
        }
        let recipients: Vec<_> = library
            .sharing_history()
            .iter()
            .map(|d| d.recipient_email.as_str())
            .collect();
        assert_eq!(recipients, vec!["second@x.com", "first@x.com"]);
    }
}
