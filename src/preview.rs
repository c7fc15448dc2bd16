// 预览资源模块
// 为文件创建可在界面中引用的预览地址，句柄释放时回收，且每个地址只回收一次

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::MediaFile;

const URL_PREFIX: &str = "preview://";

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    live: HashMap<u64, MediaFile>,
    created: u64,
    revoked: u64,
}

/// 预览地址登记表
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file: &MediaFile) -> PreviewHandle {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        inner.created += 1;
        let id = inner.next_id;
        inner.live.insert(id, file.clone());
        PreviewHandle {
            id,
            url: format!("{}{}", URL_PREFIX, id),
            registry: self.clone(),
        }
    }

    /// 地址对应的文件，已回收时为 None
    pub fn resolve(&self, url: &str) -> Option<MediaFile> {
        let id: u64 = url.strip_prefix(URL_PREFIX)?.parse().ok()?;
        self.inner.lock().live.get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn created_count(&self) -> u64 {
        self.inner.lock().created
    }

    pub fn revoked_count(&self) -> u64 {
        self.inner.lock().revoked
    }

    fn revoke(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.live.remove(&id).is_some() {
            inner.revoked += 1;
        } else {
            log::warn!("预览地址已回收: {}{}", URL_PREFIX, id);
        }
    }
}

/// 预览地址句柄，Drop 时回收
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    url: String,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

/// 单个预览位置（详情页、弹窗），换文件时先回收旧地址
#[derive(Debug)]
pub struct PreviewSlot {
    registry: PreviewRegistry,
    handle: Option<PreviewHandle>,
    file_id: Option<Uuid>,
}

impl PreviewSlot {
    pub fn new(registry: PreviewRegistry) -> Self {
        Self {
            registry,
            handle: None,
            file_id: None,
        }
    }

    pub fn show(&mut self, file: &MediaFile) -> &str {
        self.handle.take();
        self.file_id = Some(file.id);
        let handle = self.handle.insert(self.registry.create(file));
        handle.url()
    }

    pub fn clear(&mut self) {
        self.handle = None;
        self.file_id = None;
    }

    /// 正在显示的文件被删除时回收
    pub fn release_deleted(&mut self, deleted: &[Uuid]) -> bool {
        match self.file_id {
            Some(id) if deleted.contains(&id) => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.url())
    }
}
