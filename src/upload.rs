// 上传模拟模块
// 每个文件一个定时任务推进进度，支持暂停、继续、取消，关闭时返回已完成的文件

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::config::GalleryConfig;
use crate::error::{GalleryError, Result};
use crate::models::MediaFile;

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Paused,
    Cancelled,
    Complete,
}

impl UploadStatus {
    /// 完成和取消是终态
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Cancelled | UploadStatus::Complete)
    }

    pub fn can_transition_to(self, to: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, to),
            (Uploading, Paused)
                | (Uploading, Cancelled)
                | (Uploading, Complete)
                | (Paused, Uploading)
                | (Paused, Cancelled)
        )
    }
}

/// 单个文件的上传任务
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub file: MediaFile,
    /// 百分比 [0, 100]
    pub progress: f64,
    pub status: UploadStatus,
}

impl UploadTask {
    pub fn new(file: MediaFile) -> Self {
        Self {
            file,
            progress: 0.0,
            status: UploadStatus::Uploading,
        }
    }

    /// 任务键：文件名-大小
    pub fn key(&self) -> String {
        upload_key(&self.file)
    }

    /// 推进一步，到达 100 时转为完成
    /// 非上传状态下不做任何事，返回是否有变化
    pub fn tick(&mut self, step: f64) -> bool {
        if self.status != UploadStatus::Uploading || self.progress >= 100.0 {
            return false;
        }
        self.progress = (self.progress + step).min(100.0);
        if self.progress >= 100.0 {
            self.status = UploadStatus::Complete;
        }
        true
    }

    fn transition(&mut self, to: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(GalleryError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn uploaded_bytes(&self) -> f64 {
        self.file.size as f64 * self.progress / 100.0
    }
}

pub fn upload_key(file: &MediaFile) -> String {
    format!("{}-{}", file.name, file.size)
}

/// 每一步的间隔：总时长按模拟速度计算且不少于最短时长，再均分到每一步
pub fn tick_interval(size: u64, config: &GalleryConfig) -> Duration {
    let speed = config.simulated_upload_speed_bps.max(1) as f64;
    let duration_ms = (size as f64 / speed * 1000.0).max(config.min_upload_duration_ms as f64);
    let step_ms = duration_ms / config.upload_steps.max(1) as f64;
    Duration::from_nanos((step_ms * 1_000_000.0).round() as u64)
}

/// 整体进度汇总
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadSummary {
    pub total_files: usize,
    pub completed_count: usize,
    pub active_count: usize,
    pub cancelled_count: usize,
    /// 不含已取消任务的文件数
    pub total_uploadable: usize,
    pub total_size: u64,
    pub total_uploaded: f64,
    pub overall_progress: f64,
    pub is_finished: bool,
}

/// 一次上传会话中的全部任务
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    tasks: Vec<UploadTask>,
}

impl UploadSession {
    pub fn new(files: Vec<MediaFile>) -> Self {
        Self {
            tasks: files.into_iter().map(UploadTask::new).collect(),
        }
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn task(&self, key: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.key() == key)
    }

    fn task_mut(&mut self, key: &str) -> Result<&mut UploadTask> {
        self.tasks
            .iter_mut()
            .find(|t| t.key() == key)
            .ok_or_else(|| GalleryError::UploadNotFound(key.to_string()))
    }

    /// 已取消的任务不计入分子和分母，暂停的任务照常计入
    pub fn summary(&self) -> UploadSummary {
        let mut summary = UploadSummary {
            total_files: self.tasks.len(),
            completed_count: 0,
            active_count: 0,
            cancelled_count: 0,
            total_uploadable: 0,
            total_size: 0,
            total_uploaded: 0.0,
            overall_progress: 0.0,
            is_finished: false,
        };

        for task in &self.tasks {
            if task.status != UploadStatus::Cancelled {
                summary.total_size += task.file.size;
                summary.total_uploaded += task.uploaded_bytes();
            }
            match task.status {
                UploadStatus::Complete => summary.completed_count += 1,
                UploadStatus::Uploading | UploadStatus::Paused => summary.active_count += 1,
                UploadStatus::Cancelled => summary.cancelled_count += 1,
            }
        }

        summary.total_uploadable = summary.total_files - summary.cancelled_count;
        if summary.total_size > 0 {
            summary.overall_progress = summary.total_uploaded / summary.total_size as f64 * 100.0;
        }
        summary.is_finished = summary.active_count == 0 && summary.total_files > 0;
        summary
    }

    pub fn completed_files(&self) -> Vec<MediaFile> {
        self.tasks
            .iter()
            .filter(|t| t.status == UploadStatus::Complete)
            .map(|t| t.file.clone())
            .collect()
    }
}

/// 进度回调，每次推进后调用
pub type ProgressCallback = Arc<dyn Fn(&UploadTask) + Send + Sync>;

/// 上传模拟器
/// 必须在 tokio 运行时中使用
pub struct UploadSimulator {
    session: Arc<Mutex<UploadSession>>,
    timers: HashMap<String, JoinHandle<()>>,
    config: GalleryConfig,
    on_progress: Option<ProgressCallback>,
}

impl UploadSimulator {
    /// 创建会话并立即开始所有上传
    pub fn start(files: Vec<MediaFile>, config: GalleryConfig) -> Self {
        Self::start_with_callback(files, config, None)
    }

    pub fn start_with_callback(
        files: Vec<MediaFile>,
        config: GalleryConfig,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        log::info!("开始上传 {} 个文件", files.len());
        let session = UploadSession::new(files);
        let keys: Vec<(String, u64)> = session
            .tasks()
            .iter()
            .map(|t| (t.key(), t.file.size))
            .collect();

        let mut simulator = Self {
            session: Arc::new(Mutex::new(session)),
            timers: HashMap::new(),
            config,
            on_progress,
        };
        for (key, size) in keys {
            simulator.spawn_timer(key, size);
        }
        simulator
    }

    fn spawn_timer(&mut self, key: String, size: u64) {
        // interval 不接受零周期
        let period = tick_interval(size, &self.config).max(Duration::from_millis(1));
        let step = 100.0 / self.config.upload_steps.max(1) as f64;
        let session = self.session.clone();
        let on_progress = self.on_progress.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let snapshot = {
                    let mut session = session.lock();
                    let Some(task) = session.tasks.iter_mut().find(|t| t.key() == task_key) else {
                        break;
                    };
                    if !task.tick(step) {
                        break;
                    }
                    task.clone()
                };
                if let Some(callback) = &on_progress {
                    callback(&snapshot);
                }
                if snapshot.status == UploadStatus::Complete {
                    log::info!("上传完成: {}", snapshot.file.name);
                    break;
                }
            }
        });

        if let Some(old) = self.timers.insert(key, handle) {
            old.abort();
        }
    }

    fn stop_timer(&mut self, key: &str) {
        if let Some(handle) = self.timers.remove(key) {
            handle.abort();
        }
    }

    fn control(&mut self, key: &str, to: UploadStatus) -> Result<UploadTask> {
        let task = {
            let mut session = self.session.lock();
            let task = session.task_mut(key)?;
            task.transition(to)?;
            task.clone()
        };
        self.stop_timer(key);
        Ok(task)
    }

    /// 暂停：停止计时，保留进度
    pub fn pause(&mut self, key: &str) -> Result<UploadTask> {
        self.control(key, UploadStatus::Paused)
    }

    /// 继续：从当前进度重新计时
    pub fn resume(&mut self, key: &str) -> Result<UploadTask> {
        let task = self.control(key, UploadStatus::Uploading)?;
        self.spawn_timer(task.key(), task.file.size);
        Ok(task)
    }

    /// 取消：停止计时，冻结进度
    pub fn cancel(&mut self, key: &str) -> Result<UploadTask> {
        let task = self.control(key, UploadStatus::Cancelled)?;
        log::info!("已取消上传: {}", task.file.name);
        Ok(task)
    }

    pub fn snapshot(&self) -> UploadSession {
        self.session.lock().clone()
    }

    pub fn summary(&self) -> UploadSummary {
        self.session.lock().summary()
    }

    /// 关闭上传界面，停止所有计时并返回已完成的文件
    pub fn close(mut self) -> Vec<MediaFile> {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        let completed = self.session.lock().completed_files();
        log::info!("上传结束: {} 个文件完成", completed.len());
        completed
    }
}

impl Drop for UploadSimulator {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
