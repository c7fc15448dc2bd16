// 幻灯片模块
// 只播放图片和视频，前后循环切换；图片按间隔自动前进，视频播放结束后前进

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::MediaFile;
use crate::preview::{PreviewRegistry, PreviewSlot};

#[derive(Debug, Clone, Serialize)]
pub struct Slideshow {
    files: Vec<MediaFile>,
    current: usize,
    playing: bool,
    #[serde(with = "millis")]
    interval: Duration,
}

impl Slideshow {
    /// 过滤出可播放的文件，默认处于播放状态
    pub fn new(files: &[MediaFile], interval: Duration) -> Self {
        Self {
            files: files
                .iter()
                .filter(|f| f.is_image() || f.is_video())
                .cloned()
                .collect(),
            current: 0,
            playing: true,
            interval,
        }
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn current(&self) -> Option<&MediaFile> {
        self.files.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next(&mut self) -> Option<&MediaFile> {
        if !self.files.is_empty() {
            self.current = (self.current + 1) % self.files.len();
        }
        self.current()
    }

    pub fn prev(&mut self) -> Option<&MediaFile> {
        if !self.files.is_empty() {
            let len = self.files.len();
            self.current = (self.current + len - 1) % len;
        }
        self.current()
    }

    pub fn toggle_play(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// 当前页自动前进前的等待时间
    /// 暂停、空列表或当前是视频时为 None
    pub fn auto_advance_delay(&self) -> Option<Duration> {
        let file = self.current()?;
        if !self.playing || file.is_video() {
            return None;
        }
        Some(self.interval)
    }

    /// 视频播放结束，播放中时前进
    pub fn on_video_ended(&mut self) -> Option<&MediaFile> {
        if self.playing {
            self.next()
        } else {
            self.current()
        }
    }
}

/// 幻灯片操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SlideshowAction {
    Next,
    Prev,
    TogglePlay,
    VideoEnded,
    SetInterval { millis: u64 },
    Stop,
}

/// 前端渲染用的幻灯片状态
#[derive(Debug, Clone, Serialize)]
pub struct SlideshowView {
    #[serde(flatten)]
    pub show: Slideshow,
    pub preview_url: Option<String>,
    /// 当前页自动前进前的等待（毫秒）
    pub auto_advance_ms: Option<u64>,
    pub generation: u64,
}

/// 正在播放的幻灯片，持有当前页的预览地址
/// 换页时先回收旧地址，关闭（Drop）时回收最后一个
#[derive(Debug)]
pub struct SlideshowPlayer {
    show: Slideshow,
    preview: PreviewSlot,
    /// 每次状态变化加一，用来作废过期的自动前进计时
    generation: u64,
}

impl SlideshowPlayer {
    pub fn start(show: Slideshow, registry: PreviewRegistry) -> Self {
        let mut player = Self {
            show,
            preview: PreviewSlot::new(registry),
            generation: 0,
        };
        player.refresh_preview();
        player
    }

    pub fn slideshow(&self) -> &Slideshow {
        &self.show
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.url()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 执行一个操作，Stop 由调用方丢弃播放器完成
    pub fn apply(&mut self, action: SlideshowAction) {
        let before = self.show.current_index();
        match action {
            SlideshowAction::Next => {
                self.show.next();
            }
            SlideshowAction::Prev => {
                self.show.prev();
            }
            SlideshowAction::VideoEnded => {
                self.show.on_video_ended();
            }
            SlideshowAction::TogglePlay => {
                self.show.toggle_play();
            }
            SlideshowAction::SetInterval { millis } => {
                self.show.set_interval(Duration::from_millis(millis));
            }
            SlideshowAction::Stop => {
                self.preview.clear();
            }
        }
        if self.show.current_index() != before {
            self.refresh_preview();
        }
        self.generation += 1;
    }

    /// 自动前进计时到期；期间状态有变化时忽略
    pub fn auto_advance(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.show.auto_advance_delay().is_none() {
            return false;
        }
        self.apply(SlideshowAction::Next);
        true
    }

    pub fn view(&self) -> SlideshowView {
        SlideshowView {
            show: self.show.clone(),
            preview_url: self.preview_url().map(str::to_string),
            auto_advance_ms: self.show.auto_advance_delay().map(|d| d.as_millis() as u64),
            generation: self.generation,
        }
    }

    fn refresh_preview(&mut self) {
        match self.show.current() {
            Some(file) => {
                self.preview.show(file);
            }
            None => self.preview.clear(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
