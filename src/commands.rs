// Tauri 命令模块
// 暴露给前端调用的所有命令：导入与上传、画廊视图、地图、相册、标签、分享、下载

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Manager};
use uuid::Uuid;

use crate::config::GalleryConfig;
use crate::density::{self, ClusterIcon, ClusterPreview, ClusterStyle, MapController};
use crate::download::{self, DownloadReport};
use crate::geo::{self, ClusterEngine, GeoBounds, GeoPoint, GridClusterer};
use crate::ingest::{self, IngestReport};
use crate::library::{Album, Library, TagEntry};
use crate::memories::{self, Memory};
use crate::metadata::{self, ExifTagReader, TagReader};
use crate::models::{FileKey, GeoCoordinate, MediaFile, PhotoMetadata};
use crate::preview::{PreviewRegistry, PreviewSlot};
use crate::scanner;
use crate::share::{self, ShareRequest, SharedDetails};
use crate::slideshow::{Slideshow, SlideshowAction, SlideshowPlayer, SlideshowView};
use crate::thumbnail;
use crate::upload::{ProgressCallback, UploadSimulator, UploadSummary, UploadTask};
use crate::view::{self, ViewQuery};

/// 全局应用状态
pub struct AppState {
    pub library: Mutex<Library>,
    pub config: GalleryConfig,
    /// 当前的上传会话
    pub uploads: Mutex<Option<UploadSimulator>>,
    pub previews: PreviewRegistry,
    /// 详情页的预览地址
    pub detail_preview: Mutex<PreviewSlot>,
    pub slideshow: Mutex<Option<SlideshowPlayer>>,
    pub tag_reader: Arc<dyn TagReader>,
}

impl AppState {
    pub fn new(config: GalleryConfig) -> Self {
        let previews = PreviewRegistry::new();
        Self {
            library: Mutex::new(Library::new()),
            config,
            uploads: Mutex::new(None),
            detail_preview: Mutex::new(PreviewSlot::new(previews.clone())),
            previews,
            slideshow: Mutex::new(None),
            tag_reader: Arc::new(ExifTagReader),
        }
    }
}

fn err(e: impl std::fmt::Display) -> String {
    e.to_string()
}

// === 导入与上传 ===

/// 校验选中的文件并开始模拟上传，进度通过 upload-progress 事件推送
#[tauri::command]
pub async fn add_files(app: AppHandle, paths: Vec<String>) -> Result<IngestReport, String> {
    let incoming = tokio::task::spawn_blocking(move || {
        paths
            .iter()
            .filter_map(|p| match scanner::media_file_from_path(Path::new(p)) {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("读取文件信息失败 {}: {}", p, e);
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| format!("读取文件失败: {}", e))?;

    let state = app.state::<AppState>();
    let report = {
        let library = state.library.lock();
        ingest::validate_batch(&state.config, library.files(), incoming)
    };

    if !report.accepted.is_empty() {
        let handle = app.clone();
        let on_progress: ProgressCallback = Arc::new(move |task: &UploadTask| {
            let _ = handle.emit("upload-progress", task);
        });
        let simulator = UploadSimulator::start_with_callback(
            report.accepted.clone(),
            state.config.clone(),
            Some(on_progress),
        );
        // 旧会话被替换时其计时器随 Drop 停止
        *state.uploads.lock() = Some(simulator);
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadAction {
    Pause,
    Resume,
    Cancel,
}

#[tauri::command]
pub async fn control_upload(
    app: AppHandle,
    key: String,
    action: UploadAction,
) -> Result<UploadTask, String> {
    let state = app.state::<AppState>();
    let mut uploads = state.uploads.lock();
    let simulator = uploads.as_mut().ok_or("没有进行中的上传")?;
    let task = match action {
        UploadAction::Pause => simulator.pause(&key),
        UploadAction::Resume => simulator.resume(&key),
        UploadAction::Cancel => simulator.cancel(&key),
    };
    task.map_err(err)
}

#[tauri::command]
pub async fn upload_summary(app: AppHandle) -> Result<Option<UploadSummary>, String> {
    let state = app.state::<AppState>();
    let summary = state.uploads.lock().as_ref().map(|s| s.summary());
    Ok(summary)
}

/// 关闭上传界面：已完成的文件并入图库并开始读取元数据
#[tauri::command]
pub async fn finish_upload(app: AppHandle) -> Result<Vec<MediaFile>, String> {
    let state = app.state::<AppState>();
    let simulator = state.uploads.lock().take();
    let completed = match simulator {
        Some(simulator) => simulator.close(),
        None => return Ok(Vec::new()),
    };

    let pending = {
        let mut library = state.library.lock();
        library.complete_upload(completed.clone());
        library.take_pending_metadata()
    };
    spawn_metadata_extraction(&app, pending);
    Ok(completed)
}

fn spawn_metadata_extraction(app: &AppHandle, files: Vec<MediaFile>) {
    let reader = app.state::<AppState>().tag_reader.clone();
    for file in files {
        let app = app.clone();
        let reader = reader.clone();
        tokio::spawn(async move {
            let key = file.key();
            let metadata = metadata::extract_photo_metadata(reader, file).await;
            apply_metadata(&app, key, metadata);
        });
    }
}

fn apply_metadata(app: &AppHandle, key: FileKey, metadata: PhotoMetadata) {
    let state = app.state::<AppState>();
    let applied = state.library.lock().apply_metadata(key.clone(), metadata);
    if applied {
        let _ = app.emit("metadata-loaded", &key);
    }
}

#[derive(Debug, Serialize)]
pub struct FolderImportResult {
    pub report: IngestReport,
    pub added: usize,
}

/// 导入整个文件夹：不经过上传动画，直接并入图库并批量读取元数据
#[tauri::command]
pub async fn import_folder(
    app: AppHandle,
    source_dir: String,
    include_subdirs: bool,
) -> Result<FolderImportResult, String> {
    let dir = PathBuf::from(&source_dir);
    let incoming = tokio::task::spawn_blocking(move || scanner::import_folder(&dir, include_subdirs))
        .await
        .map_err(|e| format!("扫描任务失败: {}", e))?;

    let state = app.state::<AppState>();
    let (report, added, pending) = {
        let mut library = state.library.lock();
        let report = ingest::validate_batch(&state.config, library.files(), incoming);
        let added = library.complete_upload(report.accepted.clone());
        (report, added, library.take_pending_metadata())
    };

    let reader = state.tag_reader.clone();
    let app_handle = app.clone();
    tokio::task::spawn_blocking(move || {
        let results = metadata::extract_batch(reader.as_ref(), &pending);
        for (key, metadata) in results {
            apply_metadata(&app_handle, key, metadata);
        }
    });

    Ok(FolderImportResult { report, added })
}

// === 画廊 ===

#[derive(Debug, Clone, Serialize)]
pub struct GalleryView {
    pub files: Vec<MediaFile>,
    pub total: usize,
    pub top_tags: Vec<String>,
    pub is_loading_metadata: bool,
}

#[tauri::command]
pub async fn query_gallery(app: AppHandle, query: ViewQuery) -> Result<GalleryView, String> {
    let state = app.state::<AppState>();
    let library = state.library.lock();
    let index = library.index();
    let files = view::build_view(library.files(), &query, &index);
    let top_tags = view::top_tags(&files, &index, state.config.top_tag_count);
    Ok(GalleryView {
        files: files.into_iter().cloned().collect(),
        total: library.files().len(),
        top_tags,
        is_loading_metadata: library.is_loading_metadata(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDetails {
    pub file: MediaFile,
    pub metadata: Option<PhotoMetadata>,
    pub location: Option<GeoCoordinate>,
    pub tags: Vec<TagEntry>,
    pub preview_url: String,
}

/// 打开详情页，上一个文件的预览地址先被回收
#[tauri::command]
pub async fn open_details(app: AppHandle, id: Uuid) -> Result<FileDetails, String> {
    let state = app.state::<AppState>();
    let library = state.library.lock();
    let file = library.file(id).cloned().ok_or("文件不存在")?;
    let index = library.index();
    let preview_url = state.detail_preview.lock().show(&file).to_string();
    Ok(FileDetails {
        metadata: index.metadata(&file).cloned(),
        location: index.location(&file),
        tags: library.tags_for(id).map_err(err)?,
        preview_url,
        file,
    })
}

#[tauri::command]
pub async fn close_details(app: AppHandle) -> Result<(), String> {
    app.state::<AppState>().detail_preview.lock().clear();
    Ok(())
}

/// 读取预览地址对应的文件内容
#[tauri::command]
pub async fn read_preview(app: AppHandle, url: String) -> Result<Vec<u8>, String> {
    let file = app
        .state::<AppState>()
        .previews
        .resolve(&url)
        .ok_or("预览地址已失效")?;
    tokio::task::spawn_blocking(move || file.read_bytes().map(|b| b.to_vec()))
        .await
        .map_err(err)?
        .map_err(err)
}

#[tauri::command]
pub async fn get_thumbnail(app: AppHandle, id: Uuid) -> Result<Option<String>, String> {
    let state = app.state::<AppState>();
    let file = state.library.lock().file(id).cloned().ok_or("文件不存在")?;
    let max_size = state.config.thumbnail_max_size;
    tokio::task::spawn_blocking(move || thumbnail::thumbnail_for(&file, max_size))
        .await
        .map_err(err)
}

#[tauri::command]
pub async fn delete_files(app: AppHandle, ids: Vec<Uuid>) -> Result<usize, String> {
    let state = app.state::<AppState>();
    let removed = state.library.lock().delete_files(&ids);
    state.detail_preview.lock().release_deleted(&ids);
    Ok(removed)
}

#[tauri::command]
pub async fn set_location(app: AppHandle, id: Uuid, location: GeoCoordinate) -> Result<(), String> {
    let state = app.state::<AppState>();
    let result = state.library.lock().set_custom_location(id, location);
    result.map_err(err)
}

#[tauri::command]
pub async fn add_tag(app: AppHandle, id: Uuid, tag: String) -> Result<Vec<TagEntry>, String> {
    let state = app.state::<AppState>();
    let mut library = state.library.lock();
    library.add_custom_tag(id, &tag).map_err(err)?;
    library.tags_for(id).map_err(err)
}

#[tauri::command]
pub async fn remove_tag(app: AppHandle, id: Uuid, tag: String) -> Result<Vec<TagEntry>, String> {
    let state = app.state::<AppState>();
    let mut library = state.library.lock();
    library.remove_custom_tag(id, &tag).map_err(err)?;
    library.tags_for(id).map_err(err)
}

#[tauri::command]
pub async fn get_memories(app: AppHandle) -> Result<Vec<Memory>, String> {
    let state = app.state::<AppState>();
    let library = state.library.lock();
    let today = chrono::Local::now().date_naive();
    Ok(memories::find_memories(library.files(), &library.index(), today))
}

// === 地图 ===

#[derive(Debug, Clone, Serialize)]
pub struct MapData {
    pub points: Vec<GeoPoint>,
    pub bounds: Option<GeoBounds>,
    pub fit_padding: u32,
}

#[tauri::command]
pub async fn map_points(app: AppHandle) -> Result<MapData, String> {
    let points = current_points(&app);
    Ok(MapData {
        bounds: geo::bounds(&points),
        points,
        fit_padding: density::FIT_ALL_PADDING,
    })
}

fn current_points(app: &AppHandle) -> Vec<GeoPoint> {
    let state = app.state::<AppState>();
    let library = state.library.lock();
    geo::project_points(library.files(), &library.index())
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub icon: ClusterIcon,
    pub center: GeoCoordinate,
    pub bounds: GeoBounds,
    pub file_ids: Vec<Uuid>,
}

#[tauri::command]
pub async fn map_clusters(
    app: AppHandle,
    zoom: u8,
    style: ClusterStyle,
) -> Result<Vec<ClusterView>, String> {
    let saturation = app.state::<AppState>().config.heatmap_saturation_density;
    let points = current_points(&app);
    let clusters = GridClusterer::default().cluster(&points, zoom);
    Ok(clusters
        .iter()
        .map(|c| ClusterView {
            icon: style.icon(c, saturation),
            center: c.center(),
            bounds: c.bounds,
            file_ids: c.points.iter().map(|p| p.file.id).collect(),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
struct FlyTo {
    bounds: GeoBounds,
    padding: u32,
}

/// 通过 map-fly-to 事件驱动前端地图控件
struct EventMapController {
    app: AppHandle,
}

impl MapController for EventMapController {
    fn fly_to_bounds(&self, bounds: GeoBounds, padding: u32) {
        let _ = self.app.emit("map-fly-to", &FlyTo { bounds, padding });
    }
}

/// 点击聚类：先飞到聚类范围，稍后返回预览
#[tauri::command]
pub async fn open_cluster(app: AppHandle, zoom: u8, index: usize) -> Result<ClusterPreview, String> {
    let points = current_points(&app);
    let cluster = GridClusterer::default()
        .cluster(&points, zoom)
        .into_iter()
        .nth(index)
        .ok_or("聚类不存在")?;
    let delay = app.state::<AppState>().config.cluster_preview_delay();
    let map = EventMapController { app: app.clone() };
    Ok(density::open_cluster(&map, &cluster, delay).await)
}

// === 相册 ===

#[tauri::command]
pub async fn list_albums(app: AppHandle) -> Result<Vec<Album>, String> {
    Ok(app.state::<AppState>().library.lock().albums().to_vec())
}

#[tauri::command]
pub async fn create_album(app: AppHandle, name: String) -> Result<(), String> {
    let state = app.state::<AppState>();
    let result = state.library.lock().create_album(&name);
    result.map_err(err)
}

#[tauri::command]
pub async fn add_to_album(app: AppHandle, name: String, ids: Vec<Uuid>) -> Result<usize, String> {
    let state = app.state::<AppState>();
    let result = state.library.lock().add_to_album(&name, &ids);
    result.map_err(err)
}

#[tauri::command]
pub async fn album_files(app: AppHandle, name: String) -> Result<Vec<MediaFile>, String> {
    let state = app.state::<AppState>();
    let result = state.library.lock().album_files(&name);
    result.map_err(err)
}

// === 分享与下载 ===

#[tauri::command]
pub async fn share_files(
    app: AppHandle,
    ids: Vec<Uuid>,
    request: ShareRequest,
) -> Result<SharedDetails, String> {
    let state = app.state::<AppState>();
    let files = state.library.lock().files_by_ids(&ids);
    let details = share::simulate_share(files, request, state.config.share_delay())
        .await
        .map_err(err)?;
    state.library.lock().record_share(details.clone());
    Ok(details)
}

#[tauri::command]
pub async fn sharing_history(app: AppHandle) -> Result<Vec<SharedDetails>, String> {
    Ok(app.state::<AppState>().library.lock().sharing_history().to_vec())
}

/// 超过 5 个文件时需要前端先确认
#[tauri::command]
pub async fn download_files(
    app: AppHandle,
    ids: Vec<Uuid>,
    target_dir: String,
    confirmed: bool,
) -> Result<DownloadReport, String> {
    if download::needs_confirmation(ids.len()) && !confirmed {
        return Err(format!("将下载 {} 个文件，请先确认", ids.len()));
    }
    let files = app.state::<AppState>().library.lock().files_by_ids(&ids);
    tokio::task::spawn_blocking(move || download::download_files(&files, Path::new(&target_dir)))
        .await
        .map_err(|e| format!("下载任务失败: {}", e))?
        .map_err(err)
}

// === 幻灯片 ===

#[tauri::command]
pub async fn start_slideshow(app: AppHandle, ids: Vec<Uuid>) -> Result<SlideshowView, String> {
    let state = app.state::<AppState>();
    let files = state.library.lock().files_by_ids(&ids);
    let show = Slideshow::new(&files, state.config.slideshow_interval());
    if show.is_empty() {
        return Err("没有可播放的图片或视频".to_string());
    }
    // 旧的播放器被替换时回收其预览地址
    let view = {
        let mut slot = state.slideshow.lock();
        let player = slot.insert(SlideshowPlayer::start(show, state.previews.clone()));
        player.view()
    };
    schedule_auto_advance(&app, &view);
    Ok(view)
}

#[tauri::command]
pub async fn slideshow_action(
    app: AppHandle,
    action: SlideshowAction,
) -> Result<Option<SlideshowView>, String> {
    let state = app.state::<AppState>();
    let view = {
        let mut slot = state.slideshow.lock();
        if let SlideshowAction::Stop = action {
            *slot = None;
            return Ok(None);
        }
        let player = slot.as_mut().ok_or("幻灯片未开始")?;
        player.apply(action);
        player.view()
    };
    schedule_auto_advance(&app, &view);
    Ok(Some(view))
}

/// 图片页到时自动前进，并通过 slideshow-changed 事件推送新状态
fn schedule_auto_advance(app: &AppHandle, view: &SlideshowView) {
    let Some(delay_ms) = view.auto_advance_ms else {
        return;
    };
    let generation = view.generation;
    let app = app.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        let next = {
            let state = app.state::<AppState>();
            let mut slot = state.slideshow.lock();
            match slot.as_mut() {
                Some(player) if player.auto_advance(generation) => Some(player.view()),
                _ => None,
            }
        };
        if let Some(view) = next {
            let _ = app.emit("slideshow-changed", &view);
            schedule_auto_advance(&app, &view);
        }
    });
}
