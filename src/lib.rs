// photo-gallery - 个人照片图库
// 库入口：核心模块不依赖 Tauri，桌面端命令和插件只在 desktop 特性下注册

pub mod config;
pub mod density;
pub mod download;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod library;
pub mod memories;
pub mod metadata;
pub mod models;
pub mod preview;
pub mod scanner;
pub mod share;
pub mod slideshow;
pub mod thumbnail;
pub mod upload;
pub mod view;

#[cfg(feature = "desktop")]
mod commands;

pub use config::GalleryConfig;
pub use error::{GalleryError, Result};
pub use library::Library;

/// 配置文件名，放在应用配置目录下
#[cfg(feature = "desktop")]
const CONFIG_FILE: &str = "gallery.json";

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::AppState;
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            // 配置文件缺失或无效时使用默认值
            let config = match app.path().app_config_dir() {
                Ok(dir) if dir.join(CONFIG_FILE).exists() => {
                    GalleryConfig::load(&dir.join(CONFIG_FILE)).unwrap_or_else(|e| {
                        log::warn!("配置无效，使用默认配置: {}", e);
                        GalleryConfig::default()
                    })
                }
                _ => GalleryConfig::default(),
            };
            app.manage(AppState::new(config));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::add_files,
            commands::control_upload,
            commands::upload_summary,
            commands::finish_upload,
            commands::import_folder,
            commands::query_gallery,
            commands::open_details,
            commands::close_details,
            commands::read_preview,
            commands::get_thumbnail,
            commands::delete_files,
            commands::set_location,
            commands::add_tag,
            commands::remove_tag,
            commands::get_memories,
            commands::map_points,
            commands::map_clusters,
            commands::open_cluster,
            commands::list_albums,
            commands::create_album,
            commands::add_to_album,
            commands::album_files,
            commands::share_files,
            commands::sharing_history,
            commands::download_files,
            commands::start_slideshow,
            commands::slideshow_action,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
