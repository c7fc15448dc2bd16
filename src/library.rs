// 图库状态模块
// 唯一的状态持有者：文件列表、元数据缓存、自定义位置/标签、相册和分享记录
// 其它模块只通过只读的 LibraryIndex 读取快照

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::error::{GalleryError, Result};
use crate::models::{FileKey, GeoCoordinate, MediaFile, PhotoMetadata};
use crate::share::SharedDetails;

/// 相册：名称唯一，文件不重复
#[derive(Debug, Clone, Serialize)]
pub struct Album {
    pub name: String,
    pub file_ids: Vec<Uuid>,
}

/// 标签及其是否可删除（EXIF 关键字只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    pub tag: String,
    pub removable: bool,
}

/// 派生视图读取的只读快照
#[derive(Debug, Clone, Copy)]
pub struct LibraryIndex<'a> {
    pub metadata: &'a HashMap<FileKey, PhotoMetadata>,
    pub custom_locations: &'a HashMap<FileKey, GeoCoordinate>,
    pub custom_tags: &'a HashMap<FileKey, Vec<String>>,
}

impl<'a> LibraryIndex<'a> {
    /// 缓存未命中表示元数据尚未加载，不是错误
    pub fn metadata(&self, file: &MediaFile) -> Option<&'a PhotoMetadata> {
        self.metadata.get(&file.key())
    }

    pub fn custom_location(&self, file: &MediaFile) -> Option<GeoCoordinate> {
        self.custom_locations.get(&file.key()).copied()
    }

    pub fn custom_tags(&self, file: &MediaFile) -> &'a [String] {
        self.custom_tags
            .get(&file.key())
            .map(|tags| tags.as_slice())
            .unwrap_or(&[])
    }

    pub fn keywords(&self, file: &MediaFile) -> &'a [String] {
        self.metadata(file)
            .map(|m| m.keywords.as_slice())
            .unwrap_or(&[])
    }

    /// 自定义位置优先于 EXIF GPS
    pub fn location(&self, file: &MediaFile) -> Option<GeoCoordinate> {
        self.custom_location(file)
            .or_else(|| self.metadata(file).and_then(|m| m.gps))
    }

    /// EXIF 关键字与自定义标签的并集，按首次出现顺序
    pub fn all_tags(&self, file: &MediaFile) -> Vec<&'a str> {
        let mut tags: Vec<&'a str> = Vec::new();
        for tag in self.keywords(file).iter().chain(self.custom_tags(file)) {
            if !tags.contains(&tag.as_str()) {
                tags.push(tag.as_str());
            }
        }
        tags
    }
}

/// 图库状态
#[derive(Debug, Default)]
pub struct Library {
    files: Vec<MediaFile>,
    metadata: HashMap<FileKey, PhotoMetadata>,
    custom_locations: HashMap<FileKey, GeoCoordinate>,
    custom_tags: HashMap<FileKey, Vec<String>>,
    /// 已派发提取任务、结果尚未写回的文件
    extracting: HashSet<FileKey>,
    albums: Vec<Album>,
    sharing_history: Vec<SharedDetails>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn file(&self, id: Uuid) -> Option<&MediaFile> {
        self.files.iter().find(|f| f.id == id)
    }

    fn file_key(&self, id: Uuid) -> Result<FileKey> {
        self.file(id)
            .map(|f| f.key())
            .ok_or(GalleryError::FileNotFound(id))
    }

    /// 按 ID 取文件，忽略已不存在的 ID
    pub fn files_by_ids(&self, ids: &[Uuid]) -> Vec<MediaFile> {
        ids.iter().filter_map(|id| self.file(*id)).cloned().collect()
    }

    pub fn index(&self) -> LibraryIndex<'_> {
        LibraryIndex {
            metadata: &self.metadata,
            custom_locations: &self.custom_locations,
            custom_tags: &self.custom_tags,
        }
    }

    /// 上传完成的文件并入图库，整体按修改时间倒序
    pub fn complete_upload(&mut self, uploaded: Vec<MediaFile>) -> usize {
        let mut added = 0;
        let mut merged: Vec<MediaFile> = Vec::with_capacity(self.files.len() + uploaded.len());
        for file in uploaded {
            if self.files.iter().chain(merged.iter()).any(|f| f.same_content_as(&file)) {
                continue;
            }
            merged.push(file);
            added += 1;
        }
        merged.append(&mut self.files);
        merged.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        self.files = merged;
        log::info!("新增 {} 个文件，图库共 {} 个", added, self.files.len());
        added
    }

    /// 取出需要提取元数据的文件并标记为提取中，同一文件只会被取出一次
    pub fn take_pending_metadata(&mut self) -> Vec<MediaFile> {
        let mut pending = Vec::new();
        for file in &self.files {
            let key = file.key();
            if self.metadata.contains_key(&key) || self.extracting.contains(&key) {
                continue;
            }
            self.extracting.insert(key);
            pending.push(file.clone());
        }
        pending
    }

    pub fn is_loading_metadata(&self) -> bool {
        self.files.iter().any(|f| !self.metadata.contains_key(&f.key()))
    }

    /// 写入异步提取的元数据；文件已被删除时丢弃结果
    pub fn apply_metadata(&mut self, key: FileKey, metadata: PhotoMetadata) -> bool {
        self.extracting.remove(&key);
        if !self.files.iter().any(|f| f.key() == key) {
            log::debug!("文件已移除，丢弃元数据: {}", key);
            return false;
        }
        self.metadata.insert(key, metadata);
        true
    }

    /// 删除文件，同时从所有相册和按文件记录的缓存中移除
    pub fn delete_files(&mut self, ids: &[Uuid]) -> usize {
        let before = self.files.len();
        self.files.retain(|f| !ids.contains(&f.id));
        for album in &mut self.albums {
            album.file_ids.retain(|id| !ids.contains(id));
        }

        let remaining: HashSet<FileKey> = self.files.iter().map(|f| f.key()).collect();
        self.metadata.retain(|key, _| remaining.contains(key));
        self.custom_locations.retain(|key, _| remaining.contains(key));
        self.custom_tags.retain(|key, _| remaining.contains(key));
        self.extracting.retain(|key| remaining.contains(key));

        let removed = before - self.files.len();
        log::info!("删除 {} 个文件", removed);
        removed
    }

    pub fn set_custom_location(&mut self, id: Uuid, location: GeoCoordinate) -> Result<()> {
        let key = self.file_key(id)?;
        log::info!("设置自定义位置 {}: {:?}", key, location);
        self.custom_locations.insert(key, location);
        Ok(())
    }

    pub fn set_custom_tags(&mut self, id: Uuid, tags: Vec<String>) -> Result<()> {
        let key = self.file_key(id)?;
        self.custom_tags.insert(key, tags);
        Ok(())
    }

    /// 添加自定义标签；空标签或已存在（含 EXIF 关键字）时返回 false
    pub fn add_custom_tag(&mut self, id: Uuid, tag: &str) -> Result<bool> {
        let tag = tag.trim();
        let file = self.file(id).ok_or(GalleryError::FileNotFound(id))?;
        if tag.is_empty() || self.index().all_tags(file).contains(&tag) {
            return Ok(false);
        }
        let key = file.key();
        self.custom_tags.entry(key).or_default().push(tag.to_string());
        Ok(true)
    }

    /// 删除自定义标签；EXIF 关键字不可删除
    pub fn remove_custom_tag(&mut self, id: Uuid, tag: &str) -> Result<bool> {
        let key = self.file_key(id)?;
        let Some(tags) = self.custom_tags.get_mut(&key) else {
            return Ok(false);
        };
        let before = tags.len();
        tags.retain(|t| t != tag);
        Ok(tags.len() != before)
    }

    /// 文件的全部标签及可删除标记
    pub fn tags_for(&self, id: Uuid) -> Result<Vec<TagEntry>> {
        let file = self.file(id).ok_or(GalleryError::FileNotFound(id))?;
        let index = self.index();
        let custom = index.custom_tags(file);
        Ok(index
            .all_tags(file)
            .into_iter()
            .map(|tag| TagEntry {
                tag: tag.to_string(),
                removable: custom.iter().any(|t| t == tag),
            })
            .collect())
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn album(&self, name: &str) -> Option<&Album> {
        self.albums.iter().find(|a| a.name == name)
    }

    /// 创建相册，名称区分大小写且不可重复
    pub fn create_album(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(GalleryError::BlankAlbumName);
        }
        if self.album(name).is_some() {
            return Err(GalleryError::AlbumExists(name.to_string()));
        }
        self.albums.push(Album {
            name: name.to_string(),
            file_ids: Vec::new(),
        });
        log::info!("创建相册: {}", name);
        Ok(())
    }

    /// 向相册添加文件，返回新加入的数量
    pub fn add_to_album(&mut self, name: &str, ids: &[Uuid]) -> Result<usize> {
        let valid: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| self.file(*id).is_some())
            .collect();
        let album = self
            .albums
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| GalleryError::AlbumNotFound(name.to_string()))?;

        let mut added = 0;
        for id in valid {
            if !album.file_ids.contains(&id) {
                album.file_ids.push(id);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn album_files(&self, name: &str) -> Result<Vec<MediaFile>> {
        let album = self
            .album(name)
            .ok_or_else(|| GalleryError::AlbumNotFound(name.to_string()))?;
        Ok(self.files_by_ids(&album.file_ids))
    }

    /// 新的分享记录排在最前
    pub fn record_share(&mut self, details: SharedDetails) {
        self.sharing_history.insert(0, details);
    }

    pub fn sharing_history(&self) -> &[SharedDetails] {
        &self.sharing_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(name: &str, size: usize, last_modified: i64) -> MediaFile {
        MediaFile::from_bytes(name, "image/jpeg", last_modified, vec![0u8; size])
    }

    fn library_with(files: Vec<MediaFile>) -> Library {
        let mut library = Library::new();
        library.complete_upload(files);
        library
    }

    #[test]
    fn test_complete_upload_sorts_newest_first() {
        let mut library = library_with(vec![media("old.jpg", 1, 10), media("new.jpg", 1, 30)]);
        library.complete_upload(vec![media("mid.jpg", 1, 20), media("old.jpg", 1, 99)]);

        let names: Vec<_> = library.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["new.jpg", "mid.jpg", "old.jpg"]);
    }

    #[test]
    fn test_create_album_rejects_existing_name() {
        let a = media("a.jpg", 1, 1);
        let id = a.id;
        let mut library = library_with(vec![a]);

        library.create_album("Trip").unwrap();
        library.add_to_album("Trip", &[id]).unwrap();

        assert!(matches!(
            library.create_album("Trip"),
            Err(GalleryError::AlbumExists(_))
        ));
        assert_eq!(library.album("Trip").unwrap().file_ids, vec![id]);
        assert_eq!(library.albums().len(), 1);

        // 区分大小写
        library.create_album("trip").unwrap();
        assert!(matches!(
            library.create_album("  "),
            Err(GalleryError::BlankAlbumName)
        ));
    }

    #[test]
    fn test_album_has_set_semantics() {
        let a = media("a.jpg", 1, 1);
        let id = a.id;
        let mut library = library_with(vec![a]);
        library.create_album("Set").unwrap();

        assert_eq!(library.add_to_album("Set", &[id, id]).unwrap(), 1);
        assert_eq!(library.add_to_album("Set", &[id]).unwrap(), 0);
        assert_eq!(library.add_to_album("Set", &[Uuid::new_v4()]).unwrap(), 0);
        assert!(matches!(
            library.add_to_album("Missing", &[id]),
            Err(GalleryError::AlbumNotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_from_every_album() {
        let a = media("a.jpg", 1, 1);
        let b = media("b.jpg", 2, 2);
        let (a_id, b_id) = (a.id, b.id);
        let mut library = library_with(vec![a, b]);
        library.create_album("One").unwrap();
        library.create_album("Two").unwrap();
        library.add_to_album("One", &[a_id, b_id]).unwrap();
        library.add_to_album("Two", &[a_id]).unwrap();

        assert_eq!(library.delete_files(&[a_id]), 1);

        assert!(library.file(a_id).is_none());
        for album in library.albums() {
            assert!(!album.file_ids.contains(&a_id));
        }
        let names: Vec<_> = library
            .album_files("One")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["b.jpg"]);
    }

    #[test]
    fn test_metadata_for_removed_file_is_discarded() {
        let a = media("a.jpg", 1, 1);
        let key = a.key();
        let id = a.id;
        let mut library = library_with(vec![a]);
        assert!(library.is_loading_metadata());
        assert_eq!(library.take_pending_metadata().len(), 1);

        library.delete_files(&[id]);
        assert!(!library.apply_metadata(key, PhotoMetadata::default()));
        assert!(library.index().metadata.is_empty());
    }

    #[test]
    fn test_pending_metadata_is_handed_out_once() {
        let a = media("a.jpg", 1, 1);
        let a_key = a.key();
        let mut library = library_with(vec![a]);

        assert_eq!(library.take_pending_metadata().len(), 1);
        // a 的提取仍在进行，第二批只包含新文件
        library.complete_upload(vec![media("b.jpg", 1, 2)]);
        let second: Vec<_> = library
            .take_pending_metadata()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(second, vec!["b.jpg"]);
        assert!(library.take_pending_metadata().is_empty());

        assert!(library.apply_metadata(a_key, PhotoMetadata::default()));
        assert!(library.take_pending_metadata().is_empty());
        assert!(library.is_loading_metadata());
    }

    #[test]
    fn test_delete_prunes_custom_location_and_tags() {
        let a = media("a.jpg", 1, 1);
        let b = media("b.jpg", 2, 2);
        let (a_id, b_id) = (a.id, b.id);
        let mut library = library_with(vec![a, b]);
        library
            .set_custom_location(a_id, GeoCoordinate::new(1.0, 2.0))
            .unwrap();
        library.add_custom_tag(a_id, "beach").unwrap();
        library.add_custom_tag(b_id, "city").unwrap();

        library.delete_files(&[a_id]);

        let index = library.index();
        assert!(index.custom_locations.is_empty());
        assert_eq!(index.custom_tags.len(), 1);
        let b = library.file(b_id).unwrap();
        assert_eq!(index.custom_tags(b), &["city".to_string()]);
    }

    #[test]
    fn test_custom_location_overrides_exif() {
        let a = media("a.jpg", 1, 1);
        let (id, key) = (a.id, a.key());
        let mut library = library_with(vec![a]);
        library.apply_metadata(
            key,
            PhotoMetadata {
                gps: Some(GeoCoordinate::new(1.0, 2.0)),
                ..Default::default()
            },
        );
        let file = library.file(id).unwrap().clone();
        assert_eq!(library.index().location(&file), Some(GeoCoordinate::new(1.0, 2.0)));

        library
            .set_custom_location(id, GeoCoordinate::new(10.0, 20.0))
            .unwrap();
        assert_eq!(
            library.index().location(&file),
            Some(GeoCoordinate::new(10.0, 20.0))
        );
        assert!(library
            .set_custom_location(Uuid::new_v4(), GeoCoordinate::new(0.0, 0.0))
            .is_err());
    }

    #[test]
    fn test_exif_keywords_are_not_removable() {
        let a = media("a.jpg", 1, 1);
        let (id, key) = (a.id, a.key());
        let mut library = library_with(vec![a]);
        library.apply_metadata(
            key,
            PhotoMetadata {
                keywords: vec!["beach".into()],
                ..Default::default()
            },
        );

        assert!(!library.add_custom_tag(id, "beach").unwrap());
        assert!(!library.add_custom_tag(id, "   ").unwrap());
        assert!(library.add_custom_tag(id, " friends ").unwrap());

        assert_eq!(
            library.tags_for(id).unwrap(),
            vec![
                TagEntry { tag: "beach".into(), removable: false },
                TagEntry { tag: "friends".into(), removable: true },
            ]
        );

        assert!(!library.remove_custom_tag(id, "beach").unwrap());
        assert!(library.remove_custom_tag(id, "friends").unwrap());
        assert_eq!(library.tags_for(id).unwrap().len(), 1);
    }
}
