// 地理点模块
// 把文件映射为地图上的点（自定义位置优先于 EXIF GPS），以及地图聚类的协作接口

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::library::LibraryIndex;
use crate::models::{GeoCoordinate, MediaFile};

/// 地图弹窗里显示的 EXIF 摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifSummary {
    pub date_taken: Option<NaiveDateTime>,
    pub camera_model: Option<String>,
    pub camera_make: Option<String>,
    pub lens_model: Option<String>,
    pub gps_date: Option<DateTime<Utc>>,
}

/// 地图上的照片点
#[derive(Debug, Clone, Serialize)]
pub struct GeoPoint {
    pub file: MediaFile,
    pub position: GeoCoordinate,
    pub exif: ExifSummary,
}

/// 经纬度包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn from_coordinates<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoCoordinate>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bounds = GeoBounds {
            south: first.latitude,
            west: first.longitude,
            north: first.latitude,
            east: first.longitude,
        };
        for c in iter {
            bounds.south = bounds.south.min(c.latitude);
            bounds.north = bounds.north.max(c.latitude);
            bounds.west = bounds.west.min(c.longitude);
            bounds.east = bounds.east.max(c.longitude);
        }
        Some(bounds)
    }

    pub fn center(&self) -> GeoCoordinate {
        GeoCoordinate::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn contains(&self, c: GeoCoordinate) -> bool {
        c.latitude >= self.south
            && c.latitude <= self.north
            && c.longitude >= self.west
            && c.longitude <= self.east
    }
}

/// 为每个有位置的文件生成地图点，顺序与输入一致
/// 元数据尚未加载时结果可能为空，加载完成后重新计算即可
pub fn project_points<'a, I>(files: I, index: &LibraryIndex<'_>) -> Vec<GeoPoint>
where
    I: IntoIterator<Item = &'a MediaFile>,
{
    files
        .into_iter()
        .filter_map(|file| {
            let position = index.location(file)?;
            let exif = index
                .metadata(file)
                .map(|m| ExifSummary {
                    date_taken: m.date_taken,
                    camera_model: m.camera_model.clone(),
                    camera_make: m.camera_make.clone(),
                    lens_model: m.lens_model.clone(),
                    gps_date: m.gps_date,
                })
                .unwrap_or_default();
            Some(GeoPoint {
                file: file.clone(),
                position,
                exif,
            })
        })
        .collect()
}

/// 所有点的包围盒（“全部显示”按钮）
pub fn bounds(points: &[GeoPoint]) -> Option<GeoBounds> {
    GeoBounds::from_coordinates(points.iter().map(|p| p.position))
}

/// 地图上的一个聚类
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub points: Vec<GeoPoint>,
    pub bounds: GeoBounds,
}

impl Cluster {
    pub fn from_points(points: Vec<GeoPoint>) -> Option<Self> {
        let bounds = bounds(&points)?;
        Some(Self { points, bounds })
    }

    pub fn child_count(&self) -> usize {
        self.points.len()
    }

    pub fn center(&self) -> GeoCoordinate {
        self.bounds.center()
    }
}

/// 空间聚类协作者：按当前缩放级别把相近的点分组
pub trait ClusterEngine {
    fn cluster(&self, points: &[GeoPoint], zoom: u8) -> Vec<Cluster>;
}

/// 基于 Web 墨卡托像素网格的聚类
#[derive(Debug, Clone, Copy)]
pub struct GridClusterer {
    /// 网格边长（像素）
    pub radius_px: f64,
}

impl Default for GridClusterer {
    fn default() -> Self {
        Self { radius_px: 80.0 }
    }
}

const TILE_SIZE: f64 = 256.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// 经纬度转当前缩放级别下的世界像素坐标
pub fn project_to_pixels(c: GeoCoordinate, zoom: u8) -> (f64, f64) {
    let scale = TILE_SIZE * 2f64.powi(zoom as i32);
    let lat = c.latitude.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (c.longitude + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    (x, y)
}

impl ClusterEngine for GridClusterer {
    fn cluster(&self, points: &[GeoPoint], zoom: u8) -> Vec<Cluster> {
        let mut cells: HashMap<(i64, i64), usize> = HashMap::new();
        let mut groups: Vec<Vec<GeoPoint>> = Vec::new();

        for point in points {
            let (x, y) = project_to_pixels(point.position, zoom);
            let cell = (
                (x / self.radius_px).floor() as i64,
                (y / self.radius_px).floor() as i64,
            );
            match cells.get(&cell) {
                Some(&i) => groups[i].push(point.clone()),
                None => {
                    cells.insert(cell, groups.len());
                    groups.push(vec![point.clone()]);
                }
            }
        }

        groups.into_iter().filter_map(Cluster::from_points).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use crate::models::PhotoMetadata;

    fn point(name: &str, lat: f64, lon: f64) -> GeoPoint {
        GeoPoint {
            file: MediaFile::from_bytes(name, "image/jpeg", 0, vec![0u8]),
            position: GeoCoordinate::new(lat, lon),
            exif: ExifSummary::default(),
        }
    }

    #[test]
    fn test_projection_merges_custom_over_exif() {
        let files: Vec<MediaFile> = ["exif.jpg", "custom.jpg", "none.jpg", "both.jpg"]
            .iter()
            .enumerate()
            .map(|(i, n)| MediaFile::from_bytes(*n, "image/jpeg", 10 - i as i64, vec![0u8]))
            .collect();
        let ids: Vec<_> = files.iter().map(|f| f.id).collect();
        let keys: Vec<_> = files.iter().map(|f| f.key()).collect();

        let mut library = Library::new();
        library.complete_upload(files);

        // 元数据加载前没有点
        assert!(project_points(library.files(), &library.index()).is_empty());

        let gps = |lat, lon| PhotoMetadata {
            gps: Some(GeoCoordinate::new(lat, lon)),
            camera_model: Some("X100".into()),
            ..Default::default()
        };
        library.apply_metadata(keys[0].clone(), gps(1.0, 1.0));
        library.apply_metadata(keys[1].clone(), PhotoMetadata::default());
        library.apply_metadata(keys[2].clone(), PhotoMetadata::default());
        library.apply_metadata(keys[3].clone(), gps(3.0, 3.0));
        library.set_custom_location(ids[1], GeoCoordinate::new(2.0, 2.0)).unwrap();
        library.set_custom_location(ids[3], GeoCoordinate::new(4.0, 4.0)).unwrap();

        let points = project_points(library.files(), &library.index());
        let summary: Vec<_> = points
            .iter()
            .map(|p| (p.file.name.as_str(), p.position.latitude))
            .collect();
        assert_eq!(
            summary,
            vec![("exif.jpg", 1.0), ("custom.jpg", 2.0), ("both.jpg", 4.0)]
        );
        assert_eq!(points[0].exif.camera_model.as_deref(), Some("X100"));
        assert_eq!(points[1].exif, ExifSummary::default());
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(&[]), None);
        let points = vec![point("a", 10.0, -5.0), point("b", -2.0, 7.0), point("c", 4.0, 1.0)];
        let b = bounds(&points).unwrap();
        assert_eq!(b, GeoBounds { south: -2.0, west: -5.0, north: 10.0, east: 7.0 });
        assert_eq!(b.center(), GeoCoordinate::new(4.0, 1.0));
        assert!(b.contains(GeoCoordinate::new(0.0, 0.0)));
        assert!(!b.contains(GeoCoordinate::new(11.0, 0.0)));
    }

    #[test]
    fn test_grid_clusterer_groups_nearby_points() {
        let points = vec![
            point("paris-1", 48.8566, 2.3522),
            point("tokyo", 35.6762, 139.6503),
            point("paris-2", 48.8570, 2.3530),
        ];
        let clusters = GridClusterer::default().cluster(&points, 5);
        assert_eq!(clusters.len(), 2);
        let names: Vec<_> = clusters[0].points.iter().map(|p| p.file.name.as_str()).collect();
        assert_eq!(names, vec!["paris-1", "paris-2"]);
        assert_eq!(clusters[1].child_count(), 1);

        // 放到最大缩放时巴黎两点分开
        let clusters = GridClusterer::default().cluster(&points, 18);
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn test_pixel_projection_origin() {
        let (x, y) = project_to_pixels(GeoCoordinate::new(0.0, 0.0), 0);
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);
    }
}
