// 聚类热力图模块
// 计算聚类的照片密度、颜色和尺寸，生成聚类图标，并处理聚类点击后的预览

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{Cluster, GeoBounds};
use crate::models::MediaFile;

/// 点击聚类时飞行动画的内边距
pub const CLUSTER_FLY_PADDING: u32 = 60;
/// “全部显示”时的内边距
pub const FIT_ALL_PADDING: u32 = 50;

/// 一个聚类的密度统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityStats {
    pub photo_count: usize,
    /// 不同拍摄日期的数量，没有任何日期时按 1 计
    pub unique_date_count: usize,
    /// 平均每天的照片数
    pub density: f64,
    /// 热度 [0, 1]
    pub t: f64,
    /// 色相，240 为蓝（冷），0 为红（热）
    pub hue: f64,
    /// 图标边长（像素）
    pub size: f64,
}

impl DensityStats {
    pub fn compute(cluster: &Cluster, saturation_density: f64) -> Self {
        Self::compute_in(cluster, saturation_density, &Local)
    }

    /// 拍摄时间按 `tz` 解释，再按 UTC 日期去重
    pub fn compute_in<Tz: TimeZone>(cluster: &Cluster, saturation_density: f64, tz: &Tz) -> Self {
        let photo_count = cluster.child_count();
        let unique_dates: HashSet<NaiveDate> = cluster
            .points
            .iter()
            .filter_map(|p| p.exif.date_taken.as_ref())
            .map(|taken| utc_day(taken, tz))
            .collect();
        let unique_date_count = unique_dates.len().max(1);
        let density = photo_count as f64 / unique_date_count as f64;
        let t = heat(density, saturation_density);

        Self {
            photo_count,
            unique_date_count,
            density,
            t,
            hue: 240.0 * (1.0 - t),
            size: icon_size(photo_count),
        }
    }
}

/// 本地拍摄时间对应的 UTC 日期，落在夏令时空档里时取原日期
pub fn utc_day<Tz: TimeZone>(taken: &NaiveDateTime, tz: &Tz) -> NaiveDate {
    tz.from_local_datetime(taken)
        .earliest()
        .map(|t| t.with_timezone(&Utc).date_naive())
        .unwrap_or_else(|| taken.date())
}

/// 对数热度，密度达到饱和值时为 1
/// 饱和值不大于 1 时任何密度都算饱和
pub fn heat(density: f64, saturation_density: f64) -> f64 {
    if saturation_density.is_nan() || saturation_density <= 1.0 {
        return 1.0;
    }
    let t = density.max(1.0).log10() / saturation_density.log10();
    t.clamp(0.0, 1.0)
}

/// 图标尺寸只取决于照片数
pub fn icon_size(count: usize) -> f64 {
    30.0 + (count.max(1) as f64).log2() * 10.0
}

/// 聚类图标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterIcon {
    pub html: String,
    pub class_name: String,
    pub size: f64,
    pub tooltip: String,
}

/// 聚类图标样式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStyle {
    #[default]
    Heatmap,
    Standard,
}

impl ClusterStyle {
    pub fn icon(self, cluster: &Cluster, saturation_density: f64) -> ClusterIcon {
        match self {
            ClusterStyle::Heatmap => heatmap_icon(&DensityStats::compute(cluster, saturation_density)),
            ClusterStyle::Standard => standard_icon(cluster.child_count()),
        }
    }
}

/// 热力图样式：颜色表示密度，尺寸表示数量
pub fn heatmap_icon(stats: &DensityStats) -> ClusterIcon {
    let opaque = format!("hsla({}, 100%, 50%, 0.9)", stats.hue);
    let transparent = format!("hsla({}, 100%, 50%, 0)", stats.hue);
    let html = format!(
        "<div style=\"width:100%;height:100%;border-radius:50%;background:radial-gradient(circle, {} 20%, {} 70%);display:flex;align-items:center;justify-content:center;\"><span style=\"color:white;font-weight:700;font-size:{}px;text-shadow:0 0 4px #000;\">{}</span></div>",
        opaque,
        transparent,
        stats.size / 2.5,
        stats.photo_count
    );
    let tooltip = format!(
        "<b>{} 张照片</b>，共 <strong>{} 天</strong><br><i>平均每天 {:.1} 张</i><br><br>\
         <div style=\"text-align: left; font-size: 0.9rem; line-height: 1.4;\">\
         &bull; <strong>大小</strong> 表示照片总数<br>\
         &bull; <strong>颜色</strong> 表示拍摄密度（越红越密集）</div><br>\
         点击放大并预览",
        stats.photo_count, stats.unique_date_count, stats.density
    );
    ClusterIcon {
        html,
        class_name: "marker-cluster".to_string(),
        size: stats.size,
        tooltip,
    }
}

/// 标准样式：固定蓝色
pub fn standard_icon(child_count: usize) -> ClusterIcon {
    let size = icon_size(child_count);
    let html = format!(
        "<div style=\"width:100%;height:100%;border-radius:50%;background:radial-gradient(circle, #3b82f6 30%, #2563eb 100%);border:3px solid #60a5fa;display:flex;align-items:center;justify-content:center;box-shadow:0 4px 14px rgba(0,0,0,0.5);\"><span style=\"color:white;font-weight:700;font-size:{}px;text-shadow:0 0 6px #000;\">{}</span></div>",
        size / 2.5,
        child_count
    );
    ClusterIcon {
        html,
        class_name: "marker-cluster".to_string(),
        size,
        tooltip: format!("{} 张照片，点击放大并预览", child_count),
    }
}

/// 地图控件协作者
pub trait MapController: Send + Sync {
    fn fly_to_bounds(&self, bounds: GeoBounds, padding: u32);
}

/// 聚类预览弹窗内容
#[derive(Debug, Clone, Serialize)]
pub struct ClusterPreview {
    pub files: Vec<MediaFile>,
    pub caption: Option<String>,
}

/// 聚类点击：先发出飞行指令，延迟后再给出预览
pub async fn open_cluster<M>(map: &M, cluster: &Cluster, delay: Duration) -> ClusterPreview
where
    M: MapController + ?Sized,
{
    map.fly_to_bounds(cluster.bounds, CLUSTER_FLY_PADDING);
    tokio::time::sleep(delay).await;

    ClusterPreview {
        files: cluster.points.iter().map(|p| p.file.clone()).collect(),
        caption: date_caption(cluster),
    }
}

/// 拍摄日期范围说明，没有日期时为 None
pub fn date_caption(cluster: &Cluster) -> Option<String> {
    let dates = cluster.points.iter().filter_map(|p| p.exif.date_taken);
    let (min, max) = dates.fold(None, |acc, d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((if d < lo { d } else { lo }, if d > hi { d } else { hi })),
    })?;

    let fmt = "%Y年%-m月%-d日";
    if min.date() == max.date() {
        Some(format!("拍摄于 {}", min.format(fmt)))
    } else {
        Some(format!("拍摄于 {} 至 {}", min.format(fmt), max.format(fmt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{ExifSummary, GeoPoint};
    use crate::metadata::parse_exif_datetime;
    use crate::models::GeoCoordinate;
    use chrono::FixedOffset;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn cluster_with_dates(dates: &[Option<&str>]) -> Cluster {
        let points = dates
            .iter()
            .enumerate()
            .map(|(i, d)| GeoPoint {
                file: MediaFile::from_bytes(format!("p{}.jpg", i), "image/jpeg", 0, vec![0u8]),
                position: GeoCoordinate::new(10.0 + i as f64 * 0.01, 20.0),
                exif: ExifSummary {
                    date_taken: d.and_then(parse_exif_datetime),
                    ..Default::default()
                },
            })
            .collect();
        Cluster::from_points(points).unwrap()
    }

    #[test]
    fn test_single_photo_is_cold() {
        let stats = DensityStats::compute(&cluster_with_dates(&[None]), 25.0);
        assert_eq!(stats.unique_date_count, 1);
        assert_eq!(stats.t, 0.0);
        assert_eq!(stats.hue, 240.0);
        assert_eq!(stats.size, 30.0);
    }

    #[test]
    fn test_saturated_cluster_is_hot() {
        let dates = vec![Some("2023:07:01 10:00:00"); 25];
        let stats = DensityStats::compute(&cluster_with_dates(&dates), 25.0);
        assert_eq!(stats.unique_date_count, 1);
        assert!((stats.t - 1.0).abs() < 1e-12);
        assert!(stats.hue.abs() < 1e-9);

        let icon = heatmap_icon(&stats);
        assert_eq!(icon.class_name, "marker-cluster");
        assert!(icon.html.contains(">25</span>"));
    }

    #[test]
    fn test_density_spread_over_days() {
        // 4 张照片分布在 2 天，1 张无日期不计入天数
        let stats = DensityStats::compute_in(
            &cluster_with_dates(&[
                Some("2023:07:01 10:00:00"),
                Some("2023:07:01 23:00:00"),
                Some("2023:07:02 08:00:00"),
                None,
            ]),
            25.0,
            &Utc,
        );
        assert_eq!(stats.unique_date_count, 2);
        assert_eq!(stats.density, 2.0);
        assert_eq!(stats.size, 50.0);
        assert!(stats.t > 0.0 && stats.t < 1.0);
        assert!(heatmap_icon(&stats).tooltip.contains("平均每天 2.0 张"));
    }

    #[test]
    fn test_days_are_counted_in_utc() {
        // UTC+8 下两张照片的本地日期不同，但都落在 UTC 的 6 月 30 日
        let cluster = cluster_with_dates(&[
            Some("2023:07:01 05:00:00"),
            Some("2023:06:30 20:00:00"),
        ]);
        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
        let stats = DensityStats::compute_in(&cluster, 25.0, &shanghai);
        assert_eq!(stats.unique_date_count, 1);
        assert_eq!(stats.density, 2.0);

        let stats = DensityStats::compute_in(&cluster, 25.0, &Utc);
        assert_eq!(stats.unique_date_count, 2);
        assert_eq!(stats.density, 1.0);
    }

    #[test]
    fn test_degenerate_saturation_is_finite() {
        for saturation in [1.0, 0.5, 0.0, -3.0, f64::NAN] {
            let t = heat(2.0, saturation);
            assert_eq!(t, 1.0, "saturation {}", saturation);
        }
        assert_eq!(heat(1.0, 25.0), 0.0);
    }

    #[test]
    fn test_standard_icon() {
        let icon = standard_icon(8);
        assert_eq!(icon.size, 60.0);
        assert!(icon.html.contains("#3b82f6"));
        assert!(icon.tooltip.starts_with("8 张照片"));

        let cluster = cluster_with_dates(&[None, None]);
        assert_eq!(ClusterStyle::Standard.icon(&cluster, 25.0).size, 40.0);
    }

    #[test]
    fn test_date_caption() {
        assert_eq!(date_caption(&cluster_with_dates(&[None])), None);
        assert_eq!(
            date_caption(&cluster_with_dates(&[Some("2023:07:01 10:00:00")])).as_deref(),
            Some("拍摄于 2023年7月1日")
        );
        assert_eq!(
            date_caption(&cluster_with_dates(&[
                Some("2023:07:05 10:00:00"),
                Some("2023:06:30 10:00:00"),
            ]))
            .as_deref(),
            Some("拍摄于 2023年6月30日 至 2023年7月5日")
        );
    }

    #[derive(Default)]
    struct RecordingMap {
        calls: Mutex<Vec<(GeoBounds, u32)>>,
    }

    impl MapController for RecordingMap {
        fn fly_to_bounds(&self, bounds: GeoBounds, padding: u32) {
            self.calls.lock().push((bounds, padding));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_flies_before_preview() {
        let map = Arc::new(RecordingMap::default());
        let cluster = cluster_with_dates(&[None, None, None]);

        let task = {
            let map = map.clone();
            let cluster = cluster.clone();
            tokio::spawn(async move {
                open_cluster(map.as_ref(), &cluster, Duration::from_millis(500)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 预览尚未出现时已经发出飞行指令
        assert!(!task.is_finished());
        assert_eq!(map.calls.lock().as_slice(), &[(cluster.bounds, 60)]);

        let preview = task.await.unwrap();
        assert_eq!(preview.files.len(), 3);
        assert_eq!(preview.caption, None);
    }
}
