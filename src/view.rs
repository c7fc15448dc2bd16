// 派生视图模块
// 过滤 -> 排序 -> 标签统计，纯函数，输入相同则输出相同

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::library::LibraryIndex;
use crate::models::{FileTypeFilter, MediaFile};

/// 排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortCriteria {
    #[serde(rename = "date-desc")]
    DateDesc,
    #[serde(rename = "date-asc")]
    DateAsc,
    #[serde(rename = "size-desc")]
    SizeDesc,
    #[serde(rename = "size-asc")]
    SizeAsc,
    #[serde(rename = "name-asc")]
    NameAsc,
    #[serde(rename = "name-desc")]
    NameDesc,
    #[default]
    #[serde(rename = "datetaken-desc")]
    DateTakenDesc,
    #[serde(rename = "datetaken-asc")]
    DateTakenAsc,
}

impl SortCriteria {
    pub const ALL: [SortCriteria; 8] = [
        SortCriteria::DateDesc,
        SortCriteria::DateAsc,
        SortCriteria::SizeDesc,
        SortCriteria::SizeAsc,
        SortCriteria::NameAsc,
        SortCriteria::NameDesc,
        SortCriteria::DateTakenDesc,
        SortCriteria::DateTakenAsc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortCriteria::DateDesc => "date-desc",
            SortCriteria::DateAsc => "date-asc",
            SortCriteria::SizeDesc => "size-desc",
            SortCriteria::SizeAsc => "size-asc",
            SortCriteria::NameAsc => "name-asc",
            SortCriteria::NameDesc => "name-desc",
            SortCriteria::DateTakenDesc => "datetaken-desc",
            SortCriteria::DateTakenAsc => "datetaken-asc",
        }
    }
}

impl fmt::Display for SortCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortCriteria {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortCriteria::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("未知的排序方式: {}", s))
    }
}

/// 日期范围，按本地日期；起始日 00:00 含，结束日次日 00:00 不含
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, when: NaiveDateTime) -> bool {
        if let Some(start) = self.start {
            if when < start.and_time(NaiveTime::default()) {
                return false;
            }
        }
        if let Some(end) = self.end {
            if let Some(next_day) = end.checked_add_days(Days::new(1)) {
                if when >= next_day.and_time(NaiveTime::default()) {
                    return false;
                }
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// 画廊的全部过滤与排序条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    pub search: String,
    pub file_type: FileTypeFilter,
    pub date_range: DateRange,
    /// 只显示有位置信息的文件
    pub location_only: bool,
    pub sort: SortCriteria,
}

/// 过滤条件逐项相与
pub fn filter_files<'a, I>(files: I, query: &ViewQuery, index: &LibraryIndex<'_>) -> Vec<&'a MediaFile>
where
    I: IntoIterator<Item = &'a MediaFile>,
{
    let search = query.search.to_lowercase();
    files
        .into_iter()
        .filter(|file| query.file_type.matches(file.category()))
        .filter(|file| search.is_empty() || matches_search(file, &search, index))
        .filter(|file| !query.location_only || index.location(file).is_some())
        .filter(|file| {
            query.date_range.is_unbounded() || query.date_range.contains(effective_date(file, index))
        })
        .collect()
}

/// 文件名、相机、镜头、描述、关键字（EXIF + 自定义）任一包含即匹配
fn matches_search(file: &MediaFile, needle: &str, index: &LibraryIndex<'_>) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);

    if contains(file.name.as_str()) {
        return true;
    }
    if let Some(meta) = index.metadata(file) {
        let fields = [
            &meta.camera_model,
            &meta.camera_make,
            &meta.lens_model,
            &meta.description,
        ];
        if fields.iter().any(|f| f.as_deref().is_some_and(contains)) {
            return true;
        }
    }
    index
        .keywords(file)
        .iter()
        .chain(index.custom_tags(file))
        .any(|k| contains(k.as_str()))
}

/// 拍摄时间，缺失时退回修改时间
pub fn effective_date(file: &MediaFile, index: &LibraryIndex<'_>) -> NaiveDateTime {
    index
        .metadata(file)
        .and_then(|m| m.date_taken)
        .unwrap_or_else(|| file.last_modified_local())
}

/// 稳定排序，相等元素保持原有顺序
pub fn sort_files(files: &mut [&MediaFile], criteria: SortCriteria, index: &LibraryIndex<'_>) {
    match criteria {
        SortCriteria::DateDesc => files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
        SortCriteria::DateAsc => files.sort_by(|a, b| a.last_modified.cmp(&b.last_modified)),
        SortCriteria::SizeDesc => files.sort_by(|a, b| b.size.cmp(&a.size)),
        SortCriteria::SizeAsc => files.sort_by(|a, b| a.size.cmp(&b.size)),
        SortCriteria::NameAsc => files.sort_by(|a, b| compare_names(&a.name, &b.name)),
        SortCriteria::NameDesc => files.sort_by(|a, b| compare_names(&b.name, &a.name)),
        SortCriteria::DateTakenDesc => {
            files.sort_by(|a, b| compare_date_taken(a, b, index, true))
        }
        SortCriteria::DateTakenAsc => {
            files.sort_by(|a, b| compare_date_taken(a, b, index, false))
        }
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// 有拍摄时间的文件总是排在没有的前面，与方向无关
fn compare_date_taken(
    a: &MediaFile,
    b: &MediaFile,
    index: &LibraryIndex<'_>,
    descending: bool,
) -> Ordering {
    let date_a = index.metadata(a).and_then(|m| m.date_taken);
    let date_b = index.metadata(b).and_then(|m| m.date_taken);
    let directed = |ord: Ordering| if descending { ord.reverse() } else { ord };

    match (date_a, date_b) {
        (Some(x), Some(y)) => directed(x.cmp(&y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => directed(a.last_modified.cmp(&b.last_modified)),
    }
}

/// 过滤并排序，得到画廊显示的文件列表
pub fn build_view<'a, I>(files: I, query: &ViewQuery, index: &LibraryIndex<'_>) -> Vec<&'a MediaFile>
where
    I: IntoIterator<Item = &'a MediaFile>,
{
    let mut visible = filter_files(files, query, index);
    sort_files(&mut visible, query.sort, index);
    visible
}

/// 标签计数，按数量降序，数量相同按首次出现顺序
/// 同一文件内 EXIF 关键字和自定义标签重复只计一次
pub fn tag_counts(files: &[&MediaFile], index: &LibraryIndex<'_>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for file in files {
        for tag in index.all_tags(file) {
            match counts.iter_mut().find(|(t, _)| t == tag) {
                Some((_, count)) => *count += 1,
                None => counts.push((tag.to_string(), 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn top_tags(files: &[&MediaFile], index: &LibraryIndex<'_>, limit: usize) -> Vec<String> {
    tag_counts(files, index)
        .into_iter()
        .take(limit)
        .map(|(tag, _)| tag)
        .collect()
}
