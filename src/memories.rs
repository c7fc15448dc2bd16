// 回忆模块
// 找出往年今天拍摄的照片，按拍摄日期分组

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::library::LibraryIndex;
use crate::models::MediaFile;

/// 某一天的回忆
#[derive(Debug, Clone, Serialize)]
pub struct Memory {
    pub date: NaiveDate,
    pub files: Vec<MediaFile>,
}

/// 往年同月同日拍摄的文件，按日期分组，最近的年份在前
/// 多个年份都有时全部返回，由界面决定展示哪一组
pub fn find_memories<'a, I>(files: I, index: &LibraryIndex<'_>, today: NaiveDate) -> Vec<Memory>
where
    I: IntoIterator<Item = &'a MediaFile>,
{
    let mut memories: Vec<Memory> = Vec::new();

    for file in files {
        let Some(taken) = index.metadata(file).and_then(|m| m.date_taken) else {
            continue;
        };
        let date = taken.date();
        if date.month() != today.month() || date.day() != today.day() || date.year() >= today.year()
        {
            continue;
        }
        match memories.iter_mut().find(|m| m.date == date) {
            Some(memory) => memory.files.push(file.clone()),
            None => memories.push(Memory {
                date,
                files: vec![file.clone()],
            }),
        }
    }

    memories.sort_by(|a, b| b.date.cmp(&a.date));
    memories
}
