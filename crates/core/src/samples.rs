//! Built-in sample stories that can be loaded as new projects.

use serde::Serialize;

use crate::error::CoreError;
use crate::project::Project;
use crate::reconcile::{apply_story, ImportReport};
use crate::story::{parse_story, StoryAnalysis};

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub key: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    json: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleInfo {
    pub key: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
}

impl Sample {
    pub fn info(&self) -> SampleInfo {
        SampleInfo {
            key: self.key,
            title: self.title,
            summary: self.summary,
        }
    }

    pub fn story(&self) -> Result<StoryAnalysis, CoreError> {
        parse_story(self.json)
    }

    /// Build a fresh project from this sample.
    pub fn load(&self, threshold: f64) -> Result<(Project, ImportReport), CoreError> {
        let story = self.story()?;
        let mut project = Project::new(self.title);
        let report = apply_story(&mut project, &story, threshold);
        Ok((project, report))
    }
}

pub const SAMPLES: &[Sample] = &[
    Sample {
        key: "parking_lot",
        title: "深夜停车场",
        summary: "男主撞见女友与他人在一起，礼物盒摔碎，独自驾车离开。",
        json: PARKING_LOT,
    },
    Sample {
        key: "lucky_pony",
        title: "福宝马送福",
        summary: "Q萌小马吉祥物在马年街头给路人派发好运挂件。",
        json: LUCKY_PONY,
    },
];

pub fn list() -> Vec<SampleInfo> {
    SAMPLES.iter().map(Sample::info).collect()
}

pub fn find(key: &str) -> Result<&'static Sample, CoreError> {
    SAMPLES
        .iter()
        .find(|s| s.key == key.trim())
        .ok_or_else(|| CoreError::not_found("Sample", key))
}

const PARKING_LOT: &str = r#"{
  "project_name": "深夜停车场",
  "description": "男主撞见女友与他人在一起，礼物盒摔碎，独自驾车离开。",
  "genre": "爱情",
  "style": "realistic",
  "characters": [
    {"name": "男主", "age": "28", "gender": "男", "appearance": "短发，眉眼清秀，身形修长", "clothing": "深灰色风衣，白衬衫", "personality": "内敛，重感情", "role": "主角"},
    {"name": "女友", "age": "26", "gender": "女", "appearance": "长卷发，妆容精致", "clothing": "米色连衣裙，细跟高跟鞋", "personality": "犹豫，心虚", "role": "配角"},
    {"name": "陌生男人", "age": "30", "gender": "男", "appearance": "寸头，神情傲慢", "clothing": "黑色西装", "personality": "强势", "role": "配角"}
  ],
  "scenes": [
    {"name": "地下停车场", "location_type": "室内", "description": "空旷的地下停车场，水泥立柱，稀疏的车辆", "lighting": "冷白色顶灯，局部昏暗", "atmosphere": "压抑，冷清", "time_of_day": "深夜"},
    {"name": "男主车内", "location_type": "室内", "description": "狭小的驾驶座，仪表盘微光", "lighting": "仪表盘蓝光", "atmosphere": "孤独", "time_of_day": "深夜"}
  ],
  "props": [
    {"name": "礼物盒", "category": "礼品", "description": "系着红丝带的方形礼物盒", "material": "硬纸", "size": "手掌大小", "importance": "关键道具"}
  ],
  "shots": [
    {"template": "全景", "description": "男主站在停车场立柱旁，看见女友和陌生男人站在一起，整个人僵住", "characters": ["男主", "女友", "陌生男人"], "scene": "地下停车场", "props": ["礼物盒"]},
    {"template": "特写", "description": "礼物盒从男主手中滑落，摔在地上", "characters": ["男主"], "scene": "地下停车场", "props": ["礼物盒"]},
    {"template": "中景", "description": "女友闻声转头，脸色苍白", "characters": ["女友"], "scene": "地下停车场", "dialogue": "女友：你……你怎么来了？"},
    {"template": "中景", "description": "男主一言不发转身离开，女友想追却被陌生男人拉住", "characters": ["男主", "女友", "陌生男人"], "scene": "地下停车场"},
    {"template": "近景", "description": "男主坐进车里，双手紧握方向盘，泪水落下", "characters": ["男主"], "scene": "男主车内", "dialogue": "男主（内心独白）：原来，一切都是假的……"}
  ]
}"#;

const LUCKY_PONY: &str = r#"{
  "project_name": "福宝马送福",
  "description": "Q萌小马吉祥物在马年街头给路人派发好运挂件。",
  "genre": "喜剧",
  "style": "anime",
  "characters": [
    {"name": "福宝马", "age": "1", "gender": "男", "appearance": "超级Q萌的胖胖小马，圆滚滚的身体，大眼睛闪闪发光，粉嫩脸蛋", "clothing": "红色小马甲，背着金色福袋", "personality": "活泼，走路一颠一颠", "role": "主角"},
    {"name": "马爷爷", "age": "70", "gender": "男", "appearance": "Q版老爷爷，圆脸，笑眯眯的眼睛", "clothing": "红色唐装，胸前绣着骏马图案", "personality": "慈祥", "role": "配角"}
  ],
  "scenes": [
    {"name": "喜庆街道", "location_type": "室外", "description": "2D卡通风格的喜庆街道，马形灯笼高挂，红色横幅飘扬", "lighting": "明亮的午后阳光", "atmosphere": "欢乐热闹", "time_of_day": "下午", "weather": "晴"}
  ],
  "props": [
    {"name": "马蹄铁挂件", "category": "饰品", "description": "金色马蹄铁挂件，系着红绳", "material": "金属", "size": "小", "importance": "关键道具"}
  ],
  "shots": [
    {"template": "远景", "description": "喜庆街道全貌，灯笼高挂，人来人往", "scene": "喜庆街道"},
    {"template": "全景", "description": "福宝马蹦蹦跳跳走在街上，背上的福袋晃来晃去", "characters": ["福宝马"], "scene": "喜庆街道"},
    {"template": "中景", "description": "福宝马遇见马爷爷，开心地挥动小蹄子", "characters": ["福宝马", "马爷爷"], "scene": "喜庆街道"},
    {"template": "特写", "description": "福宝马从福袋里掏出金色马蹄铁挂件，眼睛弯成月牙", "characters": ["福宝马"], "scene": "喜庆街道", "props": ["马蹄铁挂件"], "dialogue": "福宝马：送你马到成功！"},
    {"template": "中景", "description": "马爷爷接过挂件笑得合不拢嘴", "characters": ["马爷爷"], "scene": "喜庆街道", "props": ["马蹄铁挂件"]}
  ]
}"#;

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::matching::DEFAULT_MATCH_THRESHOLD;

    #[test]
    fn every_sample_loads_without_unresolved_names() {
        for sample in SAMPLES {
            let (project, report) = sample.load(DEFAULT_MATCH_THRESHOLD).unwrap();
            assert_eq!(project.name, sample.title);
            assert!(report.unresolved_names.is_empty(), "{}: {:?}", sample.key, report.unresolved_names);
            assert_eq!(report.shots_added, project.shots.len());
            assert!(project.shots.iter().all(|s| s.scene_id.is_some()));
        }
    }

    #[test]
    fn list_exposes_keys() {
        let keys: Vec<_> = list().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["parking_lot", "lucky_pony"]);
    }

    #[test]
    fn unknown_key_is_not_found() {
        assert_matches!(find("nope"), Err(CoreError::NotFound { .. }));
    }
}
