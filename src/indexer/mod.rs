//! Batch video indexing.
//!
//! The `video_indexer` tool pulls a clip from blob storage, submits it to
//! the Video Indexer service, waits for processing and reduces the returned
//! label insights to the instances above a confidence threshold.

mod client;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub use client::{BlobClient, VideoIndexerClient};

/// Processing state that ends polling successfully.
pub const STATE_PROCESSED: &str = "Processed";
pub const STATE_FAILED: &str = "Failed";

/// The part of a video index response the tool reads.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VideoIndex {
    pub state: Option<String>,
    #[serde(default)]
    pub videos: Vec<IndexedVideo>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct IndexedVideo {
    #[serde(default)]
    pub insights: Insights,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Insights {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<LabelInstance>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelInstance {
    pub confidence: f64,
    pub start: String,
    pub end: String,
}

/// A label that kept at least one instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilteredLabel {
    pub id: usize,
    pub label: String,
    pub instances: Vec<LabelInstance>,
}

impl VideoIndex {
    pub fn is_processed(&self) -> bool {
        self.state.as_deref() == Some(STATE_PROCESSED)
    }

    pub fn is_failed(&self) -> bool {
        self.state.as_deref() == Some(STATE_FAILED)
    }
}

/// Keep instances with confidence strictly above `threshold`, drop labels
/// left empty, and number the survivors from 1 in their original order.
pub fn filter_labels(index: &VideoIndex, threshold: f64) -> Result<Vec<FilteredLabel>> {
    let video = index
        .videos
        .first()
        .ok_or_else(|| anyhow!("video index contains no videos"))?;

    let mut output = Vec::new();
    for label in &video.insights.labels {
        let instances: Vec<LabelInstance> = label
            .instances
            .iter()
            .filter(|instance| instance.confidence > threshold)
            .cloned()
            .collect();
        if instances.is_empty() {
            continue;
        }
        output.push(FilteredLabel {
            id: output.len() + 1,
            label: label.name.clone(),
            instances,
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VideoIndex {
        serde_json::from_str(
            r#"{
                "state": "Processed",
                "videos": [{
                    "insights": {
                        "labels": [
                            {"id": 7, "name": "elephant", "instances": [
                                {"confidence": 0.92, "start": "0:00:01", "end": "0:00:04"},
                                {"confidence": 0.40, "start": "0:00:09", "end": "0:00:10"}
                            ]},
                            {"id": 8, "name": "tree", "instances": [
                                {"confidence": 0.50, "start": "0:00:00", "end": "0:00:12"}
                            ]},
                            {"id": 9, "name": "grass", "instances": [
                                {"confidence": 0.81, "start": "0:00:00", "end": "0:00:12"}
                            ]}
                        ]
                    }
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn keeps_confident_instances_and_renumbers() -> Result<()> {
        let filtered = filter_labels(&index(), 0.5)?;
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].id, 1);
        assert_eq!(filtered[0].label, "elephant");
        assert_eq!(filtered[0].instances.len(), 1);
        assert_eq!(filtered[1].id, 2);
        assert_eq!(filtered[1].label, "grass");
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> Result<()> {
        let filtered = filter_labels(&index(), 0.81)?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].label, "elephant");
        Ok(())
    }

    #[test]
    fn output_shape_matches_report() -> Result<()> {
        let filtered = filter_labels(&index(), 0.9)?;
        let json = serde_json::to_value(&filtered)?;
        assert_eq!(
            json,
            serde_json::json!([{
                "id": 1,
                "label": "elephant",
                "instances": [{"confidence": 0.92, "start": "0:00:01", "end": "0:00:04"}]
            }])
        );
        Ok(())
    }

    #[test]
    fn empty_index_is_an_error() {
        assert!(filter_labels(&VideoIndex::default(), 0.5).is_err());
    }

    #[test]
    fn state_helpers() {
        assert!(index().is_processed());
        let failed = VideoIndex {
            state: Some("Failed".to_string()),
            videos: Vec::new(),
        };
        assert!(failed.is_failed());
        assert!(!failed.is_processed());
    }
}
