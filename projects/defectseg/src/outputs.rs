// Shared result map visible to downstream pipeline stages.
//
// Keys are stage-defined names; once published they are never retracted
// within a run. Workers never touch this map; only the orchestrator writes
// to it, after the worker pool has drained.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::tree::ProjectTree;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutputValue {
    Tree(ProjectTree),
    Timestamp(DateTime<Utc>),
    Images(Vec<PathBuf>),
}

#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct StageOutputs {
    values: BTreeMap<String, OutputValue>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value under a stage-defined key. Publishing the same key
    /// twice within a run is a bug in the calling stage.
    pub fn publish(&mut self, key: &str, value: OutputValue) {
        let previous = self.values.insert(key.to_string(), value);
        debug_assert!(previous.is_none(), "output key {key} published twice");
    }

    pub fn get(&self, key: &str) -> Option<&OutputValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The image-path list published under `key`, if any.
    pub fn images(&self, key: &str) -> Option<&[PathBuf]> {
        match self.get(key) {
            Some(OutputValue::Images(paths)) => Some(paths),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_read_back() {
        let mut outputs = StageOutputs::new();
        outputs.publish(
            "stain_overlay_images",
            OutputValue::Images(vec![PathBuf::from("/out/a.jpg")]),
        );
        outputs.publish("start_time", OutputValue::Timestamp(Utc::now()));

        assert_eq!(
            outputs.images("stain_overlay_images").unwrap(),
            &[PathBuf::from("/out/a.jpg")]
        );
        assert!(outputs.images("start_time").is_none());
        assert_eq!(
            outputs.keys().collect::<Vec<_>>(),
            ["stain_overlay_images", "start_time"]
        );
    }

    #[test]
    #[should_panic(expected = "published twice")]
    fn double_publish_is_a_bug() {
        let mut outputs = StageOutputs::new();
        outputs.publish("tree", OutputValue::Images(Vec::new()));
        outputs.publish("tree", OutputValue::Images(Vec::new()));
    }
}
