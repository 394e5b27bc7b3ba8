// Geolocation copy between photos, via exiftool.
//
// GPS values are passed through verbatim: exiftool prints human-readable
// coordinate strings and accepts the same strings back when writing.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

pub trait GeoCopier: Send + Sync {
    /// Copy GPS tags from `source` to `dest`. Returns true when the source
    /// carried a complete position and the tags were written.
    fn copy(&self, source: &Path, dest: &Path) -> Result<bool>;
}

#[derive(Debug, Default, Deserialize)]
struct GpsRecord {
    #[serde(rename = "GPSLatitude")]
    latitude: Option<Value>,
    #[serde(rename = "GPSLongitude")]
    longitude: Option<Value>,
    #[serde(rename = "GPSAltitude")]
    altitude: Option<Value>,
    #[serde(rename = "GPSLatitudeRef")]
    latitude_ref: Option<Value>,
    #[serde(rename = "GPSLongitudeRef")]
    longitude_ref: Option<Value>,
}

fn present(value: &Option<Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

impl GpsRecord {
    /// A partial position is treated as no position at all.
    fn has_full_position(&self) -> bool {
        present(&self.latitude) && present(&self.longitude) && present(&self.altitude)
    }
}

fn tag_argument(tag: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("-{tag}={s}"),
        other => format!("-{tag}={other}"),
    }
}

pub struct ExiftoolGeoCopier {
    exiftool_path: String,
}

impl ExiftoolGeoCopier {
    pub fn new(exiftool_path: impl Into<String>) -> Self {
        Self {
            exiftool_path: exiftool_path.into(),
        }
    }

    fn read_geolocation(&self, image: &Path) -> Result<GpsRecord> {
        let output = Command::new(&self.exiftool_path)
            .args([
                "-json",
                "-GPSLatitude",
                "-GPSLongitude",
                "-GPSAltitude",
                "-GPSLatitudeRef",
                "-GPSLongitudeRef",
            ])
            .arg(image)
            .output()
            .with_context(|| format!("Cannot run {}", self.exiftool_path))?;
        if !output.status.success() {
            bail!(
                "exiftool failed on {}: {}",
                image.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        // Unparseable output degrades to "no geolocation", not a failure.
        Ok(parse_gps_output(&output.stdout))
    }

    fn write_geolocation(&self, dest: &Path, record: &GpsRecord) -> Result<()> {
        let mut command = Command::new(&self.exiftool_path);
        command.arg("-overwrite_original");
        for (tag, value) in [
            ("GPSLatitude", &record.latitude),
            ("GPSLongitude", &record.longitude),
            ("GPSAltitude", &record.altitude),
            ("GPSLatitudeRef", &record.latitude_ref),
            ("GPSLongitudeRef", &record.longitude_ref),
        ] {
            if let Some(value) = value {
                command.arg(tag_argument(tag, value));
            }
        }
        let output = command
            .arg(dest)
            .output()
            .with_context(|| format!("Cannot run {}", self.exiftool_path))?;
        if !output.status.success() {
            bail!(
                "exiftool failed to write GPS tags to {}: {}",
                dest.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn parse_gps_output(stdout: &[u8]) -> GpsRecord {
    serde_json::from_slice::<Vec<GpsRecord>>(stdout)
        .ok()
        .and_then(|mut records| {
            if records.is_empty() {
                None
            } else {
                Some(records.remove(0))
            }
        })
        .unwrap_or_default()
}

impl GeoCopier for ExiftoolGeoCopier {
    fn copy(&self, source: &Path, dest: &Path) -> Result<bool> {
        let record = self.read_geolocation(source)?;
        if !record.has_full_position() {
            return Ok(false);
        }
        self.write_geolocation(dest, &record)?;
        Ok(true)
    }
}
