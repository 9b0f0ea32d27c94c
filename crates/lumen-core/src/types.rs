//! Core data types for the Lumen processing pipeline.
//!
//! Field names on [`ImageMetadataRecord`] follow the `image_metadata` table
//! columns so rows read from PostgREST deserialize directly.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A request to process one already-uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    /// Image id from the `images` table
    pub image_id: i64,
    /// Opaque identity of the owning user
    pub user_id: String,
    /// Storage key of the original upload
    pub original_path: String,
    /// Original filename as uploaded
    pub filename: String,
}

impl ProcessingRequest {
    pub fn new(
        image_id: i64,
        user_id: impl Into<String>,
        original_path: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            image_id,
            user_id: user_id.into(),
            original_path: original_path.into(),
            filename: filename.into(),
        }
    }
}

/// Processing status of a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal until a new invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RGB color, serialized as lowercase `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("invalid color '{s}': expected #rrggbb"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("invalid color '{s}': {e}"))
        };
        Ok(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The persisted processing result for one image.
///
/// Created externally in `pending` state; the pipeline reads it and
/// overwrites it as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadataRecord {
    pub image_id: i64,
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub original_path: String,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    /// Most frequent colors, most frequent first
    #[serde(rename = "colors", default, deserialize_with = "null_as_default")]
    pub dominant_colors: Vec<Rgb>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "ai_processing_status", default)]
    pub status: ProcessingStatus,
}

impl ImageMetadataRecord {
    /// A fresh record as the upload flow creates it.
    pub fn pending(
        image_id: i64,
        user_id: impl Into<String>,
        original_path: impl Into<String>,
    ) -> Self {
        Self {
            image_id,
            user_id: user_id.into(),
            original_path: original_path.into(),
            thumbnail_path: None,
            dominant_colors: Vec::new(),
            tags: Vec::new(),
            description: String::new(),
            status: ProcessingStatus::Pending,
        }
    }

    /// Copy of this record with a different status and nothing else changed.
    pub fn with_status(&self, status: ProcessingStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// PostgREST returns `null` for unset columns.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Tags and description returned by the vision service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisionAnalysis {
    pub tags: Vec<String>,
    pub description: String,
}
