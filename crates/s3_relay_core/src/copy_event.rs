use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Json,
    TsvGz,
    Other,
}

impl FileKind {
    pub fn classify(key: &str) -> Self {
        if key.ends_with(".json") {
            Self::Json
        } else if key.ends_with(".tsv.gz") {
            Self::TsvGz
        } else {
            Self::Other
        }
    }

    pub fn is_relayed(self) -> bool {
        matches!(self, Self::Json | Self::TsvGz)
    }
}

/// A single object-created notification, reduced to what the relay needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyEvent {
    pub source_bucket: String,
    pub source_key: String,
}

impl CopyEvent {
    pub fn new(source_bucket: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
        }
    }

    pub fn file_kind(&self) -> FileKind {
        FileKind::classify(&self.source_key)
    }

    /// Filename stem used as the routing key: the last path segment up to its
    /// first period.
    pub fn prefix_id(&self) -> &str {
        let file_name = self
            .source_key
            .rsplit('/')
            .next()
            .unwrap_or(self.source_key.as_str());
        file_name.split('.').next().unwrap_or(file_name)
    }
}

/// Decodes an object key as delivered in S3 event notifications, where spaces
/// arrive as `+` and other reserved bytes as `%XX` escapes.
pub fn decode_event_key(raw_key: &str) -> Option<String> {
    let spaced = raw_key.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|decoded| decoded.into_owned())
}

/// Encodes a key for the `x-amz-copy-source` header, keeping `/` separators.
pub fn encode_copy_source(bucket: &str, key: &str) -> String {
    let encoded_key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{encoded_key}")
}
