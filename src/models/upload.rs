//! Metadata carried by the `json` part of an upload.

use serde::Deserialize;

/// Decoded `json` part of a POST or PATCH body.
///
/// Field names follow the wire format (`Size`, `ContentType`, ...); the
/// lowercase spellings are accepted as well.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UploadMeta {
    /// Declared payload size. The stored size comes from the bytes written.
    #[serde(default, alias = "size")]
    pub size: u64,

    /// Content type override; the payload part's own header wins when set.
    #[serde(default, alias = "contentType", alias = "content_type")]
    pub content_type: Option<String>,

    #[serde(default, alias = "description")]
    pub description: String,

    #[serde(default, alias = "private")]
    pub private: Option<bool>,

    /// Target directory for PATCH, enabling rename-with-move.
    #[serde(default, alias = "dir")]
    pub dir: Option<String>,

    /// New base name for PATCH without a payload.
    #[serde(default, alias = "name")]
    pub name: Option<String>,
}
