//! 画像参照
//!
//! - Transient: 端末内だけに存在する未保存のエンコード（data: / blob: URL）
//! - Durable: コンテンツストアに保存済みの参照（id + 取得URL）
//!
//! Transient は記録APIにもLLMにも送らない。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 画像参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ImageRef {
    /// 未保存のローカルバッファ
    #[serde(rename_all = "camelCase")]
    Transient { data_url: String },
    /// 保存済み参照
    Durable { id: String, url: String },
}

impl ImageRef {
    /// URLから参照を生成（ロケータで種別を判定）
    pub fn from_locator(locator: &str, id: Option<&str>) -> Self {
        if is_transient_locator(locator) {
            ImageRef::Transient {
                data_url: locator.to_string(),
            }
        } else {
            ImageRef::Durable {
                id: id.map(str::to_string).unwrap_or_else(|| locator.to_string()),
                url: locator.to_string(),
            }
        }
    }

    pub fn durable(id: impl Into<String>, url: impl Into<String>) -> Self {
        ImageRef::Durable {
            id: id.into(),
            url: url.into(),
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, ImageRef::Durable { .. })
    }

    /// 取得URL（Transientの場合はdata URLそのもの）
    pub fn locator(&self) -> &str {
        match self {
            ImageRef::Transient { data_url } => data_url,
            ImageRef::Durable { url, .. } => url,
        }
    }
}

/// ロケータがローカルエンコードを指すか
pub fn is_transient_locator(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("data:") || lower.starts_with("blob:")
}

/// Durableな参照だけを残し、重複（同一id）を除去する
pub fn retain_durable(images: &[ImageRef]) -> Vec<ImageRef> {
    let mut seen = std::collections::HashSet::new();
    images
        .iter()
        .filter(|img| img.is_durable())
        .filter(|img| match img {
            ImageRef::Durable { id, .. } => seen.insert(id.clone()),
            ImageRef::Transient { .. } => false,
        })
        .cloned()
        .collect()
}

/// JSON値からローカルエンコードの画像を取り除く
///
/// 文字列ロケータ、`{url}` / `{src}` / `{dataUrl}` オブジェクト、`kind: transient` のタグ付き参照が対象。
/// 値そのものが除去対象なら None
pub fn strip_transient_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if is_transient_locator(s) => None,
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(strip_transient_value).collect(),
        )),
        Value::Object(map) if is_transient_object(map) => None,
        Value::Object(map) => Some(Value::Object(strip_transient_fields(map))),
        other => Some(other.clone()),
    }
}

/// フィールド群からローカルエンコードの画像を取り除く（該当キーごと削除）
pub fn strip_transient_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(key, value)| strip_transient_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn is_transient_object(map: &Map<String, Value>) -> bool {
    if map.get("kind").and_then(Value::as_str) == Some("transient") {
        return true;
    }
    ["url", "src", "dataUrl"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .any(is_transient_locator)
}

/// 参照を追加（同一参照は追加しない）
pub fn push_unique(images: &mut Vec<ImageRef>, image: ImageRef) -> bool {
    let exists = images.iter().any(|existing| match (existing, &image) {
        (ImageRef::Durable { id: a, .. }, ImageRef::Durable { id: b, .. }) => a == b,
        (a, b) => a == b,
    });
    if !exists {
        images.push(image);
    }
    !exists
}

/// Data URLからMIMEタイプとBase64部分を分離
///
/// "data:image/jpeg;base64,/9j/4AAQ..." → ("image/jpeg", "/9j/4AAQ...")
pub fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.split(';').next().filter(|m| !m.is_empty()).unwrap_or("image/jpeg");
    Some((mime, data))
}

// ウィジェットからは文字列 / {url} / {id,url} / タグ付きのいずれかで届く
#[derive(Deserialize)]
#[serde(untagged)]
enum RawImageRef {
    Tagged(TaggedImageRef),
    Locator(String),
    Object {
        #[serde(default, alias = "_id", alias = "fileId")]
        id: Option<String>,
        #[serde(alias = "src", alias = "dataUrl")]
        url: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum TaggedImageRef {
    #[serde(rename_all = "camelCase")]
    Transient { data_url: String },
    Durable { id: String, url: String },
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawImageRef::deserialize(deserializer)? {
            RawImageRef::Tagged(TaggedImageRef::Transient { data_url }) => {
                ImageRef::Transient { data_url }
            }
            // タグがDurableでもロケータがローカルなら信用しない
            RawImageRef::Tagged(TaggedImageRef::Durable { id, url }) => {
                ImageRef::from_locator(&url, Some(&id))
            }
            RawImageRef::Locator(locator) => ImageRef::from_locator(&locator, None),
            RawImageRef::Object { id, url } => ImageRef::from_locator(&url, id.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_locator() {
        assert!(is_transient_locator("data:image/png;base64,AAAA"));
        assert!(is_transient_locator("blob:https://app/1234"));
        assert!(is_transient_locator("  DATA:image/jpeg;base64,xx"));
        assert!(!is_transient_locator("https://files.example.com/abc"));
        assert!(!is_transient_locator("/api/files/64f0c"));
    }

    #[test]
    fn test_retain_durable_drops_transient_and_duplicates() {
        let images = vec![
            ImageRef::durable("a", "https://f/a"),
            ImageRef::Transient { data_url: "data:image/png;base64,AA".into() },
            ImageRef::durable("a", "https://f/a?v=2"),
            ImageRef::durable("b", "https://f/b"),
        ];
        let kept = retain_durable(&images);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(ImageRef::is_durable));
        assert_eq!(kept[0].locator(), "https://f/a");
    }

    #[test]
    fn test_push_unique() {
        let mut images = vec![ImageRef::durable("a", "https://f/a")];
        assert!(!push_unique(&mut images, ImageRef::durable("a", "https://f/a")));
        assert!(push_unique(&mut images, ImageRef::durable("b", "https://f/b")));
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn test_split_data_url() {
        let (mime, data) = split_data_url("data:image/png;base64,iVBOR").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, "iVBOR");
        assert!(split_data_url("https://f/a").is_none());
    }

    #[test]
    fn test_deserialize_variants() {
        let json = r#"[
            "data:image/jpeg;base64,/9j/",
            "https://files/1",
            {"_id": "64f", "url": "/api/files/64f"},
            {"kind": "durable", "id": "x", "url": "data:image/png;base64,AA"},
            {"kind": "transient", "dataUrl": "blob:local"}
        ]"#;
        let images: Vec<ImageRef> = serde_json::from_str(json).unwrap();
        assert!(!images[0].is_durable());
        assert_eq!(images[1], ImageRef::durable("https://files/1", "https://files/1"));
        assert_eq!(images[2], ImageRef::durable("64f", "/api/files/64f"));
        assert!(!images[3].is_durable());
        assert!(!images[4].is_durable());
    }

    #[test]
    fn test_strip_transient_fields() {
        let fields = serde_json::json!({
            "photos": ["data:image/jpeg;base64,/9j/4AAQ", "https://files/a.jpg"],
            "sketch": "blob:https://app/77",
            "cover": {"id": "x", "url": "data:image/png;base64,AA"},
            "gallery": [{"_id": "64f", "url": "/api/files/64f"}, {"kind": "transient", "dataUrl": "x"}],
            "nested": {"thumb": {"src": "DATA:image/png;base64,BB"}, "count": 2},
            "owner": "ACME"
        });
        let stripped = strip_transient_fields(fields.as_object().unwrap());
        assert_eq!(
            Value::Object(stripped),
            serde_json::json!({
                "photos": ["https://files/a.jpg"],
                "gallery": [{"_id": "64f", "url": "/api/files/64f"}],
                "nested": {"count": 2},
                "owner": "ACME"
            })
        );
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_string(&ImageRef::durable("a", "https://f/a")).unwrap();
        assert_eq!(json, r#"{"kind":"durable","id":"a","url":"https://f/a"}"#);
    }
}
