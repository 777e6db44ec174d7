//! 記録APIクライアント（HTTP）
//!
//! - POST {base}/records/sections  セクション保存
//! - GET  {base}/records/{id}      記録取得（404はNone）
//! - POST {base}/files             画像保存 → {id, url}
//! - GET  {url}                    画像取得

use super::{ContentStore, RecordSnapshot, RecordStore, SectionSaveRequest, SectionSaveResponse};
use crate::error::{WizardError, Result};
use async_trait::async_trait;
use inspection_wizard_common::ImageRef;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "_id", alias = "fileId")]
    id: String,
    url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 相対URLはベースURLに連結
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.endpoint(url)
        }
    }
}

#[async_trait]
impl RecordStore for HttpStore {
    async fn save_section(&self, request: &SectionSaveRequest) -> Result<SectionSaveResponse> {
        let url = self.endpoint("records/sections");
        debug!(%url, section = request.payload.section_index, "セクション保存リクエスト");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WizardError::Persistence(format!("{}: {}", status, body)));
        }

        response
            .json::<SectionSaveResponse>()
            .await
            .map_err(|e| WizardError::Persistence(format!("レスポンス解析エラー: {}", e)))
    }

    async fn load_record(&self, record_id: &str) -> Result<Option<RecordSnapshot>> {
        let url = self.endpoint(&format!("records/{}", record_id));
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(WizardError::Persistence(format!("記録取得エラー: {}", status))),
        }
    }
}

#[async_trait]
impl ContentStore for HttpStore {
    async fn upload(&self, bytes: Vec<u8>, mime: &str) -> Result<ImageRef> {
        let response = self
            .client
            .post(self.endpoint("files"))
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WizardError::ContentStore(format!(
                "アップロード失敗: {}",
                response.status()
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(ImageRef::from_locator(&uploaded.url, Some(uploaded.id.as_str())))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let ImageRef::Durable { url, .. } = image else {
            return Err(WizardError::ContentStore("未保存の画像は取得できません".into()));
        };

        let response = self.client.get(self.resolve_url(url)).send().await?;
        if !response.status().is_success() {
            return Err(WizardError::ContentStore(format!(
                "画像取得失敗 {}: {}",
                url,
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
