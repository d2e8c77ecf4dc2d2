use super::types::{KeywordSearchRequest, KeywordSearchResponse, PlaceDocument};
use super::{send_json, PlaceSearchProvider, ProviderError};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Kakao Local keyword search.
pub struct KakaoLocalClient {
    client: Client,
    config: Config,
}

impl KakaoLocalClient {
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("GeoProxyServer/1.0")
            .timeout(config.upstream_timeout)
            .build()
            .map_err(ProviderError::Request)?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl PlaceSearchProvider for KakaoLocalClient {
    async fn keyword_search(
        &self,
        request: &KeywordSearchRequest,
    ) -> Result<Vec<PlaceDocument>, ProviderError> {
        let url = format!("{}{}", self.config.kakao_base_url, self.config.kakao_keyword_path);
        let http = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("KakaoAK {}", self.config.kakao_rest_api_key),
            )
            .query(&request.query_params());

        let payload = send_json(http, self.config.upstream_timeout).await?;
        let response = KeywordSearchResponse::deserialize(&payload)
            .map_err(|source| ProviderError::Decode { body: payload.clone(), source })?;

        tracing::debug!(
            keyword = %request.keyword,
            found = response.documents.len(),
            "Keyword search returned"
        );
        Ok(response.documents)
    }
}
