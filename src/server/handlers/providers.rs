//! Provider listing and browsing passthroughs.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use super::super::AppState;
use super::api_types::ApiResponse;
use super::helpers::{bad_request, scraper_error};
use crate::models::SiteAccess;

pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::ok(state.download.registry().list())
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(flatten)]
    pub site: SiteAccess,
    pub keyword: String,
}

pub async fn search(State(state): State<AppState>, Json(body): Json<SearchBody>) -> impl IntoResponse {
    let keyword = body.keyword.trim().to_string();
    if keyword.is_empty() {
        return bad_request("keyword is required");
    }
    let result = state
        .download
        .browse(&body.site, |provider, ctx| {
            let keyword = keyword.clone();
            async move { provider.search(&ctx, &keyword).await }
        })
        .await;
    match result {
        Ok(items) => ApiResponse::ok(items).into_response(),
        Err(e) => scraper_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogBody {
    #[serde(flatten)]
    pub site: SiteAccess,
    pub page: Option<u32>,
    pub orderby: Option<String>,
    pub path: Option<String>,
}

pub async fn catalog(State(state): State<AppState>, Json(body): Json<CatalogBody>) -> impl IntoResponse {
    let page = body.page.unwrap_or(1).max(1);
    let result = state
        .download
        .browse(&body.site, |provider, ctx| {
            let orderby = body.orderby.clone();
            let path = body.path.clone();
            async move {
                provider
                    .catalog(&ctx, page, orderby.as_deref(), path.as_deref())
                    .await
            }
        })
        .await;
    match result {
        Ok(page) => ApiResponse::ok(page).into_response(),
        Err(e) => scraper_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChaptersBody {
    #[serde(flatten)]
    pub site: SiteAccess,
    pub manga_id: Option<String>,
    pub manga_url: Option<String>,
}

pub async fn chapters(State(state): State<AppState>, Json(body): Json<ChaptersBody>) -> impl IntoResponse {
    let manga_url = body.manga_url.clone().filter(|u| !u.trim().is_empty());
    let manga_id = body.manga_id.clone().filter(|id| !id.trim().is_empty());
    if manga_url.is_none() && manga_id.is_none() {
        return bad_request("manga_id or manga_url is required");
    }
    let result = state
        .download
        .browse(&body.site, |provider, ctx| {
            let url = match (&manga_url, &manga_id) {
                (Some(url), _) => url.clone(),
                (None, Some(id)) => provider.manga_url(&ctx.base_url, id),
                (None, None) => String::new(),
            };
            async move { provider.chapters(&ctx, &url).await }
        })
        .await;
    match result {
        Ok(chapters) => ApiResponse::ok(chapters).into_response(),
        Err(e) => scraper_error(e),
    }
}
