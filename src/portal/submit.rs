//! Save and finalize submission against the portal.
//!
//! Saving persists one task's payload; finalizing locks in every saved task
//! of a category in a single batch. Both succeed at the transport level even
//! when the portal rejects them, so success is detected by a literal marker
//! string in the response body and its absence is surfaced as a warning with
//! the raw response, never as a fatal error.

use anyhow::{Context, Result};
use html_scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{info, warn};
use url::Url;

use crate::portal::form::Payload;
use crate::portal::session::Session;

/// Save ("暂存") endpoint for a single task.
pub const SAVE_PATH: &str = "/jsxsd/xspj/xspj_save.do";
/// Batch finalize ("提交") endpoint for a whole category.
pub const FINALIZE_PATH: &str = "/jsxsd/xspj/xspj_All_submit.do";

/// Body marker confirming a save.
const SAVE_OK: &str = "保存成功";
/// Body marker confirming a finalize.
const FINALIZE_OK: &str = "提交成功";
/// Per-task confirmation field appended to the finalize payload.
const CONFIRM_FIELD: (&str, &str) = ("issavestr", "是");

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());

/// POST one task's payload to the save endpoint, with the task's own page as
/// referer. Returns whether the portal confirmed the save.
pub async fn save(
    session: &Session,
    portal_base: &Url,
    payload: &Payload,
    edit_url: &Url,
) -> Result<bool> {
    let mut url = portal_base.clone();
    url.set_path(SAVE_PATH);

    let resp = session
        .post_form(url, payload, Some(edit_url))
        .await
        .context("posting save request")?;
    let body = resp.text().await.context("reading save response")?;

    if body.contains(SAVE_OK) {
        info!(url = %edit_url, "evaluation saved");
        Ok(true)
    } else {
        warn!(
            url = %edit_url,
            response = snippet(&body, 300),
            "save not confirmed by portal"
        );
        Ok(false)
    }
}

/// Finalize a category: re-fetch its list page, round-trip the bookkeeping
/// fields of its form, confirm once per saved task, and POST to the batch
/// submit endpoint. A missing marker is a warning; the run continues.
pub async fn finalize_category(
    session: &Session,
    portal_base: &Url,
    category_url: &Url,
    task_count: usize,
) -> Result<()> {
    let resp = session
        .get(category_url.clone())
        .await
        .context("fetching category page for finalize")?;
    let body = resp.text().await.context("reading category page")?;
    let html = Html::parse_document(&body);

    let Some(payload) = finalize_payload(&html, task_count) else {
        warn!(url = %category_url, "no form on category page, skipping finalize");
        return Ok(());
    };

    let mut url = portal_base.clone();
    url.set_path(FINALIZE_PATH);
    let resp = session
        .post_form(url, &payload, Some(category_url))
        .await
        .context("posting finalize request")?;
    let body = resp.text().await.context("reading finalize response")?;

    if body.contains(FINALIZE_OK) {
        info!(url = %category_url, tasks = task_count, "category finalized");
    } else {
        warn!(
            url = %category_url,
            response = snippet(&body, 300),
            "finalize not confirmed by portal"
        );
    }
    Ok(())
}

/// Build the finalize payload from a category page: every named input of the
/// page's form plus one confirmation field per saved task. `None` when the
/// page has no form.
pub fn finalize_payload(html: &Html, task_count: usize) -> Option<Payload> {
    let form = html.select(&FORM_SEL).next()?;

    let mut payload: Payload = form
        .select(&INPUT_SEL)
        .filter_map(|input| {
            let name = input.attr("name")?;
            if name.is_empty() {
                return None;
            }
            let value = input.attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    for _ in 0..task_count {
        payload.push((CONFIRM_FIELD.0.to_string(), CONFIRM_FIELD.1.to_string()));
    }
    Some(payload)
}

/// First `max` characters of a response body, for diagnostics.
fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect::<String>().trim().to_string()
}
