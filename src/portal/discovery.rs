//! Enumeration of pending evaluation tasks.
//!
//! The entry page links to one list page per evaluation category; each list
//! page carries one "evaluate" link per unfinished task. Discovery walks that
//! two-level structure and pairs every task with the category it must later
//! be finalized under.

use anyhow::{Context, Result};
use html_scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{info, warn};
use url::Url;

use crate::portal::session::Session;
use crate::portal::submit::SAVE_PATH;

/// Entry page listing evaluation categories.
const FIND_PATH: &str = "/jsxsd/xspj/xspj_find.do";
/// Href fragment identifying a category list page.
const LIST_MARKER: &str = "xspj_list.do";
/// Href fragment identifying a task edit page.
const EDIT_MARKER: &str = "xspj_edit.do";
/// Visible label of an actionable "evaluate" link.
const EVALUATE_LABEL: &str = "评价";

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// One fillable evaluation form and the category page it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub edit_url: Url,
    pub category_url: Url,
}

/// Enumerate every pending task for the authenticated session.
///
/// An entry-page failure yields an empty list (no pending work); a failure on
/// one category page skips only that category.
pub async fn pending_tasks(session: &Session, portal_base: &Url) -> Vec<PendingTask> {
    let entry = match fetch_page(session, join(portal_base, FIND_PATH)).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = ?e, "failed to fetch evaluation entry page");
            return Vec::new();
        }
    };

    let categories = category_links(&entry, portal_base);
    if categories.is_empty() {
        // Degraded fallback: the entry page itself sometimes carries edit
        // links directly. Without a list page there is no correct finalize
        // target, so the save endpoint stands in and finalize will likely
        // miss; kept because the original deployment behaved this way.
        warn!("no category pages found, falling back to entry-page scan (degraded)");
        let save_url = join(portal_base, SAVE_PATH);
        return evaluate_links(&entry, portal_base)
            .into_iter()
            .map(|edit_url| PendingTask {
                edit_url,
                category_url: save_url.clone(),
            })
            .collect();
    }

    info!(categories = categories.len(), "checking evaluation categories");
    let mut tasks = Vec::new();
    for category_url in categories {
        let page = match fetch_page(session, category_url.clone()).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %category_url, error = ?e, "failed to fetch category page, skipping");
                continue;
            }
        };
        for edit_url in evaluate_links(&page, portal_base) {
            tasks.push(PendingTask {
                edit_url,
                category_url: category_url.clone(),
            });
        }
    }
    tasks
}

/// Hyperlinks on the entry page whose target is a category list page.
pub fn category_links(html: &Html, base: &Url) -> Vec<Url> {
    html.select(&ANCHOR_SEL)
        .filter_map(|a| a.attr("href"))
        .filter(|href| href.contains(LIST_MARKER))
        .filter_map(|href| base.join(href).ok())
        .collect()
}

/// Hyperlinks labeled "evaluate" whose target is a task edit page.
pub fn evaluate_links(html: &Html, base: &Url) -> Vec<Url> {
    html.select(&ANCHOR_SEL)
        .filter(|a| a.text().collect::<String>().trim() == EVALUATE_LABEL)
        .filter_map(|a| a.attr("href"))
        .filter(|href| href.contains(EDIT_MARKER))
        .filter_map(|href| base.join(href).ok())
        .collect()
}

async fn fetch_page(session: &Session, url: Url) -> Result<Html> {
    let resp = session.get(url.clone()).await?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("{url} returned status {status}");
    }
    let body = resp.text().await.context("reading page body")?;
    Ok(Html::parse_document(&body))
}

fn join(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    url.set_path(path);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://jwxt.example.edu.cn").unwrap()
    }

    #[test]
    fn test_category_links_match_list_pages_only() {
        let html = Html::parse_document(
            r#"<body>
                <a href="/jsxsd/xspj/xspj_list.do?pj01id=A">学生评价</a>
                <a href="/jsxsd/xspj/xspj_list.do?pj01id=B">教学评价</a>
                <a href="/jsxsd/framework/xsMain.htmlx">首页</a>
                <a href="/jsxsd/xspj/xspj_edit.do?id=1">评价</a>
            </body>"#,
        );
        let links = category_links(&html, &base());
        assert_eq!(links.len(), 2);
        assert!(links[0].as_str().contains("pj01id=A"));
        assert!(links[1].as_str().contains("pj01id=B"));
    }

    #[test]
    fn test_evaluate_links_require_label_and_edit_target() {
        let html = Html::parse_document(
            r#"<body>
                <a href="/jsxsd/xspj/xspj_edit.do?id=1">评价</a>
                <a href="/jsxsd/xspj/xspj_edit.do?id=2">查看</a>
                <a href="/jsxsd/xspj/xspj_list.do?id=3">评价</a>
                <a href="/jsxsd/xspj/xspj_edit.do?id=4"> 评价 </a>
            </body>"#,
        );
        let links = evaluate_links(&html, &base());
        assert_eq!(links.len(), 2);
        assert!(links[0].as_str().contains("id=1"));
        assert!(links[1].as_str().contains("id=4"));
    }

    #[test]
    fn test_links_resolve_relative_hrefs() {
        let html = Html::parse_document(r#"<a href="xspj_list.do?x=1">list</a>"#);
        let base = Url::parse("https://jwxt.example.edu.cn/jsxsd/xspj/xspj_find.do").unwrap();
        let links = category_links(&html, &base);
        assert_eq!(
            links[0].as_str(),
            "https://jwxt.example.edu.cn/jsxsd/xspj/xspj_list.do?x=1"
        );
    }

    #[test]
    fn test_no_links_on_empty_page() {
        let html = Html::parse_document("<body><p>暂无评教任务</p></body>");
        assert!(category_links(&html, &base()).is_empty());
        assert!(evaluate_links(&html, &base()).is_empty());
    }
}
