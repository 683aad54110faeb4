//! Evaluation form harvesting and favorable autofill.
//!
//! Evaluation pages carry a single form of heterogeneous controls with no
//! machine-readable schema, so each control is classified from its tag and
//! attributes into a [`ControlKind`] and a value is synthesized per kind:
//! numeric rating selects lean toward the high end, radio groups prefer the
//! agree-ish labels, pre-filled comments are kept. The result is the flat
//! ordered field list the save endpoint expects.

use anyhow::{Context, Result};
use html_scraper::{ElementRef, Html, Selector};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use crate::portal::session::Session;

/// Ordered (name, value) pairs submitted to the save endpoint. Duplicate
/// names are legitimate and keep their source-relative stacking.
pub type Payload = Vec<(String, String)>;

/// Comment substituted into empty textareas.
const FILLER_COMMENT: &str = "老师讲课认真，内容充实，收获很大！";
/// Sibling label texts that mark a radio option as a favorable answer.
const PREFERRED_LABELS: [&str; 2] = ["同意", "大体同意"];
/// Synthetic field telling the server this is a save, not a final submit.
const SAVE_MARKER: (&str, &str) = ("zancun", "暂存");

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static CONTROL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, textarea, select").unwrap());
static OPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());

/// One classified form control. Classification is a pure function of the
/// parsed element; value synthesis happens separately so radio groups can be
/// buffered until the whole form has been scanned.
#[derive(Debug, Clone, PartialEq)]
enum ControlKind {
    /// Text, hidden, and any other plain input: declared value verbatim.
    Text { value: String },
    /// Included only when checked; unchecked boxes are omitted entirely.
    Checkbox { value: String, checked: bool },
    /// One member of a group resolved after the full scan.
    Radio { value: String, label: Option<String> },
    /// Candidate option values (blank-valued options are not candidates).
    Select { options: Vec<String> },
    /// Existing text, if any, wins over the filler.
    Textarea { text: String },
}

/// Fetch a task page and synthesize its payload. `Ok(None)` when the page
/// carries no form: nothing to do, the caller skips the task.
pub async fn harvest(session: &Session, edit_url: &Url) -> Result<Option<Payload>> {
    let resp = session
        .get(edit_url.clone())
        .await
        .context("fetching evaluation form")?;
    let body = resp.text().await.context("reading evaluation form body")?;
    let html = Html::parse_document(&body);

    let payload = fill_form(&html, edit_url, &mut rand::rng());
    if payload.is_none() {
        info!(url = %edit_url, "no form on task page, skipping");
    }
    Ok(payload)
}

/// Synthesize a favorable payload from a parsed task page, or `None` when the
/// page has no form.
pub fn fill_form(html: &Html, edit_url: &Url, rng: &mut impl Rng) -> Option<Payload> {
    let form = html.select(&FORM_SEL).next()?;

    let mut payload: Payload = Vec::new();
    // Radio groups keyed by name, in first-appearance order. A control may
    // appear before the rest of its group, so resolution waits for the scan.
    let mut radio_groups: indexmap::IndexMap<String, Vec<RadioOption>> =
        indexmap::IndexMap::new();

    for control in form.select(&CONTROL_SEL) {
        let Some((name, kind)) = classify(control) else {
            continue;
        };
        match kind {
            ControlKind::Radio { value, label } => {
                radio_groups
                    .entry(name)
                    .or_default()
                    .push(RadioOption { value, label });
            }
            ControlKind::Checkbox { value, checked } => {
                if checked {
                    payload.push((name, value));
                }
            }
            ControlKind::Select { options } => {
                let value = choose_select_value(&options, rng).unwrap_or_default();
                payload.push((name, value));
            }
            ControlKind::Textarea { text } => {
                let value = if text.trim().is_empty() {
                    FILLER_COMMENT.to_string()
                } else {
                    text
                };
                payload.push((name, value));
            }
            ControlKind::Text { value } => payload.push((name, value)),
        }
    }

    for (name, options) in &radio_groups {
        if let Some(value) = resolve_radio_group(options, rng) {
            payload.push((name.clone(), value));
        }
    }

    payload.push((SAVE_MARKER.0.to_string(), SAVE_MARKER.1.to_string()));

    // Forms sometimes rely on identifiers carried only in the edit URL's
    // query string; mirror any that no emitted field already covers.
    let present: std::collections::HashSet<String> =
        payload.iter().map(|(n, _)| n.clone()).collect();
    for (key, value) in edit_url.query_pairs() {
        if !present.contains(key.as_ref()) {
            payload.push((key.into_owned(), value.into_owned()));
        }
    }

    debug!(fields = payload.len(), "synthesized evaluation payload");
    Some(payload)
}

/// One radio control buffered for post-scan group resolution.
#[derive(Debug, Clone, PartialEq)]
struct RadioOption {
    value: String,
    /// Trimmed text of the node immediately following the control, when the
    /// markup places the option label there.
    label: Option<String>,
}

/// Classify a control element. Unnamed controls are dropped: the server
/// would never receive them from a browser either.
fn classify(el: ElementRef<'_>) -> Option<(String, ControlKind)> {
    let name = el.attr("name")?.to_string();
    if name.is_empty() {
        return None;
    }

    let kind = match el.value().name() {
        "select" => ControlKind::Select {
            options: el
                .select(&OPTION_SEL)
                .filter_map(|o| o.attr("value"))
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.to_string())
                .collect(),
        },
        "textarea" => ControlKind::Textarea {
            text: el.text().collect::<String>(),
        },
        _ => match el.attr("type").unwrap_or("text") {
            "radio" => ControlKind::Radio {
                value: el.attr("value").unwrap_or_default().to_string(),
                label: sibling_label(el),
            },
            "checkbox" => ControlKind::Checkbox {
                // A checkbox without a declared value submits as "on".
                value: el.attr("value").unwrap_or("on").to_string(),
                checked: el.attr("checked").is_some(),
            },
            _ => ControlKind::Text {
                value: el.attr("value").unwrap_or_default().to_string(),
            },
        },
    };
    Some((name, kind))
}

/// Text node immediately after a radio control, trimmed; `None` when the
/// sibling is absent, not text, or blank.
fn sibling_label(el: ElementRef<'_>) -> Option<String> {
    let sibling = el.next_sibling()?;
    let text = sibling.value().as_text()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Pick a value for a select control.
///
/// When every candidate parses as a non-negative decimal the control is a
/// rating scale: sample with weight equal to the 1-based option index, so
/// later (higher-scored) options dominate without being deterministic.
/// Otherwise pick uniformly.
fn choose_select_value(options: &[String], rng: &mut impl Rng) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    if options.iter().all(|v| is_decimal(v)) {
        let weighted: Vec<(usize, &String)> = options.iter().enumerate().collect();
        weighted
            .choose_weighted(rng, |(i, _)| (i + 1) as u32)
            .ok()
            .map(|(_, v)| (*v).clone())
    } else {
        options.choose(rng).cloned()
    }
}

/// Resolve a radio group to exactly one value: uniformly among options whose
/// sibling label is a preferred agree-ish text, else uniformly among the
/// first two document-order options (the deployment lists answers best-first).
fn resolve_radio_group(options: &[RadioOption], rng: &mut impl Rng) -> Option<String> {
    let preferred: Vec<&RadioOption> = options
        .iter()
        .filter(|o| {
            o.label
                .as_deref()
                .is_some_and(|l| PREFERRED_LABELS.contains(&l))
        })
        .collect();

    let chosen = if !preferred.is_empty() {
        preferred.choose(rng).copied()
    } else if options.len() > 1 {
        options[..2].choose(rng)
    } else {
        options.first()
    };
    chosen.map(|o| o.value.clone())
}

/// Non-negative decimal: digits with at most one dot and at least one digit.
/// Signs and exponents disqualify (a "-1" option is a sentinel, not a score).
fn is_decimal(s: &str) -> bool {
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in s.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}
