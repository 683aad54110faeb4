//! End-to-end exercise of the non-network pipeline: discover tasks from
//! portal markup, group them into category batches, synthesize a favorable
//! payload for each form, and build the batch finalize payload.

use autoeval::app::plan_batches;
use autoeval::portal::discovery::{PendingTask, category_links, evaluate_links};
use autoeval::portal::form::fill_form;
use autoeval::portal::submit::finalize_payload;
use html_scraper::Html;
use url::Url;

const ENTRY_PAGE: &str = r#"
<html><body>
  <div class="main">
    <a href="/jsxsd/xspj/xspj_list.do?pj01id=C1&xnxq01id=2023-2024-2">学生评教</a>
    <a href="/jsxsd/xspj/xspj_list.do?pj01id=C2&xnxq01id=2023-2024-2">教学检查</a>
    <a href="/jsxsd/framework/xsMain.htmlx">返回首页</a>
  </div>
</body></html>"#;

const CATEGORY_PAGE: &str = r#"
<html><body>
  <form action="/jsxsd/xspj/xspj_All_submit.do" method="post">
    <input type="hidden" name="pj01id" value="C1">
    <input type="hidden" name="xnxq01id" value="2023-2024-2">
    <table class="Nsb_r_list">
      <tr>
        <td>高等数学</td>
        <td><a href="/jsxsd/xspj/xspj_edit.do?jx02id=J1&pj01id=C1">评价</a></td>
      </tr>
      <tr>
        <td>大学英语</td>
        <td><a href="/jsxsd/xspj/xspj_edit.do?jx02id=J2&pj01id=C1">评价</a></td>
      </tr>
      <tr>
        <td>已完成课程</td>
        <td><a href="/jsxsd/xspj/xspj_view.do?jx02id=J3">查看</a></td>
      </tr>
    </table>
  </form>
</body></html>"#;

const EDIT_PAGE: &str = r#"
<html><body>
  <form action="/jsxsd/xspj/xspj_save.do" method="post">
    <input type="hidden" name="pj0502id" value="">
    <input type="hidden" name="jg0101id" value="T042">
    <input type="radio" name="pj06xh_1" value="1_0.2">不同意
    <input type="radio" name="pj06xh_1" value="1_0.8">大体同意
    <input type="radio" name="pj06xh_1" value="1_1.0">同意
    <input type="radio" name="pj06xh_2" value="2_0.2">不同意
    <input type="radio" name="pj06xh_2" value="2_1.0">同意
    <select name="zhszf">
      <option value="">请选择</option>
      <option value="60">60</option>
      <option value="70">70</option>
      <option value="80">80</option>
      <option value="90">90</option>
      <option value="100">100</option>
    </select>
    <input type="checkbox" name="tuijian" value="1">
    <textarea name="pjyj"></textarea>
  </form>
</body></html>"#;

fn base() -> Url {
    Url::parse("https://jwxt.example.edu.cn").unwrap()
}

#[test]
fn discovery_to_finalize_pipeline() {
    // Entry page: two categories, the home link is ignored.
    let entry = Html::parse_document(ENTRY_PAGE);
    let categories = category_links(&entry, &base());
    assert_eq!(categories.len(), 2);

    // Category page: two actionable tasks, the view-only link is ignored.
    let category = Html::parse_document(CATEGORY_PAGE);
    let edits = evaluate_links(&category, &base());
    assert_eq!(edits.len(), 2);

    let tasks: Vec<PendingTask> = edits
        .iter()
        .map(|edit_url| PendingTask {
            edit_url: edit_url.clone(),
            category_url: categories[0].clone(),
        })
        .collect();

    // One batch, both tasks, discovery order preserved.
    let batches = plan_batches(tasks);
    assert_eq!(batches.len(), 1);
    let batch = &batches[&categories[0]];
    assert_eq!(batch.len(), 2);
    assert!(batch[0].as_str().contains("jx02id=J1"));
    assert!(batch[1].as_str().contains("jx02id=J2"));

    // Each edit page yields a complete favorable payload.
    let edit_page = Html::parse_document(EDIT_PAGE);
    for edit_url in batch {
        let payload = fill_form(&edit_page, edit_url, &mut rand::rng()).unwrap();

        let get = |name: &str| -> Vec<&str> {
            payload
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
                .collect()
        };

        // Hidden bookkeeping fields round-trip verbatim.
        assert_eq!(get("pj0502id"), vec![""]);
        assert_eq!(get("jg0101id"), vec!["T042"]);

        // Radio groups resolve to one favorable answer each.
        let q1 = get("pj06xh_1");
        assert_eq!(q1.len(), 1);
        assert_ne!(q1[0], "1_0.2");
        let q2 = get("pj06xh_2");
        assert_eq!(q2.len(), 1);
        assert_ne!(q2[0], "2_0.2");

        // The numeric scale picks a real candidate.
        let score = get("zhszf");
        assert!(["60", "70", "80", "90", "100"].contains(&score[0]));

        // Unchecked checkbox never appears; empty textarea gets the filler.
        assert!(get("tuijian").is_empty());
        assert!(!get("pjyj")[0].is_empty());

        // Save marker present, URL-only parameters mirrored.
        assert_eq!(get("zancun"), vec!["暂存"]);
        assert_eq!(get("jx02id").len(), 1);
        assert_eq!(get("pj01id"), vec!["C1"]);
    }

    // Finalize payload: category form fields plus one confirmation per task.
    let finalize = finalize_payload(&category, batch.len()).unwrap();
    assert!(finalize.contains(&("pj01id".to_string(), "C1".to_string())));
    assert!(finalize.contains(&("xnxq01id".to_string(), "2023-2024-2".to_string())));
    let confirms = finalize
        .iter()
        .filter(|(n, v)| n == "issavestr" && v == "是")
        .count();
    assert_eq!(confirms, 2);
}

#[test]
fn empty_entry_page_plans_no_work() {
    let entry = Html::parse_document("<html><body><p>本学期暂无评教</p></body></html>");
    assert!(category_links(&entry, &base()).is_empty());
    assert!(evaluate_links(&entry, &base()).is_empty());
    assert!(plan_batches(Vec::new()).is_empty());
}
