//! Run orchestration: authenticate, discover, fill, save, finalize.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rand::Rng;
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;
use crate::portal::auth::{self, Handshake};
use crate::portal::discovery::{self, PendingTask};
use crate::portal::errors::PortalError;
use crate::portal::session::{DomainProfile, Session};
use crate::portal::{form, submit};
use crate::utils::fmt_duration;

/// Execute a full evaluation run. Returns the process exit code: 0 for a
/// completed run (including "nothing to do"), 1 for rejected credentials.
/// Transport errors outside discovery/harvesting bubble up as `Err`.
pub async fn run(config: Config) -> Result<ExitCode> {
    let started = Instant::now();
    let portal_base = Url::parse(&config.portal_base).context("invalid portal_base")?;
    let auth_base = Url::parse(&config.auth_base).context("invalid auth_base")?;

    let mut session = Session::new(
        DomainProfile::for_base(&portal_base),
        Duration::from_secs(config.timeout_secs),
        config.max_retries,
    )?;

    if !try_cookie_reauth(&mut session, &config, &portal_base).await {
        let handshake = Handshake::new(&mut session, portal_base.clone(), auth_base);
        match handshake.run(&config.credentials).await {
            Ok(()) => info!(user = config.credentials.username.as_str(), "login succeeded"),
            Err(PortalError::AuthenticationFailed) => {
                error!("login failed, check the configured credentials");
                return Ok(ExitCode::from(1));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let tasks = discovery::pending_tasks(&session, &portal_base).await;
    let batches = plan_batches(tasks);
    if batches.is_empty() {
        info!("no pending evaluations, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let total: usize = batches.values().map(Vec::len).sum();
    info!(
        tasks = total,
        categories = batches.len(),
        "pending evaluations found"
    );

    for (index, (category_url, edit_urls)) in batches.iter().enumerate() {
        info!(
            category = index + 1,
            of = batches.len(),
            tasks = edit_urls.len(),
            "processing category"
        );

        for (task_index, edit_url) in edit_urls.iter().enumerate() {
            if task_index > 0 {
                // Randomized pause between a save and the next harvest so the
                // portal's abuse-rate defenses stay quiet.
                pause(config.delay_min_secs, config.delay_max_secs).await;
            }

            match form::harvest(&session, edit_url).await {
                Ok(Some(payload)) => {
                    if let Err(e) = submit::save(&session, &portal_base, &payload, edit_url).await
                    {
                        warn!(url = %edit_url, error = ?e, "save request failed, continuing");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(url = %edit_url, error = ?e, "failed to harvest form, skipping task");
                }
            }
        }

        // Every task in the category has had its save attempted; only now is
        // the batch finalize allowed.
        if let Err(e) =
            submit::finalize_category(&session, &portal_base, category_url, edit_urls.len()).await
        {
            warn!(url = %category_url, error = ?e, "finalize request failed, continuing");
        }
    }

    info!(
        elapsed = fmt_duration(started.elapsed()),
        "evaluation run complete"
    );
    Ok(ExitCode::SUCCESS)
}

/// Seed configured cookies and probe them for liveness. Returns whether the
/// session is already authenticated, skipping the handshake.
async fn try_cookie_reauth(session: &mut Session, config: &Config, portal_base: &Url) -> bool {
    let Some(cookies) = &config.cookies else {
        return false;
    };
    session.seed_cookies(cookies, portal_base);
    match auth::check_login(session, portal_base).await {
        Ok(true) => {
            info!("configured cookies are still live, skipping handshake");
            true
        }
        Ok(false) => {
            info!("configured cookies expired, running full handshake");
            false
        }
        Err(e) => {
            warn!(error = ?e, "cookie liveness probe failed, running full handshake");
            false
        }
    }
}

/// Group tasks by their owning category, preserving discovery order for both
/// categories and the tasks within each.
pub fn plan_batches(tasks: Vec<PendingTask>) -> IndexMap<Url, Vec<Url>> {
    let mut batches: IndexMap<Url, Vec<Url>> = IndexMap::new();
    for task in tasks {
        batches.entry(task.category_url).or_default().push(task.edit_url);
    }
    batches
}

async fn pause(min_secs: f64, max_secs: f64) {
    let secs = if max_secs > min_secs {
        rand::rng().random_range(min_secs..=max_secs)
    } else {
        min_secs
    };
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn task(edit: &str, category: &str) -> PendingTask {
        PendingTask {
            edit_url: url(edit),
            category_url: url(category),
        }
    }

    #[test]
    fn test_plan_batches_groups_by_category_in_order() {
        let c1 = "https://jwxt.example.edu.cn/jsxsd/xspj/xspj_list.do?c=1";
        let c2 = "https://jwxt.example.edu.cn/jsxsd/xspj/xspj_list.do?c=2";
        let batches = plan_batches(vec![
            task("https://jwxt.example.edu.cn/e.do?t=1", c1),
            task("https://jwxt.example.edu.cn/e.do?t=2", c1),
            task("https://jwxt.example.edu.cn/e.do?t=3", c2),
        ]);

        // One finalize per category, in discovery order, covering all saves.
        let keys: Vec<&Url> = batches.keys().collect();
        assert_eq!(keys, vec![&url(c1), &url(c2)]);
        assert_eq!(batches[&url(c1)].len(), 2);
        assert_eq!(batches[&url(c2)].len(), 1);
    }

    #[test]
    fn test_plan_batches_empty_discovery_plans_nothing() {
        assert!(plan_batches(Vec::new()).is_empty());
    }

    #[test]
    fn test_plan_batches_keeps_task_order_within_category() {
        let c = "https://jwxt.example.edu.cn/jsxsd/xspj/xspj_list.do?c=1";
        let batches = plan_batches(vec![
            task("https://jwxt.example.edu.cn/e.do?t=b", c),
            task("https://jwxt.example.edu.cn/e.do?t=a", c),
        ]);
        let edits: Vec<String> = batches[&url(c)].iter().map(|u| u.to_string()).collect();
        assert!(edits[0].ends_with("t=b"));
        assert!(edits[1].ends_with("t=a"));
    }
}
