//! Background maintenance.
//!
//! A dedicated scheduler thread ticks once a minute and runs whichever jobs
//! have come due: expired parse caches are re-rendered every ten minutes,
//! and lapsed protections, follow-list entries, and blocks are swept hourly.
//! Jobs take the same locks as the request path, one small transaction at a
//! time, so request threads are never blocked for long.

use crate::{common, db::Repository, title::Namespace};
use std::{sync::Arc, thread, time::Duration};

/// The scheduler’s tick interval.
const TICK: Duration = Duration::from_secs(60);

/// One periodic job.
struct Job {
    /// Job name, for logging.
    name: &'static str,
    /// How many ticks apart the job runs.
    period: u64,
    /// The implementation.
    run: fn(&Repository),
}

/// Every registered job.
static JOBS: &[Job] = &[
    Job {
        name: "refresh_page_caches",
        period: 10,
        run: refresh_page_caches,
    },
    Job {
        name: "delete_expired_page_protections",
        period: 60,
        run: delete_expired_page_protections,
    },
    Job {
        name: "delete_expired_page_follows",
        period: 60,
        run: delete_expired_page_follows,
    },
    Job {
        name: "delete_expired_user_blocks",
        period: 60,
        run: delete_expired_user_blocks,
    },
    Job {
        name: "delete_expired_ip_blocks",
        period: 60,
        run: delete_expired_ip_blocks,
    },
];

/// Starts the scheduler thread.
pub fn spawn(repo: Arc<Repository>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut ticks: u64 = 0;
        loop {
            thread::sleep(TICK);
            ticks += 1;
            for job in JOBS {
                if ticks % job.period == 0 {
                    log::trace!("Running background job {}", job.name);
                    (job.run)(&repo);
                }
            }
        }
    })
}

/// Re-parses every non-deleted page whose cache has lapsed.
fn refresh_page_caches(repo: &Repository) {
    log::info!("Refreshing page caches…");
    let now = common::now();
    let mut count = 0usize;
    for (namespace_id, page_title) in repo.pages_with_expired_cache(now) {
        let Some(ns) = Namespace::find_by_id(namespace_id) else {
            continue;
        };
        match repo.refresh_parse(ns, &page_title, now) {
            Ok(_) => count += 1,
            Err(err) => log::warn!(
                "Could not refresh cache of {}: {err}",
                ns.full_title(&page_title)
            ),
        }
    }
    log::info!("Refreshed {count} page(s).");
}

/// Deletes all page protections that have expired.
fn delete_expired_page_protections(repo: &Repository) {
    log::info!("Deleting expired page protections…");
    let count = repo.delete_expired_page_protections(common::now());
    log::info!("Deleted {count} page protection(s).");
}

/// Deletes all page follows that have expired.
fn delete_expired_page_follows(repo: &Repository) {
    log::info!("Deleting expired page follows…");
    let count = repo.delete_expired_page_follows(common::now());
    log::info!("Deleted {count} page follow(s).");
}

/// Deletes all user blocks that have expired.
fn delete_expired_user_blocks(repo: &Repository) {
    log::info!("Deleting expired user blocks…");
    let count = repo.delete_expired_user_blocks(common::now());
    log::info!("Deleted {count} user block(s).");
}

/// Deletes all IP blocks that have expired.
fn delete_expired_ip_blocks(repo: &Repository) {
    log::info!("Deleting expired IP blocks…");
    let count = repo.delete_expired_ip_blocks(common::now());
    log::info!("Deleted {count} IP block(s).");
}
