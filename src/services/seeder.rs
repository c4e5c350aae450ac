// Bulk library population from a fixed pool of provider ids

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::catalog::CatalogStore;
use super::tmdb::MetadataSource;
use crate::models::NewMovie;

/// Run sizes offered to administrators
pub const SEED_COUNT_CHOICES: [usize; 5] = [10, 25, 50, 100, 200];

/// Candidates drawn per requested movie, to absorb duplicates and dead ids
pub const OVERSAMPLE: usize = 4;

/// Provider ids known to resolve to real movies
pub static DEMO_POOL: &[i64] = &[
    11, 12, 13, 14, 15, 18, 22, 24, 25, 58, 62, 63, 65, 68, 69, 70, 71, 73, 74, 75, 76, 77, 78, 80,
    81, 82, 83, 84, 85, 86, 87, 89, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99, 100, 101, 102, 103,
    104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118, 119, 120, 121, 122,
    123, 124, 125, 126, 127, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137, 138, 139, 140, 141,
    142, 143, 144, 145, 146, 147, 148, 149, 150, 151, 152, 153, 154, 155, 156, 157, 158, 159, 160,
    161, 162, 163, 164, 165, 166, 167, 168, 169, 170, 171, 172, 173, 174, 175, 176, 177, 178, 179,
    180, 181, 182, 183, 184, 185, 186, 187, 188, 189, 190, 191, 192, 193, 194, 195, 196, 197, 198,
    199, 200, 201, 202, 203, 204, 205, 206, 207, 208, 209, 210, 211, 212, 213, 214, 215, 216, 217,
    218, 219, 220, 238, 240, 242, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255, 256,
    257, 258, 259, 260, 261, 262, 263, 264, 265, 266, 267, 268, 269, 270, 271, 272, 273, 274, 275,
    276, 277, 278, 279, 280, 281, 282, 283, 284, 285, 286, 287, 288, 289, 290, 291, 292, 293, 294,
    295, 296, 297, 298, 299, 300, 301, 302, 303, 304, 305, 306, 307, 308, 309, 310, 311, 312, 313,
    314, 315, 316, 317, 318, 319, 320, 321, 322, 323, 324, 325, 326, 327, 328, 329, 330, 331, 332,
    333, 334, 335, 336, 337, 338, 339, 340, 341, 342, 343, 344, 345, 346, 347, 348, 349, 350, 351,
    352, 353, 354, 355, 356, 357, 358, 359, 360, 361, 362, 363, 364, 365, 366, 367, 368, 369, 370,
    371, 372, 373, 374, 375, 376, 377, 378, 379, 380, 381, 382, 383, 384, 385, 386, 387, 388, 389,
    390, 391, 392, 393, 394, 395, 396, 397, 398, 399,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedProgress {
    pub added: usize,
    pub total: usize,
}

/// Outcome of one seeding run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub requested: usize,
    pub added: usize,
    pub candidates: usize,
    pub skipped_existing: usize,
    pub skipped_unavailable: usize,
    pub failed_inserts: usize,
    pub cancelled: bool,
}

impl SeedReport {
    pub fn summary(&self) -> String {
        let text = if self.added == 0 {
            "Nothing could be added (all duplicates or unavailable).".to_string()
        } else if self.added < self.requested {
            format!("Added {} of {} movies.", self.added, self.requested)
        } else {
            format!("Added {} movies.", self.added)
        };
        if self.cancelled {
            format!("{} Stopped early.", text)
        } else {
            text
        }
    }
}

/// Uniform sample without replacement of `min(unique pool, count * 4)` ids
pub fn sample_candidates<R: Rng + ?Sized>(pool: &[i64], count: usize, rng: &mut R) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(pool.len());
    let mut unique: Vec<i64> = pool.iter().copied().filter(|id| seen.insert(*id)).collect();
    unique.shuffle(rng);
    unique.truncate(count.saturating_mul(OVERSAMPLE));
    unique
}

/// Fills the catalog with movies it does not have yet
pub struct LibrarySeeder<'a> {
    catalog: &'a CatalogStore,
    source: &'a dyn MetadataSource,
}

impl<'a> LibrarySeeder<'a> {
    pub fn new(catalog: &'a CatalogStore, source: &'a dyn MetadataSource) -> Self {
        Self { catalog, source }
    }

    /// Add up to `target` movies from `pool`. Duplicates of catalog rows
    /// (same provider id or same title) and ids the provider cannot
    /// describe are skipped. `progress` sees every successful insert, in
    /// order. Cancellation is checked between candidates.
    pub async fn run<R, P>(
        &self,
        target: usize,
        pool: &[i64],
        rng: &mut R,
        cancel: &CancellationToken,
        mut progress: P,
    ) -> SeedReport
    where
        R: Rng + ?Sized,
        P: FnMut(SeedProgress),
    {
        let existing = self.catalog.get_movies().await;
        let mut known_ids: HashSet<String> = existing
            .iter()
            .filter_map(|m| m.tmdb_id)
            .map(|id| id.to_string())
            .collect();
        let mut known_titles: HashSet<String> =
            existing.iter().map(|m| title_key(&m.title)).collect();

        let candidates = sample_candidates(pool, target, rng);
        let mut report = SeedReport {
            requested: target,
            candidates: candidates.len(),
            ..Default::default()
        };

        tracing::info!(
            "Seeding {} movies from {} candidates ({} already in catalog)",
            target,
            candidates.len(),
            existing.len()
        );

        for id in candidates {
            if report.added >= target {
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if known_ids.contains(&id.to_string()) {
                report.skipped_existing += 1;
                continue;
            }

            let details = match self.source.movie_details(id).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", id, e);
                    report.skipped_unavailable += 1;
                    continue;
                }
            };
            let Some(title) = details.title.clone() else {
                tracing::debug!("Skipping {}: no title", id);
                report.skipped_unavailable += 1;
                continue;
            };

            let key = title_key(&title);
            if known_titles.contains(&key) {
                report.skipped_existing += 1;
                continue;
            }

            let trailer_url = match self.source.movie_trailer(id).await {
                Ok(trailer) => Some(trailer.url),
                Err(e) => {
                    tracing::debug!("No trailer for {}: {}", id, e);
                    None
                }
            };

            let movie = NewMovie {
                title,
                year: details.year,
                rating: Some(details.rating),
                genre: Some(details.genre),
                director: Some(details.director),
                description: Some(details.description),
                image: Some(details.image),
                tmdb_id: Some(id),
                trailer_url,
            };

            match self.catalog.add_movie(&movie).await {
                Ok(_) => {
                    report.added += 1;
                    known_ids.insert(id.to_string());
                    known_titles.insert(key);
                    progress(SeedProgress {
                        added: report.added,
                        total: target,
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to add seeded movie {}: {}", id, e);
                    report.failed_inserts += 1;
                }
            }
        }

        tracing::info!("Seeding finished: {}", report.summary());
        report
    }
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("A seeding run is already in progress")]
    AlreadyRunning,

    #[error("Seed count {0} is not one of 10, 25, 50, 100, 200")]
    InvalidCount(usize),
}

/// Live view of the seeding job
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedStatus {
    pub running: bool,
    pub progress: SeedProgress,
    pub last_report: Option<SeedReport>,
    pub message: Option<String>,
}

#[derive(Default)]
struct RunnerState {
    running: bool,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    last_report: Option<SeedReport>,
}

impl RunnerState {
    /// A run that panicked never clears `running`; its finished handle does
    fn is_running(&self) -> bool {
        self.running && !self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

struct RunnerInner {
    state: Mutex<RunnerState>,
    progress: watch::Sender<SeedProgress>,
    shutdown: CancellationToken,
}

/// At most one seeding run at a time, in the background
#[derive(Clone)]
pub struct SeedRunner {
    inner: Arc<RunnerInner>,
}

impl SeedRunner {
    pub fn new(shutdown: CancellationToken) -> Self {
        let (progress, _) = watch::channel(SeedProgress::default());
        Self {
            inner: Arc::new(RunnerInner {
                state: Mutex::new(RunnerState::default()),
                progress,
                shutdown,
            }),
        }
    }

    pub async fn start(
        &self,
        catalog: Arc<CatalogStore>,
        source: Arc<dyn MetadataSource>,
        target: usize,
    ) -> Result<(), SeedError> {
        if !SEED_COUNT_CHOICES.contains(&target) {
            return Err(SeedError::InvalidCount(target));
        }

        let mut state = self.inner.state.lock().await;
        if state.is_running() {
            return Err(SeedError::AlreadyRunning);
        }
        if state.running {
            tracing::warn!("Previous seeding run ended without a report");
        }

        let cancel = self.inner.shutdown.child_token();
        self.inner.progress.send_replace(SeedProgress {
            added: 0,
            total: target,
        });

        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let report = LibrarySeeder::new(&catalog, source.as_ref())
                .run(target, DEMO_POOL, &mut rng, &token, |p| {
                    inner.progress.send_replace(p);
                })
                .await;

            let mut state = inner.state.lock().await;
            state.running = false;
            state.cancel = None;
            state.last_report = Some(report);
        });

        state.running = true;
        state.cancel = Some(cancel);
        state.handle = Some(handle);
        Ok(())
    }

    /// Ask the running job to stop after its current candidate
    pub async fn cancel(&self) -> bool {
        let state = self.inner.state.lock().await;
        if !state.is_running() {
            return false;
        }
        match &state.cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn status(&self) -> SeedStatus {
        let state = self.inner.state.lock().await;
        SeedStatus {
            running: state.is_running(),
            progress: *self.inner.progress.borrow(),
            message: state.last_report.as_ref().map(SeedReport::summary),
            last_report: state.last_report.clone(),
        }
    }

    /// Stop a running job and wait for it to wind down
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self.inner.state.lock().await.handle.take();
        if let Some(handle) = handle {
            tracing::debug!("Waiting for seeding run to finish...");
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("Seeding run finished cleanly"),
                Ok(Err(e)) => tracing::warn!("Seeding run panicked: {}", e),
                Err(_) => tracing::warn!("Seeding run timed out during shutdown"),
            }
        }
    }
}
