use crate::error::{ComplianceError, Result};
use crate::types::{EntityType, PepEntry, ReferenceLists, SanctionsEntry, ScreeningHits};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Where sanctions and PEP lists come from
#[async_trait]
pub trait ReferenceListSource: Send + Sync {
    async fn fetch(&self) -> Result<ReferenceLists>;
}

/// Fixed in-process lists
#[derive(Debug, Clone)]
pub struct StaticReferenceLists {
    lists: ReferenceLists,
}

impl StaticReferenceLists {
    pub fn new(lists: ReferenceLists) -> Self {
        Self { lists }
    }
}

impl Default for StaticReferenceLists {
    fn default() -> Self {
        let sanction = |name: &str, country: &str, list: &str, entity_type| SanctionsEntry {
            name: name.to_string(),
            country: country.to_string(),
            list: list.to_string(),
            entity_type,
        };
        let pep = |name: &str, position: &str, country: &str| PepEntry {
            name: name.to_string(),
            position: position.to_string(),
            country: country.to_string(),
        };

        Self::new(ReferenceLists {
            sanctions: vec![
                sanction("John Smith", "IR", "OFAC SDN List", EntityType::Individual),
                sanction(
                    "Global Terror Org",
                    "SY",
                    "OFAC Terrorism List",
                    EntityType::Organization,
                ),
                sanction(
                    "Sanctioned Bank Ltd",
                    "KP",
                    "EU Sanctions List",
                    EntityType::Organization,
                ),
            ],
            peps: vec![
                pep("James Wilson", "Minister of Finance", "UK"),
                pep("Maria Garcia", "Deputy Minister", "ES"),
                pep("Chen Wei", "Provincial Governor", "CN"),
            ],
        })
    }
}

#[async_trait]
impl ReferenceListSource for StaticReferenceLists {
    async fn fetch(&self) -> Result<ReferenceLists> {
        Ok(self.lists.clone())
    }
}

struct CachedLists {
    lists: Arc<ReferenceLists>,
    loaded_at: Instant,
}

/// TTL cache over a `ReferenceListSource`.
///
/// An expired or empty cache is repopulated synchronously on the next
/// lookup; stale lists are never served past the TTL.
pub struct ReferenceListCache {
    source: Arc<dyn ReferenceListSource>,
    ttl: Duration,
    state: RwLock<Option<CachedLists>>,
    refreshes: AtomicU64,
}

impl std::fmt::Debug for ReferenceListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceListCache")
            .field("ttl", &self.ttl)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

impl ReferenceListCache {
    pub fn new(source: Arc<dyn ReferenceListSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: RwLock::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Current lists, repopulating from the source when missing or expired
    pub async fn lists(&self) -> Result<Arc<ReferenceLists>> {
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.lists));
                }
            }
        }

        let mut state = self.state.write().await;

        // Another task may have repopulated while we waited for the lock
        if let Some(cached) = state.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.lists));
            }
        }

        let fetched = self.source.fetch().await?;
        if fetched.is_empty() {
            return Err(ComplianceError::ListNotLoaded(
                "source returned no sanctions or PEP entries".to_string(),
            ));
        }

        let lists = Arc::new(fetched);
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!(
            "Loaded reference lists: {} sanctions entries, {} PEP entries",
            lists.sanctions.len(),
            lists.peps.len()
        );

        *state = Some(CachedLists {
            lists: Arc::clone(&lists),
            loaded_at: Instant::now(),
        });

        Ok(lists)
    }

    /// Drop the cached lists
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }

    /// Number of times the lists were (re)loaded
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Case-insensitive substring screening of `name`
    pub async fn screen_name(&self, name: &str) -> Result<ScreeningHits> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Ok(ScreeningHits::default());
        }

        let lists = self.lists().await?;

        let sanctions: Vec<SanctionsEntry> = lists
            .sanctions
            .iter()
            .filter(|entry| contains_name(&normalized, &entry.name))
            .cloned()
            .collect();

        let peps: Vec<PepEntry> = lists
            .peps
            .iter()
            .filter(|entry| contains_name(&normalized, &entry.name))
            .cloned()
            .collect();

        if !sanctions.is_empty() || !peps.is_empty() {
            debug!(
                "Screening hits for '{}': {} sanctions, {} PEP",
                name,
                sanctions.len(),
                peps.len()
            );
        }

        Ok(ScreeningHits { sanctions, peps })
    }
}

fn contains_name(haystack: &str, listed: &str) -> bool {
    let needle = normalize_name(listed);
    !needle.is_empty() && haystack.contains(&needle)
}

// Normalize name for comparison (lowercase, remove special chars, collapse whitespace)
fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptySource;

    #[async_trait]
    impl ReferenceListSource for EmptySource {
        async fn fetch(&self) -> Result<ReferenceLists> {
            Ok(ReferenceLists::default())
        }
    }

    fn default_cache(ttl: Duration) -> ReferenceListCache {
        ReferenceListCache::new(Arc::new(StaticReferenceLists::default()), ttl)
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name("John O'Brien, Jr."), "john obrien jr");
        assert_eq!(normalize_name("ACME   Corp."), "acme corp");
    }

    #[tokio::test]
    async fn test_sanctions_substring_match() {
        let cache = default_cache(Duration::from_secs(3600));

        let hits = cache.screen_name("Mr JOHN SMITH Junior").await.unwrap();
        assert_eq!(hits.sanctions.len(), 1);
        assert_eq!(hits.sanctions[0].list, "OFAC SDN List");
        assert!(hits.peps.is_empty());

        let clear = cache.screen_name("Jane Doe").await.unwrap();
        assert!(clear.sanctions.is_empty());
        assert!(clear.peps.is_empty());
    }

    #[tokio::test]
    async fn test_pep_match() {
        let cache = default_cache(Duration::from_secs(3600));
        let hits = cache.screen_name("maria garcia").await.unwrap();
        assert!(hits.sanctions.is_empty());
        assert_eq!(hits.peps[0].position, "Deputy Minister");
    }

    #[tokio::test]
    async fn test_cache_serves_within_ttl() {
        let cache = default_cache(Duration::from_secs(3600));
        cache.lists().await.unwrap();
        cache.lists().await.unwrap();
        cache.screen_name("anyone").await.unwrap();
        assert_eq!(cache.refresh_count(), 1);

        cache.invalidate().await;
        cache.lists().await.unwrap();
        assert_eq!(cache.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_cache_repopulates() {
        let cache = default_cache(Duration::ZERO);
        cache.lists().await.unwrap();
        cache.lists().await.unwrap();
        assert_eq!(cache.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_source_is_not_loaded() {
        let cache = ReferenceListCache::new(Arc::new(EmptySource), Duration::from_secs(60));
        let err = cache.screen_name("John Smith").await.unwrap_err();
        assert!(matches!(err, ComplianceError::ListNotLoaded(_)));
    }

    #[tokio::test]
    async fn test_blank_name_skips_lookup() {
        let cache = ReferenceListCache::new(Arc::new(EmptySource), Duration::from_secs(60));
        let hits = cache.screen_name("   ").await.unwrap();
        assert_eq!(hits, ScreeningHits::default());
    }
}
