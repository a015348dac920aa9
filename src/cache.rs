//! Response cache keyed by request signature
//!
//!  Entries hold the raw response body so a hit is byte-identical to the
//!  original. An optional directory mirrors entries to disk so a restart
//!  within the TTL does not re-query; the disk copy is advisory and any
//!  failure reading or writing it is ignored.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use moka::Expiry;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::geo::BoundingBox;

const MAX_ENTRIES: u64 = 1_000;

/// Body plus how long it may still be served
#[derive(Clone)]
struct CachedBody {
    body: Bytes,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedBody> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedBody, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedBody,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct ResponseCache {
    ttl: Duration,
    dir: Option<PathBuf>,
    entries: Cache<String, CachedBody>,
}

/// Normalized signature of a state request: sorted unique codes plus region
pub fn request_signature<'a, I>(codes: I, bbox: Option<&BoundingBox>) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let mut codes: Vec<String> = codes.into_iter().map(|c| c.to_ascii_uppercase()).collect();
    codes.sort();
    codes.dedup();
    let region = match bbox {
        Some(b) => format!(
            "{:.4},{:.4},{:.4},{:.4}",
            b.min_lat, b.min_lon, b.max_lat, b.max_lon
        ),
        None => "none".to_string(),
    };
    format!("{}|{}", codes.join(","), region)
}

impl ResponseCache {
    pub fn new(ttl: Duration, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                debug!("Cannot create cache dir {}: {}", dir.display(), e);
            }
        }
        Self {
            ttl,
            dir,
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    pub fn get(&self, signature: &str) -> Option<Bytes> {
        if self.ttl.is_zero() {
            return None;
        }
        if let Some(hit) = self.entries.get(signature) {
            return Some(hit.body);
        }
        let (body, age) = self.read_disk(signature)?;
        // Only the part of the TTL the file has not used up yet
        self.entries.insert(
            signature.to_string(),
            CachedBody {
                body: body.clone(),
                ttl: self.ttl.saturating_sub(age),
            },
        );
        Some(body)
    }

    pub fn put(&self, signature: &str, body: Bytes) {
        if self.ttl.is_zero() {
            return;
        }
        self.write_disk(signature, &body);
        self.entries.insert(
            signature.to_string(),
            CachedBody {
                body,
                ttl: self.ttl,
            },
        );
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    fn file_for(dir: &Path, signature: &str) -> PathBuf {
        let digest = Sha256::digest(signature.as_bytes());
        dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Body and age of the on-disk copy, if it is still within the TTL
    fn read_disk(&self, signature: &str) -> Option<(Bytes, Duration)> {
        let path = Self::file_for(self.dir.as_deref()?, signature);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age >= self.ttl {
            return None;
        }
        let data = std::fs::read(&path).ok()?;
        debug!("Cache hit on disk: {} ({:?} old)", path.display(), age);
        Some((Bytes::from(data), age))
    }

    fn write_disk(&self, signature: &str, body: &Bytes) {
        let Some(dir) = self.dir.as_deref() else {
            return;
        };
        let path = Self::file_for(dir, signature);
        if let Err(e) = std::fs::write(&path, body) {
            debug!("Cache write failed for {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::thread::sleep;

    use super::*;

    #[test]
    fn test_signature_is_normalized() {
        let a = vec!["abc123".to_string(), "A1B2C3".to_string(), "ABC123".to_string()];
        let b = vec!["A1B2C3".to_string(), "ABC123".to_string()];
        assert_eq!(request_signature(&a, None), request_signature(&b, None));

        let bbox = BoundingBox::new(24.0, -125.0, 50.0, -66.0);
        assert_ne!(request_signature(&b, Some(&bbox)), request_signature(&b, None));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(Duration::from_millis(300), None);
        cache.put("sig", Bytes::from_static(b"{\"states\":null}"));
        assert_eq!(cache.get("sig").as_deref(), Some(&b"{\"states\":null}"[..]));

        sleep(Duration::from_millis(400));
        assert!(cache.get("sig").is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = ResponseCache::new(Duration::ZERO, None);
        cache.put("sig", Bytes::from_static(b"x"));
        assert!(cache.get("sig").is_none());
    }

    #[test]
    fn test_disk_entry_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = ResponseCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));
        first.put("A1B2C3|none", Bytes::from_static(b"payload"));
        drop(first);

        let second = ResponseCache::new(Duration::from_secs(60), Some(dir.path().to_path_buf()));
        assert_eq!(second.get("A1B2C3|none").as_deref(), Some(&b"payload"[..]));
        assert!(second.get("OTHER|none").is_none());
    }

    #[test]
    fn test_disk_entry_keeps_its_age_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(2);
        let first = ResponseCache::new(ttl, Some(dir.path().to_path_buf()));
        first.put("A1B2C3|none", Bytes::from_static(b"payload"));
        drop(first);

        // Pretend the file was written 1.5s ago
        let path = ResponseCache::file_for(dir.path(), "A1B2C3|none");
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_millis(1500))
            .unwrap();

        let second = ResponseCache::new(ttl, Some(dir.path().to_path_buf()));
        assert!(second.get("A1B2C3|none").is_some());

        // Real age is now past the TTL: neither memory nor disk may serve it
        sleep(Duration::from_millis(800));
        assert!(second.get("A1B2C3|none").is_none());
    }
}
