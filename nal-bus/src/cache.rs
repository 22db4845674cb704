use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::chunk::Chunk;
use crate::error::{BusError, Result};

/// Write-once keyed store for a stream's parameter-set chunks, so a
/// reconnecting session can skip live header acquisition. Entries are
/// files `{dir}/{key}` holding a sequence of records:
///
/// ```text
/// [u32 length BE][start-code-prefixed NAL payload of that length]
/// ```
pub struct HeaderCache {
    dir: PathBuf,
}

impl HeaderCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Loads the header chunks persisted under `key`, in stored order.
    /// `Ok(None)` on a miss.
    pub fn lookup(&self, key: &str) -> Result<Option<Vec<Chunk>>> {
        let data = match fs::read(self.entry_path(key)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut chunks = Vec::new();
        let mut at = 0;
        while at < data.len() {
            if at + 4 > data.len() {
                return Err(BusError::ShortMessage {
                    needed: at + 4,
                    got: data.len(),
                });
            }
            let len = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
                as usize;
            at += 4;
            if at + len > data.len() {
                return Err(BusError::ShortMessage {
                    needed: at + len,
                    got: data.len(),
                });
            }
            chunks.push(Chunk::from_owned(data[at..at + len].to_vec())?);
            at += len;
        }
        Ok(Some(chunks))
    }

    /// Persists `chunks` under `key`. Entries are write-once: an existing
    /// entry is left untouched and `Ok(false)` is returned. A cache entry
    /// always represents complete, valid headers, so callers must only
    /// store after acquisition succeeded. The records are written to a
    /// scratch file and renamed into place, so an interrupted store never
    /// leaves a truncated entry behind.
    pub fn store(&self, key: &str, chunks: &[Chunk]) -> Result<bool> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        if path.exists() {
            return Ok(false);
        }

        let scratch = self.dir.join(format!("{}.tmp.{}", key, std::process::id()));
        let mut file = fs::File::create(&scratch)?;
        for chunk in chunks {
            file.write_all(&(chunk.size() as u32).to_be_bytes())?;
            file.write_all(chunk.bytes())?;
        }
        drop(file);
        fs::rename(&scratch, &path)?;
        Ok(true)
    }

    /// Removes the entry under `key` so a fresh store can replace it.
    /// Absent entries are not an error.
    pub fn evict(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(payload: &[u8]) -> Chunk {
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(payload);
        Chunk::from_owned(data).unwrap()
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nal-bus-cache-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_store_then_lookup_bit_identical() {
        let dir = scratch_dir("roundtrip");
        let cache = HeaderCache::new(&dir);
        let headers = vec![chunk(&[0x67, 0x42, 0x00]), chunk(&[0x68, 0xce]), chunk(&[0x66, 0x05])];

        assert!(cache.store("session-a", &headers).unwrap());
        let back = cache.lookup("session-a").unwrap().unwrap();
        assert_eq!(back.len(), headers.len());
        for (a, b) in back.iter().zip(&headers) {
            assert_eq!(a.bytes(), b.bytes());
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_second_store_never_overwrites() {
        let dir = scratch_dir("writeonce");
        let cache = HeaderCache::new(&dir);
        let first = vec![chunk(&[0x67, 0x01])];
        let second = vec![chunk(&[0x67, 0x02]), chunk(&[0x68, 0x03])];

        assert!(cache.store("k", &first).unwrap());
        assert!(!cache.store("k", &second).unwrap());

        let back = cache.lookup("k").unwrap().unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].bytes(), first[0].bytes());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_lookup_miss() {
        let dir = scratch_dir("miss");
        let cache = HeaderCache::new(&dir);
        assert!(cache.lookup("absent").unwrap().is_none());
    }

    #[test]
    fn test_store_leaves_no_scratch_file() {
        let dir = scratch_dir("scratch");
        let cache = HeaderCache::new(&dir);
        assert!(cache.store("k", &[chunk(&[0x67, 0x01])]).unwrap());

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["k"]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_evict_allows_replacement() {
        let dir = scratch_dir("evict");
        let cache = HeaderCache::new(&dir);
        assert!(cache.store("k", &[chunk(&[0x67, 0x01])]).unwrap());

        cache.evict("k").unwrap();
        assert!(cache.lookup("k").unwrap().is_none());
        // Absent entries are fine to evict again.
        cache.evict("k").unwrap();

        assert!(cache.store("k", &[chunk(&[0x67, 0x02]), chunk(&[0x68, 0x03])]).unwrap());
        assert_eq!(cache.lookup("k").unwrap().unwrap().len(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_truncated_entry_is_an_error() {
        let dir = scratch_dir("truncated");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bad"), [0u8, 0, 0, 9, 0, 0, 0, 1, 0x67]).unwrap();
        let cache = HeaderCache::new(&dir);
        let err = cache.lookup("bad").unwrap_err();
        assert!(matches!(err, BusError::ShortMessage { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }
}
