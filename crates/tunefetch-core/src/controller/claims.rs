//! Output paths held by active jobs, so two items that map to the same final
//! file never write the same `<final>.part` at once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::model::ItemId;

#[derive(Default)]
pub(super) struct OutputClaims {
    held: Mutex<HashMap<PathBuf, ItemId>>,
}

impl OutputClaims {
    /// Claims `path` for `id`. `Ok(true)` if newly claimed, `Ok(false)` if
    /// `id` already held it, `Err(holder)` if another item does.
    pub(super) fn claim(&self, path: &Path, id: &str) -> Result<bool, ItemId> {
        let mut held = self.lock();
        match held.get(path) {
            Some(holder) if holder == id => Ok(false),
            Some(holder) => Err(holder.clone()),
            None => {
                held.insert(path.to_path_buf(), id.to_string());
                Ok(true)
            }
        }
    }

    /// Releases `path` if `id` holds it.
    pub(super) fn release(&self, path: &Path, id: &str) {
        let mut held = self.lock();
        if held.get(path).is_some_and(|holder| holder == id) {
            held.remove(path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, ItemId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_item_is_refused_until_release() {
        let claims = OutputClaims::default();
        let p = Path::new("/out/Band - Song.mp3");
        assert_eq!(claims.claim(p, "a"), Ok(true));
        assert_eq!(claims.claim(p, "a"), Ok(false));
        assert_eq!(claims.claim(p, "b"), Err("a".to_string()));

        claims.release(p, "b");
        assert_eq!(claims.claim(p, "b"), Err("a".to_string()), "only the holder releases");
        claims.release(p, "a");
        assert_eq!(claims.claim(p, "b"), Ok(true));
    }
}
