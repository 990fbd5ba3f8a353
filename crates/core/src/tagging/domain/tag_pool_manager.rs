use std::collections::HashSet;

use crate::shared::constants::{ANONYMOUS_POOL_BATCH, MAX_POOL_ATTEMPTS};
use crate::tagging::domain::archive::IdentityStore;
use crate::tagging::domain::identity::{Identity, NewIdentity, TagId};
use crate::tagging::domain::tagging_error::TaggingError;

/// Keeps enough anonymous placeholder identities in the archive to cover
/// the faces that need one.
///
/// Identities are created in batches (the shortfall is rounded up to a
/// multiple of `batch_size`) and the pool is always re-read after a write
/// rather than trusting the write's outcome, so a partially failed batch is
/// simply topped up on the next round.
#[derive(Clone, Debug)]
pub struct TagPoolManager {
    batch_size: usize,
    max_attempts: usize,
}

impl TagPoolManager {
    pub fn new(batch_size: usize, max_attempts: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_attempts,
        }
    }

    /// Returns every anonymous identity id, ascending, creating new ones
    /// first if fewer than `required` exist.
    ///
    /// Creation failures are logged and retried; a fetch failure is fatal
    /// because numbering continues from the highest existing index.
    pub fn ensure_anonymous_identities<S: IdentityStore + ?Sized>(
        &self,
        store: &mut S,
        required: usize,
    ) -> Result<Vec<TagId>, TaggingError> {
        if required == 0 {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            let existing = store.anonymous_identities()?;
            if existing.len() >= required {
                return Ok(existing.iter().map(|i| i.id).collect());
            }
            if attempt == self.max_attempts {
                return Err(TaggingError::PoolDidNotConverge {
                    required,
                    attempts: attempt,
                });
            }
            attempt += 1;

            let batch = self.creation_batch(&existing, required);
            log::info!(
                "Creating {} anonymous identities ({} exist, {required} required)",
                batch.len(),
                existing.len()
            );
            if let Err(e) = store.create_identities(&batch) {
                log::warn!("Failed to create anonymous identities: {e}");
            }
        }
    }

    /// Anonymous ids free to assign in one image: at least `unmatched` of
    /// them, none of which appears in `held` (tags that already have a
    /// position in that image).
    pub fn pool_for_image<S: IdentityStore + ?Sized>(
        &self,
        store: &mut S,
        unmatched: usize,
        held: &HashSet<TagId>,
    ) -> Result<Vec<TagId>, TaggingError> {
        let mut ids = self.ensure_anonymous_identities(store, unmatched)?;
        let taken = ids.iter().filter(|id| held.contains(id)).count();
        if taken > 0 && ids.len() - taken < unmatched {
            ids = self.ensure_anonymous_identities(store, unmatched + taken)?;
        }
        ids.retain(|id| !held.contains(id));
        Ok(ids)
    }

    /// Size the pool should reach: `required` rounded up to the batch size.
    pub fn target_size(&self, required: usize) -> usize {
        required.div_ceil(self.batch_size) * self.batch_size
    }

    fn creation_batch(&self, existing: &[Identity], required: usize) -> Vec<NewIdentity> {
        let next = existing
            .iter()
            .filter_map(Identity::anonymous_index)
            .max()
            .unwrap_or(0)
            + 1;
        let count = self.target_size(required).saturating_sub(existing.len());
        (0..count as u32)
            .map(|offset| NewIdentity::anonymous(next + offset))
            .collect()
    }
}

impl Default for TagPoolManager {
    fn default() -> Self {
        Self::new(ANONYMOUS_POOL_BATCH, MAX_POOL_ATTEMPTS)
    }
}
