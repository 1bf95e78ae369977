use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// A lease service able to grant application leadership to units.
#[async_trait]
pub trait Claimer: Send + Sync {
    /// Claim or extend leadership of `application_id` for `unit_id`.
    ///
    /// `Ok(())` guarantees the unit leads for at least `duration` from the
    /// call. Returns [`Error::ClaimDenied`](crate::Error::ClaimDenied) when
    /// another unit holds the lease.
    async fn claim(&self, application_id: &str, unit_id: &str, duration: Duration) -> Result<()>;

    /// Block until `application_id` has no lease holder.
    ///
    /// Returns [`Error::BlockCancelled`](crate::Error::BlockCancelled) once
    /// `cancel` fires.
    async fn block_until_released(
        &self,
        application_id: &str,
        cancel: CancellationToken,
    ) -> Result<()>;
}
