//! Service advertisement seam.
//!
//! An advertiser announces the broker (mDNS, broadcast, a directory, ...)
//! under the CA fingerprint and listening port. Each started advertisement
//! yields a handle the lifecycle stops on shutdown. Handles are independent
//! of each other and are stopped concurrently.

use async_trait::async_trait;

use endocrine_core::error::Result;

#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;
    async fn start(&self, fingerprint: &str, port: u16) -> Result<Box<dyn AdvertisementHandle>>;
}

#[async_trait]
pub trait AdvertisementHandle: Send {
    async fn stop(&mut self) -> Result<()>;
}
