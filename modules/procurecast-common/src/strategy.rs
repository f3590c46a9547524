use async_trait::async_trait;

/// A swappable way of turning an input into a result.
///
/// Link discovery (markup to candidate URLs) and outcome confirmation
/// (prediction to confirmed solicitation) are both attempts, so a
/// stand-in can be replaced without touching the calling stage.
#[async_trait]
pub trait Attempt<I: ?Sized + Sync>: Send + Sync {
    type Output: Send;

    async fn attempt(&self, input: &I) -> anyhow::Result<Self::Output>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
