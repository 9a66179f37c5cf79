use crate::Reading;

/// A supplier of raw readings for one pipeline run.
///
/// Sources never fail: a source that cannot deliver logs the reason and
/// returns an empty batch.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Vec<Reading>;
}
