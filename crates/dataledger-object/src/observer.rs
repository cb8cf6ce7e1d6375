use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Hook for transfer observation: byte counts, latency, in-flight progress.
/// The default implementation observes nothing.
pub trait TransferObserver: Send + Sync + 'static {
    fn observe_upload(&self, _bucket: &str, _bytes: u64, _elapsed: Duration) {}
    fn observe_download(&self, _bucket: &str, _bytes: u64, _elapsed: Duration) {}
    fn observe_progress(&self, _bucket: &str, _key: &str, _transferred: u64, _total: u64) {}
}

#[derive(Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Reader wrapper that reports cumulative progress as the transport drains it.
pub(crate) struct ProgressReader<R> {
    inner: R,
    bucket: String,
    key: String,
    total: u64,
    transferred: u64,
    observer: Arc<dyn TransferObserver>,
}

impl<R> ProgressReader<R> {
    pub(crate) fn new(
        inner: R,
        bucket: String,
        key: String,
        total: u64,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        Self {
            inner,
            bucket,
            key,
            total,
            transferred: 0,
            observer,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        if read > 0 {
            self.transferred += read as u64;
            self.observer
                .observe_progress(&self.bucket, &self.key, self.transferred, self.total);
        }
        Ok(read)
    }
}
