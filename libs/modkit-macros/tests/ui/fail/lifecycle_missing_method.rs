// `method` is the one mandatory key for `#[lifecycle(...)]`.
use modkit_macros::lifecycle;

struct Worker;

#[lifecycle(stop_timeout = "1s")]
impl Worker {
    async fn run_forever(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}

fn main() {}
