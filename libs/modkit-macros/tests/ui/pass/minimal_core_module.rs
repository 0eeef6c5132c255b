// A bare core module: no capabilities, no deps, just the required name.
use modkit_macros::module;

#[derive(Default)]
#[module(name = "minimal")]
pub struct Minimal;

#[async_trait::async_trait]
impl modkit::Module for Minimal {
    async fn init(&self, _ctx: &modkit::ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

fn main() {}
