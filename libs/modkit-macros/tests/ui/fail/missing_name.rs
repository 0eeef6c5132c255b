// `name` is the one mandatory key; omitting it must fail to compile.
use modkit_macros::module;

#[derive(Default)]
#[module(capabilities = [rest])]
pub struct NoName;

fn main() {}
