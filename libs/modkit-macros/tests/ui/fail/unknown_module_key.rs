// Unrecognized keys in `#[module(...)]` must be rejected at the parse step,
// not silently ignored.
use modkit_macros::module;

#[derive(Default)]
#[module(name = "typo", cabilities = [rest])]
pub struct Typo;

fn main() {}
