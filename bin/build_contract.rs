//! Binary for building WASM contracts from odra modules.
#![doc = "Binary for building WASM contracts from odra modules."]

#[allow(unused_imports)]
use cdp_contracts;

fn main() {
    // The Odra build system compiles the contracts listed in Odra.toml;
    // this binary only links the crate in.
}
