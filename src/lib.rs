#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
extern crate alloc;

// Shared building blocks
pub mod errors;
pub mod events;
pub mod math;
pub mod assets;

// Collaborator contracts
pub mod token;
pub mod oracle;
pub mod treasury;

// Stability Pool
pub mod stability;

// Troves, liquidations and redemptions
pub mod troves;
