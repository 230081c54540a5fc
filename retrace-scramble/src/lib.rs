//! Line number scrambling as performed by the yGuard obfuscator.
//!
//! When yGuard is configured to scramble line numbers, it replaces every line number in a class
//! with the output of a pseudo-random permutation. The permutation is seeded from a per-class
//! *scrambling salt* recorded in the mapping file and the hash of the class name, which means it
//! can be rebuilt and inverted as long as the mapping file is available.
//!
//! Reproducing the permutation requires bit-exact compatibility with the generator the obfuscator
//! runs on, which is `java.util.Random`. This crate provides:
//!
//!  - [`JavaRandom`], a reimplementation of that 48-bit linear congruential generator,
//!  - [`LineScrambler`], the permutation table with forward and inverse lookups,
//!  - [`java_string_hash`] and [`class_seed`] to derive the table seed for a class.
//!
//! # Examples
//!
//! ```
//! use retrace_scramble::{class_seed, LineScrambler, SCRAMBLE_TABLE_SIZE};
//!
//! let seed = class_seed(42, "com.example.Foo");
//! let scrambler = LineScrambler::new(SCRAMBLE_TABLE_SIZE, seed.into());
//!
//! let obfuscated = scrambler.scramble(5);
//! assert_eq!(scrambler.unscramble(obfuscated), 5);
//! ```

#![warn(missing_docs)]

mod random;
mod scrambler;

pub use random::JavaRandom;
pub use scrambler::*;
