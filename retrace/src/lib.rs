//! Deobfuscation of Java stack traces from applications obfuscated with yGuard.
//!
//! yGuard renames packages, classes, methods and fields, and can optionally scramble line
//! numbers. It records every rename in a mapping file. Given that file, a [`Retracer`] turns an
//! obfuscated stack trace back into one with the original names and line numbers:
//!
//! ```
//! use retrace::Retracer;
//!
//! let mapping = br#"
//!     <yguard version="1.5">
//!       <map>
//!         <package name="com.example" map="a"/>
//!         <class name="com.example.Foo" map="a.B"/>
//!         <method class="com.example.Foo" name="void run()" map="c"/>
//!         <method class="com.example.Foo" name="void stop()" map="c"/>
//!       </map>
//!     </yguard>
//! "#;
//!
//! let retracer = Retracer::parse(mapping).unwrap();
//! let trace = "java.lang.IllegalStateException: a.B is closed\n\tat a.B.c(B.java:12)";
//!
//! assert_eq!(
//!     retracer.translate_str(trace),
//!     "java.lang.IllegalStateException: com.example.Foo is closed\n\
//!      \tat com.example.Foo.run|stop(Foo.java:12)"
//! );
//! ```
//!
//! When several methods share an obfuscated name, all candidates are listed, separated by `|`.
//!
//! The building blocks live in their own crates and are re-exported here: [`mapping`] loads
//! mapping files and [`scramble`] reproduces yGuard's line number permutation.

#![warn(missing_docs)]

mod frame;
mod options;
mod resolve;
mod retracer;

pub use frame::*;
pub use options::*;
pub use retracer::*;

pub use retrace_mapping as mapping;
pub use retrace_mapping::{MappingError, MappingErrorKind, MappingTree};
pub use retrace_scramble as scramble;
