//! Loading of yGuard obfuscation mapping files.
//!
//! yGuard writes a log of every rename it performs as an XML document. The document lists the
//! renamed packages, classes, methods and fields in `<map>` sections, symbols that kept their
//! names in `<expose>` sections, and per-class properties such as the line number scrambling salt:
//!
//! ```xml
//! <yguard version="1.5">
//!   <map>
//!     <package name="com.example" map="a"/>
//!     <class name="com.example.Foo" map="B"/>
//!     <method class="com.example.Foo" name="void run(int)" map="c"/>
//!     <field class="com.example.Foo" name="count" map="d"/>
//!     <property owner="com.example.Foo" key="scrambling-salt" value="42"/>
//!   </map>
//!   <expose>
//!     <class name="com.example.Api"/>
//!   </expose>
//! </yguard>
//! ```
//!
//! [`MappingTree`] holds this information as a tree of packages, classes and members that can be
//! searched by obfuscated name. The [`descriptor`] module converts JVM descriptors into Java
//! signatures, which is required to normalize method names.

#![warn(missing_docs)]

pub mod descriptor;
mod error;
mod ingest;
mod tree;

pub use error::*;
pub use tree::*;
