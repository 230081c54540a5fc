use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A frame carrying the method descriptor between the method name and the location, as printed
/// by JRockit: `at a.B.c(I)V(B.java:5)`.
static JROCKIT_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(.*\s+)?([^;()\s]+)\.([^;()\s]+)\(([^)]*)\)([^\s()]+)\(([^:)]+)(?::(\d*))?\)(.*)$",
    )
    .unwrap()
});

/// A conventional frame: `at a.B.c(B.java:5)`, `at a.B.c(Unknown Source)`.
static FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*\s+)?([^(\s]+)\.([^(\s]+)\(([^:)]*)(?::(\d*))?\)(.*)$").unwrap()
});

static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^:;()\s]+\.)+[^:;()\s]+").unwrap());

static CHAR_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d+);").unwrap());

/// A single frame of a Java stack trace.
///
/// Besides the class, method, file and line of the frame, the text around it is retained so that
/// a remapped frame can be printed in place of the original line.
///
/// # Examples
///
/// ```
/// use retrace::StackFrame;
///
/// let frame = StackFrame::parse("\tat a.B.c(B.java:5)").unwrap();
/// assert_eq!(frame.class(), "a.B");
/// assert_eq!(frame.method(), "c");
/// assert_eq!(frame.file(), Some("B.java"));
/// assert_eq!(frame.line(), Some(5));
/// assert_eq!(frame.to_string(), "\tat a.B.c(B.java:5)");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame<'a> {
    pub(crate) prefix: Cow<'a, str>,
    pub(crate) class: Cow<'a, str>,
    pub(crate) method: Cow<'a, str>,
    pub(crate) descriptor: Option<Cow<'a, str>>,
    pub(crate) file: Option<Cow<'a, str>>,
    pub(crate) line: Option<u32>,
    pub(crate) suffix: Cow<'a, str>,
}

impl<'a> StackFrame<'a> {
    /// Creates a bare frame for a method of a class.
    pub fn new(class: &'a str, method: &'a str) -> Self {
        Self {
            prefix: Cow::Borrowed(""),
            class: Cow::Borrowed(class),
            method: Cow::Borrowed(method),
            descriptor: None,
            file: None,
            line: None,
            suffix: Cow::Borrowed(""),
        }
    }

    /// Sets the source file and line of the frame.
    pub fn with_location(mut self, file: &'a str, line: Option<u32>) -> Self {
        self.file = Some(Cow::Borrowed(file));
        self.line = line;
        self
    }

    /// Sets the method descriptor, as printed in JRockit frames.
    pub fn with_descriptor(mut self, descriptor: &'a str) -> Self {
        self.descriptor = Some(Cow::Borrowed(descriptor));
        self
    }

    /// Parses a line of a stack trace into a frame.
    ///
    /// Both JRockit frames and conventional frames are recognized, with the JRockit form taking
    /// precedence. Returns `None` if the line does not have the shape of a frame.
    pub fn parse(line: &'a str) -> Option<Self> {
        Self::parse_jrockit(line).or_else(|| Self::parse_conventional(line))
    }

    fn parse_jrockit(line: &'a str) -> Option<Self> {
        let captures = JROCKIT_FRAME.captures(line)?;
        let arguments = captures.get(4)?;
        let return_type = captures.get(5)?;

        Some(Self {
            prefix: group(&captures, 1),
            class: group(&captures, 2),
            method: group(&captures, 3),
            // Includes the parentheses around the arguments.
            descriptor: Some(Cow::Borrowed(
                &line[arguments.start() - 1..return_type.end()],
            )),
            file: Some(group(&captures, 6)),
            line: parse_line(&captures, 7)?,
            suffix: group(&captures, 8),
        })
    }

    fn parse_conventional(line: &'a str) -> Option<Self> {
        let captures = FRAME.captures(line)?;
        let file = group(&captures, 4);

        Some(Self {
            prefix: group(&captures, 1),
            class: group(&captures, 2),
            method: group(&captures, 3),
            descriptor: None,
            file: (!file.is_empty()).then_some(file),
            line: parse_line(&captures, 5)?,
            suffix: group(&captures, 6),
        })
    }

    /// The text preceding the frame, such as `\tat `.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The fully qualified class name, possibly including a module qualifier.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method descriptor of a JRockit frame, such as `(I)V`.
    pub fn descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }

    /// The source file, such as `B.java` or `Unknown Source`.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The line number.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The text following the frame.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for StackFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", self.prefix, self.class, self.method)?;
        if let Some(descriptor) = &self.descriptor {
            f.write_str(descriptor)?;
        }

        f.write_str("(")?;
        if let Some(file) = &self.file {
            f.write_str(file)?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        write!(f, "){}", self.suffix)
    }
}

fn group<'a>(captures: &Captures<'a>, index: usize) -> Cow<'a, str> {
    Cow::Borrowed(captures.get(index).map_or("", |m| m.as_str()))
}

/// Returns `None` if the line is present but not a valid number. An empty line number, as in
/// `B.java:`, counts as missing.
fn parse_line(captures: &Captures<'_>, index: usize) -> Option<Option<u32>> {
    match captures.get(index) {
        Some(m) if !m.as_str().is_empty() => m.as_str().parse().ok().map(Some),
        _ => Some(None),
    }
}

/// Replaces numeric character references (`&#NNNN;`) with the characters they encode.
///
/// References to invalid code points are left as they are.
///
/// ```
/// assert_eq!(retrace::decode_char_refs("a.&#946;.c"), "a.β.c");
/// assert_eq!(retrace::decode_char_refs("&#55296;"), "&#55296;");
/// ```
pub fn decode_char_refs(line: &str) -> Cow<'_, str> {
    CHAR_REF.replace_all(line, |captures: &Captures<'_>| {
        captures[1]
            .parse()
            .ok()
            .and_then(char::from_u32)
            .map_or_else(|| captures[0].to_owned(), String::from)
    })
}

/// Finds the byte ranges of all dotted names in a line of text.
///
/// Trailing punctuation is not considered part of a name.
///
/// ```
/// let line = "Caused by: a.B: failed in c.D.";
/// let names: Vec<_> = retrace::find_qualified_names(line)
///     .into_iter()
///     .map(|range| &line[range])
///     .collect();
///
/// assert_eq!(names, ["a.B", "c.D"]);
/// ```
pub fn find_qualified_names(line: &str) -> Vec<Range<usize>> {
    QUALIFIED_NAME
        .find_iter(line)
        .filter_map(|m| {
            let name = m.as_str().trim_end_matches(['.', ',']);
            name.contains('.').then(|| m.start()..m.start() + name.len())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_conventional() {
        let frame = StackFrame::parse("\tat com.example.a.A$a.b(A.java:27)").unwrap();
        assert_eq!(frame.prefix(), "\tat ");
        assert_eq!(frame.class(), "com.example.a.A$a");
        assert_eq!(frame.method(), "b");
        assert_eq!(frame.descriptor(), None);
        assert_eq!(frame.file(), Some("A.java"));
        assert_eq!(frame.line(), Some(27));
        assert_eq!(frame.suffix(), "");
    }

    #[test]
    fn test_without_line() {
        let frame = StackFrame::parse("at x.y.z.run(Unknown Source)").unwrap();
        assert_eq!(frame.class(), "x.y.z");
        assert_eq!(frame.file(), Some("Unknown Source"));
        assert_eq!(frame.line(), None);

        let frame = StackFrame::parse("at a.B.c(B.java:)").unwrap();
        assert_eq!(frame.file(), Some("B.java"));
        assert_eq!(frame.line(), None);

        let frame = StackFrame::parse("at a.B.c()").unwrap();
        assert_eq!(frame.file(), None);
        assert_eq!(frame.to_string(), "at a.B.c()");
    }

    #[test]
    fn test_jrockit() {
        let line = "    at a.B.c(Ljava/lang/String;I)V(B.java:12) ~[app.jar]";
        let frame = StackFrame::parse(line).unwrap();

        assert_eq!(frame.prefix(), "    at ");
        assert_eq!(frame.class(), "a.B");
        assert_eq!(frame.method(), "c");
        assert_eq!(frame.descriptor(), Some("(Ljava/lang/String;I)V"));
        assert_eq!(frame.file(), Some("B.java"));
        assert_eq!(frame.line(), Some(12));
        assert_eq!(frame.suffix(), " ~[app.jar]");
        assert_eq!(frame.to_string(), line);
    }

    #[test]
    fn test_module() {
        let frame = StackFrame::parse("\tat mymodule/a.B.run(B.java:5)").unwrap();
        assert_eq!(frame.class(), "mymodule/a.B");
        assert_eq!(frame.method(), "run");
    }

    #[test]
    fn test_not_a_frame() {
        assert_eq!(StackFrame::parse("java.lang.NullPointerException: boom"), None);
        assert_eq!(StackFrame::parse("\t... 3 more"), None);
        assert_eq!(StackFrame::parse(""), None);
        // Line numbers beyond 32 bits are not line numbers.
        assert_eq!(StackFrame::parse("at a.B.c(B.java:99999999999)"), None);
    }

    #[test]
    fn test_builder() {
        let frame = StackFrame::new("a.B", "c")
            .with_descriptor("(I)V")
            .with_location("B.java", Some(3));
        assert_eq!(frame.to_string(), "a.B.c(I)V(B.java:3)");
    }

    #[test]
    fn test_decode_char_refs() {
        assert_eq!(decode_char_refs("at a.&#97;.c"), "at a.a.c");
        assert_eq!(decode_char_refs("&#65;&#66;"), "AB");
        assert_eq!(decode_char_refs("&#x41; & &#;"), "&#x41; & &#;");
        assert_eq!(decode_char_refs("&#99999999999;"), "&#99999999999;");
        assert!(matches!(decode_char_refs("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_qualified_names() {
        let line = "Exception in thread \"main\" java.lang.Error: a.B$c, see x.y.";
        let names: Vec<_> = find_qualified_names(line)
            .into_iter()
            .map(|range| &line[range])
            .collect();
        assert_eq!(names, ["java.lang.Error", "a.B$c", "x.y"]);
    }

    #[test]
    fn test_qualified_names_ellipsis() {
        assert!(find_qualified_names("\t... 3 more").is_empty());
    }
}
