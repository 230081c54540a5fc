use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Captures, Regex};

use retrace_mapping::descriptor::{method_parameters, parameter_list};
use retrace_mapping::{MappingError, MappingTree, NodeId, NodeType};
use retrace_scramble::{class_seed, LineScrambler, SCRAMBLE_TABLE_SIZE};

use crate::frame::{decode_char_refs, find_qualified_names, StackFrame};
use crate::options::RetraceOptions;
use crate::resolve::{join_originals, resolve_name};

/// An object type inside a method descriptor, terminated by `;` or the start of generic
/// arguments.
static OBJECT_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"L([^;<>()\[]+)([;<])").unwrap());

/// Files that are kept when synthesizing file names.
const NATIVE_METHOD: &str = "Native Method";

/// Deobfuscates stack traces of applications obfuscated with yGuard.
///
/// A `Retracer` owns the [`MappingTree`] of a mapping file and translates stack traces line by
/// line. Lines shaped like stack frames have their class, method, file and line restored. In all
/// other lines, every dotted name that resolves entirely is replaced by its original name. Text
/// that cannot be resolved is kept as it is, and no line is ever dropped.
///
/// The retracer can be shared between threads.
///
/// # Examples
///
/// ```
/// use retrace::Retracer;
///
/// let retracer = Retracer::parse(br#"
///     <yguard version="1.5">
///       <map>
///         <package name="com.example" map="a"/>
///         <class name="com.example.Foo" map="B"/>
///         <method class="com.example.Foo" name="void run()" map="c"/>
///       </map>
///     </yguard>
/// "#).unwrap();
///
/// assert_eq!(
///     retracer.translate_line("\tat a.B.c(B.java:5)"),
///     "\tat com.example.Foo.run(Foo.java:5)"
/// );
/// ```
#[derive(Debug)]
pub struct Retracer {
    tree: MappingTree,
    options: RetraceOptions,
    scramblers: RwLock<HashMap<i32, Arc<LineScrambler>>>,
}

impl Retracer {
    /// Creates a retracer with default options.
    pub fn new(tree: MappingTree) -> Self {
        Self::with_options(tree, RetraceOptions::new())
    }

    /// Creates a retracer with the given options.
    pub fn with_options(tree: MappingTree, options: RetraceOptions) -> Self {
        Self {
            tree,
            options,
            scramblers: RwLock::new(HashMap::new()),
        }
    }

    /// Parses a yGuard mapping file and creates a retracer with default options.
    pub fn parse(data: &[u8]) -> Result<Self, MappingError> {
        MappingTree::parse(data).map(Self::new)
    }

    /// The mapping tree used for deobfuscation.
    pub fn tree(&self) -> &MappingTree {
        &self.tree
    }

    /// The options of this retracer.
    pub fn options(&self) -> RetraceOptions {
        self.options
    }

    /// Translates a sequence of lines.
    ///
    /// The result has one line per input line, in the same order.
    #[tracing::instrument(
        level = "trace",
        name = "Retracer::translate",
        skip_all,
        fields(lines = lines.len())
    )]
    pub fn translate<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        lines
            .iter()
            .map(|line| self.translate_line(line.as_ref()))
            .collect()
    }

    /// Translates a block of text, such as an entire stack trace.
    ///
    /// Line breaks are preserved exactly.
    pub fn translate_str(&self, text: &str) -> String {
        text.split('\n')
            .map(|line| self.translate_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Translates a single line.
    pub fn translate_line(&self, line: &str) -> String {
        let line = decode_char_refs(line);
        if line.len() > self.options.line_len_limit() {
            tracing::debug!(len = line.len(), "skipping overlong line");
            return line.into_owned();
        }

        if let Some(frame) = StackFrame::parse(&line) {
            return match self.remap_frame(&frame) {
                Some(remapped) => remapped.to_string(),
                None => line.into_owned(),
            };
        }

        self.translate_text(&line)
    }

    /// Translates a single qualified name, such as a class, package or member name.
    ///
    /// Resolution stops at the first segment without a mapping. The segments resolved up to that
    /// point are translated and the rest is kept.
    ///
    /// ```
    /// use retrace::Retracer;
    ///
    /// let retracer = Retracer::parse(br#"
    ///     <yguard>
    ///       <map>
    ///         <class name="com.example.Foo" map="a.B"/>
    ///         <field class="com.example.Foo" name="count" map="c"/>
    ///       </map>
    ///     </yguard>
    /// "#).unwrap();
    ///
    /// assert_eq!(retracer.translate_name("com.a.B.c"), "com.example.Foo.count");
    /// assert_eq!(retracer.translate_name("com.a.B.x"), "com.example.Foo.x");
    /// ```
    pub fn translate_name(&self, name: &str) -> String {
        resolve_name(&self.tree, name, true).text
    }

    /// Remaps a stack frame.
    ///
    /// Returns `None` if nothing in the frame could be remapped.
    pub fn remap_frame<'a>(&self, frame: &StackFrame<'a>) -> Option<StackFrame<'a>> {
        let resolution = resolve_name(&self.tree, frame.class(), false);
        let mut remapped = frame.clone();

        // Anonymous classes and lambdas are missing from mapping files. Their enclosing class
        // still names the source file.
        if let Some(enclosing) = resolution.enclosing {
            if let Some(class) = resolution.class(&self.tree) {
                if let Some(method) = self.remap_method(class, frame) {
                    remapped.method = Cow::Owned(method);
                }
            }

            let class_name = resolution.class_name(&self.tree);
            let descrambled = frame
                .line()
                .zip(class_name)
                .and_then(|(line, name)| self.descramble(&name, line));
            if let Some(line) = descrambled {
                remapped.line = Some(line);
            }

            if let Some(file) = self.file_name(enclosing, frame.file()) {
                remapped.file = Some(Cow::Owned(file));
            }
        }

        remapped.class = Cow::Owned(resolution.text);

        if let Some(descriptor) = frame.descriptor() {
            let descriptor = self.remap_descriptor(descriptor).into_owned();
            remapped.descriptor = Some(Cow::Owned(descriptor));
        }

        (remapped != *frame).then_some(remapped)
    }

    /// Replaces all fully resolvable names in free text, right to left.
    fn translate_text(&self, line: &str) -> String {
        let mut translated = line.to_owned();

        for range in find_qualified_names(line).into_iter().rev() {
            let name = &line[range.clone()];
            let resolution = resolve_name(&self.tree, name, true);
            if resolution.is_complete() && resolution.text != name {
                translated.replace_range(range, &resolution.text);
            }
        }

        translated
    }

    /// Resolves the original name of a method, joining ambiguous overloads with `|`.
    fn remap_method(&self, class: NodeId, frame: &StackFrame<'_>) -> Option<String> {
        let candidates: Vec<_> = self
            .tree
            .find_all_mapped(class, NodeType::Method, frame.method())
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let candidates = match frame.descriptor() {
            Some(descriptor) => self.narrow_overloads(candidates, descriptor),
            None => candidates,
        };

        Some(join_originals(&self.tree, &candidates))
    }

    /// Keeps the overloads whose parameters match the frame's descriptor.
    ///
    /// If none match, all candidates are kept.
    fn narrow_overloads(&self, candidates: Vec<NodeId>, descriptor: &str) -> Vec<NodeId> {
        let arguments = match (descriptor.find('('), descriptor.find(')')) {
            (Some(open), Some(close)) if open < close => &descriptor[open + 1..close],
            _ => return candidates,
        };

        let expected = match parameter_list(&self.remap_descriptor(arguments)) {
            Ok(parameters) => compact(&parameters),
            Err(error) => {
                tracing::debug!(descriptor, %error, "failed to convert frame descriptor");
                return candidates;
            }
        };

        let matching: Vec<_> = candidates
            .iter()
            .copied()
            .filter(|&id| {
                self.tree
                    .node(id)
                    .signature()
                    .and_then(method_parameters)
                    .map(compact)
                    .as_deref()
                    == Some(expected.as_str())
            })
            .collect();

        if matching.is_empty() {
            candidates
        } else {
            matching
        }
    }

    /// Translates the class names referenced by a method descriptor.
    fn remap_descriptor<'d>(&self, descriptor: &'d str) -> Cow<'d, str> {
        OBJECT_TYPE.replace_all(descriptor, |captures: &Captures<'_>| {
            let name = captures[1].replace('/', ".");
            let resolution = resolve_name(&self.tree, &name, false);

            let class = match resolution.class(&self.tree) {
                Some(_) => resolution.text.replace('.', "/"),
                None => captures[1].to_owned(),
            };
            format!("L{class}{}", &captures[2])
        })
    }

    /// Restores a scrambled line number of a class with a scrambling salt.
    ///
    /// `class` is the original fully qualified name of the class.
    fn descramble(&self, class: &str, line: u32) -> Option<u32> {
        if !self.options.descrambles_lines() || line == 0 {
            return None;
        }

        let salt = self.tree.properties().scrambling_salt(class)?;
        let salt = match salt.trim().parse::<i32>() {
            Ok(salt) => salt,
            Err(error) => {
                tracing::debug!(class, salt, %error, "invalid scrambling salt");
                return None;
            }
        };

        let scrambler = self.scrambler(class_seed(salt, class));
        Some(scrambler.unscramble(line))
    }

    /// Returns the cached line scrambler for a seed, building it on first use.
    fn scrambler(&self, seed: i32) -> Arc<LineScrambler> {
        if let Some(scrambler) = self.scramblers.read().get(&seed) {
            return Arc::clone(scrambler);
        }

        let scrambler = Arc::new(LineScrambler::new(SCRAMBLE_TABLE_SIZE, seed.into()));
        let mut scramblers = self.scramblers.write();
        Arc::clone(scramblers.entry(seed).or_insert(scrambler))
    }

    /// Names the source file after the outermost class.
    fn file_name(&self, class: NodeId, file: Option<&str>) -> Option<String> {
        if !self.options.synthesizes_file_names() {
            return None;
        }

        match file {
            None | Some("") | Some(NATIVE_METHOD) => None,
            Some(_) => {
                let outer = self.tree.outermost_class(class);
                Some(format!("{}.java", self.tree.node(outer).original()))
            }
        }
    }
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    const MAPPING: &str = r#"<?xml version="1.0"?>
<yguard version="1.5">
  <map>
    <package name="com.example" map="a"/>
    <class name="com.example.Foo" map="a.B"/>
    <class name="com.example.Foo$Inner" map="c"/>
    <method class="com.example.Foo" name="void run()" map="run"/>
    <method class="com.example.Foo" name="void open(java.lang.String)" map="a"/>
    <method class="com.example.Foo" name="void close(int)" map="a"/>
    <method class="com.example.Foo$Inner" name="void call()" map="a"/>
  </map>
</yguard>"#;

    fn retracer() -> Retracer {
        Retracer::parse(MAPPING.as_bytes()).unwrap()
    }

    fn salted(salt: &str) -> Retracer {
        let mapping = MAPPING.replace(
            "</map>",
            &format!(
                r#"<property owner="com.example.Foo" key="scrambling-salt" value="{salt}"/></map>"#
            ),
        );
        Retracer::parse(mapping.as_bytes()).unwrap()
    }

    #[test]
    fn test_simple_frame() {
        assert_eq!(
            retracer().translate_line("at a.B.run(B.java:5)"),
            "at com.example.Foo.run(Foo.java:5)"
        );
    }

    #[test]
    fn test_scrambled_line() {
        let retracer = salted("42");
        assert_eq!(
            retracer.translate_line("at a.B.run(B.java:452)"),
            "at com.example.Foo.run(Foo.java:5)"
        );
        assert_eq!(
            retracer.translate_line("at a.B.run(B.java:4036)"),
            "at com.example.Foo.run(Foo.java:3589)"
        );
    }

    #[test]
    fn test_scrambled_line_disabled() {
        let tree = salted("42").tree().clone();
        let retracer = Retracer::with_options(tree, RetraceOptions::new().descramble_lines(false));
        assert_eq!(
            retracer.translate_line("at a.B.run(B.java:452)"),
            "at com.example.Foo.run(Foo.java:452)"
        );
    }

    #[test]
    fn test_invalid_salt() {
        assert_eq!(
            salted("pepper").translate_line("at a.B.run(B.java:452)"),
            "at com.example.Foo.run(Foo.java:452)"
        );
    }

    #[test]
    fn test_zero_line() {
        assert_eq!(
            salted("42").translate_line("at a.B.run(B.java:0)"),
            "at com.example.Foo.run(Foo.java:0)"
        );
    }

    #[test]
    fn test_scrambler_cache() {
        let retracer = salted("42");
        retracer.translate_line("at a.B.run(B.java:1)");
        retracer.translate_line("at a.B.run(B.java:2)");
        retracer.translate_line("at a.B$c.a(B.java:2)");
        assert_eq!(retracer.scramblers.read().len(), 1);
    }

    #[test]
    fn test_unknown_frame() {
        let line = "at x.y.z.run(Unknown Source)";
        assert_eq!(retracer().translate_line(line), line);
    }

    #[test]
    fn test_module() {
        assert_eq!(
            retracer().translate_line("mymodule/a.B.run(B.java:5)"),
            "mymodule/com.example.Foo.run(Foo.java:5)"
        );
    }

    #[test]
    fn test_overloads() {
        assert_eq!(
            retracer().translate_line("\tat a.B.a(B.java:7)"),
            "\tat com.example.Foo.open|close(Foo.java:7)"
        );
    }

    #[test]
    fn test_jrockit_narrowing() {
        assert_eq!(
            retracer().translate_line("\tat a.B.a(I)V(B.java:7)"),
            "\tat com.example.Foo.close(I)V(Foo.java:7)"
        );
        // Nothing matches, so both overloads are reported.
        assert_eq!(
            retracer().translate_line("\tat a.B.a(J)V(B.java:7)"),
            "\tat com.example.Foo.open|close(J)V(Foo.java:7)"
        );
    }

    #[test]
    fn test_jrockit_malformed_descriptor() {
        assert_eq!(
            retracer().translate_line("\tat a.B.a(Q)V(B.java:7)"),
            "\tat com.example.Foo.open|close(Q)V(Foo.java:7)"
        );
    }

    #[test]
    fn test_jrockit_descriptor() {
        assert_eq!(
            retracer().translate_line("at x.Y.z(La/B;[La/B$c;)La/B;(Y.java:1)"),
            "at x.Y.z(Lcom/example/Foo;[Lcom/example/Foo$Inner;)Lcom/example/Foo;(Y.java:1)"
        );
    }

    #[test]
    fn test_inner_class_file() {
        assert_eq!(
            retracer().translate_line("at a.B$c.a(B.java:3)"),
            "at com.example.Foo$Inner.call(Foo.java:3)"
        );
    }

    #[test]
    fn test_anonymous_class() {
        assert_eq!(
            retracer().translate_line("\tat a.B$1.c(B.java:5)"),
            "\tat com.example.Foo$1.c(Foo.java:5)"
        );
        assert_eq!(
            retracer().translate_line("\tat a.B$c$$Lambda$7.run(Unknown Source)"),
            "\tat com.example.Foo$Inner$$Lambda$7.run(Foo.java)"
        );
    }

    #[test]
    fn test_anonymous_class_scrambled_line() {
        let mapping = MAPPING.replace(
            "</map>",
            r#"<property owner="com.example.Foo$1" key="scrambling-salt" value="42"/></map>"#,
        );
        let retracer = Retracer::parse(mapping.as_bytes()).unwrap();
        assert_eq!(
            retracer.translate_line("\tat a.B$1.c(B.java:1061)"),
            "\tat com.example.Foo$1.c(Foo.java:5)"
        );
        // The salt of the anonymous class does not apply to its enclosing class.
        assert_eq!(
            retracer.translate_line("\tat a.B.run(B.java:1061)"),
            "\tat com.example.Foo.run(Foo.java:1061)"
        );
    }

    #[test]
    fn test_leading_dollar_class() {
        let retracer = Retracer::parse(
            br#"<yguard>
                <map>
                  <package name="com.example" map="a"/>
                  <class name="com.example.$Proxy" map="B"/>
                  <method class="com.example.$Proxy" name="void run()" map="c"/>
                </map>
              </yguard>"#,
        )
        .unwrap();

        assert_eq!(
            retracer.translate_line("\tat a.B.c(B.java:5)"),
            "\tat com.example.$Proxy.run($Proxy.java:5)"
        );
    }

    #[test]
    fn test_empty_line_number() {
        assert_eq!(
            retracer().translate_line("at a.B.run(B.java:)"),
            "at com.example.Foo.run(Foo.java)"
        );
    }

    #[test]
    fn test_native_method() {
        assert_eq!(
            retracer().translate_line("at a.B.run(Native Method)"),
            "at com.example.Foo.run(Native Method)"
        );
        assert_eq!(
            retracer().translate_line("at a.B.run()"),
            "at com.example.Foo.run()"
        );
    }

    #[test]
    fn test_unknown_method() {
        assert_eq!(
            retracer().translate_line("at a.B.zz(B.java:9)"),
            "at com.example.Foo.zz(Foo.java:9)"
        );
    }

    #[test]
    fn test_partially_resolved_frame() {
        assert_eq!(
            retracer().translate_line("at a.Q.run(Q.java:9)"),
            "at com.example.Q.run(Q.java:9)"
        );
    }

    #[test]
    fn test_free_text() {
        assert_eq!(
            retracer().translate_line("Caused by: a.B$c: state of a.B.a and x.Y."),
            "Caused by: com.example.Foo$Inner: state of com.example.Foo.open|close and x.Y."
        );
    }

    #[test]
    fn test_free_text_partial_match() {
        let line = "see a.B.x for details";
        assert_eq!(retracer().translate_line(line), line);
    }

    #[test]
    fn test_char_refs() {
        assert_eq!(
            retracer().translate_line("at a.&#66;.run(B.java:5)"),
            "at com.example.Foo.run(Foo.java:5)"
        );
        assert_eq!(retracer().translate_line("x &#97;"), "x a");
    }

    #[test]
    fn test_long_line() {
        let tree = retracer().tree().clone();
        let retracer = Retracer::with_options(tree, RetraceOptions::new().max_line_len(10));
        assert_eq!(
            retracer.translate_line("at a.B.run(B.java:5)"),
            "at a.B.run(B.java:5)"
        );
    }

    #[test]
    fn test_file_names_disabled() {
        let tree = retracer().tree().clone();
        let options = RetraceOptions::new().synthesize_file_names(false);
        let retracer = Retracer::with_options(tree, options);
        assert_eq!(
            retracer.translate_line("at a.B.run(B.java:5)"),
            "at com.example.Foo.run(B.java:5)"
        );
    }

    #[test]
    fn test_translate_preserves_lines() {
        let lines = ["java.lang.Error", "", "at a.B.run(B.java:5)", "\t... 1 more"];
        let translated = retracer().translate(&lines);
        assert_eq!(
            translated,
            [
                "java.lang.Error",
                "",
                "at com.example.Foo.run(Foo.java:5)",
                "\t... 1 more",
            ]
        );
    }

    #[test]
    fn test_translate_str() {
        assert_eq!(
            retracer().translate_str("a.B\r\nat a.B.run(B.java:5)\n"),
            "com.example.Foo\r\nat com.example.Foo.run(Foo.java:5)\n"
        );
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Retracer>();
    }
}
