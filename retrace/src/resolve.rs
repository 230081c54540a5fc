//! Resolution of obfuscated qualified names against a [`MappingTree`].

use std::borrow::Cow;

use retrace_mapping::{MappingTree, NodeId, NodeType};

/// How many levels of unrenamed packages are searched for a flattened package or class.
const MAX_FLATTEN_DEPTH: usize = 8;

/// The outcome of resolving a qualified name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Resolution {
    /// The deobfuscated name. If resolution stopped early, the unresolved rest is kept verbatim.
    pub text: String,
    /// The node the name resolved to, if every segment was consumed.
    pub node: Option<NodeId>,
    /// The innermost class the name resolved to, or that encloses its unresolved inner classes.
    pub enclosing: Option<NodeId>,
    /// The unresolved inner classes following `enclosing`, such as `1` in `a.B$1`.
    pub inner: Option<String>,
}

impl Resolution {
    /// Whether every segment of the name was resolved.
    pub fn is_complete(&self) -> bool {
        self.node.is_some()
    }

    /// The class the name resolved to, if it names a class.
    pub fn class(&self, tree: &MappingTree) -> Option<NodeId> {
        self.node.filter(|&id| tree.node(id).is_class())
    }

    /// The original name of the class, including unresolved inner classes.
    ///
    /// Returns `None` unless the name resolved at least up to an outer class.
    pub fn class_name(&self, tree: &MappingTree) -> Option<String> {
        let enclosing = tree.original_fqn(self.enclosing?);
        Some(match &self.inner {
            Some(inner) => format!("{enclosing}${inner}"),
            None => enclosing,
        })
    }
}

struct Token<'a> {
    text: &'a str,
    start: usize,
    delimiter: Option<char>,
}

enum Step {
    /// Descends to the last node of the path. Leading nodes are unrenamed packages that were
    /// skipped in the obfuscated name.
    Descend(Vec<NodeId>),
    /// Resolves the last segment to class members.
    Members(Vec<NodeId>),
}

/// Splits off a leading module qualifier, as in `mymodule/a.B` or `app//a.B`.
pub(crate) fn split_module(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(index) if name[index + 1..].contains('.') => name.split_at(index + 1),
        _ => ("", name),
    }
}

fn tokenize(name: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;

    for (index, c) in name.char_indices() {
        // A leading `$` is part of the name, see `split_inner_classes`.
        if matches!(c, '.' | '/') || (c == '$' && index > start) {
            tokens.push(Token {
                text: &name[start..index],
                start,
                delimiter: Some(c),
            });
            start = index + 1;
        }
    }

    tokens.push(Token {
        text: &name[start..],
        start,
        delimiter: None,
    });
    tokens
}

/// Resolves an obfuscated qualified name segment by segment.
///
/// With `members`, the last segment may also resolve to methods or a field of a class. Segments
/// that do not match a package are accumulated, since obfuscation may have merged several
/// packages into one. Resolution stops at the first segment that cannot be resolved, keeping
/// the rest of the name as it was.
pub(crate) fn resolve_name(tree: &MappingTree, name: &str, members: bool) -> Resolution {
    let (module, name) = split_module(name);
    let tokens = tokenize(name);

    let mut text = String::from(module);
    let mut node = tree.root();
    let mut mid_package = true;
    let mut accumulated = String::new();
    let mut pending = 0;
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        let terminal = index + 1 == tokens.len();
        let candidate = if accumulated.is_empty() {
            Cow::Borrowed(token.text)
        } else {
            Cow::Owned(format!("{accumulated}/{}", token.text))
        };

        let step = if mid_package {
            package_step(tree, node, &candidate, terminal)
        } else {
            class_step(tree, node, &candidate, terminal && members)
        };

        match step {
            Some(Step::Descend(path)) => {
                for (position, &id) in path.iter().enumerate() {
                    if position > 0 {
                        text.push('.');
                    }
                    text.push_str(tree.node(id).original());
                }
                if let Some(delimiter) = token.delimiter {
                    text.push(delimiter);
                }

                node = path.last().copied().unwrap_or(node);
                mid_package = tree.node(node).is_package();
                accumulated.clear();
                index += 1;
                pending = index;
            }
            Some(Step::Members(ids)) => {
                text.push_str(&join_originals(tree, &ids));
                return Resolution {
                    text,
                    node: ids.first().copied(),
                    enclosing: None,
                    inner: None,
                };
            }
            None if mid_package && !terminal => {
                accumulated = candidate.into_owned();
                index += 1;
            }
            None => {
                let rest = &name[tokens[pending].start..];
                text.push_str(rest);

                let after_class = pending > 0
                    && tokens[pending - 1].delimiter == Some('$')
                    && tree.node(node).is_class();

                return Resolution {
                    text,
                    node: None,
                    enclosing: after_class.then_some(node),
                    inner: after_class.then(|| rest.to_owned()),
                };
            }
        }
    }

    let enclosing = tree.node(node).is_class().then_some(node);
    Resolution {
        text,
        node: Some(node),
        enclosing,
        inner: None,
    }
}

/// Joins the original names of the given nodes with `|`, skipping duplicates.
pub(crate) fn join_originals(tree: &MappingTree, ids: &[NodeId]) -> String {
    let mut names: Vec<&str> = Vec::with_capacity(ids.len());
    for &id in ids {
        let name = tree.node(id).original();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.join("|")
}

fn package_step(tree: &MappingTree, node: NodeId, name: &str, terminal: bool) -> Option<Step> {
    let order = if terminal {
        [NodeType::Class, NodeType::Package]
    } else {
        [NodeType::Package, NodeType::Class]
    };

    // Names that kept their original spelling, such as exposed classes in renamed packages.
    let unmapped = || {
        order
            .into_iter()
            .find_map(|ty| tree.find_original(node, ty, name))
            .map(|id| vec![id])
    };

    order
        .into_iter()
        .find_map(|ty| lookup(tree, node, ty, name))
        .or_else(unmapped)
        .map(Step::Descend)
}

fn class_step(tree: &MappingTree, node: NodeId, name: &str, members: bool) -> Option<Step> {
    let inner = tree
        .find_mapped(node, NodeType::Class, name)
        .or_else(|| tree.find_original(node, NodeType::Class, name));
    if let Some(inner) = inner {
        return Some(Step::Descend(vec![inner]));
    }

    if !members {
        return None;
    }

    let methods: Vec<_> = tree.find_all_mapped(node, NodeType::Method, name).collect();
    if !methods.is_empty() {
        return Some(Step::Members(methods));
    }

    tree.find_mapped(node, NodeType::Field, name)
        .map(|field| Step::Members(vec![field]))
}

/// Looks up a child by mapped name, falling back to renamed nodes nested in unrenamed packages.
fn lookup(tree: &MappingTree, parent: NodeId, ty: NodeType, name: &str) -> Option<Vec<NodeId>> {
    if let Some(id) = tree.find_mapped(parent, ty, name) {
        return Some(vec![id]);
    }

    let mut path = Vec::new();
    flattened(tree, parent, ty, name, MAX_FLATTEN_DEPTH, &mut path).then_some(path)
}

fn flattened(
    tree: &MappingTree,
    parent: NodeId,
    ty: NodeType,
    name: &str,
    depth: usize,
    path: &mut Vec<NodeId>,
) -> bool {
    if depth == 0 {
        return false;
    }

    for (id, node) in tree.children(parent) {
        if !node.is_package() || node.is_renamed() {
            continue;
        }

        path.push(id);

        let target = tree
            .find_all_mapped(id, ty, name)
            .find(|&target| tree.node(target).is_renamed());
        if let Some(target) = target {
            path.push(target);
            return true;
        }

        if flattened(tree, id, ty, name, depth - 1, path) {
            return true;
        }

        path.pop();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn tree() -> MappingTree {
        MappingTree::parse(
            br#"<yguard>
                <map>
                  <package name="com.example" map="a"/>
                  <package name="org.merged" map="p.m.n"/>
                  <class name="com.example.Foo" map="B"/>
                  <class name="com.example.Foo$Inner" map="c"/>
                  <class name="org.merged.Bar" map="D"/>
                  <method class="com.example.Foo" name="void run()" map="r"/>
                  <method class="com.example.Foo" name="void stop(int)" map="r"/>
                  <field class="com.example.Foo" name="count" map="f"/>
                </map>
                <expose>
                  <class name="com.example.Api"/>
                </expose>
              </yguard>"#,
        )
        .unwrap()
    }

    fn text(tree: &MappingTree, name: &str, members: bool) -> (String, bool) {
        let resolution = resolve_name(tree, name, members);
        let complete = resolution.is_complete();
        (resolution.text, complete)
    }

    #[test]
    fn test_split_module() {
        assert_eq!(split_module("mymodule/a.B"), ("mymodule/", "a.B"));
        assert_eq!(split_module("app//a.B"), ("app//", "a.B"));
        assert_eq!(split_module("java.base/java.lang.Thread"), ("java.base/", "java.lang.Thread"));
        assert_eq!(split_module("a.B"), ("", "a.B"));
        assert_eq!(split_module("a/B"), ("", "a/B"));
    }

    #[test]
    fn test_flattened_package() {
        let tree = tree();
        assert_eq!(text(&tree, "a.B", false), ("com.example.Foo".into(), true));
        assert_eq!(text(&tree, "a", false), ("com.example".into(), true));
    }

    #[test]
    fn test_full_name() {
        let tree = tree();
        assert_eq!(
            text(&tree, "com.example.Api", false),
            ("com.example.Api".into(), true)
        );
        assert_eq!(
            text(&tree, "com.a.B", false),
            ("com.example.Foo".into(), true)
        );
    }

    #[test]
    fn test_inner_class() {
        let tree = tree();
        assert_eq!(text(&tree, "a.B$c", false), ("com.example.Foo$Inner".into(), true));
        let resolution = resolve_name(&tree, "a.B$c", false);
        assert_eq!(resolution.class(&tree), tree.find_class("com.example.Foo$Inner"));
    }

    #[test]
    fn test_accumulated_packages() {
        let tree = tree();
        assert_eq!(
            text(&tree, "p.m.n.D", false),
            ("org.merged.Bar".into(), true)
        );
    }

    #[test]
    fn test_members() {
        let tree = tree();
        assert_eq!(text(&tree, "a.B.r", true), ("com.example.Foo.run|stop".into(), true));
        assert_eq!(text(&tree, "a.B.f", true), ("com.example.Foo.count".into(), true));
        assert_eq!(text(&tree, "a.B.f", false), ("com.example.Foo.f".into(), false));

        let resolution = resolve_name(&tree, "a.B.f", true);
        assert_eq!(resolution.class(&tree), None);
    }

    #[test]
    fn test_unresolved_inner_class() {
        let tree = tree();

        let resolution = resolve_name(&tree, "a.B$1", false);
        assert_eq!(resolution.text, "com.example.Foo$1");
        assert!(!resolution.is_complete());
        assert_eq!(resolution.enclosing, tree.find_class("com.example.Foo"));
        assert_eq!(resolution.class_name(&tree).as_deref(), Some("com.example.Foo$1"));

        let resolution = resolve_name(&tree, "a.B$c$$Lambda$7", false);
        assert_eq!(resolution.text, "com.example.Foo$Inner$$Lambda$7");
        assert_eq!(resolution.enclosing, tree.find_class("com.example.Foo$Inner"));
        assert_eq!(
            resolution.class_name(&tree).as_deref(),
            Some("com.example.Foo$Inner$$Lambda$7")
        );

        let resolution = resolve_name(&tree, "a.Q$1", false);
        assert_eq!(resolution.enclosing, None);
        assert_eq!(resolution.class_name(&tree), None);
    }

    #[test]
    fn test_leading_dollar() {
        let tree = MappingTree::parse(
            br#"<yguard>
                <map>
                  <package name="com.example" map="a"/>
                  <class name="com.example.$Proxy" map="B"/>
                  <class name="com.example.Foo" map="$c"/>
                </map>
              </yguard>"#,
        )
        .unwrap();

        assert_eq!(text(&tree, "a.B", false), ("com.example.$Proxy".into(), true));
        assert_eq!(text(&tree, "a.$c", false), ("com.example.Foo".into(), true));
        assert_eq!(
            text(&tree, "a.$c$$Lambda$1", false),
            ("com.example.Foo$$Lambda$1".into(), false)
        );
    }

    #[test]
    fn test_unresolved() {
        let tree = tree();
        assert_eq!(text(&tree, "x.y.z", false), ("x.y.z".into(), false));
        assert_eq!(text(&tree, "a.B.x.y", true), ("com.example.Foo.x.y".into(), false));
        assert_eq!(text(&tree, "a.Q", false), ("com.example.Q".into(), false));
        assert_eq!(text(&tree, "", false), ("".into(), false));
    }

    #[test]
    fn test_module_prefix() {
        let tree = tree();
        assert_eq!(
            text(&tree, "mymodule/a.B", false),
            ("mymodule/com.example.Foo".into(), true)
        );
    }

    #[test]
    fn test_join_originals() {
        let mut tree = MappingTree::new();
        let a = tree.get_or_create_method("Foo", "void run()");
        let b = tree.get_or_create_method("Foo", "void run(int)");
        let c = tree.get_or_create_method("Foo", "void stop()");
        assert_eq!(join_originals(&tree, &[a, b, c]), "run|stop");
        assert_eq!(join_originals(&tree, &[c, a]), "stop|run");
    }
}
