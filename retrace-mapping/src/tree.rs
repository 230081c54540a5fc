use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::method_display_name;

/// The property key holding the line number scrambling salt of a class.
pub const SCRAMBLING_SALT: &str = "scrambling-salt";

/// Splits a class name into the names of its outer and inner classes.
///
/// A `$` only separates two classes if it follows a name. Leading dollars belong to the class
/// name, as in generated proxies (`$Proxy12`) or lambdas (`Foo$$Lambda$7`).
///
/// ```
/// use retrace_mapping::split_inner_classes;
///
/// assert_eq!(split_inner_classes("Foo$Bar"), ["Foo", "Bar"]);
/// assert_eq!(split_inner_classes("$Proxy12"), ["$Proxy12"]);
/// assert_eq!(split_inner_classes("Foo$$Lambda$7"), ["Foo", "$Lambda", "7"]);
/// ```
pub fn split_inner_classes(name: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;

    for (index, c) in name.char_indices() {
        if c == '$' && index > start {
            segments.push(&name[start..index]);
            start = index + 1;
        }
    }

    segments.push(&name[start..]);
    segments
}

/// Index of a node in a [`MappingTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the position of the node in the tree's arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The type of a [`Node`], without kind specific data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// A package, or one segment of a dotted package name.
    Package,
    /// A class. Inner classes are children of their outer class.
    Class,
    /// A method of a class.
    Method,
    /// A field of a class.
    Field,
}

/// The kind of a [`Node`] along with its kind specific data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A package segment.
    Package,
    /// A class.
    Class,
    /// A method.
    Method {
        /// The Java signature of the method, such as `void run(int)`.
        ///
        /// Overloads share the same name but differ in their signature.
        signature: String,
    },
    /// A field.
    Field,
}

impl NodeKind {
    /// Returns the type of this kind.
    pub fn ty(&self) -> NodeType {
        match self {
            Self::Package => NodeType::Package,
            Self::Class => NodeType::Class,
            Self::Method { .. } => NodeType::Method,
            Self::Field => NodeType::Field,
        }
    }
}

/// A package, class, method or field in a [`MappingTree`].
#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    original: String,
    mapped: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, original: &str, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            original: original.to_owned(),
            mapped: original.to_owned(),
            parent,
            children: Vec::new(),
        }
    }

    /// The kind of this node.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The type of this node.
    pub fn ty(&self) -> NodeType {
        self.kind.ty()
    }

    /// The name of this node before obfuscation.
    ///
    /// For packages and classes this is a single segment of the qualified name. For methods it is
    /// the bare method name.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The name this node received from the obfuscator.
    ///
    /// Equals [`original`](Self::original) for symbols that were not renamed.
    pub fn mapped(&self) -> &str {
        &self.mapped
    }

    /// The Java signature of a method node.
    pub fn signature(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Method { signature } => Some(signature),
            _ => None,
        }
    }

    /// The parent of this node, or `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The children of this node in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the obfuscator assigned a different name to this node.
    pub fn is_renamed(&self) -> bool {
        self.original != self.mapped
    }

    /// Whether this node is a package.
    pub fn is_package(&self) -> bool {
        self.ty() == NodeType::Package
    }

    /// Whether this node is a class.
    pub fn is_class(&self) -> bool {
        self.ty() == NodeType::Class
    }

    /// Whether this node is a method.
    pub fn is_method(&self) -> bool {
        self.ty() == NodeType::Method
    }

    /// Whether this node is a field.
    pub fn is_field(&self) -> bool {
        self.ty() == NodeType::Field
    }
}

/// Per-class key/value properties from a mapping file, keyed by the original class name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyTable {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl PropertyTable {
    /// Creates an empty property table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a property of a class.
    pub fn get(&self, owner: &str, key: &str) -> Option<&str> {
        self.entries.get(owner)?.get(key).map(String::as_str)
    }

    /// Sets a property of a class, replacing a previous value.
    pub fn insert(&mut self, owner: &str, key: &str, value: &str) {
        self.entries
            .entry(owner.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
    }

    /// Returns the raw scrambling salt recorded for a class.
    pub fn scrambling_salt(&self, owner: &str) -> Option<&str> {
        self.get(owner, SCRAMBLING_SALT)
    }

    /// Iterates all properties as `(owner, key, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.entries.iter().flat_map(|(owner, props)| {
            props
                .iter()
                .map(move |(key, value)| (owner.as_str(), key.as_str(), value.as_str()))
        })
    }

    /// Whether the table holds no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The hierarchy of packages, classes, methods and fields described by a mapping file.
///
/// Nodes live in an arena and refer to each other through [`NodeId`]s. The root is an anonymous
/// package representing the default package. Lookups during construction go by original name,
/// while lookups during deobfuscation go by mapped name.
///
/// # Examples
///
/// ```
/// use retrace_mapping::{MappingTree, NodeType};
///
/// let mut tree = MappingTree::new();
/// let class = tree.get_or_create_class("com.example.Foo");
/// tree.set_mapped(class, "A");
///
/// let package = tree.find_class("com.example.Foo").and_then(|id| tree.node(id).parent()).unwrap();
/// assert_eq!(tree.find_mapped(package, NodeType::Class, "A"), Some(class));
/// assert_eq!(tree.original_fqn(class), "com.example.Foo");
/// ```
#[derive(Clone)]
pub struct MappingTree {
    nodes: Vec<Node>,
    properties: PropertyTable,
}

impl MappingTree {
    /// Creates a tree that only contains the root package.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Package, "", None)],
            properties: PropertyTable::new(),
        }
    }

    /// The root package.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id belongs to a different tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// The number of nodes in the tree, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree contains nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Iterates the children of a node along with their ids.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.node(id)
            .children
            .iter()
            .map(move |&child| (child, self.node(child)))
    }

    /// Finds a child of the given type by its original name.
    pub fn find_original(&self, parent: NodeId, ty: NodeType, name: &str) -> Option<NodeId> {
        self.children(parent)
            .find(|(_, node)| node.ty() == ty && node.original == name)
            .map(|(id, _)| id)
    }

    /// Finds the first child of the given type by its mapped name.
    ///
    /// Methods are matched by the bare name of their mapping, so that `a`, `a(I)V` and
    /// `void a(int)` are all found under `a`.
    pub fn find_mapped(&self, parent: NodeId, ty: NodeType, name: &str) -> Option<NodeId> {
        self.find_all_mapped(parent, ty, name).next()
    }

    /// Finds all children of the given type that carry the mapped name, in insertion order.
    pub fn find_all_mapped<'a>(
        &'a self,
        parent: NodeId,
        ty: NodeType,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(parent)
            .filter(move |(_, node)| {
                node.ty() == ty
                    && match ty {
                        NodeType::Method => method_display_name(&node.mapped) == name,
                        _ => node.mapped == name,
                    }
            })
            .map(|(id, _)| id)
    }

    /// Looks up the node of a dotted package name, creating missing segments.
    ///
    /// The empty name refers to the root.
    pub fn get_or_create_package(&mut self, name: &str) -> NodeId {
        let mut node = self.root();
        if name.is_empty() {
            return node;
        }

        for segment in name.split('.') {
            node = self.get_or_create_child(node, NodeKind::Package, segment);
        }
        node
    }

    /// Looks up the node of a fully qualified class name, creating missing packages and classes.
    ///
    /// Inner classes (`Outer$Inner`) are created as children of their outer class.
    pub fn get_or_create_class(&mut self, fqn: &str) -> NodeId {
        let (package, class) = match fqn.rfind('.') {
            Some(index) => (&fqn[..index], &fqn[index + 1..]),
            None => ("", fqn),
        };

        let mut node = self.get_or_create_package(package);
        for segment in split_inner_classes(class) {
            node = self.get_or_create_child(node, NodeKind::Class, segment);
        }
        node
    }

    /// Looks up a method of a class by its Java signature, creating it if necessary.
    ///
    /// Every distinct signature gets its own node, so overloads stay apart.
    pub fn get_or_create_method(&mut self, class: &str, signature: &str) -> NodeId {
        let class = self.get_or_create_class(class);

        let existing = self.children(class).find(|(_, node)| {
            matches!(&node.kind, NodeKind::Method { signature: s } if s == signature)
        });
        if let Some((id, _)) = existing {
            return id;
        }

        let kind = NodeKind::Method {
            signature: signature.to_owned(),
        };
        self.push_node(class, kind, method_display_name(signature))
    }

    /// Looks up a field of a class, creating it if necessary.
    pub fn get_or_create_field(&mut self, class: &str, name: &str) -> NodeId {
        let class = self.get_or_create_class(class);
        self.get_or_create_child(class, NodeKind::Field, name)
    }

    /// Assigns the obfuscated name of a node.
    pub fn set_mapped(&mut self, id: NodeId, mapped: impl Into<String>) {
        self.nodes[id.0].mapped = mapped.into();
    }

    /// Looks up a class by its original fully qualified name without creating it.
    pub fn find_class(&self, fqn: &str) -> Option<NodeId> {
        let (package, class) = match fqn.rfind('.') {
            Some(index) => (&fqn[..index], &fqn[index + 1..]),
            None => ("", fqn),
        };

        let mut node = self.root();
        if !package.is_empty() {
            for segment in package.split('.') {
                node = self.find_original(node, NodeType::Package, segment)?;
            }
        }
        for segment in split_inner_classes(class) {
            node = self.find_original(node, NodeType::Class, segment)?;
        }
        Some(node)
    }

    /// Reconstructs the original qualified name of a node.
    ///
    /// Packages are joined with `.` and inner classes with `$`. Members are appended to their
    /// class with a `.`.
    pub fn original_fqn(&self, id: NodeId) -> String {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            if node.parent.is_some() {
                path.push(node);
            }
            current = node.parent;
        }

        let mut fqn = String::new();
        let mut previous: Option<&Node> = None;
        for node in path.into_iter().rev() {
            if let Some(previous) = previous {
                fqn.push(if previous.is_class() && node.is_class() {
                    '$'
                } else {
                    '.'
                });
            }
            fqn.push_str(&node.original);
            previous = Some(node);
        }
        fqn
    }

    /// Returns the outermost class enclosing the given class, which may be the class itself.
    pub fn outermost_class(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.node(id).parent {
            if !self.node(parent).is_class() {
                break;
            }
            id = parent;
        }
        id
    }

    /// The per-class properties of the mapping file.
    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    /// Mutable access to the per-class properties.
    pub fn properties_mut(&mut self) -> &mut PropertyTable {
        &mut self.properties
    }

    fn get_or_create_child(&mut self, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
        match self.find_original(parent, kind.ty(), name) {
            Some(id) => id,
            None => self.push_node(parent, kind, name),
        }
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind, name, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }
}

impl Default for MappingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MappingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingTree")
            .field("nodes", &self.nodes.len())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Renders the tree as an indented outline, one node per line.
///
/// Renamed nodes are written as `original -> mapped`.
impl fmt::Display for MappingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(
            tree: &MappingTree,
            f: &mut fmt::Formatter<'_>,
            id: NodeId,
            depth: usize,
        ) -> fmt::Result {
            for (child, node) in tree.children(id) {
                let label = match &node.kind {
                    NodeKind::Package => "package",
                    NodeKind::Class => "class",
                    NodeKind::Method { .. } => "method",
                    NodeKind::Field => "field",
                };
                let name = node.signature().unwrap_or(&node.original);

                write!(f, "{:indent$}{label} {name}", "", indent = depth * 2)?;
                if node.is_renamed() {
                    write!(f, " -> {}", node.mapped)?;
                }
                writeln!(f)?;

                write_node(tree, f, child, depth + 1)?;
            }
            Ok(())
        }

        write_node(self, f, self.root(), 0)
    }
}
