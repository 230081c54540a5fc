use std::io::{Cursor, Read};

use elementtree::Element;

use crate::descriptor::{is_method_descriptor, method_signature};
use crate::error::{MappingError, MappingErrorKind};
use crate::tree::{split_inner_classes, MappingTree, NodeId};

/// The newest mapping file version known to be supported.
const SUPPORTED_VERSION: f64 = 1.5;

impl MappingTree {
    /// Parses a yGuard mapping file.
    ///
    /// ```
    /// use retrace_mapping::MappingTree;
    ///
    /// let tree = MappingTree::parse(br#"
    ///     <yguard version="1.5">
    ///       <map>
    ///         <class name="com.example.Foo" map="A"/>
    ///       </map>
    ///     </yguard>
    /// "#).unwrap();
    ///
    /// let class = tree.find_class("com.example.Foo").unwrap();
    /// assert_eq!(tree.node(class).mapped(), "A");
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, MappingError> {
        Self::from_reader(Cursor::new(data))
    }

    /// Reads and parses a yGuard mapping file.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MappingError> {
        let root = Element::from_reader(reader)?;
        Self::from_element(&root)
    }

    /// Builds the tree from the root element of an already parsed mapping file.
    ///
    /// All `<map>` sections are applied before `<expose>` sections. Entries that lack a required
    /// attribute are skipped.
    #[tracing::instrument(level = "trace", name = "MappingTree::from_element", skip_all)]
    pub fn from_element(root: &Element) -> Result<Self, MappingError> {
        if root.tag().name() != "yguard" {
            return Err(MappingError::new(
                MappingErrorKind::InvalidRoot,
                format!("unexpected root element <{}>", root.tag().name()),
            ));
        }

        if let Some(version) = root.get_attr("version") {
            match version.trim().parse::<f64>() {
                Ok(number) if number > SUPPORTED_VERSION => {
                    tracing::warn!(version, "mapping file version may not be fully supported");
                }
                Ok(_) => {}
                Err(_) => tracing::debug!(version, "unparsable mapping file version"),
            }
        }

        let mut tree = Self::new();

        for section in root.find_all("map") {
            apply_map_section(&mut tree, section);
        }
        for section in root.find_all("expose") {
            apply_expose_section(&mut tree, section);
        }
        for property in root.find_all("property") {
            apply_property(&mut tree, property);
        }

        tracing::trace!(nodes = tree.len(), "built mapping tree");
        Ok(tree)
    }
}

/// Returns the values of all named attributes, or `None` if any of them is missing or empty.
fn attrs<'a, const N: usize>(element: &'a Element, names: [&'a str; N]) -> Option<[&'a str; N]> {
    let mut values = [""; N];
    for (value, name) in values.iter_mut().zip(names) {
        *value = element.get_attr(name).filter(|v| !v.is_empty())?;
    }
    Some(values)
}

fn skip(element: &Element) {
    tracing::debug!(
        element = element.tag().name(),
        "skipping mapping entry with missing attributes"
    );
}

fn children<'a>(section: &'a Element, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    section.children().filter(move |child| child.tag().name() == tag)
}

/// Applies a `<map>` section.
///
/// Packages are applied before classes, so that qualified class mappings only fill in package
/// names that no package entry provided.
fn apply_map_section(tree: &mut MappingTree, section: &Element) {
    for element in children(section, "package") {
        match attrs(element, ["name", "map"]) {
            Some([name, map]) => map_package(tree, name, map),
            None => skip(element),
        }
    }

    for element in children(section, "class") {
        match attrs(element, ["name", "map"]) {
            Some([name, map]) => map_class(tree, name, map),
            None => skip(element),
        }
    }

    for element in children(section, "method") {
        match attrs(element, ["class", "name", "map"]) {
            Some([class, name, map]) => {
                let signature = normalize_method(name, element.get_attr("signature"));
                let id = tree.get_or_create_method(class, &signature);
                tree.set_mapped(id, map);
            }
            None => skip(element),
        }
    }

    for element in children(section, "field") {
        match attrs(element, ["class", "name", "map"]) {
            Some([class, name, map]) => {
                let id = tree.get_or_create_field(class, name);
                tree.set_mapped(id, map);
            }
            None => skip(element),
        }
    }

    for element in children(section, "property") {
        apply_property(tree, element);
    }
}

/// Applies an `<expose>` section. Exposed symbols are recorded under their original names.
fn apply_expose_section(tree: &mut MappingTree, section: &Element) {
    for element in section.children() {
        match element.tag().name() {
            "package" => match attrs(element, ["name"]) {
                Some([name]) => {
                    tree.get_or_create_package(name);
                }
                None => skip(element),
            },
            "class" => match attrs(element, ["name"]) {
                Some([name]) => {
                    tree.get_or_create_class(name);
                }
                None => skip(element),
            },
            "method" => match attrs(element, ["class", "name"]) {
                Some([class, name]) => {
                    let signature = normalize_method(name, element.get_attr("signature"));
                    tree.get_or_create_method(class, &signature);
                }
                None => skip(element),
            },
            "field" => match attrs(element, ["class", "name"]) {
                Some([class, name]) => {
                    tree.get_or_create_field(class, name);
                }
                None => skip(element),
            },
            _ => {}
        }
    }
}

fn apply_property(tree: &mut MappingTree, element: &Element) {
    match attrs(element, ["owner", "key", "value"]) {
        Some([owner, key, value]) => tree.properties_mut().insert(owner, key, value),
        None => skip(element),
    }
}

/// Assigns a package mapping.
///
/// The mapped segments are aligned to the right end of the original name. A mapping with more
/// segments than the original folds the surplus into the last package, joined with `/`.
fn map_package(tree: &mut MappingTree, name: &str, map: &str) {
    let node = tree.get_or_create_package(name);
    let depth = name.split('.').count();

    let mut segments: Vec<String> = map.split('.').map(str::to_owned).collect();
    if segments.len() > depth {
        let folded = segments.split_off(depth - 1).join("/");
        segments.push(folded);
    }

    let mut current = Some(node);
    for segment in segments.into_iter().rev() {
        let Some(id) = current.filter(|&id| id != tree.root()) else {
            break;
        };
        tree.set_mapped(id, segment);
        current = tree.node(id).parent();
    }
}

/// Assigns a class mapping.
///
/// The last segment of the mapping names the class. Qualifying segments, as in `a.B` or `A$b`,
/// name the enclosing packages and outer classes, unless those were renamed already.
fn map_class(tree: &mut MappingTree, name: &str, map: &str) {
    let node = tree.get_or_create_class(name);
    let segments: Vec<&str> = map.split('.').flat_map(split_inner_classes).collect();
    let mut segments = segments.into_iter().rev();

    if let Some(last) = segments.next() {
        tree.set_mapped(node, last);
    }

    let mut current: NodeId = node;
    for qualifier in segments {
        if qualifier.is_empty() {
            break;
        }
        match tree.node(current).parent() {
            Some(parent) if parent != tree.root() => current = parent,
            _ => break,
        }
        if !tree.node(current).is_renamed() {
            tree.set_mapped(current, qualifier);
        }
    }
}

/// Turns a method name from a mapping file into its Java signature.
///
/// Names may be given as Java signatures already, in descriptor form, or as a plain name with a
/// separate descriptor. Descriptors that fail to convert leave the name as written.
fn normalize_method(name: &str, descriptor: Option<&str>) -> String {
    let converted = match descriptor {
        Some(descriptor) => method_signature(name, descriptor),
        None if is_method_descriptor(name) => match name.find('(') {
            Some(index) => method_signature(&name[..index], &name[index..]),
            None => return name.to_owned(),
        },
        None => return name.to_owned(),
    };

    converted.unwrap_or_else(|error| {
        tracing::debug!(name, %error, "failed to convert method descriptor");
        name.to_owned()
    })
}
