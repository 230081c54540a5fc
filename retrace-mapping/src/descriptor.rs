//! Conversion of JVM type and method descriptors into their Java source form.
//!
//! Descriptors are the compact encoding of types used in class files, for instance
//! `[Ljava/lang/String;` for `java.lang.String[]` or `(IJ)V` for a method taking an `int` and a
//! `long` and returning `void`. Mapping files and some stack trace dialects carry these, while
//! humans expect the source representation.

use crate::error::DescriptorError;

/// Converts a class file path into a dotted class name.
///
/// ```
/// use retrace_mapping::descriptor::class_descriptor_to_name;
///
/// assert_eq!(class_descriptor_to_name("com/example/Foo.class"), "com.example.Foo");
/// assert_eq!(class_descriptor_to_name("com/example/Foo$Bar"), "com.example.Foo$Bar");
/// ```
pub fn class_descriptor_to_name(name: &str) -> String {
    name.strip_suffix(".class").unwrap_or(name).replace('/', ".")
}

/// Converts a single type descriptor into the Java type name.
///
/// Object types are written with dots, generic arguments are converted recursively and every
/// leading `[` adds a pair of brackets.
///
/// ```
/// use retrace_mapping::descriptor::type_descriptor;
///
/// assert_eq!(type_descriptor("I").unwrap(), "int");
/// assert_eq!(type_descriptor("[[Ljava/lang/String;").unwrap(), "java.lang.String[][]");
/// assert_eq!(
///     type_descriptor("Ljava/util/List<Ljava/lang/String;>;").unwrap(),
///     "java.util.List<java.lang.String>"
/// );
/// ```
pub fn type_descriptor(ty: &str) -> Result<String, DescriptorError> {
    let (converted, rest) = read_type(ty)?;
    match rest.chars().next() {
        None => Ok(converted),
        Some(c) => Err(DescriptorError::Malformed(c)),
    }
}

/// Converts a sequence of descriptors into a comma separated list of Java types.
///
/// Besides plain type descriptors, the list may contain generic wildcards (`*`, `+`, `-`) and
/// type variables (`T<name>;`), as found in generic signatures.
///
/// ```
/// use retrace_mapping::descriptor::parameter_list;
///
/// assert_eq!(parameter_list("ILjava/lang/String;[J").unwrap(), "int, java.lang.String, long[]");
/// assert_eq!(parameter_list("+TE;").unwrap(), "? extends E");
/// assert_eq!(parameter_list("").unwrap(), "");
/// ```
pub fn parameter_list(descriptor: &str) -> Result<String, DescriptorError> {
    let mut params = Vec::new();
    let mut rest = descriptor;

    while !rest.is_empty() {
        let (param, remaining) = read_argument(rest)?;
        params.push(param);
        rest = remaining;
    }

    Ok(params.join(", "))
}

/// Builds the Java signature of a method from its name and descriptor.
///
/// ```
/// use retrace_mapping::descriptor::method_signature;
///
/// assert_eq!(
///     method_signature("run", "(Ljava/lang/String;I)V").unwrap(),
///     "void run(java.lang.String, int)"
/// );
/// ```
pub fn method_signature(name: &str, descriptor: &str) -> Result<String, DescriptorError> {
    let open = descriptor
        .find('(')
        .ok_or(DescriptorError::MissingArguments)?;
    let close = descriptor[open..]
        .find(')')
        .map(|pos| open + pos)
        .ok_or(DescriptorError::MissingArguments)?;

    let args = parameter_list(&descriptor[open + 1..close])?;

    // Generic signatures may list thrown exceptions after the return type.
    let ret = descriptor[close + 1..].split('^').next().unwrap_or_default();
    let ret = type_descriptor(ret)?;

    Ok(format!("{ret} {name}({args})"))
}

/// Reduces a method signature to the bare method name.
///
/// Accepts the Java form (`void run(int)`), the descriptor form (`run(I)V`) and plain names.
///
/// ```
/// use retrace_mapping::descriptor::method_display_name;
///
/// assert_eq!(method_display_name("void run(int)"), "run");
/// assert_eq!(method_display_name("run(I)V"), "run");
/// assert_eq!(method_display_name("a"), "a");
/// ```
pub fn method_display_name(signature: &str) -> &str {
    let head = match signature.find('(') {
        Some(index) => &signature[..index],
        None => signature,
    };

    match head.rfind(' ') {
        Some(index) => &head[index + 1..],
        None => head,
    }
}

/// Returns the parameter list of a Java method signature, without parentheses.
///
/// ```
/// use retrace_mapping::descriptor::method_parameters;
///
/// assert_eq!(method_parameters("void run(int, long)"), Some("int, long"));
/// assert_eq!(method_parameters("run"), None);
/// ```
pub fn method_parameters(signature: &str) -> Option<&str> {
    let open = signature.find('(')?;
    let close = signature.rfind(')')?;
    signature.get(open + 1..close)
}

/// Checks whether a method name is written in descriptor form (`run(I)V`) rather than as a Java
/// signature (`void run(int)`).
pub fn is_method_descriptor(name: &str) -> bool {
    name.contains('(') && !name.contains(' ')
}

fn primitive(c: char) -> Option<&'static str> {
    Some(match c {
        'B' => "byte",
        'C' => "char",
        'D' => "double",
        'F' => "float",
        'I' => "int",
        'J' => "long",
        'S' => "short",
        'Z' => "boolean",
        'V' => "void",
        _ => return None,
    })
}

/// Reads one type descriptor from the front of `s` and returns it along with the unread rest.
fn read_type(s: &str) -> Result<(String, &str), DescriptorError> {
    let dims = s.bytes().take_while(|&b| b == b'[').count();
    let s = &s[dims..];

    let first = s.chars().next().ok_or(DescriptorError::UnexpectedEnd)?;
    let (mut converted, rest) = if let Some(name) = primitive(first) {
        (name.to_owned(), &s[1..])
    } else if first == 'L' {
        let end = object_end(s)?;
        (object_name(&s[1..end])?, &s[end + 1..])
    } else {
        return Err(DescriptorError::Malformed(first));
    };

    for _ in 0..dims {
        converted.push_str("[]");
    }

    Ok((converted, rest))
}

/// Reads one entry of a parameter list, which may also be a wildcard or type variable.
fn read_argument(s: &str) -> Result<(String, &str), DescriptorError> {
    let first = s.chars().next().ok_or(DescriptorError::UnexpectedEnd)?;
    match first {
        '*' => Ok(("?".to_owned(), &s[1..])),
        '+' => {
            let (bound, rest) = read_argument(&s[1..])?;
            Ok((format!("? extends {bound}"), rest))
        }
        '-' => {
            let (bound, rest) = read_argument(&s[1..])?;
            Ok((format!("? super {bound}"), rest))
        }
        'T' => {
            let end = s.find(';').ok_or(DescriptorError::Unterminated)?;
            Ok((s[1..end].to_owned(), &s[end + 1..]))
        }
        _ => read_type(s),
    }
}

/// Finds the `;` that terminates the object type starting at `s[0]`, skipping generic arguments.
fn object_end(s: &str) -> Result<usize, DescriptorError> {
    let mut depth = 0usize;
    for (index, byte) in s.bytes().enumerate() {
        match byte {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => return Ok(index),
            _ => {}
        }
    }
    Err(DescriptorError::Unterminated)
}

fn object_name(inner: &str) -> Result<String, DescriptorError> {
    let (open, close) = match (inner.find('<'), inner.rfind('>')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Ok(inner.replace('/', ".")),
    };

    let mut name = inner[..open].replace('/', ".");
    name.push('<');
    name.push_str(&parameter_list(&inner[open + 1..close])?);
    name.push('>');
    // Members of a generic outer class, as in `Outer<TT;>.Inner`.
    name.push_str(&inner[close + 1..].replace('/', "."));

    Ok(name)
}
