use std::fmt;

/// A qualified element or attribute name. Document-dialect names carry no
/// namespace; internal bookkeeping attributes live in the reserved metadata
/// namespace (see [`crate::tree::schema`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: if namespace.is_empty() {
                None
            } else {
                Some(namespace.to_string())
            },
            local: local.to_string(),
        }
    }

    pub fn local(local: &str) -> Self {
        Self {
            namespace: None,
            local: local.to_string(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: &str) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }
}
