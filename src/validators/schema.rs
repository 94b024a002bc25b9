//! Compiled schema components
//!
//! A `CompiledSchema` holds the global declarations of one schema document
//! and everything it includes or imports. Components refer to each other by
//! qualified name; references are checked once when compilation finishes.

use crate::namespaces::QName;
use crate::validators::builtins::BuiltinType;
use crate::validators::facets::{Facets, WhiteSpace};
use indexmap::IndexMap;
use std::sync::Arc;

/// Reference to a type definition
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// Built-in XSD type
    Builtin(BuiltinType),
    /// Named user type
    Named(QName),
    /// Anonymous type declared in place
    Inline(Arc<TypeDef>),
}

/// A simple or complex type definition
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// Simple type
    Simple(SimpleTypeDef),
    /// Complex type
    Complex(ComplexTypeDef),
}

impl TypeDef {
    /// Name of the definition, if it is global
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(st) => st.name.as_ref(),
            TypeDef::Complex(ct) => ct.name.as_ref(),
        }
    }
}

/// Simple type definition
#[derive(Debug, Clone)]
pub struct SimpleTypeDef {
    /// Global name
    pub name: Option<QName>,
    /// How the type is built
    pub variety: SimpleVariety,
}

/// The three ways a simple type is derived
#[derive(Debug, Clone)]
pub enum SimpleVariety {
    /// Restriction of a base type by facets
    Restriction {
        /// Restricted base
        base: TypeRef,
        /// Facets of this step
        facets: Facets,
    },
    /// Whitespace separated list of items
    List {
        /// Item type
        item: TypeRef,
    },
    /// Any of the member types
    Union {
        /// Member types, tried in order
        members: Vec<TypeRef>,
    },
}

/// How a complex type is derived from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Content appended to the base's content
    Extension,
    /// Content restated as a subset of the base's content
    Restriction,
}

/// Content of a complex type
#[derive(Debug, Clone)]
pub enum ContentType {
    /// No children, no text
    Empty,
    /// Text only, of the given simple type
    Simple(TypeRef),
    /// Child elements described by a particle
    Elements(Particle),
}

/// Complex type definition
#[derive(Debug, Clone)]
pub struct ComplexTypeDef {
    /// Global name
    pub name: Option<QName>,
    /// Declared content
    pub content: ContentType,
    /// Mixed content allowed
    pub mixed: bool,
    /// Locally declared attributes
    pub attributes: Vec<AttributeUse>,
    /// Referenced attribute groups
    pub attribute_groups: Vec<QName>,
    /// Attribute wildcard
    pub any_attribute: Option<Wildcard>,
    /// Base type for `complexContent` derivations
    pub base: Option<(Derivation, QName)>,
}

impl Default for ComplexTypeDef {
    fn default() -> Self {
        Self {
            name: None,
            content: ContentType::Empty,
            mixed: false,
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            any_attribute: None,
            base: None,
        }
    }
}

/// Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Expanded name
    pub name: QName,
    /// Declared type
    pub type_ref: TypeRef,
    /// `nillable="true"`
    pub nillable: bool,
    /// Default value
    pub default: Option<String>,
    /// Fixed value
    pub fixed: Option<String>,
}

/// Global attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// Expanded name
    pub name: QName,
    /// Declared type
    pub type_ref: TypeRef,
    /// Fixed value
    pub fixed: Option<String>,
}

/// Attribute use inside a complex type or attribute group
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// Expanded name
    pub name: QName,
    /// Declared type; `None` for a reference to a global attribute
    pub type_ref: Option<TypeRef>,
    /// `use="required"`
    pub required: bool,
    /// `use="prohibited"`
    pub prohibited: bool,
    /// Fixed value
    pub fixed: Option<String>,
}

/// Attribute group definition
#[derive(Debug, Clone, Default)]
pub struct AttributeGroupDef {
    /// Attribute uses
    pub attributes: Vec<AttributeUse>,
    /// Nested attribute group references
    pub attribute_groups: Vec<QName>,
    /// Attribute wildcard
    pub any_attribute: Option<Wildcard>,
}

/// Occurrence-bounded term of a content model
#[derive(Debug, Clone)]
pub struct Particle {
    /// `minOccurs`
    pub min_occurs: u32,
    /// `maxOccurs`; `None` is unbounded
    pub max_occurs: Option<u32>,
    /// The term
    pub term: Term,
}

impl Particle {
    /// Particle occurring exactly once
    pub fn once(term: Term) -> Self {
        Self {
            min_occurs: 1,
            max_occurs: Some(1),
            term,
        }
    }
}

/// Term of a particle
#[derive(Debug, Clone)]
pub enum Term {
    /// Local element declaration
    Element(Arc<ElementDecl>),
    /// Reference to a global element
    ElementRef(QName),
    /// Ordered group
    Sequence(Vec<Particle>),
    /// One of the alternatives
    Choice(Vec<Particle>),
    /// Each member at most once, in any order
    All(Vec<Particle>),
    /// Element wildcard
    Any(Wildcard),
    /// Reference to a named model group
    GroupRef(QName),
}

/// Namespaces a wildcard accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    /// `##any`
    Any,
    /// `##other`: any namespace other than the given target namespace and
    /// no-namespace
    Other(Option<String>),
    /// Explicit list; `None` stands for no-namespace
    List(Vec<Option<String>>),
}

impl NamespaceConstraint {
    /// True when a name in `namespace` is accepted
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => {
                namespace.is_some() && namespace != target.as_deref()
            }
            NamespaceConstraint::List(list) => list.iter().any(|ns| ns.as_deref() == namespace),
        }
    }
}

/// `processContents` of a wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    /// A declaration is required
    Strict,
    /// Validate when a declaration exists
    Lax,
    /// Do not validate
    Skip,
}

/// Element or attribute wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    /// Accepted namespaces
    pub namespaces: NamespaceConstraint,
    /// Validation mode for matched items
    pub process_contents: ProcessContents,
}

/// A compiled schema ready to drive validation
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    /// Target namespace of the root schema document
    pub target_namespace: Option<String>,
    /// Location the schema was loaded from
    pub location: Option<String>,
    /// Global element declarations
    pub elements: IndexMap<QName, Arc<ElementDecl>>,
    /// Named type definitions
    pub types: IndexMap<QName, Arc<TypeDef>>,
    /// Global attribute declarations
    pub attributes: IndexMap<QName, AttributeDecl>,
    /// Named model groups
    pub groups: IndexMap<QName, Particle>,
    /// Named attribute groups
    pub attribute_groups: IndexMap<QName, AttributeGroupDef>,
}

/// Result of following a `TypeRef`
#[derive(Debug, Clone)]
pub enum ResolvedType {
    /// Built-in type
    Builtin(BuiltinType),
    /// User definition
    Defined(Arc<TypeDef>),
}

impl CompiledSchema {
    /// Global element declaration by name
    pub fn element(&self, name: &QName) -> Option<&Arc<ElementDecl>> {
        self.elements.get(name)
    }

    /// Named type definition
    pub fn type_definition(&self, name: &QName) -> Option<&Arc<TypeDef>> {
        self.types.get(name)
    }

    /// Follow a type reference
    pub fn resolve(&self, type_ref: &TypeRef) -> Option<ResolvedType> {
        match type_ref {
            TypeRef::Builtin(b) => Some(ResolvedType::Builtin(*b)),
            TypeRef::Named(name) => self.types.get(name).cloned().map(ResolvedType::Defined),
            TypeRef::Inline(def) => Some(ResolvedType::Defined(def.clone())),
        }
    }

    /// Built-in type a simple type ultimately restricts, if any
    pub fn primitive(&self, type_ref: &TypeRef) -> Option<BuiltinType> {
        let mut current = type_ref.clone();
        // bounded in case of a hand-built cyclic chain
        for _ in 0..64 {
            match self.resolve(&current)? {
                ResolvedType::Builtin(b) => return Some(b),
                ResolvedType::Defined(def) => match def.as_ref() {
                    TypeDef::Simple(SimpleTypeDef {
                        variety: SimpleVariety::Restriction { base, .. },
                        ..
                    }) => current = base.clone(),
                    TypeDef::Complex(ComplexTypeDef {
                        content: ContentType::Simple(base),
                        ..
                    }) => current = base.clone(),
                    _ => return None,
                },
            }
        }
        None
    }

    /// White space handling of a simple type
    pub fn white_space(&self, type_ref: &TypeRef) -> WhiteSpace {
        let mut current = type_ref.clone();
        for _ in 0..64 {
            match self.resolve(&current) {
                Some(ResolvedType::Builtin(b)) => return b.white_space(),
                Some(ResolvedType::Defined(def)) => match def.as_ref() {
                    TypeDef::Simple(SimpleTypeDef {
                        variety: SimpleVariety::Restriction { base, facets },
                        ..
                    }) => {
                        if let Some(ws) = facets.white_space {
                            return ws;
                        }
                        current = base.clone();
                    }
                    TypeDef::Complex(ComplexTypeDef {
                        content: ContentType::Simple(base),
                        ..
                    }) => current = base.clone(),
                    _ => return WhiteSpace::Collapse,
                },
                None => return WhiteSpace::Preserve,
            }
        }
        WhiteSpace::Preserve
    }

    /// True when `derived` is `base` or reaches it through its base types.
    /// Simple types without a restriction base derive from anySimpleType,
    /// complex types without a base from anyType.
    pub fn derives_from(&self, derived: &TypeRef, base: &TypeRef) -> bool {
        let Some(target) = self.resolve(base) else {
            return false;
        };
        let mut current = derived.clone();
        for _ in 0..64 {
            let Some(resolved) = self.resolve(&current) else {
                return false;
            };
            match (&resolved, &target) {
                (ResolvedType::Builtin(b), ResolvedType::Builtin(t)) => return b.derives_from(*t),
                (ResolvedType::Builtin(_), ResolvedType::Defined(_)) => return false,
                (ResolvedType::Defined(d), ResolvedType::Defined(t)) if Arc::ptr_eq(d, t) => {
                    return true
                }
                _ => {}
            }
            let ResolvedType::Defined(def) = resolved else {
                return false;
            };
            current = match def.as_ref() {
                TypeDef::Complex(ComplexTypeDef {
                    base: Some((_, name)),
                    ..
                }) => TypeRef::Named(name.clone()),
                TypeDef::Complex(ComplexTypeDef {
                    content: ContentType::Simple(inner),
                    ..
                }) => inner.clone(),
                TypeDef::Complex(_) => TypeRef::Builtin(BuiltinType::AnyType),
                TypeDef::Simple(SimpleTypeDef {
                    variety: SimpleVariety::Restriction { base, .. },
                    ..
                }) => base.clone(),
                TypeDef::Simple(_) => TypeRef::Builtin(BuiltinType::AnySimpleType),
            };
        }
        false
    }

    /// Chain of complex types from `def` up through its named bases
    pub fn complex_chain(&self, def: &Arc<TypeDef>) -> Vec<Arc<TypeDef>> {
        let mut chain = vec![def.clone()];
        let mut current = def.clone();
        while let TypeDef::Complex(ComplexTypeDef {
            base: Some((_, base)),
            ..
        }) = current.as_ref()
        {
            let Some(next) = self.types.get(base).cloned() else {
                break;
            };
            if chain.iter().any(|seen| Arc::ptr_eq(seen, &next)) || chain.len() > 64 {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Number of global components
    pub fn component_count(&self) -> usize {
        self.elements.len()
            + self.types.len()
            + self.attributes.len()
            + self.groups.len()
            + self.attribute_groups.len()
    }
}
