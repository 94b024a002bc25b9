//! XSD compilation
//!
//! `XsdCompiler` reads schema documents with roxmltree and builds a
//! `CompiledSchema`. Included and imported documents are loaded once each,
//! relative to the document that references them. Cross references are
//! checked after every document has been read, so declaration order does
//! not matter.

use super::builtins::BuiltinType;
use super::facets::{Facets, WhiteSpace};
use super::schema::{
    AttributeDecl, AttributeGroupDef, AttributeUse, CompiledSchema, ComplexTypeDef, ContentType,
    Derivation, ElementDecl, NamespaceConstraint, Particle, ProcessContents, ResolvedType,
    SimpleTypeDef, SimpleVariety, Term, TypeDef, TypeRef, Wildcard,
};
use super::{SchemaCompiler, SchemaSource};
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::{DefaultUriResolver, Location, UriResolver};
use crate::names::split_qname;
use crate::namespaces::{QName, XSD_NAMESPACE};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashSet;
use std::sync::Arc;

/// Default schema compiler for the supported XSD 1.0 subset
#[derive(Debug, Clone, Default)]
pub struct XsdCompiler {
    limits: Limits,
}

impl XsdCompiler {
    /// Create a compiler with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits (schema nesting depth and document size)
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

impl SchemaCompiler for XsdCompiler {
    fn compile(&self, source: &SchemaSource) -> Result<CompiledSchema> {
        let mut compilation = Compilation {
            loader: Loader::new().with_limits(self.limits),
            limits: self.limits,
            schema: CompiledSchema::default(),
            visited: HashSet::new(),
        };
        let outcome = compilation
            .load(&source.system_id, source.content.clone(), None, 0)
            .and_then(|_| check_references(&compilation.schema));
        if let Err(e) = outcome {
            return Err(match e {
                Error::SchemaCompile(_) => e,
                other => Error::SchemaCompile(
                    ParseError::new(other.to_string()).with_location(source.system_id.clone()),
                ),
            });
        }
        log::debug!(
            "compiled schema {} ({} global components)",
            source.system_id,
            compilation.schema.component_count()
        );
        Ok(compilation.schema)
    }
}

struct Compilation {
    loader: Loader,
    limits: Limits,
    schema: CompiledSchema,
    visited: HashSet<String>,
}

impl Compilation {
    /// Load one schema document and everything it references.
    ///
    /// `adopt_namespace` is the including document's target namespace; a
    /// document without its own target namespace takes it over.
    fn load(
        &mut self,
        system_id: &str,
        content: Option<String>,
        adopt_namespace: Option<Option<String>>,
        depth: usize,
    ) -> Result<()> {
        self.limits.check_schema_depth(depth)?;
        let key = Location::from_system_id(system_id)
            .and_then(|l| l.to_url())
            .map(|u| u.to_string())
            .unwrap_or_else(|_| system_id.to_string());
        if !self.visited.insert(key) {
            log::trace!("schema document {} already loaded", system_id);
            return Ok(());
        }

        let text = match content {
            Some(text) => text,
            None => self.loader.load(&Location::from_system_id(system_id)?)?,
        };
        let options = ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = Document::parse_with_options(&text, options).map_err(|e| {
            Error::SchemaCompile(
                ParseError::new(format!("malformed schema document: {}", e))
                    .with_location(system_id.to_string()),
            )
        })?;
        let root = doc.root_element();
        if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XSD_NAMESPACE)
        {
            return Err(Error::SchemaCompile(
                ParseError::new("root element must be xs:schema")
                    .with_location(system_id.to_string()),
            ));
        }

        let own_namespace = root.attribute("targetNamespace").map(str::to_string);
        let target_namespace = match (&adopt_namespace, own_namespace) {
            (Some(including), Some(own)) if including.as_deref() != Some(own.as_str()) => {
                return Err(Error::SchemaCompile(
                    ParseError::new(format!(
                        "included schema has target namespace '{}', expected '{}'",
                        own,
                        including.as_deref().unwrap_or("")
                    ))
                    .with_location(system_id.to_string()),
                ));
            }
            (_, Some(own)) => Some(own),
            (Some(including), None) => including.clone(),
            (None, None) => None,
        };
        if depth == 0 {
            self.schema.target_namespace = target_namespace.clone();
            self.schema.location = Some(system_id.to_string());
        }

        let ctx = DocContext {
            location: system_id.to_string(),
            target_namespace,
            element_qualified: root.attribute("elementFormDefault") == Some("qualified"),
            attribute_qualified: root.attribute("attributeFormDefault") == Some("qualified"),
        };
        log::trace!(
            "reading schema document {} (target namespace {:?})",
            system_id,
            ctx.target_namespace
        );

        for child in xsd_children(root) {
            match child.tag_name().name() {
                "include" => {
                    let href = ctx.required(child, "schemaLocation")?;
                    let url = DefaultUriResolver.resolve(href, Some(system_id))?;
                    self.load(
                        url.as_str(),
                        None,
                        Some(ctx.target_namespace.clone()),
                        depth + 1,
                    )?;
                }
                "import" => match child.attribute("schemaLocation") {
                    Some(href) => {
                        let url = DefaultUriResolver.resolve(href, Some(system_id))?;
                        self.load(url.as_str(), None, None, depth + 1)?;
                    }
                    None => log::debug!(
                        "import of namespace {:?} without schemaLocation skipped",
                        child.attribute("namespace")
                    ),
                },
                "notation" => {}
                "element" => {
                    let decl = ctx.element(child, true)?;
                    let name = decl.name.clone();
                    if self.schema.elements.insert(name.clone(), Arc::new(decl)).is_some() {
                        return Err(ctx.error(child, format!("duplicate element declaration '{}'", name)));
                    }
                }
                "complexType" => {
                    let name = ctx.global_name(child)?;
                    let def = TypeDef::Complex(ctx.complex_type(child, Some(name.clone()))?);
                    self.insert_type(&ctx, child, name, def)?;
                }
                "simpleType" => {
                    let name = ctx.global_name(child)?;
                    let def = TypeDef::Simple(ctx.simple_type(child, Some(name.clone()))?);
                    self.insert_type(&ctx, child, name, def)?;
                }
                "attribute" => {
                    let decl = ctx.global_attribute(child)?;
                    let name = decl.name.clone();
                    if self.schema.attributes.insert(name.clone(), decl).is_some() {
                        return Err(ctx.error(child, format!("duplicate attribute declaration '{}'", name)));
                    }
                }
                "group" => {
                    let name = ctx.global_name(child)?;
                    let model = xsd_children(child)
                        .next()
                        .ok_or_else(|| ctx.error(child, "model group without content"))?;
                    let particle = Particle::once(ctx.particle(model)?.term);
                    if self.schema.groups.insert(name.clone(), particle).is_some() {
                        return Err(ctx.error(child, format!("duplicate model group '{}'", name)));
                    }
                }
                "attributeGroup" => {
                    let name = ctx.global_name(child)?;
                    let mut group = AttributeGroupDef::default();
                    for item in xsd_children(child) {
                        ctx.attribute_item(
                            item,
                            &mut group.attributes,
                            &mut group.attribute_groups,
                            &mut group.any_attribute,
                        )?;
                    }
                    if self.schema.attribute_groups.insert(name.clone(), group).is_some() {
                        return Err(ctx.error(child, format!("duplicate attribute group '{}'", name)));
                    }
                }
                other => {
                    return Err(ctx.error(child, format!("unsupported schema construct xs:{}", other)));
                }
            }
        }
        Ok(())
    }

    fn insert_type(
        &mut self,
        ctx: &DocContext,
        node: Node<'_, '_>,
        name: QName,
        def: TypeDef,
    ) -> Result<()> {
        if self.schema.types.insert(name.clone(), Arc::new(def)).is_some() {
            return Err(ctx.error(node, format!("duplicate type definition '{}'", name)));
        }
        Ok(())
    }
}

/// Children in the XSD namespace, without annotations
fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|c| {
        c.is_element()
            && c.tag_name().namespace() == Some(XSD_NAMESPACE)
            && c.tag_name().name() != "annotation"
    })
}

/// Settings of the schema document being read
struct DocContext {
    location: String,
    target_namespace: Option<String>,
    element_qualified: bool,
    attribute_qualified: bool,
}

impl DocContext {
    fn error(&self, node: Node<'_, '_>, message: impl Into<String>) -> Error {
        let pos = node.document().text_pos_at(node.range().start);
        let source = node.document().input_text()[node.range()]
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        Error::SchemaCompile(
            ParseError::new(message)
                .with_location(format!("{}:{}:{}", self.location, pos.row, pos.col))
                .with_source(source),
        )
    }

    fn required<'a>(&self, node: Node<'a, '_>, name: &str) -> Result<&'a str> {
        node.attribute(name).ok_or_else(|| {
            self.error(
                node,
                format!("xs:{} requires a '{}' attribute", node.tag_name().name(), name),
            )
        })
    }

    fn global_name(&self, node: Node<'_, '_>) -> Result<QName> {
        let name = self.required(node, "name")?;
        Ok(QName::new(self.target_namespace.as_deref(), name))
    }

    fn resolve_qname(&self, node: Node<'_, '_>, raw: &str) -> Result<QName> {
        let (prefix, local) = split_qname(raw.trim());
        let namespace = match prefix {
            Some(prefix) => Some(node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                self.error(node, format!("unbound prefix '{}' in '{}'", prefix, raw))
            })?),
            None => node.lookup_namespace_uri(None).filter(|ns| !ns.is_empty()),
        };
        Ok(QName::new(namespace, local).with_prefix(prefix))
    }

    fn type_ref(&self, node: Node<'_, '_>, raw: &str) -> Result<TypeRef> {
        let name = self.resolve_qname(node, raw)?;
        if name.namespace.as_deref() == Some(XSD_NAMESPACE) {
            return BuiltinType::from_local_name(&name.local_name)
                .map(TypeRef::Builtin)
                .ok_or_else(|| self.error(node, format!("unknown built-in type '{}'", raw)));
        }
        Ok(TypeRef::Named(name))
    }

    fn inline_type(&self, node: Node<'_, '_>) -> Result<Option<TypeRef>> {
        for child in xsd_children(node) {
            let def = match child.tag_name().name() {
                "complexType" => TypeDef::Complex(self.complex_type(child, None)?),
                "simpleType" => TypeDef::Simple(self.simple_type(child, None)?),
                _ => continue,
            };
            return Ok(Some(TypeRef::Inline(Arc::new(def))));
        }
        Ok(None)
    }

    fn element(&self, node: Node<'_, '_>, global: bool) -> Result<ElementDecl> {
        let local = self.required(node, "name")?;
        let qualified = global
            || match node.attribute("form") {
                Some("qualified") => true,
                Some("unqualified") => false,
                _ => self.element_qualified,
            };
        let namespace = if qualified {
            self.target_namespace.as_deref()
        } else {
            None
        };
        if node.attribute("substitutionGroup").is_some() {
            return Err(self.error(node, "substitution groups are not supported"));
        }

        let type_ref = match node.attribute("type") {
            Some(raw) => self.type_ref(node, raw)?,
            None => self
                .inline_type(node)?
                .unwrap_or(TypeRef::Builtin(BuiltinType::AnyType)),
        };
        if xsd_children(node).any(|c| matches!(c.tag_name().name(), "key" | "keyref" | "unique")) {
            log::debug!("identity constraints on element '{}' are not enforced", local);
        }

        Ok(ElementDecl {
            name: QName::new(namespace, local),
            type_ref,
            nillable: node.attribute("nillable") == Some("true"),
            default: node.attribute("default").map(str::to_string),
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn occurs(&self, node: Node<'_, '_>) -> Result<(u32, Option<u32>)> {
        let parse = |raw: &str| {
            raw.trim()
                .parse::<u32>()
                .map_err(|_| self.error(node, format!("invalid occurrence bound '{}'", raw)))
        };
        let min = node.attribute("minOccurs").map(parse).transpose()?.unwrap_or(1);
        let max = match node.attribute("maxOccurs") {
            Some("unbounded") => None,
            Some(raw) => Some(parse(raw)?),
            None => Some(1),
        };
        if max.map_or(false, |max| max < min) {
            return Err(self.error(node, "maxOccurs is smaller than minOccurs"));
        }
        Ok((min, max))
    }

    fn particle(&self, node: Node<'_, '_>) -> Result<Particle> {
        let (min_occurs, max_occurs) = self.occurs(node)?;
        let term = match node.tag_name().name() {
            "element" => match node.attribute("ref") {
                Some(raw) => Term::ElementRef(self.resolve_qname(node, raw)?),
                None => Term::Element(Arc::new(self.element(node, false)?)),
            },
            "sequence" => Term::Sequence(self.particles(node)?),
            "choice" => Term::Choice(self.particles(node)?),
            "all" => Term::All(self.particles(node)?),
            "any" => Term::Any(self.wildcard(node)),
            "group" => Term::GroupRef(self.resolve_qname(node, self.required(node, "ref")?)?),
            other => {
                return Err(self.error(node, format!("unsupported particle xs:{}", other)));
            }
        };
        Ok(Particle {
            min_occurs,
            max_occurs,
            term,
        })
    }

    fn particles(&self, node: Node<'_, '_>) -> Result<Vec<Particle>> {
        xsd_children(node).map(|child| self.particle(child)).collect()
    }

    fn wildcard(&self, node: Node<'_, '_>) -> Wildcard {
        let tokens: Vec<&str> = node
            .attribute("namespace")
            .unwrap_or("##any")
            .split_whitespace()
            .collect();
        let namespaces = match tokens.as_slice() {
            [] | ["##any"] => NamespaceConstraint::Any,
            ["##other"] => NamespaceConstraint::Other(self.target_namespace.clone()),
            list => NamespaceConstraint::List(
                list.iter()
                    .map(|token| match *token {
                        "##targetNamespace" => self.target_namespace.clone(),
                        "##local" => None,
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        let process_contents = match node.attribute("processContents") {
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            _ => ProcessContents::Strict,
        };
        Wildcard {
            namespaces,
            process_contents,
        }
    }

    fn complex_type(&self, node: Node<'_, '_>, name: Option<QName>) -> Result<ComplexTypeDef> {
        let mut def = ComplexTypeDef {
            name,
            mixed: node.attribute("mixed") == Some("true"),
            ..ComplexTypeDef::default()
        };
        for child in xsd_children(node) {
            match child.tag_name().name() {
                "simpleContent" => self.simple_content(child, &mut def)?,
                "complexContent" => {
                    if let Some(mixed) = child.attribute("mixed") {
                        def.mixed = mixed == "true";
                    }
                    let derivation = xsd_children(child)
                        .next()
                        .ok_or_else(|| self.error(child, "complexContent without derivation"))?;
                    let kind = match derivation.tag_name().name() {
                        "extension" => Derivation::Extension,
                        "restriction" => Derivation::Restriction,
                        other => {
                            return Err(self.error(derivation, format!("unexpected xs:{}", other)))
                        }
                    };
                    let base = self.resolve_qname(derivation, self.required(derivation, "base")?)?;
                    if !base.matches(Some(XSD_NAMESPACE), "anyType") {
                        def.base = Some((kind, base));
                    }
                    self.complex_body(derivation, &mut def)?;
                }
                _ => self.complex_body_item(child, &mut def)?,
            }
        }
        Ok(def)
    }

    fn complex_body(&self, node: Node<'_, '_>, def: &mut ComplexTypeDef) -> Result<()> {
        for child in xsd_children(node) {
            self.complex_body_item(child, def)?;
        }
        Ok(())
    }

    fn complex_body_item(&self, node: Node<'_, '_>, def: &mut ComplexTypeDef) -> Result<()> {
        match node.tag_name().name() {
            "sequence" | "choice" | "all" | "group" => {
                def.content = ContentType::Elements(self.particle(node)?);
                Ok(())
            }
            _ => self.attribute_item(
                node,
                &mut def.attributes,
                &mut def.attribute_groups,
                &mut def.any_attribute,
            ),
        }
    }

    fn simple_content(&self, node: Node<'_, '_>, def: &mut ComplexTypeDef) -> Result<()> {
        let derivation = xsd_children(node)
            .next()
            .ok_or_else(|| self.error(node, "simpleContent without derivation"))?;
        let base = self.type_ref(derivation, self.required(derivation, "base")?)?;
        let kind = match derivation.tag_name().name() {
            "extension" => Derivation::Extension,
            "restriction" => Derivation::Restriction,
            other => return Err(self.error(derivation, format!("unexpected xs:{}", other))),
        };
        if let TypeRef::Named(name) = &base {
            def.base = Some((kind, name.clone()));
        }

        def.content = match kind {
            Derivation::Extension => ContentType::Simple(base),
            Derivation::Restriction => {
                let base = match self.inline_type(derivation)? {
                    Some(inline) => inline,
                    None => base,
                };
                ContentType::Simple(TypeRef::Inline(Arc::new(TypeDef::Simple(SimpleTypeDef {
                    name: None,
                    variety: SimpleVariety::Restriction {
                        base,
                        facets: self.facets(derivation)?,
                    },
                }))))
            }
        };

        for child in xsd_children(derivation) {
            if matches!(
                child.tag_name().name(),
                "attribute" | "attributeGroup" | "anyAttribute"
            ) {
                self.attribute_item(
                    child,
                    &mut def.attributes,
                    &mut def.attribute_groups,
                    &mut def.any_attribute,
                )?;
            }
        }
        Ok(())
    }

    fn attribute_item(
        &self,
        node: Node<'_, '_>,
        attributes: &mut Vec<AttributeUse>,
        groups: &mut Vec<QName>,
        any_attribute: &mut Option<Wildcard>,
    ) -> Result<()> {
        match node.tag_name().name() {
            "attribute" => attributes.push(self.attribute_use(node)?),
            "attributeGroup" => {
                groups.push(self.resolve_qname(node, self.required(node, "ref")?)?);
            }
            "anyAttribute" => *any_attribute = Some(self.wildcard(node)),
            other => {
                return Err(self.error(node, format!("unsupported schema construct xs:{}", other)));
            }
        }
        Ok(())
    }

    fn attribute_use(&self, node: Node<'_, '_>) -> Result<AttributeUse> {
        let usage = node.attribute("use").unwrap_or("optional");
        let fixed = node.attribute("fixed").map(str::to_string);
        if let Some(raw) = node.attribute("ref") {
            return Ok(AttributeUse {
                name: self.resolve_qname(node, raw)?,
                type_ref: None,
                required: usage == "required",
                prohibited: usage == "prohibited",
                fixed,
            });
        }

        let local = self.required(node, "name")?;
        let qualified = match node.attribute("form") {
            Some("qualified") => true,
            Some("unqualified") => false,
            _ => self.attribute_qualified,
        };
        let namespace = if qualified {
            self.target_namespace.as_deref()
        } else {
            None
        };
        Ok(AttributeUse {
            name: QName::new(namespace, local),
            type_ref: Some(self.attribute_type(node)?),
            required: usage == "required",
            prohibited: usage == "prohibited",
            fixed,
        })
    }

    fn global_attribute(&self, node: Node<'_, '_>) -> Result<AttributeDecl> {
        Ok(AttributeDecl {
            name: self.global_name(node)?,
            type_ref: self.attribute_type(node)?,
            fixed: node.attribute("fixed").map(str::to_string),
        })
    }

    fn attribute_type(&self, node: Node<'_, '_>) -> Result<TypeRef> {
        match node.attribute("type") {
            Some(raw) => self.type_ref(node, raw),
            None => Ok(self
                .inline_type(node)?
                .unwrap_or(TypeRef::Builtin(BuiltinType::AnySimpleType))),
        }
    }

    fn simple_type(&self, node: Node<'_, '_>, name: Option<QName>) -> Result<SimpleTypeDef> {
        let child = xsd_children(node)
            .next()
            .ok_or_else(|| self.error(node, "simpleType needs restriction, list or union"))?;
        let variety = match child.tag_name().name() {
            "restriction" => {
                let base = match child.attribute("base") {
                    Some(raw) => self.type_ref(child, raw)?,
                    None => self
                        .inline_type(child)?
                        .ok_or_else(|| self.error(child, "restriction without a base type"))?,
                };
                SimpleVariety::Restriction {
                    base,
                    facets: self.facets(child)?,
                }
            }
            "list" => {
                let item = match child.attribute("itemType") {
                    Some(raw) => self.type_ref(child, raw)?,
                    None => self
                        .inline_type(child)?
                        .ok_or_else(|| self.error(child, "list without an item type"))?,
                };
                SimpleVariety::List { item }
            }
            "union" => {
                let mut members = Vec::new();
                for raw in child.attribute("memberTypes").unwrap_or("").split_whitespace() {
                    members.push(self.type_ref(child, raw)?);
                }
                for inline in xsd_children(child) {
                    members.push(TypeRef::Inline(Arc::new(TypeDef::Simple(
                        self.simple_type(inline, None)?,
                    ))));
                }
                if members.is_empty() {
                    return Err(self.error(child, "union without member types"));
                }
                SimpleVariety::Union { members }
            }
            other => return Err(self.error(child, format!("unexpected xs:{}", other))),
        };
        Ok(SimpleTypeDef { name, variety })
    }

    fn facets(&self, node: Node<'_, '_>) -> Result<Facets> {
        let mut facets = Facets::default();
        let mut patterns = Vec::new();
        for child in xsd_children(node) {
            let facet = child.tag_name().name();
            if matches!(
                facet,
                "simpleType" | "attribute" | "attributeGroup" | "anyAttribute"
            ) {
                continue;
            }
            let value = self.required(child, "value")?;
            let size = |value: &str| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| self.error(child, format!("invalid {} value '{}'", facet, value)))
            };
            match facet {
                "enumeration" => facets.enumeration.push(value.to_string()),
                "pattern" => patterns.push(value.to_string()),
                "length" => facets.length = Some(size(value)?),
                "minLength" => facets.min_length = Some(size(value)?),
                "maxLength" => facets.max_length = Some(size(value)?),
                "totalDigits" => facets.total_digits = Some(size(value)? as u32),
                "fractionDigits" => facets.fraction_digits = Some(size(value)? as u32),
                "minInclusive" => facets.min_inclusive = Some(value.trim().to_string()),
                "maxInclusive" => facets.max_inclusive = Some(value.trim().to_string()),
                "minExclusive" => facets.min_exclusive = Some(value.trim().to_string()),
                "maxExclusive" => facets.max_exclusive = Some(value.trim().to_string()),
                "whiteSpace" => facets.white_space = Some(WhiteSpace::parse(value)?),
                other => {
                    return Err(self.error(child, format!("unsupported facet xs:{}", other)));
                }
            }
        }
        facets.set_patterns(&patterns)?;
        Ok(facets)
    }
}

// =============================================================================
// Reference checks
// =============================================================================

fn reference_error(message: String) -> Error {
    Error::SchemaCompile(ParseError::new(message))
}

fn check_references(schema: &CompiledSchema) -> Result<()> {
    for decl in schema.elements.values() {
        check_type_ref(schema, &decl.type_ref)?;
    }
    for def in schema.types.values() {
        check_type_def(schema, def)?;
    }
    for decl in schema.attributes.values() {
        check_simple_ref(schema, &decl.type_ref)?;
    }
    for particle in schema.groups.values() {
        check_particle(schema, particle, true)?;
    }
    for group in schema.attribute_groups.values() {
        check_attributes(schema, &group.attributes, &group.attribute_groups)?;
    }
    check_group_cycles(schema)
}

fn check_type_ref(schema: &CompiledSchema, type_ref: &TypeRef) -> Result<()> {
    match type_ref {
        TypeRef::Builtin(_) => Ok(()),
        TypeRef::Named(name) => {
            if schema.types.contains_key(name) {
                Ok(())
            } else {
                Err(reference_error(format!("unknown type '{}'", name)))
            }
        }
        TypeRef::Inline(def) => check_type_def(schema, def),
    }
}

/// Type used where a simple type is required
fn check_simple_ref(schema: &CompiledSchema, type_ref: &TypeRef) -> Result<()> {
    check_type_ref(schema, type_ref)?;
    let simple = match schema.resolve(type_ref) {
        Some(ResolvedType::Builtin(b)) => b != BuiltinType::AnyType,
        Some(ResolvedType::Defined(def)) => match def.as_ref() {
            TypeDef::Simple(_) => true,
            TypeDef::Complex(ct) => matches!(ct.content, ContentType::Simple(_)),
        },
        None => false,
    };
    if simple {
        Ok(())
    } else {
        Err(reference_error(format!(
            "type '{}' is not a simple type",
            describe(type_ref)
        )))
    }
}

fn describe(type_ref: &TypeRef) -> String {
    match type_ref {
        TypeRef::Builtin(b) => format!("xs:{}", b.name()),
        TypeRef::Named(name) => name.to_string(),
        TypeRef::Inline(_) => "(anonymous)".to_string(),
    }
}

fn check_type_def(schema: &CompiledSchema, def: &TypeDef) -> Result<()> {
    match def {
        TypeDef::Simple(st) => match &st.variety {
            SimpleVariety::Restriction { base, facets } => {
                check_simple_ref(schema, base)?;
                if facets.has_bounds() {
                    let primitive = schema.primitive(base).ok_or_else(|| {
                        reference_error("bound facets need an atomic base type".to_string())
                    })?;
                    let bounds = [
                        &facets.min_inclusive,
                        &facets.max_inclusive,
                        &facets.min_exclusive,
                        &facets.max_exclusive,
                    ];
                    for bound in bounds.into_iter().flatten() {
                        primitive.validate(bound).map_err(|_| {
                            reference_error(format!(
                                "bound '{}' is not a valid xs:{}",
                                bound,
                                primitive.name()
                            ))
                        })?;
                    }
                }
                Ok(())
            }
            SimpleVariety::List { item } => check_simple_ref(schema, item),
            SimpleVariety::Union { members } => members
                .iter()
                .try_for_each(|member| check_simple_ref(schema, member)),
        },
        TypeDef::Complex(ct) => {
            match &ct.content {
                ContentType::Empty => {}
                ContentType::Simple(type_ref) => check_simple_ref(schema, type_ref)?,
                ContentType::Elements(particle) => check_particle(schema, particle, true)?,
            }
            if let Some((_, base)) = &ct.base {
                let base_def = schema
                    .types
                    .get(base)
                    .ok_or_else(|| reference_error(format!("unknown base type '{}'", base)))?;
                let simple_content = matches!(ct.content, ContentType::Simple(_));
                if !simple_content && !matches!(base_def.as_ref(), TypeDef::Complex(_)) {
                    return Err(reference_error(format!(
                        "complex content cannot derive from simple type '{}'",
                        base
                    )));
                }
            }
            check_attributes(schema, &ct.attributes, &ct.attribute_groups)
        }
    }
}

fn check_attributes(
    schema: &CompiledSchema,
    attributes: &[AttributeUse],
    groups: &[QName],
) -> Result<()> {
    for attribute in attributes {
        match &attribute.type_ref {
            Some(type_ref) => check_simple_ref(schema, type_ref)?,
            None => {
                if !schema.attributes.contains_key(&attribute.name) {
                    return Err(reference_error(format!(
                        "unknown attribute '{}'",
                        attribute.name
                    )));
                }
            }
        }
    }
    for group in groups {
        if !schema.attribute_groups.contains_key(group) {
            return Err(reference_error(format!("unknown attribute group '{}'", group)));
        }
    }
    Ok(())
}

fn check_particle(schema: &CompiledSchema, particle: &Particle, top: bool) -> Result<()> {
    match &particle.term {
        Term::Element(decl) => check_type_ref(schema, &decl.type_ref),
        Term::ElementRef(name) => {
            if schema.elements.contains_key(name) {
                Ok(())
            } else {
                Err(reference_error(format!("unknown element '{}'", name)))
            }
        }
        Term::Sequence(items) | Term::Choice(items) => items
            .iter()
            .try_for_each(|item| check_particle(schema, item, false)),
        Term::All(items) => {
            if !top || particle.max_occurs != Some(1) {
                return Err(reference_error(
                    "xs:all must be the whole content model and occur at most once".to_string(),
                ));
            }
            for item in items {
                let is_element = matches!(item.term, Term::Element(_) | Term::ElementRef(_));
                if !is_element || item.max_occurs != Some(1) {
                    return Err(reference_error(
                        "xs:all may only contain elements occurring at most once".to_string(),
                    ));
                }
                check_particle(schema, item, false)?;
            }
            Ok(())
        }
        Term::Any(_) => Ok(()),
        Term::GroupRef(name) => match schema.groups.get(name) {
            Some(group) => {
                if matches!(group.term, Term::All(_)) && !top {
                    return Err(reference_error(format!(
                        "group '{}' contains xs:all and must be the whole content model",
                        name
                    )));
                }
                Ok(())
            }
            None => Err(reference_error(format!("unknown model group '{}'", name))),
        },
    }
}

fn check_group_cycles(schema: &CompiledSchema) -> Result<()> {
    fn referenced(particle: &Particle, out: &mut Vec<QName>) {
        match &particle.term {
            Term::GroupRef(name) => out.push(name.clone()),
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => {
                items.iter().for_each(|item| referenced(item, out))
            }
            _ => {}
        }
    }

    fn visit(schema: &CompiledSchema, name: &QName, stack: &mut Vec<QName>) -> Result<()> {
        if stack.contains(name) {
            return Err(reference_error(format!("model group '{}' refers to itself", name)));
        }
        let Some(group) = schema.groups.get(name) else {
            return Ok(());
        };
        stack.push(name.clone());
        let mut refs = Vec::new();
        referenced(group, &mut refs);
        for next in &refs {
            visit(schema, next, stack)?;
        }
        stack.pop();
        Ok(())
    }

    for name in schema.groups.keys() {
        visit(schema, name, &mut Vec::new())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn compile(xsd: &str) -> Result<CompiledSchema> {
        XsdCompiler::new().compile(&SchemaSource::from_string("memory:test.xsd", xsd))
    }

    const PURCHASE: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:po="urn:po" targetNamespace="urn:po" elementFormDefault="qualified">
  <xs:element name="order" type="po:Order"/>
  <xs:complexType name="Order">
    <xs:sequence>
      <xs:element name="item" type="po:Item" maxOccurs="unbounded"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:ID" use="required"/>
  </xs:complexType>
  <xs:complexType name="Item">
    <xs:simpleContent>
      <xs:extension base="po:Sku">
        <xs:attribute name="qty" type="xs:positiveInteger"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:simpleType name="Sku">
    <xs:restriction base="xs:string">
      <xs:pattern value="\d{3}-[A-Z]{2}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

    #[test]
    fn test_compile_forward_references() {
        let schema = compile(PURCHASE).unwrap();
        assert_eq!(schema.target_namespace.as_deref(), Some("urn:po"));

        let order = schema.element(&QName::namespaced("urn:po", "order")).unwrap();
        assert!(matches!(&order.type_ref, TypeRef::Named(n) if n.local_name == "Order"));

        let Some(def) = schema.type_definition(&QName::namespaced("urn:po", "Order")) else {
            panic!("Order type missing");
        };
        let TypeDef::Complex(ct) = def.as_ref() else {
            panic!("Order is not complex");
        };
        assert_eq!(ct.attributes.len(), 1);
        assert!(ct.attributes[0].required);
        let ContentType::Elements(particle) = &ct.content else {
            panic!("Order has no element content");
        };
        let Term::Sequence(items) = &particle.term else {
            panic!("expected a sequence");
        };
        assert_eq!(items[0].max_occurs, None);
        let Term::Element(item) = &items[0].term else {
            panic!("expected a local element");
        };
        // elementFormDefault="qualified" puts local elements in the target namespace
        assert_eq!(item.name, QName::namespaced("urn:po", "item"));
    }

    #[test]
    fn test_unknown_type_reference() {
        let err = compile(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="a" type="Missing"/>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(matches!(&err, Error::SchemaCompile(e) if e.message.contains("unknown type")));
    }

    #[test]
    fn test_rejects_non_schema_and_malformed() {
        assert!(matches!(compile("<root/>"), Err(Error::SchemaCompile(_))));
        assert!(matches!(
            compile("<xs:schema xmlns:xs='http://www.w3.org/2001/XMLSchema'>"),
            Err(Error::SchemaCompile(_))
        ));
    }

    #[test]
    fn test_unsupported_construct() {
        let err = compile(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:redefine schemaLocation="other.xsd"/>
               </xs:schema>"#,
        )
        .unwrap_err();
        let Error::SchemaCompile(e) = err else {
            panic!("expected a compile error");
        };
        assert!(e.message.contains("xs:redefine"));
        assert!(e.location.unwrap().starts_with("memory:test.xsd:2:"));
    }

    #[test]
    fn test_invalid_bound_rejected() {
        let err = compile(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:simpleType name="Small">
                   <xs:restriction base="xs:int"><xs:maxInclusive value="ten"/></xs:restriction>
                 </xs:simpleType>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(matches!(&err, Error::SchemaCompile(e) if e.message.contains("ten")));
    }

    #[test]
    fn test_group_cycle_rejected() {
        let err = compile(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:group name="a"><xs:sequence><xs:group ref="b"/></xs:sequence></xs:group>
                 <xs:group name="b"><xs:sequence><xs:group ref="a"/></xs:sequence></xs:group>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(matches!(&err, Error::SchemaCompile(e) if e.message.contains("refers to itself")));
    }

    #[test]
    fn test_include_and_import_from_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                          xmlns:m="urn:main" xmlns:c="urn:common" targetNamespace="urn:main">
                 <xs:include schemaLocation="parts/types.xsd"/>
                 <xs:import namespace="urn:common" schemaLocation="common.xsd"/>
                 <xs:element name="doc" type="m:DocType"/>
                 <xs:element name="note" type="c:Note"/>
               </xs:schema>"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::write(
            dir.path().join("parts/types.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:m="urn:main">
                 <xs:include schemaLocation="../parts/types.xsd"/>
                 <xs:complexType name="DocType"/>
               </xs:schema>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("common.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:common">
                 <xs:simpleType name="Note">
                   <xs:restriction base="xs:string"><xs:maxLength value="5"/></xs:restriction>
                 </xs:simpleType>
               </xs:schema>"#,
        )
        .unwrap();

        let path = dir.path().join("main.xsd");
        let schema = XsdCompiler::new()
            .compile(&SchemaSource::from_system_id(path.to_string_lossy()))
            .unwrap();

        // the chameleon include adopts urn:main
        assert!(schema
            .type_definition(&QName::namespaced("urn:main", "DocType"))
            .is_some());
        assert!(schema
            .type_definition(&QName::namespaced("urn:common", "Note"))
            .is_some());
        assert_eq!(schema.elements.len(), 2);
    }

    #[test]
    fn test_schema_depth_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            fs::write(
                dir.path().join(format!("s{}.xsd", i)),
                format!(
                    r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                         <xs:include schemaLocation="s{}.xsd"/>
                       </xs:schema>"#,
                    i + 1
                ),
            )
            .unwrap();
        }
        fs::write(
            dir.path().join("s4.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#,
        )
        .unwrap();

        let limits = Limits {
            max_schema_depth: 2,
            ..Limits::default()
        };
        let path = dir.path().join("s0.xsd");
        let err = XsdCompiler::new()
            .with_limits(limits)
            .compile(&SchemaSource::from_system_id(path.to_string_lossy()))
            .unwrap_err();
        assert!(matches!(&err, Error::SchemaCompile(e) if e.message.contains("limit exceeded")));
    }
}
