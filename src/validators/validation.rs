//! Streaming validation against a compiled schema
//!
//! The `Validator` receives the reader's element events and keeps one frame
//! per open element. Element-only content is matched by a small NFA built
//! from the type's particle tree (cached per type definition), `xs:all` by a
//! dedicated matcher. Errors never stop the run: an element that cannot be
//! assessed is skipped together with its subtree.

use super::builtins::{BuiltinType, XsdValue};
use super::facets::Facets;
use super::schema::{
    AttributeUse, CompiledSchema, ComplexTypeDef, ContentType, Derivation, ElementDecl,
    NamespaceConstraint, Particle, ProcessContents, ResolvedType, SimpleVariety, Term, TypeDef,
    TypeRef, Wildcard,
};
use crate::error::{Error, ValidationError};
use crate::namespaces::{
    NamespaceStack, QName, XML_NAMESPACE, XMLNS_NAMESPACE, XSD_NAMESPACE, XSI_NAMESPACE,
};
use crate::sax::Attributes;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Occurrence bounds above this are matched as unbounded
const MAX_UNROLLED: u32 = 100;

/// Nesting bound when following type and group references
const MAX_REFERENCE_DEPTH: usize = 64;

type ValueResult<T> = std::result::Result<T, String>;

// =============================================================================
// Content model automaton
// =============================================================================

#[derive(Debug, Clone)]
enum Symbol {
    Element(Arc<ElementDecl>),
    Any(Wildcard),
}

impl Symbol {
    fn matches(&self, name: &QName) -> bool {
        match self {
            Symbol::Element(decl) => decl.name == *name,
            Symbol::Any(wildcard) => wildcard.namespaces.allows(name.namespace.as_deref()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Symbol::Element(decl) => decl.name.to_string(),
            Symbol::Any(_) => "any element".to_string(),
        }
    }
}

/// Thompson NFA over element names
#[derive(Debug, Default)]
struct Automaton {
    symbols: Vec<Symbol>,
    epsilon: Vec<Vec<usize>>,
    edges: Vec<Vec<(usize, usize)>>,
    start: usize,
    accept: usize,
}

impl Automaton {
    fn build(schema: &CompiledSchema, particle: &Particle) -> Self {
        let mut automaton = Automaton::default();
        let (start, accept) = automaton.particle(schema, particle, 0);
        automaton.start = start;
        automaton.accept = accept;
        automaton
    }

    fn state(&mut self) -> usize {
        self.epsilon.push(Vec::new());
        self.edges.push(Vec::new());
        self.epsilon.len() - 1
    }

    fn link(&mut self, from: usize, to: usize) {
        self.epsilon[from].push(to);
    }

    fn symbol(&mut self, symbol: Symbol) -> (usize, usize) {
        let (start, end) = (self.state(), self.state());
        self.symbols.push(symbol);
        self.edges[start].push((self.symbols.len() - 1, end));
        (start, end)
    }

    fn particle(&mut self, schema: &CompiledSchema, particle: &Particle, depth: usize) -> (usize, usize) {
        let start = self.state();
        let mut current = start;
        for _ in 0..particle.min_occurs.min(MAX_UNROLLED) {
            let (s, e) = self.term(schema, &particle.term, depth);
            self.link(current, s);
            current = e;
        }
        let end = self.state();
        match particle.max_occurs {
            Some(max) if max <= MAX_UNROLLED => {
                for _ in particle.min_occurs..max {
                    let (s, e) = self.term(schema, &particle.term, depth);
                    self.link(current, end);
                    self.link(current, s);
                    current = e;
                }
            }
            _ => {
                let (s, e) = self.term(schema, &particle.term, depth);
                self.link(current, s);
                self.link(e, current);
            }
        }
        self.link(current, end);
        (start, end)
    }

    fn term(&mut self, schema: &CompiledSchema, term: &Term, depth: usize) -> (usize, usize) {
        match term {
            Term::Element(decl) => self.symbol(Symbol::Element(decl.clone())),
            Term::ElementRef(name) => match schema.element(name) {
                Some(decl) => self.symbol(Symbol::Element(decl.clone())),
                None => (self.state(), self.state()),
            },
            Term::Any(wildcard) => self.symbol(Symbol::Any(wildcard.clone())),
            // `xs:all` below the top level is matched in declaration order
            Term::Sequence(items) | Term::All(items) => {
                let start = self.state();
                let mut current = start;
                for item in items {
                    let (s, e) = self.particle(schema, item, depth);
                    self.link(current, s);
                    current = e;
                }
                (start, current)
            }
            Term::Choice(items) => {
                let (start, end) = (self.state(), self.state());
                for item in items {
                    let (s, e) = self.particle(schema, item, depth);
                    self.link(start, s);
                    self.link(e, end);
                }
                (start, end)
            }
            Term::GroupRef(name) => match schema.groups.get(name) {
                Some(group) if depth < MAX_REFERENCE_DEPTH => {
                    self.term(schema, &group.term, depth + 1)
                }
                _ => (self.state(), self.state()),
            },
        }
    }

    fn closure(&self, states: Vec<usize>) -> Vec<usize> {
        let mut seen = vec![false; self.epsilon.len()];
        let mut stack = states;
        let mut out = Vec::new();
        while let Some(state) = stack.pop() {
            if std::mem::replace(&mut seen[state], true) {
                continue;
            }
            out.push(state);
            stack.extend(self.epsilon[state].iter().copied());
        }
        out.sort_unstable();
        out
    }

    /// Advance on `name`; the preferred match is a declaration over a wildcard
    fn step(&self, states: &[usize], name: &QName) -> (Vec<usize>, Option<Symbol>) {
        let mut next = Vec::new();
        let mut matched: Option<&Symbol> = None;
        for &state in states {
            for &(symbol, target) in &self.edges[state] {
                let candidate = &self.symbols[symbol];
                if candidate.matches(name) {
                    next.push(target);
                    if matched.map_or(true, |m| matches!(m, Symbol::Any(_))) {
                        matched = Some(candidate);
                    }
                }
            }
        }
        (self.closure(next), matched.cloned())
    }

    fn expected(&self, states: &[usize]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for &state in states {
            for &(symbol, _) in &self.edges[state] {
                let described = self.symbols[symbol].describe();
                if !out.contains(&described) {
                    out.push(described);
                }
            }
        }
        out
    }
}

/// Matcher for a top-level `xs:all`
#[derive(Debug)]
struct AllMatcher {
    items: Vec<(Arc<ElementDecl>, bool)>,
    seen: Vec<bool>,
    optional: bool,
}

#[derive(Debug)]
enum Matcher {
    Nfa {
        automaton: Arc<Automaton>,
        states: Vec<usize>,
    },
    All(AllMatcher),
    /// An earlier error made the rest of the content unassessable
    Failed,
}

enum Step {
    Matched(Symbol),
    Rejected(String),
}

impl Matcher {
    fn step(&mut self, name: &QName) -> Step {
        let outcome = match self {
            Matcher::Nfa { automaton, states } => {
                let (next, matched) = automaton.step(states, name);
                match matched {
                    Some(symbol) => {
                        *states = next;
                        Step::Matched(symbol)
                    }
                    None => {
                        let expected = automaton.expected(states);
                        Step::Rejected(if expected.is_empty() {
                            format!("element '{}' is not expected here; no more elements are allowed", name)
                        } else {
                            format!(
                                "element '{}' is not expected here; expected one of: {}",
                                name,
                                expected.join(", ")
                            )
                        })
                    }
                }
            }
            Matcher::All(all) => match all.items.iter().position(|(decl, _)| decl.name == *name) {
                Some(index) if all.seen[index] => {
                    Step::Rejected(format!("element '{}' may appear only once here", name))
                }
                Some(index) => {
                    all.seen[index] = true;
                    Step::Matched(Symbol::Element(all.items[index].0.clone()))
                }
                None => Step::Rejected(format!("element '{}' is not expected here", name)),
            },
            Matcher::Failed => return Step::Matched(Symbol::Any(skip_wildcard())),
        };
        if matches!(outcome, Step::Rejected(_)) {
            *self = Matcher::Failed;
        }
        outcome
    }

    /// Message describing what is still missing, if the content is incomplete
    fn finish(&self) -> Option<String> {
        match self {
            Matcher::Nfa { automaton, states } => {
                if states.contains(&automaton.accept) {
                    None
                } else {
                    Some(format!(
                        "content is incomplete; expected one of: {}",
                        automaton.expected(states).join(", ")
                    ))
                }
            }
            Matcher::All(all) => {
                let any_seen = all.seen.iter().any(|s| *s);
                if all.optional && !any_seen {
                    return None;
                }
                let missing: Vec<String> = all
                    .items
                    .iter()
                    .zip(&all.seen)
                    .filter(|((_, required), seen)| *required && !**seen)
                    .map(|((decl, _), _)| decl.name.to_string())
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some(format!("content is incomplete; missing: {}", missing.join(", ")))
                }
            }
            Matcher::Failed => None,
        }
    }
}

fn skip_wildcard() -> Wildcard {
    Wildcard {
        namespaces: NamespaceConstraint::Any,
        process_contents: ProcessContents::Skip,
    }
}

// =============================================================================
// Frames
// =============================================================================

#[derive(Debug)]
enum Content {
    /// anyType: any attributes, any text, lax children
    Any,
    Empty,
    Simple(TypeRef),
    Elements { matcher: Matcher, mixed: bool },
}

#[derive(Debug)]
enum FrameKind {
    Skip,
    Lax,
    Typed {
        decl: Arc<ElementDecl>,
        nil: bool,
        content: Content,
    },
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    has_text: bool,
    has_children: bool,
    text: String,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            has_text: false,
            has_children: false,
            text: String::new(),
        }
    }
}

/// What a start tag resolved to
enum Assessment {
    Declared(Arc<ElementDecl>),
    Lax,
    Skip,
}

/// Effective content of a complex type after following its derivation chain
enum Effective {
    Empty,
    Simple(TypeRef),
    Elements(Vec<Particle>),
}

/// Validates one document's event stream against a compiled schema
#[derive(Debug)]
pub struct Validator {
    schema: Arc<CompiledSchema>,
    frames: Vec<Frame>,
    path: Vec<String>,
    automata: HashMap<usize, Arc<Automaton>>,
    ids: HashSet<String>,
    idrefs: Vec<(String, String, usize)>,
}

impl Validator {
    /// Create a validator for one document
    pub fn new(schema: Arc<CompiledSchema>) -> Self {
        Self {
            schema,
            frames: Vec::new(),
            path: Vec::new(),
            automata: HashMap::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
        }
    }

    /// Schema this validator checks against
    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ValidationError {
        ValidationError::new(message)
            .with_path(format!("/{}", self.path.join("/")))
            .with_line(line)
    }

    /// Check a start tag. `namespaces` holds the bindings in scope for the
    /// element and resolves QName values such as `xsi:type`.
    pub fn start_element(
        &mut self,
        name: &QName,
        attributes: &Attributes,
        namespaces: &NamespaceStack,
        line: usize,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.path.push(name.qualified());

        let assessment = match self.frames.last_mut() {
            None => match self.schema.element(name) {
                Some(decl) => Assessment::Declared(decl.clone()),
                None => {
                    errors.push(self.error(
                        line,
                        format!("cannot find the declaration of element '{}'", name),
                    ));
                    Assessment::Skip
                }
            },
            Some(parent) => {
                parent.has_children = true;
                match Self::assess_child(&self.schema, parent, name) {
                    Ok(assessment) => assessment,
                    Err(message) => {
                        errors.push(self.error(line, message));
                        Assessment::Skip
                    }
                }
            }
        };

        let kind = match assessment {
            Assessment::Skip => FrameKind::Skip,
            Assessment::Lax => FrameKind::Lax,
            Assessment::Declared(decl) => {
                let type_ref = match attributes.value_ns(Some(XSI_NAMESPACE), "type") {
                    Some(raw) => self.instance_type(&decl, raw.trim(), namespaces, line, &mut errors),
                    None => decl.type_ref.clone(),
                };
                self.typed_frame(decl, type_ref, attributes, line, &mut errors)
            }
        };
        self.frames.push(Frame::new(kind));
        errors
    }

    fn assess_child(
        schema: &CompiledSchema,
        parent: &mut Frame,
        name: &QName,
    ) -> std::result::Result<Assessment, String> {
        let lax = |name: &QName| match schema.element(name) {
            Some(decl) => Assessment::Declared(decl.clone()),
            None => Assessment::Lax,
        };
        match &mut parent.kind {
            FrameKind::Skip => Ok(Assessment::Skip),
            FrameKind::Lax => Ok(lax(name)),
            FrameKind::Typed { nil: true, .. } => {
                Err(format!("element '{}' is not allowed in a nil element", name))
            }
            FrameKind::Typed { content, .. } => match content {
                Content::Any => Ok(lax(name)),
                Content::Empty => Err(format!(
                    "element '{}' is not allowed; the parent's content must be empty",
                    name
                )),
                Content::Simple(_) => Err(format!(
                    "element '{}' is not allowed; the parent has simple content",
                    name
                )),
                Content::Elements { matcher, .. } => match matcher.step(name) {
                    Step::Rejected(message) => Err(message),
                    Step::Matched(Symbol::Element(decl)) => Ok(Assessment::Declared(decl)),
                    Step::Matched(Symbol::Any(wildcard)) => match wildcard.process_contents {
                        ProcessContents::Skip => Ok(Assessment::Skip),
                        ProcessContents::Lax => Ok(lax(name)),
                        ProcessContents::Strict => match schema.element(name) {
                            Some(decl) => Ok(Assessment::Declared(decl.clone())),
                            None => Err(format!(
                                "cannot find the declaration of element '{}' matched by a strict wildcard",
                                name
                            )),
                        },
                    },
                },
            },
        }
    }

    /// Type named by `xsi:type`, or the declared type when it cannot be used
    fn instance_type(
        &self,
        decl: &ElementDecl,
        raw: &str,
        namespaces: &NamespaceStack,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) -> TypeRef {
        let name = match namespaces.resolve_element_name(raw) {
            Ok(name) if crate::names::is_valid_qname(raw) => name,
            _ => {
                errors.push(self.error(line, format!("xsi:type value '{}' is not a resolvable QName", raw)));
                return decl.type_ref.clone();
            }
        };
        let candidate = if name.namespace.as_deref() == Some(XSD_NAMESPACE) {
            BuiltinType::from_local_name(&name.local_name).map(TypeRef::Builtin)
        } else if self.schema.type_definition(&name).is_some() {
            Some(TypeRef::Named(name.clone()))
        } else {
            None
        };
        let Some(candidate) = candidate else {
            errors.push(self.error(
                line,
                format!("cannot find the type definition '{}' named by xsi:type", name),
            ));
            return decl.type_ref.clone();
        };
        if !self.schema.derives_from(&candidate, &decl.type_ref) {
            errors.push(self.error(
                line,
                format!(
                    "type '{}' named by xsi:type is not derived from the type of element '{}'",
                    name, decl.name
                ),
            ));
            return decl.type_ref.clone();
        }
        log::trace!("element '{}' validated as xsi:type '{}'", decl.name, name);
        candidate
    }

    fn typed_frame(
        &mut self,
        decl: Arc<ElementDecl>,
        type_ref: TypeRef,
        attributes: &Attributes,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) -> FrameKind {
        let nil = match attributes.value_ns(Some(XSI_NAMESPACE), "nil") {
            Some(value) if matches!(value.trim(), "true" | "1") => {
                if decl.nillable {
                    true
                } else {
                    errors.push(self.error(line, format!("element '{}' is not nillable", decl.name)));
                    false
                }
            }
            _ => false,
        };

        let content = match self.schema.resolve(&type_ref) {
            None => {
                errors.push(self.error(line, format!("type of element '{}' is not defined", decl.name)));
                return FrameKind::Skip;
            }
            Some(ResolvedType::Builtin(BuiltinType::AnyType)) => Content::Any,
            Some(ResolvedType::Builtin(_)) => {
                self.check_no_attributes(attributes, line, errors);
                Content::Simple(type_ref.clone())
            }
            Some(ResolvedType::Defined(def)) => match def.as_ref() {
                TypeDef::Simple(_) => {
                    self.check_no_attributes(attributes, line, errors);
                    Content::Simple(type_ref.clone())
                }
                TypeDef::Complex(ct) => {
                    let chain = self.schema.complex_chain(&def);
                    self.check_attributes(&chain, attributes, line, errors);
                    match effective_content(&chain) {
                        Effective::Empty if ct.mixed => Content::Elements {
                            matcher: self.matcher(&def, Vec::new()),
                            mixed: true,
                        },
                        Effective::Empty => Content::Empty,
                        Effective::Simple(type_ref) => Content::Simple(type_ref),
                        Effective::Elements(parts) => Content::Elements {
                            matcher: self.matcher(&def, parts),
                            mixed: ct.mixed,
                        },
                    }
                }
            },
        };
        FrameKind::Typed { decl, nil, content }
    }

    fn matcher(&mut self, def: &Arc<TypeDef>, parts: Vec<Particle>) -> Matcher {
        if let [Particle {
            min_occurs,
            term: Term::All(items),
            ..
        }] = parts.as_slice()
        {
            let items: Vec<(Arc<ElementDecl>, bool)> = items
                .iter()
                .filter_map(|item| {
                    let decl = match &item.term {
                        Term::Element(decl) => decl.clone(),
                        Term::ElementRef(name) => self.schema.element(name)?.clone(),
                        _ => return None,
                    };
                    Some((decl, item.min_occurs > 0))
                })
                .collect();
            return Matcher::All(AllMatcher {
                seen: vec![false; items.len()],
                items,
                optional: *min_occurs == 0,
            });
        }

        let key = Arc::as_ptr(def) as usize;
        let automaton = match self.automata.get(&key) {
            Some(automaton) => automaton.clone(),
            None => {
                let particle = Particle::once(Term::Sequence(parts));
                let automaton = Arc::new(Automaton::build(&self.schema, &particle));
                log::trace!(
                    "built content automaton with {} states",
                    automaton.epsilon.len()
                );
                self.automata.insert(key, automaton.clone());
                automaton
            }
        };
        let states = automaton.closure(vec![automaton.start]);
        Matcher::Nfa { automaton, states }
    }

    fn check_no_attributes(
        &self,
        attributes: &Attributes,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        for attribute in attributes.iter().filter(|a| !is_infrastructure(&a.name)) {
            if attribute.name.namespace.as_deref() == Some(XML_NAMESPACE) {
                continue;
            }
            errors.push(self.error(
                line,
                format!("attribute '{}' is not allowed on an element of simple type", attribute.name),
            ));
        }
    }

    fn check_attributes(
        &mut self,
        chain: &[Arc<TypeDef>],
        attributes: &Attributes,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let (uses, wildcard) = self.attribute_uses(chain);

        for attribute in attributes.iter().filter(|a| !is_infrastructure(&a.name)) {
            let declared = uses.get(&attribute.name);
            if let Some(usage) = declared {
                if usage.prohibited {
                    errors.push(self.error(line, format!("attribute '{}' is prohibited", attribute.name)));
                    continue;
                }
                let global = self.schema.attributes.get(&attribute.name);
                let type_ref = usage
                    .type_ref
                    .clone()
                    .or_else(|| global.map(|d| d.type_ref.clone()));
                let fixed = usage
                    .fixed
                    .clone()
                    .or_else(|| global.and_then(|d| d.fixed.clone()));
                if let Some(type_ref) = type_ref {
                    self.check_attribute_value(&attribute.name, &type_ref, &attribute.value, fixed.as_deref(), line, errors);
                }
                continue;
            }

            if attribute.name.namespace.as_deref() == Some(XML_NAMESPACE) {
                continue;
            }
            let Some(wildcard) = wildcard.as_ref().filter(|w| {
                w.namespaces.allows(attribute.name.namespace.as_deref())
            }) else {
                errors.push(self.error(line, format!("attribute '{}' is not allowed", attribute.name)));
                continue;
            };
            let global = self.schema.attributes.get(&attribute.name).cloned();
            match (wildcard.process_contents, global) {
                (ProcessContents::Skip, _) => {}
                (_, Some(decl)) => self.check_attribute_value(
                    &attribute.name,
                    &decl.type_ref,
                    &attribute.value,
                    decl.fixed.as_deref(),
                    line,
                    errors,
                ),
                (ProcessContents::Lax, None) => {}
                (ProcessContents::Strict, None) => errors.push(self.error(
                    line,
                    format!("cannot find the declaration of attribute '{}'", attribute.name),
                )),
            }
        }

        for usage in uses.values() {
            if usage.required && attributes.value_ns(usage.name.namespace.as_deref(), &usage.name.local_name).is_none() {
                errors.push(self.error(line, format!("attribute '{}' is required", usage.name)));
            }
        }
    }

    /// Attribute uses of a type and its bases; the most derived use wins
    fn attribute_uses(
        &self,
        chain: &[Arc<TypeDef>],
    ) -> (IndexMap<QName, AttributeUse>, Option<Wildcard>) {
        fn collect_group(
            schema: &CompiledSchema,
            name: &QName,
            uses: &mut IndexMap<QName, AttributeUse>,
            wildcard: &mut Option<Wildcard>,
            visited: &mut HashSet<QName>,
        ) {
            if !visited.insert(name.clone()) {
                return;
            }
            let Some(group) = schema.attribute_groups.get(name) else {
                return;
            };
            for usage in &group.attributes {
                uses.entry(usage.name.clone()).or_insert_with(|| usage.clone());
            }
            if wildcard.is_none() {
                *wildcard = group.any_attribute.clone();
            }
            for nested in &group.attribute_groups {
                collect_group(schema, nested, uses, wildcard, visited);
            }
        }

        let mut uses = IndexMap::new();
        let mut wildcard = None;
        let mut visited = HashSet::new();
        for def in chain {
            let TypeDef::Complex(ct) = def.as_ref() else {
                continue;
            };
            for usage in &ct.attributes {
                uses.entry(usage.name.clone()).or_insert_with(|| usage.clone());
            }
            if wildcard.is_none() {
                wildcard = ct.any_attribute.clone();
            }
            for group in &ct.attribute_groups {
                collect_group(&self.schema, group, &mut uses, &mut wildcard, &mut visited);
            }
        }
        (uses, wildcard)
    }

    fn check_attribute_value(
        &mut self,
        name: &QName,
        type_ref: &TypeRef,
        value: &str,
        fixed: Option<&str>,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        match self.check_value(type_ref, value, 0) {
            Ok(parsed) => {
                if let Some(fixed) = fixed {
                    let ws = self.schema.white_space(type_ref);
                    if ws.normalize(value) != ws.normalize(fixed) {
                        errors.push(self.error(
                            line,
                            format!("attribute '{}' must have the fixed value '{}'", name, fixed),
                        ));
                    }
                }
                self.track_identity(type_ref, &parsed, line, errors);
            }
            Err(reason) => errors.push(
                self.error(line, format!("invalid value for attribute '{}'", name))
                    .with_reason(reason)
                    .with_schema_component(describe_type(type_ref)),
            ),
        }
    }

    fn track_identity(
        &mut self,
        type_ref: &TypeRef,
        parsed: &XsdValue,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let path = format!("/{}", self.path.join("/"));
        match (self.schema.primitive(type_ref), parsed) {
            (Some(BuiltinType::Id), XsdValue::String(id)) => {
                if !self.ids.insert(id.clone()) {
                    errors.push(self.error(line, format!("duplicate ID '{}'", id)));
                }
            }
            (Some(BuiltinType::IdRef), XsdValue::String(idref)) => {
                self.idrefs.push((idref.clone(), path, line));
            }
            (Some(BuiltinType::IdRefs), XsdValue::List(items)) => {
                for idref in items {
                    self.idrefs.push((idref.clone(), path.clone(), line));
                }
            }
            _ => {}
        }
    }

    /// Accumulate character data of the current element
    pub fn characters(&mut self, text: &str) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if !text.trim().is_empty() {
            frame.has_text = true;
        }
        if matches!(
            frame.kind,
            FrameKind::Typed {
                content: Content::Simple(_),
                ..
            }
        ) {
            frame.text.push_str(text);
        }
    }

    /// Check an end tag
    pub fn end_element(&mut self, line: usize) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(frame) = self.frames.pop() {
            if let FrameKind::Typed { decl, nil, content } = frame.kind {
                let name = &decl.name;
                if nil {
                    if frame.has_text || frame.has_children {
                        errors.push(self.error(line, format!("nil element '{}' must be empty", name)));
                    }
                } else {
                    match content {
                        Content::Any => {}
                        Content::Empty => {
                            if frame.has_text || frame.has_children {
                                errors.push(self.error(line, format!("element '{}' must be empty", name)));
                            }
                        }
                        Content::Elements { matcher, mixed } => {
                            if frame.has_text && !mixed {
                                errors.push(self.error(
                                    line,
                                    format!("text is not allowed in the element-only content of '{}'", name),
                                ));
                            }
                            if let Some(message) = matcher.finish() {
                                errors.push(self.error(line, format!("element '{}': {}", name, message)));
                            }
                        }
                        Content::Simple(type_ref) => {
                            self.end_simple(&decl, &type_ref, &frame.text, line, &mut errors);
                        }
                    }
                }
            }
        }
        self.path.pop();
        errors
    }

    fn end_simple(
        &mut self,
        decl: &ElementDecl,
        type_ref: &TypeRef,
        text: &str,
        line: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let value = match (&decl.fixed, &decl.default) {
            (Some(fixed), _) if text.is_empty() => fixed.as_str(),
            (None, Some(default)) if text.is_empty() => default.as_str(),
            _ => text,
        };
        match self.check_value(type_ref, value, 0) {
            Ok(parsed) => {
                if let Some(fixed) = &decl.fixed {
                    let ws = self.schema.white_space(type_ref);
                    if ws.normalize(value) != ws.normalize(fixed) {
                        errors.push(self.error(
                            line,
                            format!("element '{}' must have the fixed value '{}'", decl.name, fixed),
                        ));
                    }
                }
                self.track_identity(type_ref, &parsed, line, errors);
            }
            Err(reason) => errors.push(
                self.error(line, format!("invalid content of element '{}'", decl.name))
                    .with_reason(reason)
                    .with_schema_component(describe_type(type_ref)),
            ),
        }
    }

    /// Report references to IDs that never appeared
    pub fn end_document(&mut self) -> Vec<ValidationError> {
        self.idrefs
            .drain(..)
            .filter(|(idref, _, _)| !self.ids.contains(idref))
            .map(|(idref, path, line)| {
                ValidationError::new(format!("IDREF '{}' does not match any ID", idref))
                    .with_path(path)
                    .with_line(line)
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Simple values
    // -------------------------------------------------------------------------

    fn check_value(&self, type_ref: &TypeRef, raw: &str, depth: usize) -> ValueResult<XsdValue> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err("type derivation is nested too deeply".to_string());
        }
        match self.schema.resolve(type_ref) {
            None => Err(format!("type '{}' is not defined", describe_type(type_ref))),
            Some(ResolvedType::Builtin(builtin)) => builtin.validate(raw).map_err(message_of),
            Some(ResolvedType::Defined(def)) => match def.as_ref() {
                TypeDef::Complex(ComplexTypeDef {
                    content: ContentType::Simple(inner),
                    ..
                }) => self.check_value(inner, raw, depth + 1),
                TypeDef::Complex(_) => Err(format!(
                    "type '{}' is not a simple type",
                    describe_type(type_ref)
                )),
                TypeDef::Simple(st) => match &st.variety {
                    SimpleVariety::Restriction { base, facets } => {
                        let value = self.schema.white_space(type_ref).normalize(raw);
                        let parsed = self.check_value(base, &value, depth + 1)?;
                        self.check_facets(base, facets, &value, &parsed)?;
                        Ok(parsed)
                    }
                    SimpleVariety::List { item } => {
                        let items: Vec<String> =
                            raw.split_whitespace().map(str::to_string).collect();
                        for entry in &items {
                            self.check_value(item, entry, depth + 1)?;
                        }
                        Ok(XsdValue::List(items))
                    }
                    SimpleVariety::Union { members } => members
                        .iter()
                        .find_map(|member| self.check_value(member, raw, depth + 1).ok())
                        .ok_or_else(|| {
                            format!("'{}' does not match any member type of the union", raw.trim())
                        }),
                },
            },
        }
    }

    fn check_facets(
        &self,
        base: &TypeRef,
        facets: &Facets,
        value: &str,
        parsed: &XsdValue,
    ) -> ValueResult<()> {
        let length = match parsed {
            XsdValue::List(items) => items.len(),
            XsdValue::Binary(bytes) => bytes.len(),
            _ => value.chars().count(),
        };
        facets.check_lexical(value, length)?;

        let primitive = self.schema.primitive(base);
        let as_value = |lexical: &str| primitive.and_then(|p| p.validate(lexical).ok());

        if !facets.enumeration.is_empty() {
            let listed = facets.enumeration.iter().any(|candidate| {
                candidate == value
                    || as_value(candidate)
                        .and_then(|v| v.compare(parsed))
                        .map_or(false, |ord| ord == Ordering::Equal)
            });
            if !listed {
                return Err(format!(
                    "value '{}' is not one of the enumerated values [{}]",
                    value,
                    facets.enumeration.join(", ")
                ));
            }
        }

        let bounds: [(&Option<String>, &[Ordering], &str); 4] = [
            (&facets.min_inclusive, &[Ordering::Greater, Ordering::Equal], "minInclusive"),
            (&facets.max_inclusive, &[Ordering::Less, Ordering::Equal], "maxInclusive"),
            (&facets.min_exclusive, &[Ordering::Greater], "minExclusive"),
            (&facets.max_exclusive, &[Ordering::Less], "maxExclusive"),
        ];
        for (bound, allowed, facet) in bounds {
            let Some(bound) = bound else { continue };
            let Some(ordering) = as_value(bound).and_then(|b| parsed.compare(&b)) else {
                continue;
            };
            if !allowed.contains(&ordering) {
                return Err(format!("value '{}' violates {} '{}'", value, facet, bound));
            }
        }
        Ok(())
    }
}

fn effective_content(chain: &[Arc<TypeDef>]) -> Effective {
    let mut effective = Effective::Empty;
    for def in chain.iter().rev() {
        let TypeDef::Complex(ct) = def.as_ref() else {
            continue;
        };
        let extension = matches!(ct.base, Some((Derivation::Extension, _)));
        effective = match (&ct.content, effective) {
            (ContentType::Elements(own), Effective::Elements(mut parts)) if extension => {
                parts.push(own.clone());
                Effective::Elements(parts)
            }
            (ContentType::Empty, inherited) if extension => inherited,
            (ContentType::Elements(own), _) => Effective::Elements(vec![own.clone()]),
            (ContentType::Simple(type_ref), _) => Effective::Simple(type_ref.clone()),
            (ContentType::Empty, _) => Effective::Empty,
        };
    }
    effective
}

/// Attributes that belong to the XML and namespace machinery
fn is_infrastructure(name: &QName) -> bool {
    matches!(
        name.namespace.as_deref(),
        Some(XSI_NAMESPACE) | Some(XMLNS_NAMESPACE)
    )
}

fn describe_type(type_ref: &TypeRef) -> String {
    match type_ref {
        TypeRef::Builtin(builtin) => format!("xs:{}", builtin.name()),
        TypeRef::Named(name) => name.to_string(),
        TypeRef::Inline(def) => def
            .name()
            .map(ToString::to_string)
            .unwrap_or_else(|| "anonymous type".to_string()),
    }
}

fn message_of(error: Error) -> String {
    match error {
        Error::Validation(e) => e.message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::Attribute;
    use crate::validators::{SchemaCompiler, SchemaSource, XsdCompiler};
    use pretty_assertions::assert_eq;

    fn schema(xsd: &str) -> Arc<CompiledSchema> {
        Arc::new(
            XsdCompiler::new()
                .compile(&SchemaSource::from_string("memory:test.xsd", xsd))
                .unwrap(),
        )
    }

    /// Feed a document through the validator and collect every error
    fn validate(schema: &Arc<CompiledSchema>, xml: &str) -> Vec<ValidationError> {
        fn walk(
            validator: &mut Validator,
            doc: &roxmltree::Document<'_>,
            node: roxmltree::Node<'_, '_>,
            errors: &mut Vec<ValidationError>,
        ) {
            let line = doc.text_pos_at(node.range().start).row as usize;
            let name = QName::new(node.tag_name().namespace(), node.tag_name().name());
            let mut attributes = Attributes::new();
            for attr in node.attributes() {
                attributes.push(Attribute {
                    name: QName::new(attr.namespace(), attr.name()),
                    raw_name: attr.name().to_string(),
                    value: attr.value().to_string(),
                });
            }
            let mut namespaces = NamespaceStack::new();
            for namespace in node.namespaces() {
                namespaces.push(namespace.name().unwrap_or(""), namespace.uri());
            }
            errors.extend(validator.start_element(&name, &attributes, &namespaces, line));
            for child in node.children() {
                if child.is_element() {
                    walk(validator, doc, child, errors);
                } else if let Some(text) = child.text() {
                    validator.characters(text);
                }
            }
            errors.extend(validator.end_element(line));
        }

        let doc = roxmltree::Document::parse(xml).unwrap();
        let mut validator = Validator::new(schema.clone());
        let mut errors = Vec::new();
        walk(&mut validator, &doc, doc.root_element(), &mut errors);
        errors.extend(validator.end_document());
        errors
    }

    const ORDERS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="customer" type="xs:string"/>
        <xs:element name="item" type="Item" minOccurs="1" maxOccurs="unbounded"/>
        <xs:element name="note" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:ID" use="required"/>
      <xs:attribute name="status" type="Status" default="open"/>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="Item">
    <xs:simpleContent>
      <xs:extension base="Quantity">
        <xs:attribute name="sku" type="Sku" use="required"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:simpleType name="Quantity">
    <xs:restriction base="xs:int">
      <xs:minInclusive value="1"/>
      <xs:maxExclusive value="100"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="Sku">
    <xs:restriction base="xs:token">
      <xs:pattern value="[A-Z]{2}-\d{3}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="Status">
    <xs:restriction base="xs:string">
      <xs:enumeration value="open"/>
      <xs:enumeration value="shipped"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

    #[test]
    fn test_valid_document() {
        let schema = schema(ORDERS);
        let errors = validate(
            &schema,
            r#"<order id="o1" status="shipped">
                 <customer>Ann</customer>
                 <item sku="AB-123">2</item>
                 <item sku=" CD-456 ">99</item>
               </order>"#,
        );
        assert_eq!(errors.len(), 0, "{:?}", errors);
    }

    #[test]
    fn test_missing_required_attribute() {
        let schema = schema(ORDERS);
        let errors = validate(
            &schema,
            r#"<order><customer>Ann</customer><item sku="AB-123">2</item></order>"#,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "attribute 'id' is required");
        assert_eq!(errors[0].path.as_deref(), Some("/order"));
    }

    #[test]
    fn test_unexpected_and_missing_elements() {
        let schema = schema(ORDERS);
        let errors = validate(&schema, r#"<order id="o1"><item sku="AB-123">2</item></order>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'item' is not expected"));
        assert!(errors[0].message.contains("customer"));
        assert_eq!(errors[0].path.as_deref(), Some("/order/item"));

        let errors = validate(&schema, r#"<order id="o1"><customer>Ann</customer></order>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("content is incomplete"));
    }

    #[test]
    fn test_simple_value_facets() {
        let schema = schema(ORDERS);
        let errors = validate(
            &schema,
            r#"<order id="o1" status="lost">
                 <customer>Ann</customer>
                 <item sku="ab-1">100</item>
               </order>"#,
        );
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "invalid value for attribute 'status'",
                "invalid value for attribute 'sku'",
                "invalid content of element 'item'",
            ]
        );
        assert!(errors[0].reason.as_deref().unwrap().contains("enumerated"));
        assert!(errors[2].reason.as_deref().unwrap().contains("maxExclusive"));
    }

    #[test]
    fn test_text_in_element_only_content() {
        let schema = schema(ORDERS);
        let errors = validate(
            &schema,
            r#"<order id="o1">stray<customer>Ann</customer><item sku="AB-123">2</item></order>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("text is not allowed"));
    }

    #[test]
    fn test_unknown_root() {
        let schema = schema(ORDERS);
        let errors = validate(&schema, "<invoice><anything/></invoice>");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "cannot find the declaration of element 'invoice'"
        );
    }

    #[test]
    fn test_all_group() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="point">
                   <xs:complexType>
                     <xs:all>
                       <xs:element name="x" type="xs:decimal"/>
                       <xs:element name="y" type="xs:decimal"/>
                       <xs:element name="label" type="xs:string" minOccurs="0"/>
                     </xs:all>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        );
        assert!(validate(&schema, "<point><y>2</y><x>1.5</x></point>").is_empty());

        let errors = validate(&schema, "<point><x>1</x><x>2</x><y>3</y></point>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("only once"));

        let errors = validate(&schema, "<point><label>a</label><x>1</x></point>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("missing: y"));
    }

    #[test]
    fn test_extension_appends_content() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="Base">
                   <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
                   <xs:attribute name="version" type="xs:int" use="required"/>
                 </xs:complexType>
                 <xs:complexType name="Derived">
                   <xs:complexContent>
                     <xs:extension base="Base">
                       <xs:sequence><xs:element name="b" type="xs:string"/></xs:sequence>
                     </xs:extension>
                   </xs:complexContent>
                 </xs:complexType>
                 <xs:element name="doc" type="Derived"/>
               </xs:schema>"#,
        );
        assert!(validate(&schema, r#"<doc version="1"><a/><b/></doc>"#).is_empty());

        let errors = validate(&schema, r#"<doc><b/><a/></doc>"#);
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "attribute 'version' is required");
        assert!(messages[1].contains("'b' is not expected"));
    }

    #[test]
    fn test_xsi_type_selects_derived_type() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="Base">
                   <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
                 </xs:complexType>
                 <xs:complexType name="Derived">
                   <xs:complexContent>
                     <xs:extension base="Base">
                       <xs:sequence><xs:element name="b" type="xs:string"/></xs:sequence>
                     </xs:extension>
                   </xs:complexContent>
                 </xs:complexType>
                 <xs:complexType name="Unrelated">
                   <xs:sequence><xs:element name="c" type="xs:string"/></xs:sequence>
                 </xs:complexType>
                 <xs:element name="doc" type="Base"/>
                 <xs:element name="amount" type="xs:decimal"/>
               </xs:schema>"#,
        );
        let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

        let doc = format!(r#"<doc {} xsi:type="Derived"><a/><b/></doc>"#, xsi);
        assert!(validate(&schema, &doc).is_empty());

        let doc = format!(r#"<doc {} xsi:type="Derived"><a/></doc>"#, xsi);
        let errors = validate(&schema, &doc);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("content is incomplete"));

        let doc = format!(r#"<doc {} xsi:type="Unrelated"><a/></doc>"#, xsi);
        let messages: Vec<String> = validate(&schema, &doc).into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec!["type 'Unrelated' named by xsi:type is not derived from the type of element 'doc'".to_string()]
        );

        let doc = format!(r#"<doc {} xsi:type="Missing"><a/></doc>"#, xsi);
        let errors = validate(&schema, &doc);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot find the type definition 'Missing'"));
    }

    #[test]
    fn test_xsi_type_with_builtin_types() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="amount" type="xs:decimal"/>
               </xs:schema>"#,
        );
        let ns = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

        let doc = format!(r#"<amount {} xsi:type="xs:integer">12</amount>"#, ns);
        assert!(validate(&schema, &doc).is_empty());

        let doc = format!(r#"<amount {} xsi:type="xs:integer">1.5</amount>"#, ns);
        let errors = validate(&schema, &doc);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "invalid content of element 'amount'");

        let doc = format!(r#"<amount {} xsi:type="xs:string">12</amount>"#, ns);
        let errors = validate(&schema, &doc);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("is not derived from"));
    }

    #[test]
    fn test_wildcards() {
        let schema = schema(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t"
                          xmlns:t="urn:t">
                 <xs:element name="box">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:any namespace="##other" processContents="skip" maxOccurs="unbounded"/>
                     </xs:sequence>
                     <xs:anyAttribute namespace="##any" processContents="lax"/>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"###,
        );
        let ok = validate(
            &schema,
            r#"<t:box xmlns:t="urn:t" xmlns:o="urn:other" o:flag="1">
                 <o:thing><anything at="all"/></o:thing>
               </t:box>"#,
        );
        assert!(ok.is_empty(), "{:?}", ok);

        let errors = validate(&schema, r#"<t:box xmlns:t="urn:t"><t:box/></t:box>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not expected"));
    }

    #[test]
    fn test_ids_and_idrefs() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="graph">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="node" maxOccurs="unbounded">
                         <xs:complexType>
                           <xs:attribute name="id" type="xs:ID"/>
                           <xs:attribute name="next" type="xs:IDREF"/>
                         </xs:complexType>
                       </xs:element>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        );
        assert!(validate(&schema, r#"<graph><node id="a" next="b"/><node id="b"/></graph>"#).is_empty());

        let errors = validate(
            &schema,
            r#"<graph><node id="a" next="z"/><node id="a"/></graph>"#,
        );
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["duplicate ID 'a'", "IDREF 'z' does not match any ID"]
        );
    }

    #[test]
    fn test_nil_and_fixed() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="when" type="xs:date" nillable="true"/>
                       <xs:element name="unit" type="xs:string" fixed="kg"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        );
        let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
        let doc = format!(r#"<r {}><when xsi:nil="true"/><unit/></r>"#, xsi);
        assert!(validate(&schema, &doc).is_empty());

        let doc = format!(r#"<r {}><when>2024-02-30</when><unit>lb</unit></r>"#, xsi);
        let messages: Vec<String> = validate(&schema, &doc).into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec![
                "invalid content of element 'when'".to_string(),
                "element 'unit' must have the fixed value 'kg'".to_string(),
            ]
        );
    }

    #[test]
    fn test_bounded_repetition() {
        let schema = schema(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="list">
                   <xs:complexType>
                     <xs:choice minOccurs="2" maxOccurs="3">
                       <xs:element name="a"/>
                       <xs:element name="b"/>
                     </xs:choice>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        );
        assert!(validate(&schema, "<list><a/><b/></list>").is_empty());
        assert!(validate(&schema, "<list><b/><b/><a/></list>").is_empty());
        assert_eq!(validate(&schema, "<list><a/></list>").len(), 1);
        assert_eq!(validate(&schema, "<list><a/><a/><a/><a/></list>").len(), 1);
    }
}
