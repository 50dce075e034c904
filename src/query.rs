//! Structured queries over a [`Document`].
//!
//! A [`Query`] is a small, typed subset of XPath: a chain of location steps
//! (axis + name test + predicates) followed by what to pull out of the
//! selected nodes (text or an attribute). Predicates may refer to named
//! variables (`$platform`) that are bound per call, which is how a single
//! query is scoped to one build configuration among the many stored in the
//! same project file.
//!
//! Two result shapes are offered: [`multi`] for lists and [`single`] for
//! "at most one" / "exactly one" values. Their cardinality checks are the
//! only thing enforcing that a project defines one value per platform.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::error::{Result, VcxprojError};
use crate::xml::{Document, NodeId, NodeKind};

/// Variable bindings for a query, e.g. `&[("platform", "Debug|x64")]`.
pub type Vars<'a> = [(&'a str, &'a str)];

// ═══════════════════════════════════════════════════════════════════════════════
//  Query AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `/name`
    Child,
    /// `//name`
    Descendant,
    /// `/descendant-or-self::name`
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `node()`: any element, or the document node.
    Any,
    /// An element with this local name.
    Named(String),
}

/// A value inside a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Literal(String),
    /// `$name`, looked up in the [`Vars`] passed to the query.
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[name]`: has a child element with this name.
    HasChild(String),
    /// `[@name]`
    HasAttr(String),
    /// `[contains(@attr, value)]`
    AttrContains { attr: String, value: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NameTest,
    pub predicates: Vec<Predicate>,
}

/// What a query yields for each selected node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The node itself; only usable with [`Query::nodes`].
    Node,
    /// The element's text content.
    Text,
    /// `/@name`
    Attr(String),
}

/// A location path evaluated from the document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    steps: Vec<Step>,
    target: Target,
}

impl Query {
    /// `/`: the document node.
    pub fn root() -> Self {
        Self { steps: Vec::new(), target: Target::Node }
    }

    /// `/a/b/c`: a chain of child steps from the document node.
    pub fn path(names: &[&str]) -> Self {
        names.iter().fold(Self::root(), |q, name| q.child(name))
    }

    /// `//name`: every element with this name, anywhere.
    pub fn anywhere(name: &str) -> Self {
        Self::root().descendant(name)
    }

    fn step(mut self, axis: Axis, test: NameTest) -> Self {
        self.steps.push(Step { axis, test, predicates: Vec::new() });
        self
    }

    pub fn child(self, name: &str) -> Self {
        self.step(Axis::Child, NameTest::Named(name.to_string()))
    }

    pub fn descendant(self, name: &str) -> Self {
        self.step(Axis::Descendant, NameTest::Named(name.to_string()))
    }

    /// `/descendant-or-self::name`
    pub fn descendant_or_self(self, name: &str) -> Self {
        self.step(Axis::DescendantOrSelf, NameTest::Named(name.to_string()))
    }

    /// `/descendant-or-self::node()`
    pub fn descendant_or_self_any(self) -> Self {
        self.step(Axis::DescendantOrSelf, NameTest::Any)
    }

    /// Add a predicate to the last step. On a query with no steps yet this
    /// is a no-op.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.predicates.push(predicate);
        }
        self
    }

    /// `[contains(@attr, $var)]` on the last step.
    pub fn attr_contains_var(self, attr: &str, var: &str) -> Self {
        self.filter(Predicate::AttrContains {
            attr: attr.to_string(),
            value: Value::Var(var.to_string()),
        })
    }

    pub fn text(mut self) -> Self {
        self.target = Target::Text;
        self
    }

    pub fn attr(mut self, name: &str) -> Self {
        self.target = Target::Attr(name.to_string());
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Render with variables substituted, for error messages.
    pub fn describe(&self, vars: &Vars) -> String {
        let mut text = self.to_string();
        for (name, value) in vars {
            if self.uses_var(name) {
                text.push_str(&format!(" with ${name}='{value}'"));
            }
        }
        text
    }

    fn uses_var(&self, var: &str) -> bool {
        self.steps.iter().flat_map(|s| &s.predicates).any(|p| {
            matches!(p, Predicate::AttrContains { value: Value::Var(v), .. } if v == var)
        })
    }

    // ─── Evaluation ──────────────────────────────────────────────────────

    /// The selected nodes in document order, without duplicates.
    pub fn nodes(&self, doc: &Document, vars: &Vars) -> Result<Vec<NodeId>> {
        let mut context = vec![doc.root()];
        for step in &self.steps {
            let mut selected = HashSet::new();
            for &node in &context {
                for candidate in self.axis_nodes(doc, node, step.axis) {
                    if self.accepts(doc, candidate, step, vars)? {
                        selected.insert(candidate);
                    }
                }
            }
            context = in_document_order(doc, &selected);
        }
        Ok(context)
    }

    /// The string value of every selected node, in document order.
    pub fn values(&self, doc: &Document, vars: &Vars) -> Result<Vec<String>> {
        let nodes = self.nodes(doc, vars)?;
        let values = nodes.into_iter().filter_map(|n| match &self.target {
            Target::Node | Target::Text => doc.text(n),
            Target::Attr(name) => doc.attribute(n, name),
        });
        Ok(values.map(String::from).collect())
    }

    fn axis_nodes(&self, doc: &Document, node: NodeId, axis: Axis) -> Vec<NodeId> {
        match axis {
            Axis::Child => doc.children(node).collect(),
            Axis::Descendant => doc.descendants(node).into_iter().skip(1).collect(),
            Axis::DescendantOrSelf => doc.descendants(node),
        }
    }

    fn accepts(&self, doc: &Document, node: NodeId, step: &Step, vars: &Vars) -> Result<bool> {
        let name_ok = match (&step.test, doc.kind(node)) {
            (NameTest::Any, NodeKind::Root | NodeKind::Element(_)) => true,
            (NameTest::Named(name), NodeKind::Element(e)) => e.local_name() == name,
            _ => false,
        };
        if !name_ok {
            return Ok(false);
        }
        for predicate in &step.predicates {
            if !self.holds(doc, node, predicate, vars)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn holds(&self, doc: &Document, node: NodeId, predicate: &Predicate, vars: &Vars) -> Result<bool> {
        Ok(match predicate {
            Predicate::HasChild(name) => doc.children(node).any(|c| doc.name(c) == Some(name.as_str())),
            Predicate::HasAttr(attr) => doc.attribute(node, attr).is_some(),
            Predicate::AttrContains { attr, value } => {
                let needle = self.resolve(value, vars)?;
                doc.attribute(node, attr).is_some_and(|v| v.contains(needle))
            }
        })
    }

    fn resolve<'v>(&self, value: &'v Value, vars: &'v Vars) -> Result<&'v str> {
        match value {
            Value::Literal(s) => Ok(s.as_str()),
            Value::Var(name) => vars
                .iter()
                .find(|(k, _)| *k == name.as_str())
                .map(|(_, v)| *v)
                .ok_or_else(|| VcxprojError::UnboundVariable {
                    query: self.to_string(),
                    name: name.clone(),
                }),
        }
    }
}

fn in_document_order(doc: &Document, selected: &HashSet<NodeId>) -> Vec<NodeId> {
    if selected.is_empty() {
        return Vec::new();
    }
    doc.descendants(doc.root())
        .into_iter()
        .filter(|n| selected.contains(n))
        .collect()
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            f.write_str("/")?;
        }
        for step in &self.steps {
            let test = match &step.test {
                NameTest::Any => "node()",
                NameTest::Named(name) => name.as_str(),
            };
            match step.axis {
                Axis::Child => write!(f, "/{test}")?,
                Axis::Descendant => write!(f, "//{test}")?,
                Axis::DescendantOrSelf => write!(f, "/descendant-or-self::{test}")?,
            }
            for predicate in &step.predicates {
                match predicate {
                    Predicate::HasChild(name) => write!(f, "[{name}]")?,
                    Predicate::HasAttr(attr) => write!(f, "[@{attr}]")?,
                    Predicate::AttrContains { attr, value: Value::Literal(s) } => {
                        write!(f, "[contains(@{attr},'{s}')]")?
                    }
                    Predicate::AttrContains { attr, value: Value::Var(v) } => {
                        write!(f, "[contains(@{attr},${v})]")?
                    }
                }
            }
        }
        match &self.target {
            Target::Node => Ok(()),
            Target::Text => f.write_str("/text()"),
            Target::Attr(name) => write!(f, "/@{name}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Result shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// All values selected by `query`, in document order. An empty result is an
/// error unless `allow_empty`.
pub fn multi(doc: &Document, query: &Query, vars: &Vars, allow_empty: bool) -> Result<Vec<String>> {
    let values = query.values(doc, vars)?;
    if values.is_empty() && !allow_empty {
        return Err(cardinality(query, vars, "at least one", 0));
    }
    Ok(values)
}

/// The single value selected by `query`.
///
/// More than one match is always an error. Zero matches give `Ok(None)` when
/// `allow_empty`, and an error otherwise. With `strip`, surrounding
/// whitespace is trimmed from the value.
pub fn single(
    doc: &Document,
    query: &Query,
    vars: &Vars,
    allow_empty: bool,
    strip: bool,
) -> Result<Option<String>> {
    if !allow_empty {
        return exactly_one(doc, query, vars, strip).map(Some);
    }
    let mut values = query.values(doc, vars)?;
    if values.len() > 1 {
        return Err(cardinality(query, vars, "at most one", values.len()));
    }
    Ok(values.pop().map(|v| stripped(v, strip)))
}

/// The value selected by `query`, which must match exactly once.
pub fn exactly_one(doc: &Document, query: &Query, vars: &Vars, strip: bool) -> Result<String> {
    match <[String; 1]>::try_from(query.values(doc, vars)?) {
        Ok([value]) => Ok(stripped(value, strip)),
        Err(values) => Err(cardinality(query, vars, "exactly one", values.len())),
    }
}

fn stripped(value: String, strip: bool) -> String {
    if strip { value.trim().to_string() } else { value }
}

fn cardinality(query: &Query, vars: &Vars, expected: &'static str, found: usize) -> VcxprojError {
    debug!(query = %query.describe(vars), found, "query cardinality violated");
    VcxprojError::Cardinality { query: query.describe(vars), expected, found }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <ItemGroup Label="ProjectConfigurations">
    <ProjectConfiguration Include="Debug|Win32" />
  </ItemGroup>
  <ItemGroup>
    <ClCompile Include="a.cpp" />
    <ClCompile Include="b.cpp" />
    <ClInclude Include="a.h" />
  </ItemGroup>
  <PropertyGroup Condition="'$(Configuration)|$(Platform)'=='Debug|Win32'">
    <IntDir>  obj\debug\  </IntDir>
  </PropertyGroup>
  <PropertyGroup Condition="'$(Configuration)|$(Platform)'=='Release|Win32'">
    <IntDir>obj\release\</IntDir>
    <OutDir Condition="'$(Configuration)|$(Platform)'=='Release|Win32'">bin\</OutDir>
  </PropertyGroup>
  <PropertyGroup>
    <ProjectName>demo</ProjectName>
  </PropertyGroup>
</Project>"#;

    fn doc() -> Document {
        Document::parse(DOC).unwrap()
    }

    fn scoped(name: &str) -> Query {
        Query::root()
            .descendant_or_self_any()
            .attr_contains_var("Condition", "platform")
            .descendant_or_self(name)
            .text()
    }

    #[test]
    fn child_path_attributes() {
        let q = Query::path(&["Project", "ItemGroup", "ClCompile"]).attr("Include");
        assert_eq!(multi(&doc(), &q, &[], false).unwrap(), ["a.cpp", "b.cpp"]);
    }

    #[test]
    fn anywhere_text() {
        let q = Query::anywhere("ProjectName").text();
        assert_eq!(single(&doc(), &q, &[], false, true).unwrap().as_deref(), Some("demo"));
    }

    #[test]
    fn has_child_predicate() {
        let q = Query::anywhere("ItemGroup").filter(Predicate::HasChild("ClCompile".into()));
        let nodes = q.nodes(&doc(), &[]).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn platform_scoped_query() {
        let d = doc();
        let debug = single(&d, &scoped("IntDir"), &[("platform", "Debug|Win32")], false, true);
        assert_eq!(debug.unwrap().as_deref(), Some(r"obj\debug\"));

        let raw = single(&d, &scoped("IntDir"), &[("platform", "Debug|Win32")], false, false);
        assert_eq!(raw.unwrap().as_deref(), Some(r"  obj\debug\  "));
    }

    #[test]
    fn nested_conditions_select_a_node_once() {
        // OutDir is under a matching PropertyGroup and carries a matching
        // Condition itself; it must still count as one result.
        let q = scoped("OutDir");
        let out = single(&doc(), &q, &[("platform", "Release|Win32")], false, true).unwrap();
        assert_eq!(out.as_deref(), Some(r"bin\"));
    }

    #[test]
    fn single_rejects_zero_unless_allowed() {
        let q = scoped("OutDir");
        let vars = [("platform", "Debug|Win32")];
        assert!(matches!(
            single(&doc(), &q, &vars, false, true),
            Err(VcxprojError::Cardinality { found: 0, .. })
        ));
        assert_eq!(single(&doc(), &q, &vars, true, true).unwrap(), None);
    }

    #[test]
    fn single_rejects_many() {
        // "Win32" matches both configurations.
        let q = scoped("IntDir");
        let err = single(&doc(), &q, &[("platform", "Win32")], true, true).unwrap_err();
        match err {
            VcxprojError::Cardinality { found, expected, query } => {
                assert_eq!(found, 2);
                assert_eq!(expected, "at most one");
                assert!(query.contains("$platform='Win32'"), "{query}");
            }
            other => panic!("expected Cardinality, got {other:?}"),
        }
    }

    #[test]
    fn exactly_one_reports_the_bound_query() {
        let q = scoped("OutDir");
        let err = exactly_one(&doc(), &q, &[("platform", "Debug|Win32")], true).unwrap_err();
        match err {
            VcxprojError::Cardinality { found, expected, query } => {
                assert_eq!(found, 0);
                assert_eq!(expected, "exactly one");
                assert!(query.ends_with("/descendant-or-self::OutDir/text() with $platform='Debug|Win32'"), "{query}");
            }
            other => panic!("expected Cardinality, got {other:?}"),
        }
        let out = exactly_one(&doc(), &q, &[("platform", "Release|Win32")], false).unwrap();
        assert_eq!(out, r"bin\");
    }

    #[test]
    fn multi_rejects_empty_unless_allowed() {
        let q = Query::anywhere("None").attr("Include");
        assert!(multi(&doc(), &q, &[], false).is_err());
        assert!(multi(&doc(), &q, &[], true).unwrap().is_empty());
    }

    #[test]
    fn unbound_variable_is_reported() {
        let err = scoped("IntDir").nodes(&doc(), &[]).unwrap_err();
        assert!(matches!(err, VcxprojError::UnboundVariable { ref name, .. } if name == "platform"));
    }

    #[test]
    fn display_reads_like_xpath() {
        assert_eq!(
            scoped("IntDir").to_string(),
            "/descendant-or-self::node()[contains(@Condition,$platform)]/descendant-or-self::IntDir/text()"
        );
        assert_eq!(
            Query::path(&["Project", "ItemGroup", "ClCompile"]).attr("Include").to_string(),
            "/Project/ItemGroup/ClCompile/@Include"
        );
        assert_eq!(Query::root().to_string(), "/");
    }
}
