//! Typed snapshots of one project file's build metadata.
//!
//! [`Project`] resolves path fields against the project's directory;
//! [`ProjectRaw`] keeps them as the literal (forward-slashed) strings found in
//! the file, for consumers that must reproduce rather than resolve them.
//!
//! Platform-specific fields (search paths, `IntDir`, `OutDir`, `TargetName`,
//! `TargetExt`) are read through a `Condition` predicate scoped by the caller's
//! platform string, e.g. `Debug|x64`. The rest are read unscoped.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, VcxprojError};
use crate::paths;
use crate::query::{self, Query};
use crate::xml::Document;

// ═══════════════════════════════════════════════════════════════════════════════
//  Queries
// ═══════════════════════════════════════════════════════════════════════════════

mod queries {
    use crate::query::Query;

    pub fn cl_compiles() -> Query {
        Query::path(&["Project", "ItemGroup", "ClCompile"]).attr("Include")
    }

    pub fn cl_includes() -> Query {
        Query::path(&["Project", "ItemGroup", "ClInclude"]).attr("Include")
    }

    pub fn project_name() -> Query {
        Query::anywhere("ProjectName").text()
    }

    pub fn project_guid() -> Query {
        Query::anywhere("ProjectGuid").text()
    }

    /// `<name>` at or below any node whose `Condition` mentions `$platform`.
    pub fn for_platform(name: &str) -> Query {
        Query::root()
            .descendant_or_self_any()
            .attr_contains_var("Condition", "platform")
            .descendant_or_self(name)
            .text()
    }

    pub fn search_paths() -> Query {
        for_platform("AdditionalIncludeDirectories")
    }
    pub fn int_dir() -> Query {
        for_platform("IntDir")
    }
    pub fn out_dir() -> Query {
        for_platform("OutDir")
    }
    pub fn target_name() -> Query {
        for_platform("TargetName")
    }
    pub fn target_ext() -> Query {
        for_platform("TargetExt")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Field readers
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads one field at a time from an open document.
struct FieldReader<'d> {
    doc: &'d Document,
    platform: &'d str,
}

impl FieldReader<'_> {
    fn list(&self, query: Query, allow_empty: bool) -> Result<Vec<String>> {
        query::multi(self.doc, &query, &[], allow_empty)
    }

    fn value(&self, query: Query) -> Result<String> {
        query::exactly_one(self.doc, &query, &[("platform", self.platform)], true)
    }

    fn unscoped_value(&self, query: Query) -> Result<String> {
        query::exactly_one(self.doc, &query, &[], true)
    }

    fn scoped(&self, query: Query, allow_empty: bool) -> Result<Option<String>> {
        query::single(self.doc, &query, &[("platform", self.platform)], allow_empty, true)
    }

    fn cl_compiles(&self) -> Result<Vec<String>> {
        self.list(queries::cl_compiles(), false)
    }

    fn cl_includes(&self) -> Result<Vec<String>> {
        self.list(queries::cl_includes(), true)
    }

    /// The `;`-separated search path field, split and stripped, empty
    /// entries removed. `None` if the platform has no such field.
    fn search_paths(&self) -> Result<Option<Vec<String>>> {
        Ok(self
            .scoped(queries::search_paths(), true)?
            .map(|field| split_strip(&field, ';')))
    }

    fn int_dir(&self) -> Result<String> {
        self.value(queries::int_dir())
    }

    fn out_dir(&self) -> Result<String> {
        self.value(queries::out_dir())
    }

    fn project_name(&self) -> Result<String> {
        self.unscoped_value(queries::project_name())
    }

    fn target_name(&self) -> Result<Option<String>> {
        self.scoped(queries::target_name(), true)
    }

    fn target_ext(&self) -> Result<Option<String>> {
        self.scoped(queries::target_ext(), true)
    }

    fn uuid(&self) -> Result<String> {
        strip_braces(&self.unscoped_value(queries::project_guid())?)
    }
}

/// Split on `sep`, trim every piece, drop the empty ones.
fn split_strip(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// `{ABCD-1234}` → `ABCD-1234`.
fn strip_braces(guid: &str) -> Result<String> {
    guid.strip_prefix('{')
        .and_then(|g| g.strip_suffix('}'))
        .map(String::from)
        .ok_or_else(|| VcxprojError::Format {
            field: "ProjectGuid",
            value: guid.to_string(),
            message: "expected a UUID surrounded by { }".to_string(),
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Project
// ═══════════════════════════════════════════════════════════════════════════════

/// Build metadata of one project for one platform, with paths resolved.
///
/// Relative paths are anchored at the project file's directory (when it is
/// known) and normalized. Values containing build variables such as
/// `$(SolutionDir)` are never expanded: search path entries containing one
/// are dropped, and `IntDir` / `OutDir` containing one are kept as the
/// slash-converted literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub cl_includes: Vec<PathBuf>,
    pub cl_compiles: Vec<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub int_dir: PathBuf,
    pub out_dir: PathBuf,
    pub project_name: String,
    pub target_name: Option<String>,
    pub target_ext: Option<String>,
    pub uuid: String,
}

impl Project {
    /// Read a project file from disk.
    pub fn read(file: impl AsRef<Path>, platform: &str) -> Result<Self> {
        let file = file.as_ref();
        let doc = Document::from_file(file)?;
        let dir = project_dir(file)?;
        Self::from_document(&doc, Some(&dir), platform)
    }

    /// Build a snapshot from an already open document. `dir` is the
    /// directory relative paths are resolved against; without one they are
    /// only normalized.
    pub fn from_document(doc: &Document, dir: Option<&Path>, platform: &str) -> Result<Self> {
        let fields = FieldReader { doc, platform };
        let anchor = |literal: &str| resolve(dir, literal);

        let search_paths = fields.search_paths()?.ok_or_else(|| VcxprojError::Cardinality {
            query: queries::search_paths().describe(&[("platform", platform)]),
            expected: "exactly one",
            found: 0,
        })?;

        Ok(Self {
            cl_includes: fields.cl_includes()?.iter().map(|s| anchor(s)).collect(),
            cl_compiles: fields.cl_compiles()?.iter().map(|s| anchor(s)).collect(),
            search_paths: search_paths
                .iter()
                .filter(|s| !paths::has_variable_token(s))
                .map(|s| anchor(s))
                .collect(),
            int_dir: anchor(&fields.int_dir()?),
            out_dir: anchor(&fields.out_dir()?),
            project_name: fields.project_name()?,
            target_name: fields.target_name()?,
            target_ext: fields.target_ext()?,
            uuid: fields.uuid()?,
        })
    }
}

/// Canonical directory containing `file`; the file must exist.
pub(crate) fn project_dir(file: &Path) -> Result<PathBuf> {
    let canonical = file.canonicalize().map_err(|e| VcxprojError::io(file, e))?;
    Ok(canonical.parent().map(Path::to_path_buf).unwrap_or(canonical))
}

fn resolve(dir: Option<&Path>, literal: &str) -> PathBuf {
    let forward = paths::to_forward_slashes(literal);
    match dir {
        Some(dir) if !paths::has_variable_token(&forward) => paths::resolve_literal(dir, &forward),
        Some(_) => PathBuf::from(forward),
        None => paths::normalize(forward),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectRaw
// ═══════════════════════════════════════════════════════════════════════════════

/// Like [`Project`], but path fields are the literal strings from the file
/// with slashes turned forward. Nothing is anchored or normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRaw {
    pub cl_includes: Vec<String>,
    pub cl_compiles: Vec<String>,
    /// Entries inheriting item metadata (`%(...)`) are dropped.
    pub search_paths: Vec<String>,
    pub int_dir: String,
    pub out_dir: String,
    pub project_name: String,
    pub target_name: Option<String>,
    pub target_ext: Option<String>,
    pub uuid: String,
}

const TLOG_SUFFIX: &str = ".tlog";
const TLOG_MAX_NAME: usize = 16;
const TLOG_PREFIX: usize = 8;

impl ProjectRaw {
    pub fn read(file: impl AsRef<Path>, platform: &str) -> Result<Self> {
        let doc = Document::from_file(file)?;
        Self::from_document(&doc, platform)
    }

    pub fn from_document(doc: &Document, platform: &str) -> Result<Self> {
        let fields = FieldReader { doc, platform };
        let fwd = |v: Vec<String>| -> Vec<String> {
            v.iter().map(|s| paths::to_forward_slashes(s)).collect()
        };

        let search_paths: Vec<String> = fields
            .search_paths()?
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.contains("%("))
            .collect();

        Ok(Self {
            cl_includes: fwd(fields.cl_includes()?),
            cl_compiles: fwd(fields.cl_compiles()?),
            search_paths: fwd(search_paths),
            int_dir: paths::to_forward_slashes(&fields.int_dir()?),
            out_dir: paths::to_forward_slashes(&fields.out_dir()?),
            project_name: fields.project_name()?,
            target_name: fields.target_name()?,
            target_ext: fields.target_ext()?,
            uuid: fields.uuid()?,
        })
    }

    /// Name the toolchain uses for this project's `.tlog` directory.
    ///
    /// Names of up to 16 characters are used as they are. Longer ones are cut
    /// to 8 characters and followed by `.` and the first 8 characters of the
    /// UUID, so long names sharing a prefix still differ.
    pub fn tlog_name(&self) -> String {
        let name = &self.project_name;
        if name.chars().count() <= TLOG_MAX_NAME {
            return format!("{name}{TLOG_SUFFIX}");
        }
        let head: String = name.chars().take(TLOG_PREFIX).collect();
        let uuid: String = self.uuid.chars().take(TLOG_PREFIX).collect();
        format!("{head}.{uuid}{TLOG_SUFFIX}")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Rendering
// ═══════════════════════════════════════════════════════════════════════════════

struct Section<'f, 'a> {
    f: &'f mut fmt::Formatter<'a>,
}

impl Section<'_, '_> {
    fn header(&mut self, title: &str) -> fmt::Result {
        writeln!(self.f, "{title}:")
    }

    fn item(&mut self, value: impl fmt::Display) -> fmt::Result {
        writeln!(self.f, "  | \"{value}\"")
    }

    fn optional(&mut self, value: Option<&str>) -> fmt::Result {
        match value {
            Some(v) => self.item(v),
            None => writeln!(self.f, "  | (none)"),
        }
    }

    fn list<T: fmt::Display>(&mut self, title: &str, values: impl IntoIterator<Item = T>) -> fmt::Result {
        self.header(title)?;
        values.into_iter().try_for_each(|v| self.item(v))
    }

    fn one(&mut self, title: &str, value: impl fmt::Display) -> fmt::Result {
        self.header(title)?;
        self.item(value)
    }

    fn maybe(&mut self, title: &str, value: Option<&str>) -> fmt::Result {
        self.header(title)?;
        self.optional(value)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = Section { f };
        s.list("AdditionalIncludeDirectories", self.search_paths.iter().map(|p| p.display()))?;
        s.list("ClCompile", self.cl_compiles.iter().map(|p| p.display()))?;
        s.list("ClInclude", self.cl_includes.iter().map(|p| p.display()))?;
        s.one("IntDir", self.int_dir.display())?;
        s.one("OutDir", self.out_dir.display())?;
        s.one("ProjectName", &self.project_name)?;
        s.maybe("TargetName", self.target_name.as_deref())?;
        s.maybe("TargetExt", self.target_ext.as_deref())?;
        s.one("UUID", &self.uuid)
    }
}

impl fmt::Display for ProjectRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = Section { f };
        s.list("AdditionalIncludeDirectories", &self.search_paths)?;
        s.list("ClCompile", &self.cl_compiles)?;
        s.list("ClInclude", &self.cl_includes)?;
        s.one("IntDir", &self.int_dir)?;
        s.one("OutDir", &self.out_dir)?;
        s.one("ProjectName", &self.project_name)?;
        s.maybe("TargetName", self.target_name.as_deref())?;
        s.maybe("TargetExt", self.target_ext.as_deref())?;
        s.one("UUID", &self.uuid)?;
        s.one("tlog name", self.tlog_name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
