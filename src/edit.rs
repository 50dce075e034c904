//! Adding and removing compiled-source references.
//!
//! A source file reaches this module as a filesystem path relative to the
//! process, while the project stores it as a back-slashed path relative to the
//! project file. [`Matcher`] brings both into the same absolute, normalized
//! form before comparing them.
//!
//! The `*_source(s)` functions edit an open [`Document`] in memory. The file
//! level functions ([`add_to_vcxproj`], [`add_to_project`], [`remove_from`])
//! open, edit and save in one call, so no half-edited document is ever
//! observable on disk through this crate.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, VcxprojError};
use crate::paths::{self, CaseSensitivity};
use crate::project::project_dir;
use crate::query::{Predicate, Query};
use crate::xml::{Document, Indent, NodeId};

const SOURCE_ELEMENT: &str = "ClCompile";
const GROUP_ELEMENT: &str = "ItemGroup";
const INCLUDE: &str = "Include";
const FILTERS_SUFFIX: &str = ".filters";

// ═══════════════════════════════════════════════════════════════════════════════
//  Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings shared by every editing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOptions {
    /// How stored references are compared with candidate paths.
    pub case: CaseSensitivity,
    /// Indentation used when the edited document is saved.
    pub indent: Indent,
    /// Directory relative candidate paths are resolved against.
    /// `None` means the process working directory.
    pub cwd: Option<PathBuf>,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            case: CaseSensitivity::Insensitive,
            indent: Indent::default(),
            cwd: None,
        }
    }
}

impl EditOptions {
    pub(crate) fn cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir().map_err(|e| VcxprojError::io(Path::new("."), e)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Matching
// ═══════════════════════════════════════════════════════════════════════════════

/// Compares candidate paths with references stored in one project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    dir: PathBuf,
    cwd: PathBuf,
    case: CaseSensitivity,
}

impl Matcher {
    /// `dir` is the directory of the project file (absolute, normalized),
    /// `cwd` the directory relative candidates are anchored at.
    pub fn new(dir: impl Into<PathBuf>, cwd: impl Into<PathBuf>, case: CaseSensitivity) -> Self {
        Self { dir: dir.into(), cwd: cwd.into(), case: case.resolve() }
    }

    /// Matcher for the references stored in `file`, which must exist.
    pub fn for_file(file: &Path, options: &EditOptions) -> Result<Self> {
        Ok(Self::new(project_dir(file)?, options.cwd()?, options.case))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The candidate as an absolute path: symlinks resolved if it exists,
    /// otherwise anchored at the working directory and normalized.
    pub fn absolute(&self, candidate: &Path) -> PathBuf {
        paths::to_absolute(candidate, &self.cwd)
    }

    /// Does the stored `literal` refer to `candidate`?
    pub fn matches(&self, candidate: &Path, literal: &str) -> bool {
        match_source(&self.dir, &self.absolute(candidate), literal, self.case)
    }

    /// The literal a reference to `src` is stored as: relative to the
    /// project directory with back slashes. A path that cannot be expressed
    /// relatively (another drive) is stored absolute.
    pub fn literal_for(&self, src: &Path) -> String {
        let absolute = self.absolute(src);
        let stored = paths::relative_to(&absolute, &self.dir).unwrap_or(absolute);
        paths::to_back_slashes(&stored.to_string_lossy())
    }
}

/// Compare an absolute candidate path with a literal stored in a project
/// whose directory is `prj_dir`.
pub fn match_source(prj_dir: &Path, candidate: &Path, literal: &str, case: CaseSensitivity) -> bool {
    paths::path_equals(candidate, paths::resolve_literal(prj_dir, literal), case)
}

/// Sources are looked up at any depth, so references inside `Choose` /
/// `When` blocks count just like top-level ones.
fn sources_query() -> Query {
    Query::anywhere(SOURCE_ELEMENT).filter(Predicate::HasAttr(INCLUDE.to_string()))
}

fn groups_query() -> Query {
    Query::anywhere(GROUP_ELEMENT).filter(Predicate::HasChild(SOURCE_ELEMENT.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  In-memory edits
// ═══════════════════════════════════════════════════════════════════════════════

/// Every `ClCompile` node whose stored path refers to `src`, in document
/// order. Duplicate references are all returned.
pub fn find_sources(doc: &Document, matcher: &Matcher, src: &Path) -> Result<Vec<NodeId>> {
    let candidate = matcher.absolute(src);
    let found: Vec<NodeId> = sources_query()
        .nodes(doc, &[])?
        .into_iter()
        .filter(|&node| {
            doc.attribute(node, INCLUDE)
                .is_some_and(|literal| match_source(&matcher.dir, &candidate, literal, matcher.case))
        })
        .collect();
    debug!(src = %src.display(), found = found.len(), "looked up source references");
    Ok(found)
}

/// Insert a reference to `src`. It goes into the first item group that
/// already holds sources; a new group is appended to the root element if
/// there is none.
///
/// `project` only names the project in the error returned when `src` is
/// already referenced.
pub fn add_source(doc: &mut Document, matcher: &Matcher, src: &Path, project: &Path) -> Result<NodeId> {
    if !find_sources(doc, matcher, src)?.is_empty() {
        return Err(VcxprojError::DuplicateReference {
            project: project.to_path_buf(),
            file: src.to_path_buf(),
        });
    }

    let group = match groups_query().nodes(doc, &[])?.first() {
        Some(&group) => group,
        None => {
            let parent = doc.root_element().unwrap_or(doc.root());
            debug!("no item group holds sources, creating one");
            doc.append_element(parent, GROUP_ELEMENT)
        }
    };

    let literal = matcher.literal_for(src);
    let node = doc.append_element(group, SOURCE_ELEMENT);
    doc.set_attribute(node, INCLUDE, &literal);
    debug!(src = %src.display(), %literal, "added source reference");
    Ok(node)
}

/// Detach every reference to `src` and return how many there were.
///
/// Removing something that is not referenced is an error; callers that want
/// to remove "if present" check with [`find_sources`] first. `file` only
/// names the document in that error.
pub fn remove_sources(doc: &mut Document, matcher: &Matcher, src: &Path, file: &Path) -> Result<usize> {
    let found = find_sources(doc, matcher, src)?;
    if found.is_empty() {
        return Err(VcxprojError::NotFound {
            file: file.to_path_buf(),
            reference: src.to_path_buf(),
        });
    }
    for &node in &found {
        doc.detach(node);
    }
    Ok(found.len())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Filters companion
// ═══════════════════════════════════════════════════════════════════════════════

/// Keeps a project's `.filters` companion (the IDE's folder view) in step
/// with source additions.
pub trait FiltersSync {
    fn add(&self, filters: &Path, src: &Path, options: &EditOptions) -> Result<()>;
}

/// Leaves the `.filters` file untouched. Which folder a new source belongs
/// in is not something a project file records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilters;

impl FiltersSync for NoFilters {
    fn add(&self, filters: &Path, src: &Path, _options: &EditOptions) -> Result<()> {
        debug!(filters = %filters.display(), src = %src.display(), "filters file left unchanged");
        Ok(())
    }
}

/// `app.vcxproj` → `app.vcxproj.filters`.
pub fn filters_path(project: &Path) -> PathBuf {
    let mut name = OsString::from(project.as_os_str());
    name.push(FILTERS_SUFFIX);
    PathBuf::from(name)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  File-level edits
// ═══════════════════════════════════════════════════════════════════════════════

/// Add `src` to the project file `project` and save it.
pub fn add_to_vcxproj(project: &Path, src: &Path, options: &EditOptions) -> Result<()> {
    let mut doc = Document::from_file(project)?;
    let matcher = Matcher::for_file(project, options)?;
    add_source(&mut doc, &matcher, src, project)?;
    doc.save(project, options.indent)?;
    info!(project = %project.display(), src = %src.display(), "added source");
    Ok(())
}

/// Add `src` to `project` and hand its `.filters` companion to `filters`.
pub fn add_to_project(
    project: &Path,
    src: &Path,
    options: &EditOptions,
    filters: &dyn FiltersSync,
) -> Result<()> {
    add_to_vcxproj(project, src, options)?;
    filters.add(&filters_path(project), src, options)
}

/// Remove every reference to `src` from `file` (a project or a filters
/// file) and save it.
pub fn remove_from(file: &Path, src: &Path, options: &EditOptions) -> Result<usize> {
    let mut doc = Document::from_file(file)?;
    let matcher = Matcher::for_file(file, options)?;
    let removed = remove_sources(&mut doc, &matcher, src, file)?;
    doc.save(file, options.indent)?;
    info!(file = %file.display(), src = %src.display(), removed, "removed source");
    Ok(removed)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project DefaultTargets="Build" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <ItemGroup>
    <ClInclude Include="a.h" />
  </ItemGroup>
  <ItemGroup>
    <ClCompile Include="..\..\src\a.cpp" />
  </ItemGroup>
  <ItemGroup>
    <ClCompile Include="local.cpp" />
  </ItemGroup>
</Project>
"#;

    const NO_SOURCES: &str = r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <ItemGroup>
    <ClInclude Include="a.h" />
  </ItemGroup>
</Project>"#;

    fn matcher(case: CaseSensitivity) -> Matcher {
        Matcher::new("/repo/proj/vc", "/elsewhere", case)
    }

    fn doc() -> Document {
        Document::parse(PROJECT).unwrap()
    }

    fn includes(doc: &Document) -> Vec<String> {
        sources_query().attr(INCLUDE).values(doc, &[]).unwrap()
    }

    // ── Matching ─────────────────────────────────────────────────────────

    #[test]
    fn stored_literal_matches_absolute_candidate() {
        let dir = Path::new("/repo/proj/vc");
        let case = CaseSensitivity::Insensitive;
        assert!(match_source(dir, Path::new("/repo/src/a.cpp"), r"..\..\src\a.cpp", case));
        assert!(match_source(dir, Path::new("/REPO/src/A.cpp"), r"..\..\src\a.cpp", case));
        assert!(!match_source(dir, Path::new("/repo/src/b.cpp"), r"..\..\src\a.cpp", case));
        assert!(!match_source(
            dir,
            Path::new("/REPO/src/A.cpp"),
            r"..\..\src\a.cpp",
            CaseSensitivity::Sensitive
        ));
    }

    #[test]
    fn relative_candidate_is_anchored_at_cwd() {
        let m = Matcher::new("/repo/proj/vc", "/repo/tools", CaseSensitivity::Insensitive);
        assert!(m.matches(Path::new("../src/a.cpp"), r"..\..\src\a.cpp"));
        assert!(!m.matches(Path::new("src/a.cpp"), r"..\..\src\a.cpp"));
    }

    #[test]
    fn literal_is_project_relative_with_back_slashes() {
        let m = matcher(CaseSensitivity::Insensitive);
        assert_eq!(m.literal_for(Path::new("/repo/src/b.cpp")), r"..\..\src\b.cpp");
        assert_eq!(m.literal_for(Path::new("/repo/proj/vc/x/c.cpp")), r"x\c.cpp");
    }

    // ── find ─────────────────────────────────────────────────────────────

    #[test]
    fn find_locates_existing_reference() {
        let d = doc();
        let m = matcher(CaseSensitivity::Insensitive);
        let found = find_sources(&d, &m, Path::new("/repo/src/a.cpp")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(d.attribute(found[0], INCLUDE), Some(r"..\..\src\a.cpp"));

        assert!(find_sources(&d, &m, Path::new("/repo/src/b.cpp")).unwrap().is_empty());
    }

    #[test]
    fn find_respects_case_sensitivity() {
        let d = doc();
        let upper = Path::new("/repo/SRC/a.cpp");
        assert_eq!(find_sources(&d, &matcher(CaseSensitivity::Insensitive), upper).unwrap().len(), 1);
        assert!(find_sources(&d, &matcher(CaseSensitivity::Sensitive), upper).unwrap().is_empty());
    }

    // ── add ──────────────────────────────────────────────────────────────

    #[test]
    fn add_goes_into_first_source_group() {
        let mut d = doc();
        let m = matcher(CaseSensitivity::Insensitive);
        let existing = find_sources(&d, &m, Path::new("/repo/src/a.cpp")).unwrap()[0];

        let b = Path::new("/repo/src/b.cpp");
        assert!(find_sources(&d, &m, b).unwrap().is_empty());
        let node = add_source(&mut d, &m, b, Path::new("app.vcxproj")).unwrap();

        assert_eq!(d.parent(node), d.parent(existing));
        assert_eq!(d.attribute(node, INCLUDE), Some(r"..\..\src\b.cpp"));
        assert_eq!(find_sources(&d, &m, b).unwrap(), [node]);
        assert_eq!(includes(&d), [r"..\..\src\a.cpp", r"..\..\src\b.cpp", "local.cpp"]);
    }

    #[test]
    fn add_twice_is_a_duplicate() {
        let mut d = doc();
        let m = matcher(CaseSensitivity::Insensitive);
        let b = Path::new("/repo/src/b.cpp");
        add_source(&mut d, &m, b, Path::new("app.vcxproj")).unwrap();
        let err = add_source(&mut d, &m, b, Path::new("app.vcxproj")).unwrap_err();
        assert!(matches!(err, VcxprojError::DuplicateReference { .. }), "{err}");
    }

    #[test]
    fn add_creates_group_when_none_holds_sources() {
        let mut d = Document::parse(NO_SOURCES).unwrap();
        let m = matcher(CaseSensitivity::Insensitive);
        let node = add_source(&mut d, &m, Path::new("/repo/proj/vc/main.cpp"), Path::new("p")).unwrap();

        let group = d.parent(node).unwrap();
        assert_eq!(d.name(group), Some(GROUP_ELEMENT));
        assert_eq!(d.parent(group), d.root_element());
        assert_eq!(d.children(d.root_element().unwrap()).last(), Some(group));
        assert_eq!(includes(&d), ["main.cpp"]);
    }

    // ── remove ───────────────────────────────────────────────────────────

    #[test]
    fn remove_twice_is_not_found() {
        let mut d = doc();
        let m = matcher(CaseSensitivity::Insensitive);
        let a = Path::new("/repo/src/a.cpp");
        assert_eq!(remove_sources(&mut d, &m, a, Path::new("p")).unwrap(), 1);
        assert!(find_sources(&d, &m, a).unwrap().is_empty());
        let err = remove_sources(&mut d, &m, a, Path::new("p")).unwrap_err();
        assert!(matches!(err, VcxprojError::NotFound { .. }), "{err}");
        assert_eq!(includes(&d), ["local.cpp"]);
    }

    #[test]
    fn remove_detaches_every_duplicate() {
        let source = PROJECT.replace(
            r#"<ClCompile Include="local.cpp" />"#,
            r#"<ClCompile Include="..\..\SRC\a.cpp" /><ClCompile Include="local.cpp" />"#,
        );
        let mut d = Document::parse(&source).unwrap();
        let m = matcher(CaseSensitivity::Insensitive);
        let a = Path::new("/repo/src/a.cpp");
        assert_eq!(find_sources(&d, &m, a).unwrap().len(), 2);
        assert_eq!(remove_sources(&mut d, &m, a, Path::new("p")).unwrap(), 2);
        assert_eq!(includes(&d), ["local.cpp"]);
    }

    const NESTED: &str = r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <Choose>
    <When Condition="'$(Platform)'=='x64'">
      <ItemGroup>
        <ClCompile Include="..\..\src\a.cpp" />
      </ItemGroup>
    </When>
  </Choose>
</Project>"#;

    #[test]
    fn sources_inside_choose_blocks_are_found() {
        let mut d = Document::parse(NESTED).unwrap();
        let m = matcher(CaseSensitivity::Insensitive);
        let (a, b) = (Path::new("/repo/src/a.cpp"), Path::new("/repo/src/b.cpp"));
        let prj = Path::new("app.vcxproj");

        assert_eq!(find_sources(&d, &m, a).unwrap().len(), 1);
        let err = add_source(&mut d, &m, a, prj).unwrap_err();
        assert!(matches!(err, VcxprojError::DuplicateReference { .. }), "{err}");

        let node = add_source(&mut d, &m, b, prj).unwrap();
        assert_eq!(find_sources(&d, &m, b).unwrap(), [node]);
        assert!(matches!(
            add_source(&mut d, &m, b, prj),
            Err(VcxprojError::DuplicateReference { .. })
        ));

        assert_eq!(remove_sources(&mut d, &m, a, prj).unwrap(), 1);
        assert_eq!(remove_sources(&mut d, &m, b, prj).unwrap(), 1);
        assert!(includes(&d).is_empty());
    }

    // ── Filters ──────────────────────────────────────────────────────────

    #[test]
    fn filters_path_appends_suffix() {
        assert_eq!(
            filters_path(Path::new("/repo/app.vcxproj")),
            PathBuf::from("/repo/app.vcxproj.filters")
        );
    }

    // ── On disk ──────────────────────────────────────────────────────────

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let dir = root.join("proj").join("vc");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src").join("a.cpp"), "").unwrap();
        let project = dir.join("app.vcxproj");
        std::fs::write(&project, PROJECT).unwrap();
        Fixture { _tmp: tmp, root, project }
    }

    fn options(cwd: &Path) -> EditOptions {
        EditOptions { cwd: Some(cwd.to_path_buf()), ..EditOptions::default() }
    }

    #[test]
    fn add_and_remove_persist() {
        let fx = fixture();
        let opts = options(&fx.root);

        add_to_project(&fx.project, Path::new("src/b.cpp"), &opts, &NoFilters).unwrap();
        let written = std::fs::read_to_string(&fx.project).unwrap();
        assert!(written.contains(r#"<ClCompile Include="..\..\src\b.cpp"/>"#), "{written}");
        assert!(!filters_path(&fx.project).exists());

        let err = add_to_vcxproj(&fx.project, Path::new("src/b.cpp"), &opts).unwrap_err();
        assert!(matches!(err, VcxprojError::DuplicateReference { .. }));

        assert_eq!(remove_from(&fx.project, &fx.root.join("src").join("a.cpp"), &opts).unwrap(), 1);
        let err = remove_from(&fx.project, Path::new("src/a.cpp"), &opts).unwrap_err();
        assert!(matches!(err, VcxprojError::NotFound { .. }));

        let doc = Document::from_file(&fx.project).unwrap();
        assert_eq!(includes(&doc), [r"..\..\src\b.cpp", "local.cpp"]);
    }

    #[test]
    fn failed_edit_leaves_file_untouched() {
        let fx = fixture();
        let before = std::fs::read_to_string(&fx.project).unwrap();
        let err = remove_from(&fx.project, Path::new("nope.cpp"), &options(&fx.root)).unwrap_err();
        assert!(matches!(err, VcxprojError::NotFound { .. }));
        assert_eq!(std::fs::read_to_string(&fx.project).unwrap(), before);
    }

    #[test]
    fn remove_from_filters_file() {
        let fx = fixture();
        let filters = filters_path(&fx.project);
        std::fs::write(
            &filters,
            r#"<Project ToolsVersion="4.0" xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <ItemGroup>
    <ClCompile Include="..\..\src\a.cpp">
      <Filter>Source Files</Filter>
    </ClCompile>
  </ItemGroup>
</Project>"#,
        )
        .unwrap();
        assert_eq!(remove_from(&filters, Path::new("src/a.cpp"), &options(&fx.root)).unwrap(), 1);
        let written = std::fs::read_to_string(&filters).unwrap();
        assert!(!written.contains("a.cpp"), "{written}");
    }

    #[cfg(unix)]
    #[test]
    fn find_resolves_symlinked_candidate() {
        let fx = fixture();
        let link = fx.root.join("link");
        std::os::unix::fs::symlink(fx.root.join("src"), &link).unwrap();
        let m = Matcher::for_file(&fx.project, &options(&fx.root)).unwrap();
        let d = Document::from_file(&fx.project).unwrap();

        let found = find_sources(&d, &m, Path::new("link/a.cpp")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(find_sources(&d, &m, Path::new("link/missing.cpp")).unwrap().is_empty());
    }

    #[test]
    fn missing_project_is_an_io_error() {
        let fx = fixture();
        let missing = fx.root.join("missing.vcxproj");
        let err = add_to_vcxproj(&missing, Path::new("a.cpp"), &options(&fx.root)).unwrap_err();
        assert!(matches!(err, VcxprojError::Io { .. }), "{err}");
    }
}
