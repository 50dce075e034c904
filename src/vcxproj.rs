use std::path::{Path, PathBuf};

use tracing::info;

use crate::edit::{self, EditOptions, Matcher};
use crate::error::{Result, VcxprojError};
use crate::paths::CaseSensitivity;
use crate::project::{Project, ProjectRaw, project_dir};
use crate::xml::{Document, Indent, NodeId};

// ═══════════════════════════════════════════════════════════════════════════════
//  Vcxproj – top-level handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle for reading and editing one `.vcxproj` (or `.filters`) file.
///
/// The file is parsed once into an owned tree. Reads query that tree; edits
/// mutate it in memory and reach the disk only on [`save`](Self::save), which
/// rewrites the whole file. Nothing is cached across handles: open a new one
/// to observe changes made by somebody else.
#[derive(Debug, Clone)]
pub struct Vcxproj {
    doc: Document,
    /// The file this handle was opened from. `None` when created via
    /// [`Vcxproj::parse`].
    path: Option<PathBuf>,
    /// Canonical parent directory of `path`, which relative references
    /// inside the file are resolved against.
    directory: Option<PathBuf>,
    options: EditOptions,
}

impl Vcxproj {
    /// Parse a project from its XML source, with default options.
    pub fn parse(source: &str) -> Result<Self> {
        VcxprojBuilder::new().parse(source)
    }

    /// Load a project file from disk, with default options.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        VcxprojBuilder::new().from_file(path)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The directory relative references are resolved against. `None` when
    /// the handle was created via [`parse`](Self::parse).
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn options(&self) -> &EditOptions {
        &self.options
    }

    // ─── Reading ─────────────────────────────────────────────────────────

    /// Snapshot of the project for `platform` (e.g. `Debug|x64`) with paths
    /// resolved against [`directory`](Self::directory).
    pub fn read(&self, platform: &str) -> Result<Project> {
        Project::from_document(&self.doc, self.directory(), platform)
    }

    /// Snapshot of the project for `platform` with path fields as written.
    pub fn read_raw(&self, platform: &str) -> Result<ProjectRaw> {
        ProjectRaw::from_document(&self.doc, platform)
    }

    // ─── Editing ─────────────────────────────────────────────────────────

    fn matcher(&self, operation: &'static str) -> Result<Matcher> {
        let dir = self.directory.as_ref().ok_or(VcxprojError::NoLocation { operation })?;
        Ok(Matcher::new(dir, self.options.cwd()?, self.options.case))
    }

    fn location(&self, operation: &'static str) -> Result<&Path> {
        self.path().ok_or(VcxprojError::NoLocation { operation })
    }

    /// Every reference to `src`; empty if there is none.
    pub fn find_source(&self, src: impl AsRef<Path>) -> Result<Vec<NodeId>> {
        edit::find_sources(&self.doc, &self.matcher("find a source")?, src.as_ref())
    }

    /// Whether `src` is referenced at least once.
    pub fn contains_source(&self, src: impl AsRef<Path>) -> Result<bool> {
        Ok(!self.find_source(src)?.is_empty())
    }

    /// Add a reference to `src` in memory. See [`edit::add_source`].
    pub fn add_source(&mut self, src: impl AsRef<Path>) -> Result<NodeId> {
        let matcher = self.matcher("add a source")?;
        let project = self.location("add a source")?.to_path_buf();
        edit::add_source(&mut self.doc, &matcher, src.as_ref(), &project)
    }

    /// Remove every reference to `src` in memory and return how many there
    /// were. See [`edit::remove_sources`].
    pub fn remove_source(&mut self, src: impl AsRef<Path>) -> Result<usize> {
        let matcher = self.matcher("remove a source")?;
        let file = self.location("remove a source")?.to_path_buf();
        edit::remove_sources(&mut self.doc, &matcher, src.as_ref(), &file)
    }

    // ─── Persisting ──────────────────────────────────────────────────────

    /// The document as it would be saved.
    pub fn to_xml(&self) -> Result<String> {
        self.doc
            .to_xml(self.options.indent)
            .map_err(|e| VcxprojError::persist(self.path().unwrap_or(Path::new("<memory>")), e))
    }

    /// Rewrite the file this handle was opened from.
    pub fn save(&self) -> Result<()> {
        let path = self.location("save")?;
        self.save_as(path)
    }

    /// Write the document to `path`.
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.doc.save(path, self.options.indent)?;
        info!(path = %path.display(), "saved project");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  VcxprojBuilder – construction with explicit options
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for a [`Vcxproj`] with non-default matching or output settings.
///
/// # Example
/// ```no_run
/// use vcxproj_rs::{CaseSensitivity, Indent, VcxprojBuilder};
///
/// let mut project = VcxprojBuilder::new()
///     .case_sensitivity(CaseSensitivity::Default)
///     .indent(Indent::tabs(1))
///     .from_file("app.vcxproj")
///     .unwrap();
/// project.add_source("src/new.cpp").unwrap();
/// project.save().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct VcxprojBuilder {
    options: EditOptions,
}

impl VcxprojBuilder {
    /// Case-insensitive matching, two-space indentation, the process working
    /// directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// How candidate paths are compared with stored references.
    /// [`CaseSensitivity::Default`] is resolved for the host here.
    pub fn case_sensitivity(mut self, case: CaseSensitivity) -> Self {
        self.options.case = case.resolve();
        self
    }

    /// Indentation used on save.
    pub fn indent(mut self, indent: Indent) -> Self {
        self.options.indent = indent;
        self
    }

    /// Directory relative candidate paths are resolved against, instead of
    /// the process working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn options(&self) -> &EditOptions {
        &self.options
    }

    /// Parse a project from its XML source.
    pub fn parse(self, source: &str) -> Result<Vcxproj> {
        Ok(Vcxproj {
            doc: Document::parse(source)?,
            path: None,
            directory: None,
            options: self.options,
        })
    }

    /// Load a project file from disk.
    pub fn from_file(self, path: impl AsRef<Path>) -> Result<Vcxproj> {
        let path = path.as_ref();
        let doc = Document::from_file(path)?;
        Ok(Vcxproj {
            doc,
            path: Some(path.to_path_buf()),
            directory: Some(project_dir(path)?),
            options: self.options,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
