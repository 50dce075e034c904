//! Reader for Visual Studio `.sln` files.
//!
//! Only the project list is read. Each project is declared on one line:
//!
//! ```text
//! Project("{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}") = "app", "proj\app.vcxproj", "{8E6B1F4C-...}"
//! ```
//!
//! Lines starting with `Project(` are parsed with the grammar below; every
//! other line is skipped.
//!
//! ## Grammar
//!
//! ```text
//! line    = 'Project' '(' quoted ')' '=' quoted ',' quoted ',' quoted
//! quoted  = '"' chars '"'
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chumsky::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, VcxprojError};
use crate::paths;
use crate::project::{Project, project_dir};

const PROJECT_EXTENSION: &str = ".vcxproj";

// ═══════════════════════════════════════════════════════════════════════════════
//  Entries
// ═══════════════════════════════════════════════════════════════════════════════

/// One `Project(...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionEntry {
    /// Project type GUID, as written (with braces).
    pub kind: String,
    pub name: String,
    /// Path relative to the solution directory, with forward slashes.
    pub path: String,
    /// Project GUID, as written (with braces).
    pub guid: String,
}

impl SolutionEntry {
    /// Whether the entry declares a C++ project (rather than, say, a
    /// solution folder or a C# project).
    pub fn is_vcxproj(&self) -> bool {
        self.path.to_ascii_lowercase().ends_with(PROJECT_EXTENSION)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

fn entry_parser<'a>() -> impl Parser<'a, &'a str, SolutionEntry, extra::Err<Simple<'a, char>>> {
    // ── Double-quoted string ─────────────────────────────────────────────
    let quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'));

    // ── Project("{kind}") ────────────────────────────────────────────────
    let kind = just("Project").ignore_then(
        quoted
            .clone()
            .padded()
            .delimited_by(just('('), just(')')),
    );

    // ── = "name", "path", "{guid}" ───────────────────────────────────────
    kind.then_ignore(just('=').padded())
        .then(quoted.clone().padded())
        .then_ignore(just(','))
        .then(quoted.clone().padded())
        .then_ignore(just(','))
        .then(quoted.padded())
        .padded()
        .map(|(((kind, name), path), guid): (((&str, &str), &str), &str)| SolutionEntry {
            kind: kind.to_string(),
            name: name.to_string(),
            path: paths::to_forward_slashes(path),
            guid: guid.to_string(),
        })
}

/// Parse one `Project(...)` line. `line_number` is 1-based and only used for
/// error positions.
pub fn parse_entry(line: &str, line_number: u32) -> Result<SolutionEntry> {
    entry_parser().parse(line).into_result().map_err(|errs| {
        let column = errs.first().map_or(0, |e| e.span().start);
        let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
        VcxprojError::Parse {
            path: None,
            line: line_number,
            column: u32::try_from(column + 1).unwrap_or(u32::MAX),
            message: format!("Failed to parse project line '{}': {}", line.trim(), messages.join("; ")),
        }
    })
}

fn declares_project(line: &str) -> bool {
    line.trim_start().starts_with("Project(")
}

// ═══════════════════════════════════════════════════════════════════════════════
//  SolutionFile
// ═══════════════════════════════════════════════════════════════════════════════

/// The C++ projects a solution lists, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolutionFile {
    pub entries: Vec<SolutionEntry>,
}

impl SolutionFile {
    /// Parse solution text. Entries that are not `.vcxproj` files are
    /// dropped.
    pub fn parse(source: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in source.lines().enumerate() {
            if !declares_project(line) {
                continue;
            }
            let line_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let entry = parse_entry(line, line_number)?;
            if entry.is_vcxproj() {
                entries.push(entry);
            } else {
                debug!(name = %entry.name, path = %entry.path, "skipping non-C++ solution entry");
            }
        }
        Ok(Self { entries })
    }

    /// Read a `.sln` file from disk.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading solution");
        let source = std::fs::read_to_string(path).map_err(|e| VcxprojError::io(path, e))?;
        Self::parse(&source).map_err(|e| e.in_file(path))
    }

    /// Project paths relative to the solution directory.
    pub fn project_paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| PathBuf::from(&e.path)).collect()
    }
}

impl fmt::Display for SolutionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Projects:")?;
        for entry in &self.entries {
            writeln!(f, "  | \"{}\"", entry.path)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Solution
// ═══════════════════════════════════════════════════════════════════════════════

/// Every C++ project of a solution, read for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Solution {
    /// Keyed by the path relative to the solution directory.
    pub projects: BTreeMap<PathBuf, Project>,
}

impl Solution {
    /// Read the solution at `path` and every project it lists. Any project
    /// failing to read fails the whole call.
    pub fn read(path: impl AsRef<Path>, platform: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = SolutionFile::read(path)?;
        let dir = project_dir(path)?;

        let mut projects = BTreeMap::new();
        for relative in file.project_paths() {
            let project = Project::read(dir.join(&relative), platform)?;
            projects.insert(relative, project);
        }
        info!(solution = %path.display(), platform, projects = projects.len(), "read solution");
        Ok(Self { projects })
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, project) in &self.projects {
            writeln!(f, "{}:", path.display())?;
            for line in project.to_string().lines() {
                writeln!(f, "  {line}")?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const SLN: &str = "\u{feff}
Microsoft Visual Studio Solution File, Format Version 12.00
# Visual Studio Version 17
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"app\", \"app\\app.vcxproj\", \"{8E6B1F4C-0A6B-4F3E-9C43-1B7F1C2D3E4F}\"
EndProject
Project(\"{2150E333-8FDC-42A3-9474-1A3956D46DE8}\") = \"libs\", \"libs\", \"{0D5B1A2E-3C4D-4E5F-8A9B-0C1D2E3F4A5B}\"
EndProject
Project(\"{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}\") = \"core\", \"libs\\core\\Core.VCXPROJ\", \"{11111111-2222-3333-4444-555555555555}\"
\tProjectSection(ProjectDependencies) = postProject
\tEndProjectSection
EndProject
Project(\"{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}\") = \"tests\", \"tests\\tests.csproj\", \"{22222222-2222-3333-4444-555555555555}\"
EndProject
Global
EndGlobal
";

    // ── Line grammar ─────────────────────────────────────────────────────

    #[test]
    fn parse_entry_reads_all_fields() {
        let entry = parse_entry(
            r#"Project("{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}") = "app", "proj\app.vcxproj", "{ABC}""#,
            1,
        )
        .unwrap();
        assert_eq!(entry.kind, "{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}");
        assert_eq!(entry.name, "app");
        assert_eq!(entry.path, "proj/app.vcxproj");
        assert_eq!(entry.guid, "{ABC}");
        assert!(entry.is_vcxproj());
    }

    #[test]
    fn parse_entry_tolerates_spacing() {
        let entry = parse_entry("  Project( \"{K}\" )=\"n\" ,\"p.vcxproj\",  \"{G}\"\r", 1).unwrap();
        assert_eq!(entry.path, "p.vcxproj");
        assert_eq!(entry.guid, "{G}");
    }

    #[test]
    fn malformed_entry_reports_position() {
        let err = parse_entry(r#"Project("{K}") = "n", "p.vcxproj""#, 7).unwrap_err();
        match err {
            VcxprojError::Parse { line, column, .. } => {
                assert_eq!(line, 7);
                assert!(column > 1, "column {column}");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    // ── SolutionFile ─────────────────────────────────────────────────────

    #[test]
    fn solution_lists_cpp_projects_in_order() {
        let sln = SolutionFile::parse(SLN).unwrap();
        assert_eq!(
            sln.project_paths(),
            [PathBuf::from("app/app.vcxproj"), PathBuf::from("libs/core/Core.VCXPROJ")]
        );
        assert_eq!(sln.entries[1].name, "core");
    }

    #[test]
    fn solution_rendering() {
        let sln = SolutionFile::parse(SLN).unwrap();
        assert_eq!(
            sln.to_string(),
            "Projects:\n  | \"app/app.vcxproj\"\n  | \"libs/core/Core.VCXPROJ\"\n"
        );
    }

    #[test]
    fn malformed_solution_names_file_and_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.sln");
        std::fs::write(&path, "Global\nProject(\"{K}\") = oops\n").unwrap();
        let err = SolutionFile::read(&path).unwrap_err();
        match &err {
            VcxprojError::Parse { path: Some(p), line, .. } => {
                assert_eq!(p, &path);
                assert_eq!(*line, 2);
            }
            other => panic!("expected Parse with path, got {other:?}"),
        }
    }

    // ── Solution ─────────────────────────────────────────────────────────

    fn project_xml(name: &str, source: &str) -> String {
        format!(
            r#"<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup Label="Globals">
    <ProjectGuid>{{11111111-2222-3333-4444-555555555555}}</ProjectGuid>
    <ProjectName>{name}</ProjectName>
  </PropertyGroup>
  <PropertyGroup Condition="'$(Configuration)|$(Platform)'=='Debug|x64'">
    <IntDir>obj\</IntDir>
    <OutDir>$(SolutionDir)bin\</OutDir>
  </PropertyGroup>
  <ItemDefinitionGroup Condition="'$(Configuration)|$(Platform)'=='Debug|x64'">
    <ClCompile>
      <AdditionalIncludeDirectories>.</AdditionalIncludeDirectories>
    </ClCompile>
  </ItemDefinitionGroup>
  <ItemGroup>
    <ClCompile Include="{source}" />
  </ItemGroup>
</Project>"#
        )
    }

    #[test]
    fn solution_reads_every_project() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("app")).unwrap();
        std::fs::create_dir_all(root.join("libs").join("core")).unwrap();
        std::fs::write(root.join("app").join("app.vcxproj"), project_xml("app", "main.cpp")).unwrap();
        std::fs::write(
            root.join("libs").join("core").join("Core.VCXPROJ"),
            project_xml("core", r"..\..\shared\core.cpp"),
        )
        .unwrap();
        let sln = root.join("all.sln");
        std::fs::write(&sln, SLN).unwrap();

        let solution = Solution::read(&sln, "Debug|x64").unwrap();
        let keys: Vec<&PathBuf> = solution.projects.keys().collect();
        assert_eq!(keys, [&PathBuf::from("app/app.vcxproj"), &PathBuf::from("libs/core/Core.VCXPROJ")]);

        let core = &solution.projects[&PathBuf::from("libs/core/Core.VCXPROJ")];
        assert_eq!(core.project_name, "core");
        assert_eq!(core.cl_compiles, [root.join("shared").join("core.cpp")]);
        assert_eq!(core.out_dir, PathBuf::from("$(SolutionDir)bin/"));

        let text = solution.to_string();
        assert!(text.starts_with("app/app.vcxproj:\n  AdditionalIncludeDirectories:\n"), "{text}");
    }

    #[test]
    fn solution_fails_on_missing_project() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sln = tmp.path().join("all.sln");
        std::fs::write(&sln, SLN).unwrap();
        let err = Solution::read(&sln, "Debug|x64").unwrap_err();
        assert!(matches!(err, VcxprojError::Io { .. }), "{err}");
    }
}
