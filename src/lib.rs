pub mod edit;
pub mod error;
pub mod paths;
pub mod project;
pub mod query;
pub mod solution;
pub mod vcxproj;
pub mod xml;

pub use edit::{EditOptions, FiltersSync, NoFilters};
pub use error::{Result, VcxprojError};
pub use paths::CaseSensitivity;
pub use project::{Project, ProjectRaw};
pub use solution::{Solution, SolutionFile};
pub use vcxproj::{Vcxproj, VcxprojBuilder};
pub use xml::Indent;
