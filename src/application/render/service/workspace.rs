use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::warn;

use crate::application::render::types::RenderError;

const WORKSPACE_PREFIX: &str = "tikzmagic-";
const STEM: &str = "tikzfile";

/// Scratch directory owned by a single render. Removed when dropped or closed.
#[derive(Debug)]
pub(crate) struct TempWorkspace {
    dir: TempDir,
    source: PathBuf,
    pdf: PathBuf,
    png: PathBuf,
}

impl TempWorkspace {
    pub(crate) fn create(parent: Option<&Path>) -> Result<Self, RenderError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(RenderError::Workspace)?;

        let root = dir.path();
        Ok(Self {
            source: root.join(format!("{STEM}.tex")),
            pdf: root.join(format!("{STEM}.pdf")),
            png: root.join(format!("{STEM}.png")),
            dir,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn source(&self) -> &Path {
        &self.source
    }

    pub(crate) fn pdf(&self) -> &Path {
        &self.pdf
    }

    pub(crate) fn png(&self) -> &Path {
        &self.png
    }

    /// Remove the directory now, logging instead of failing the render.
    pub(crate) fn close(self) {
        let root = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(
                target = "application::render::workspace",
                op = "workspace::close",
                result = "error",
                workspace = %root.display(),
                error = %err,
                "Failed to remove render workspace"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn paths_share_one_stem_inside_the_root() {
        let parent = TempDir::new().expect("temp dir");
        let workspace = TempWorkspace::create(Some(parent.path())).expect("workspace");

        assert!(workspace.root().starts_with(parent.path()));
        assert_eq!(workspace.source(), workspace.root().join("tikzfile.tex"));
        assert_eq!(workspace.pdf(), workspace.root().join("tikzfile.pdf"));
        assert_eq!(workspace.png(), workspace.root().join("tikzfile.png"));
    }

    #[test]
    fn close_removes_directory_and_contents() {
        let parent = TempDir::new().expect("temp dir");
        let workspace = TempWorkspace::create(Some(parent.path())).expect("workspace");
        fs::write(workspace.source(), "x").expect("write");
        let root = workspace.root().to_path_buf();

        workspace.close();

        assert!(!root.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let parent = TempDir::new().expect("temp dir");
        let root = {
            let workspace = TempWorkspace::create(Some(parent.path())).expect("workspace");
            fs::write(workspace.pdf(), "x").expect("write");
            workspace.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
