mod template;
mod toolchain;
mod workspace;

use std::{
    fs,
    io::{self, Write},
    time::Instant,
};

use tracing::{info, warn};

use crate::application::render::types::{
    LatexDocument, RenderError, RenderOutput, RenderRequest, RenderService, ToolRun,
};

pub use template::assemble_document;
pub use toolchain::{DEFAULT_CONVERT_PROGRAM, DEFAULT_LATEX_PROGRAM, Toolchain};

use self::{toolchain::ToolInvocation, workspace::TempWorkspace};

/// Compile-and-convert pipeline backed by external LaTeX and ImageMagick tools.
#[derive(Debug, Clone, Default)]
pub struct TikzRenderService {
    toolchain: Toolchain,
}

impl TikzRenderService {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    fn render_in(
        &self,
        workspace: &TempWorkspace,
        request: &RenderRequest,
        document: &LatexDocument,
    ) -> Result<(Vec<u8>, ToolRun, ToolRun), RenderError> {
        fs::write(workspace.source(), document.as_str()).map_err(RenderError::WriteSource)?;

        let compile = self.run_tool(
            request,
            self.toolchain.compile(workspace.source(), workspace.root()),
        )?;
        if !workspace.pdf().is_file() {
            warn!(
                target = "application::render::tikz",
                op = "tikz::compile",
                result = "error",
                error_code = "missing_pdf",
                exit_code = compile.exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = compile.elapsed.as_millis() as u64,
                "LaTeX compiler produced no PDF"
            );
            return Err(RenderError::CompilationFailed {
                run: Box::new(compile),
            });
        }
        self.check_exit_status(&compile)?;

        if let Some(export) = request.export_file.as_ref() {
            fs::copy(workspace.pdf(), export).map_err(|source| RenderError::Export {
                path: export.clone(),
                source,
            })?;
        }

        let convert = self.run_tool(
            request,
            self.toolchain
                .rasterize(workspace.pdf(), workspace.png(), request.density()),
        )?;
        self.check_exit_status(&convert)?;

        let png = fs::read(workspace.png()).map_err(|source| RenderError::ReadImage {
            path: workspace.png().to_path_buf(),
            source,
        })?;

        Ok((png, compile, convert))
    }

    fn run_tool(
        &self,
        request: &RenderRequest,
        invocation: ToolInvocation,
    ) -> Result<ToolRun, RenderError> {
        if request.debug_mode {
            debug_echo(&invocation.command_line());
        }
        invocation.run(self.toolchain.timeout)
    }

    fn check_exit_status(&self, run: &ToolRun) -> Result<(), RenderError> {
        if run.success {
            return Ok(());
        }
        if self.toolchain.strict_exit_status {
            return Err(RenderError::ToolFailed {
                run: Box::new(run.clone()),
            });
        }
        warn!(
            target = "application::render::tikz",
            op = "tikz::render",
            program = %run.program,
            exit_code = run.exit_code.map(i64::from).unwrap_or(-1),
            stderr = %run.stderr,
            "Tool exited unsuccessfully but produced output; continuing"
        );
        Ok(())
    }
}

impl RenderService for TikzRenderService {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let started_at = Instant::now();
        let document = assemble_document(request);
        if request.debug_mode {
            debug_echo(document.as_str());
        }

        let workspace = TempWorkspace::create(self.toolchain.work_dir.as_deref())?;
        let result = self.render_in(&workspace, request, &document);
        workspace.close();

        match result {
            Ok((png, compile, convert)) => {
                info!(
                    target = "application::render::tikz",
                    op = "tikz::render",
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    compile_ms = compile.elapsed.as_millis() as u64,
                    convert_ms = convert.elapsed.as_millis() as u64,
                    density = request.density(),
                    png_bytes = png.len(),
                    "TikZ snippet rendered"
                );
                Ok(RenderOutput {
                    png,
                    density: request.density(),
                    document,
                    compile,
                    convert,
                    exported_pdf: request.export_file.clone(),
                    elapsed: started_at.elapsed(),
                })
            }
            Err(err) => {
                warn!(
                    target = "application::render::tikz",
                    op = "tikz::render",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "TikZ render failed"
                );
                Err(err)
            }
        }
    }
}

fn debug_echo(text: &str) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "{text}");
}
