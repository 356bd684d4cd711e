use crate::application::render::types::{LatexDocument, RenderRequest};

pub(crate) const PICTURE_BEGIN: &str = r"\begin{tikzpicture}";
pub(crate) const PICTURE_END: &str = r"\end{tikzpicture}";

/// Substitute the request into the standalone document template.
pub fn assemble_document(request: &RenderRequest) -> LatexDocument {
    let content = if request.wrap_env {
        format!("{PICTURE_BEGIN}{}{PICTURE_END}", request.body)
    } else {
        request.body.clone()
    };

    let border = &request.border;
    let packages = &request.latex_packages;
    let libraries = &request.tikz_libraries;
    let preamble = &request.latex_preamble;

    LatexDocument::new(format!(
        r"
\documentclass[tikz,border={border}]{{standalone}}
\usepackage{{tikz,{packages}}}
\usetikzlibrary{{{libraries}}}
{preamble}
\begin{{document}}
{content}
\end{{document}}
"
    ))
}
